//! JSON-RPC ledger client over HTTP.
//!
//! Methods: `getAccount`, `sendTransaction`, `queryInclusion`. Ledger-level
//! refusals come back as JSON-RPC errors with the codes below; everything
//! that prevents a well-formed response is a [`NetworkError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::account::AccountRecord;
use crate::crypto::PublicKey;
use crate::error::{NetworkError, Result, ZkappError};
use crate::transaction::Transaction;

use super::{InclusionStatus, LedgerClient, TransactionHandle};

const JSONRPC_VERSION: &str = "2.0";

/// The ledger has no account for the requested key.
pub const CODE_ACCOUNT_NOT_FOUND: i64 = -32004;
/// The fee payer nonce does not match the ledger's.
pub const CODE_STALE_NONCE: i64 = -32010;
/// The ledger refused the transaction.
pub const CODE_REJECTED: i64 = -32011;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetAccountParams<'a> {
    public_key: &'a PublicKey,
}

#[derive(Debug, Serialize)]
struct SendTransactionParams {
    /// Hex of [`Transaction::encode`].
    transaction: String,
}

#[derive(Debug, Serialize)]
struct QueryInclusionParams<'a> {
    handle: &'a TransactionHandle,
}

#[derive(Debug, Deserialize)]
struct SendTransactionResult {
    handle: TransactionHandle,
}

/// Context used to turn a JSON-RPC error into a typed [`ZkappError`].
enum Call<'a> {
    GetAccount(&'a PublicKey),
    Send(&'a Transaction),
    Query,
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    inner: Client,
    url: Url,
}

impl HttpLedgerClient {
    pub fn from_endpoint(endpoint: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(endpoint).map_err(|err| {
            NetworkError::Transport(format!("invalid endpoint '{endpoint}': {err}"))
        })?;
        let inner = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self { inner, url })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
        context: Call<'_>,
    ) -> Result<R> {
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: 1,
            method,
            params,
        };
        tracing::trace!(method, url = %self.url, "ledger request");
        let response = self
            .inner
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(NetworkError::Transport(format!("HTTP status {}", response.status())).into());
        }
        let response: JsonRpcResponse = response.json().await.map_err(transport)?;
        if let Some(error) = response.error {
            return Err(rpc_error(error, context));
        }
        let result = response
            .result
            .ok_or_else(|| NetworkError::Transport(format!("empty response to {method}")))?;
        serde_json::from_value(result).map_err(|err| {
            NetworkError::Transport(format!("malformed {method} response: {err}")).into()
        })
    }
}

fn transport(err: reqwest::Error) -> ZkappError {
    if err.is_timeout() {
        NetworkError::Timeout.into()
    } else {
        NetworkError::Transport(err.to_string()).into()
    }
}

fn rpc_error(error: JsonRpcError, context: Call<'_>) -> ZkappError {
    match (error.code, context) {
        (CODE_ACCOUNT_NOT_FOUND, Call::GetAccount(public_key)) => {
            NetworkError::NotFound(*public_key).into()
        }
        (CODE_STALE_NONCE, Call::Send(transaction)) => {
            let used = transaction.fee_payer.nonce;
            let expected = error
                .data
                .as_ref()
                .and_then(|data| data.get("expected"))
                .and_then(Value::as_u64)
                .unwrap_or(used);
            ZkappError::StaleNonce {
                fee_payer: transaction.fee_payer.public_key,
                used,
                expected,
            }
        }
        (CODE_REJECTED, _) => ZkappError::Rejected(error.message),
        (code, _) => {
            NetworkError::Transport(format!("rpc error {code}: {}", error.message)).into()
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_account(&self, public_key: &PublicKey) -> Result<AccountRecord> {
        self.call(
            "getAccount",
            GetAccountParams { public_key },
            Call::GetAccount(public_key),
        )
        .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<TransactionHandle> {
        let params = SendTransactionParams {
            transaction: hex::encode(transaction.encode()?),
        };
        let result: SendTransactionResult = self
            .call("sendTransaction", params, Call::Send(transaction))
            .await?;
        Ok(result.handle)
    }

    async fn query_inclusion(&self, handle: &TransactionHandle) -> Result<InclusionStatus> {
        self.call("queryInclusion", QueryInclusionParams { handle }, Call::Query)
            .await
    }
}
