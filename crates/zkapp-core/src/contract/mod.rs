//! Contract declarations.
//!
//! A [`ContractDefinition`] is an explicit registration table: the contract's
//! named state slots in layout order plus one compiled [`MethodCircuit`] per
//! method. It is built once, then shared read-only by the transaction builder
//! and the prover. A [`ContractInstance`] binds a definition to an address.
//!
//! ```ignore
//! let mut def = ContractDefinition::new("Counter");
//! def.declare_state(&["count"])?;
//! def.declare_methods(vec![MethodDecl::new("bump", [ParamType::Field], |ctx, args| {
//!     let count = ctx.get("count")?;
//!     ctx.assert_equals(count, count)?;
//!     let next = ctx.add(count, args[0]);
//!     ctx.set("count", next)
//! })])?;
//! ```

pub mod circuit;
mod context;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::backend::Fingerprint;
use crate::crypto::PublicKey;
use crate::error::{Result, ZkappError};

pub use circuit::{Constraint, Evaluation, MethodCircuit, Node, Relation, Var};
pub use context::MethodContext;

/// Type of a method parameter or state slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Field,
}

type MethodBody = Arc<dyn Fn(&mut MethodContext<'_>, &[Var]) -> Result<()> + Send + Sync>;

/// A method signature plus the body that records its assertions.
#[derive(Clone)]
pub struct MethodDecl {
    name: String,
    params: Vec<ParamType>,
    body: MethodBody,
}

impl MethodDecl {
    pub fn new<F>(name: impl Into<String>, params: impl IntoIterator<Item = ParamType>, body: F) -> Self
    where
        F: Fn(&mut MethodContext<'_>, &[Var]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            body: Arc::new(body),
        }
    }
}

impl fmt::Debug for MethodDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDecl")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredMethod {
    pub params: Vec<ParamType>,
    pub circuit: MethodCircuit,
}

/// Static description of a contract: slot layout and method circuits.
#[derive(Debug, Clone)]
pub struct ContractDefinition {
    name: String,
    slots: Vec<String>,
    state_declared: bool,
    methods: BTreeMap<String, DeclaredMethod>,
    frozen: bool,
}

impl ContractDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            state_declared: false,
            methods: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Register the contract's state slots in layout order.
    ///
    /// Fails if state was already declared, if methods were declared first,
    /// or if slot names are empty or repeated.
    pub fn declare_state(&mut self, slots: &[&str]) -> Result<()> {
        if self.frozen {
            return Err(ZkappError::declaration(
                &self.name,
                "state declared after methods",
            ));
        }
        if self.state_declared {
            return Err(ZkappError::declaration(&self.name, "state declared twice"));
        }
        let mut names: Vec<String> = Vec::with_capacity(slots.len());
        for slot in slots {
            if slot.is_empty() {
                return Err(ZkappError::declaration(&self.name, "empty slot name"));
            }
            if names.iter().any(|existing| existing == slot) {
                return Err(ZkappError::declaration(
                    &self.name,
                    format!("duplicate slot '{slot}'"),
                ));
            }
            names.push(slot.to_string());
        }
        self.slots = names;
        self.state_declared = true;
        Ok(())
    }

    /// Register methods by recording each body's circuit, then freeze the definition.
    ///
    /// Fails on duplicate method names, reads or writes of undeclared slots,
    /// and state reads that no assertion constrains.
    pub fn declare_methods(&mut self, methods: Vec<MethodDecl>) -> Result<()> {
        if self.frozen {
            return Err(ZkappError::declaration(&self.name, "methods declared twice"));
        }
        let mut declared = BTreeMap::new();
        for method in methods {
            if declared.contains_key(&method.name) {
                return Err(ZkappError::declaration(
                    &self.name,
                    format!("duplicate method '{}'", method.name),
                ));
            }
            let mut ctx =
                MethodContext::new(&self.name, &method.name, &self.slots, method.params.len());
            let args = ctx.arguments();
            (method.body)(&mut ctx, &args).map_err(|err| match err {
                ZkappError::Declaration { .. } => err,
                other => ZkappError::declaration(
                    &self.name,
                    format!("method '{}' failed while recording: {other}", method.name),
                ),
            })?;
            let circuit = ctx.finish()?;
            tracing::debug!(
                contract = %self.name,
                method = %method.name,
                constraints = circuit.constraints.len(),
                writes = circuit.writes.len(),
                "declared method"
            );
            declared.insert(
                method.name.clone(),
                DeclaredMethod {
                    params: method.params,
                    circuit,
                },
            );
        }
        self.methods = declared;
        self.frozen = true;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_names(&self) -> &[String] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_index(&self, slot: &str) -> Option<usize> {
        self.slots.iter().position(|name| name == slot)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn method(&self, name: &str) -> Option<&DeclaredMethod> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = (&String, &DeclaredMethod)> {
        self.methods.iter()
    }

    /// Circuits keyed by method name.
    pub fn circuits(&self) -> BTreeMap<String, MethodCircuit> {
        self.methods
            .iter()
            .map(|(name, method)| (name.clone(), method.circuit.clone()))
            .collect()
    }

    /// SHA-256 over the name, slot layout and method circuits.
    ///
    /// Identical declarations always produce the same fingerprint.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            name: &'a str,
            slots: &'a [String],
            methods: &'a BTreeMap<String, DeclaredMethod>,
        }
        let bytes = serde_json::to_vec(&Canonical {
            name: &self.name,
            slots: &self.slots,
            methods: &self.methods,
        })?;
        Ok(Fingerprint(Sha256::digest(&bytes).into()))
    }
}

/// A contract definition deployed (or to be deployed) at an address.
#[derive(Debug, Clone)]
pub struct ContractInstance {
    pub address: PublicKey,
    pub definition: Arc<ContractDefinition>,
}

impl ContractInstance {
    pub fn new(address: PublicKey, definition: Arc<ContractDefinition>) -> Self {
        Self {
            address,
            definition,
        }
    }
}
