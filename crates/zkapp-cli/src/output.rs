//! What `zkapp` prints: section banners, tagged status lines, the numbered
//! steps of `zkapp run`, account fields and transaction outcomes.
//!
//! Styling comes from [`console`]; long waits (proving, inclusion) get an
//! [`indicatif`] spinner.

use std::time::Duration;

use console::{style, StyledObject};
use indicatif::ProgressBar;

use zkapp_core::TransactionOutcome;

fn tag(label: &'static str) -> StyledObject<&'static str> {
    let styled = style(label).bold();
    match label {
        "[OK]" => styled.green(),
        "[WARN]" => styled.yellow(),
        _ => styled.red(),
    }
}

/// Command banner, e.g. `zkapp run` over a rule of the same width.
pub fn print_header(text: &str) {
    println!("\n{}", style(text).bold().cyan());
    println!("{}", style("-".repeat(text.chars().count())).dim());
}

pub fn print_success(text: &str) {
    println!("{} {text}", tag("[OK]"));
}

pub fn print_warning(text: &str) {
    println!("{} {text}", tag("[WARN]"));
}

pub fn print_error(text: &str) {
    println!("{} {text}", tag("[ERROR]"));
}

/// `(2/4) Deploying...`
pub fn print_step(step: u32, total: u32, text: &str) {
    println!("{} {text}", style(format!("({step}/{total})")).bold().dim());
}

/// An indented `key: value` line, used for accounts, keys and fingerprints.
pub fn print_key_value(key: &str, value: &str) {
    let key = format!("{key}:");
    println!("    {} {value}", style(format!("{key:<18}")).dim());
}

/// One-line summary of a finished transaction.
pub fn outcome_line(outcome: &TransactionOutcome) -> String {
    match outcome {
        TransactionOutcome::Included { handle, accounts } => {
            format!("{handle} included, {} account(s) updated", accounts.len())
        }
        TransactionOutcome::Rejected { handle, reason } => format!("{handle} rejected: {reason}"),
        TransactionOutcome::TimedOut { handle } => {
            format!("{handle} not included before the timeout; it may still land")
        }
    }
}

pub fn print_outcome(outcome: &TransactionOutcome) {
    let line = outcome_line(outcome);
    match outcome {
        TransactionOutcome::Included { .. } => print_success(&line),
        TransactionOutcome::Rejected { .. } => print_error(&line),
        TransactionOutcome::TimedOut { .. } => print_warning(&line),
    }
}

/// A ticking spinner; finish it with `finish_and_clear`.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner().with_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
