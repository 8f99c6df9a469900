//! Demo command: run the built-in pipeline in a fresh session.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::{format_entry, text_key_params};
use crate::agent::{ReverseAgent, UppercaseAgent};
use crate::dispatcher::Dispatcher;
use crate::session::Session;
use crate::types::CapabilityCall;

pub fn run(text: &str, save: Option<&Path>) -> Result<()> {
    let mut session = Session::new();
    println!("session {}", session.session_id());

    session.set("text", text).context("failed to seed state")?;

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(Arc::new(ReverseAgent))
        .context("failed to register reverse agent")?;
    dispatcher
        .register(Arc::new(UppercaseAgent))
        .context("failed to register uppercase agent")?;

    let calls = vec![
        CapabilityCall::new("reverse", text_key_params()),
        CapabilityCall::new("uppercase", text_key_params()),
    ];
    let outcome = dispatcher.dispatch_sequence(&calls, &mut session);

    for (call, result) in calls.iter().zip(&outcome.results) {
        let status = if result.success { "ok" } else { "failed" };
        println!("  {} -> {}", call.capability, status);
    }
    if let Some(index) = outcome.failed_at {
        anyhow::bail!(
            "pipeline failed at call {index}: {}",
            outcome
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string())
        );
    }

    println!(
        "result: {}",
        session
            .get("text")
            .map(|v| v.to_string())
            .unwrap_or_default()
    );
    println!("state version: {}", session.state_version());
    println!("\ntrajectory:");
    for entry in session.trajectory() {
        println!("{}", format_entry(entry));
    }

    if let Some(path) = save {
        session
            .save(path)
            .with_context(|| format!("failed to save session to {}", path.display()))?;
        println!("\nsaved to {}", path.display());
    }
    Ok(())
}
