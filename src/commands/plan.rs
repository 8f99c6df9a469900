//! Plan command: turn a prompt into capability calls via Ollama.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::format_entry;
use crate::agent::{ReverseAgent, UppercaseAgent};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::llm::OllamaProvider;
use crate::planner::Planner;
use crate::session::Session;

pub fn run(prompt: &str, text: &str, execute: bool, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path).context("failed to load config")?;

    let provider = OllamaProvider::new(
        &config.llm.base_url,
        &config.llm.model,
        Duration::from_secs(config.llm.timeout_seconds),
    )
    .context("failed to build ollama client")?;

    if !provider.is_available() {
        bail!(
            "ollama server at {} is not reachable; is it running?",
            provider.base_url()
        );
    }

    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(Arc::new(ReverseAgent))
        .context("failed to register reverse agent")?;
    dispatcher
        .register(Arc::new(UppercaseAgent))
        .context("failed to register uppercase agent")?;

    let mut session = Session::new();
    session.set("text", text).context("failed to seed state")?;

    let planner = Planner::new(Box::new(provider))
        .with_capabilities(dispatcher.get_capabilities());
    let plan = planner.plan(prompt, Some(&mut session));

    if !plan.success {
        let error = plan
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        if let Some(raw) = plan.raw_response {
            eprintln!("raw response: {raw}");
        }
        bail!("planning failed: {error}");
    }

    println!("plan ({} calls):", plan.calls.len());
    for call in &plan.calls {
        println!(
            "  {} {}",
            call.capability,
            serde_json::Value::Object(call.params.clone())
        );
    }

    if execute {
        let outcome = dispatcher.dispatch_sequence(&plan.calls, &mut session);
        if let Some(index) = outcome.failed_at {
            bail!(
                "execution failed at call {index}: {}",
                outcome
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        println!(
            "\nresult: {}",
            session
                .get("text")
                .map(|v| v.to_string())
                .unwrap_or_default()
        );
        println!("\ntrajectory:");
        for entry in session.trajectory() {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}
