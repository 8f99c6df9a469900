//! Inspect command: print the contents of a saved session file.

use std::path::Path;

use anyhow::{Context, Result};

use super::format_entry;
use crate::session::Session;

pub fn run(file: &Path, show_trajectory: bool) -> Result<()> {
    let session = Session::load(file)
        .with_context(|| format!("failed to load session from {}", file.display()))?;

    println!("session:          {}", session.session_id());
    println!("state version:    {}", session.state_version());
    println!("trajectory:       {} entries", session.trajectory_len());
    println!("max artifact:     {} bytes", session.max_artifact_size());

    let state = session.state();
    println!("\nstate ({} keys):", state.len());
    for (key, value) in &state {
        println!("  {key} = {value}");
    }

    let artifacts = session.list_artifacts();
    println!("\nartifacts ({}):", artifacts.len());
    for name in &artifacts {
        let size = session.artifact_size(name).unwrap_or(0);
        println!("  {name} ({size} bytes)");
    }

    if show_trajectory {
        println!("\ntrajectory:");
        for entry in session.trajectory() {
            println!("{}", format_entry(entry));
        }
    }
    Ok(())
}
