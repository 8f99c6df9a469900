//! Traject CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use traject::commands;

/// Deterministic, auditable session kernel for agent workflows.
#[derive(Parser, Debug)]
#[command(name = "traject", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the built-in reverse/uppercase pipeline in a fresh session.
    Demo {
        /// Text to seed the session with.
        #[arg(long, default_value = "hello world")]
        text: String,
        /// Save the finished session to this file.
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Print the contents of a saved session file.
    Inspect {
        /// Path to a saved session.
        file: PathBuf,
        /// Also print the full trajectory.
        #[arg(long)]
        trajectory: bool,
    },
    /// Ask the LLM planner to turn a prompt into capability calls.
    Plan {
        /// Natural language request.
        prompt: String,
        /// Text to seed the session with.
        #[arg(long, default_value = "hello world")]
        text: String,
        /// Execute the generated plan.
        #[arg(long)]
        execute: bool,
        /// Path to configuration file.
        #[arg(short, long, default_value = "traject.yaml")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let result = match args.command {
        Command::Demo { text, save } => commands::demo::run(&text, save.as_deref()),
        Command::Inspect { file, trajectory } => commands::inspect::run(&file, trajectory),
        Command::Plan {
            prompt,
            text,
            execute,
            config,
        } => commands::plan::run(&prompt, &text, execute, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
