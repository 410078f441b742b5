use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line arguments for the shroud CLI
#[derive(Parser, Debug)]
#[clap(
    name = "shroud",
    about = "Redact, restore and inspect privacy mappings from the command line"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML or JSON config file; defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use the regex detector and in-memory stores regardless of config.
    /// Handy for trying the pipeline without a detector service or KV store
    /// (note: in-memory mappings do not survive the process).
    #[arg(long)]
    pub offline: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect entities in the text and print the redacted form.
    Redact {
        /// Thread key scoping the mappings.
        #[arg(short, long)]
        thread: String,
        /// The text to redact.
        text: String,
    },
    /// Substitute stored originals back into the text.
    Restore {
        #[arg(short, long)]
        thread: String,
        /// The placeholder-bearing text to restore.
        text: String,
    },
    /// List the placeholder mappings recorded for a thread.
    Mappings {
        #[arg(short, long)]
        thread: String,
        /// Emit machine-readable JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Drop all mappings and stored conversation for a thread.
    Clear {
        #[arg(short, long)]
        thread: String,
    },
    /// Aggregate counts over the entity store.
    Stats,
}
