use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::profile::MethodologyVersion;

#[derive(Parser, Debug)]
#[command(name = "soracalc")]
#[command(about = "Ground, air and assurance risk classification for UAS operations", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify ground risk from a JSON fact object
    Ground {
        #[command(flatten)]
        input: FactsInput,
    },

    /// Classify air risk from a JSON fact object
    Air {
        #[command(flatten)]
        input: FactsInput,
    },

    /// Classify ground and air risk and compose the assurance level
    Assess {
        #[command(flatten)]
        input: FactsInput,
    },

    /// Look up the assurance level for residual ground and air classes
    Assurance {
        /// Methodology version (2.0 or 2.5); defaults to the configured version
        #[arg(short, long)]
        methodology: Option<MethodologyVersion>,

        /// Residual ground risk class
        #[arg(short, long)]
        ground: u8,

        /// Residual air risk class
        #[arg(short, long)]
        air: String,
    },

    /// Load a YAML profile and report whether it is consistent
    CheckProfile {
        /// Profile file to check
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct FactsInput {
    /// Methodology version (2.0 or 2.5); defaults to the configured version
    #[arg(short, long)]
    pub methodology: Option<MethodologyVersion>,

    /// JSON fact file; reads stdin when omitted or "-"
    #[arg(short, long)]
    pub facts: Option<PathBuf>,
}
