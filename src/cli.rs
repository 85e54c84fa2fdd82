//! Command-line arguments.
use clap::Parser;
use std::path::PathBuf;

use crate::engine::RunOverrides;

/// Command-line entry point of the compliance engine.
#[derive(Parser, Debug)]
#[command(
    name = "homekeeper",
    about = "Keep per-account home and chroot directories in their desired state",
    version
)]
pub struct Cli {
    /// Configuration file (INI)
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log intended changes without applying them
    #[arg(short, long)]
    pub simulate: bool,

    /// Run only these checks (section names)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip these checks (section names)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Append a plain-text copy of the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Overrides to apply on top of the configuration file.
    #[must_use]
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            simulate: self.simulate,
            only: self.only.clone(),
            skip: self.skip.clone(),
        }
    }
}
