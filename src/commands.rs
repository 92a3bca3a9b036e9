//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the test cases of a YAML suite and write the run reports
    Run {
        /// Path to the YAML suite
        suite: PathBuf,

        /// Configuration file (default: the per-user config)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Run only these test case ids (repeatable)
        #[arg(long)]
        only: Vec<String>,
    },

    /// Count occurrences of a pattern in a log file
    Search {
        /// File to scan
        file: PathBuf,

        /// Literal text, or a regular expression with --regex
        pattern: String,

        /// Require exactly this many matching lines
        #[arg(long)]
        count: Option<usize>,

        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
    },

    /// Fetch and print the gateway metrics
    Metrics {
        /// Configuration file (default: the per-user config)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Generate the IPv4/IPv6 NE and NEM simulator configs from templates
    GenConfigs {
        /// Configuration file (default: the per-user config)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Directory holding NE_config.yaml and NEM_config.yaml
        #[arg(long, default_value = "Config")]
        templates: PathBuf,

        /// Output directory
        #[arg(long, default_value = "Config/generated")]
        out: PathBuf,
    },

    /// Encode an MML command (JSON) as a hex frame
    Mml {
        /// Command as JSON: {"comment", "operation", "operation_object", "parameters"}
        json: String,
    },
}
