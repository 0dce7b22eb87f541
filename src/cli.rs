mod format;

use crate::condition::Relation;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
pub use format::{ColorMode, OutputFormat};
use std::path::PathBuf;

/// Resolve, rewrite and share log-search query links
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML config file; built-in defaults when omitted
    #[arg(long, global = true, env = "QUERY_LINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// When to color text output
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// More diagnostics on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Reference time as epoch milliseconds, for reproducible output
    #[arg(long, global = true, value_parser = parse_epoch_millis)]
    pub now: Option<DateTime<Utc>>,

    /// JSON file used as persisted key-value storage
    #[arg(long, global = true, env = "QUERY_LINK_STORAGE")]
    pub storage: Option<PathBuf>,
}

impl Cli {
    /// Log filter directive implied by -v / -q.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve a URL query string into the canonical query state
    Resolve {
        /// Query string, with or without the leading '?'
        query: String,

        /// Write the resolved defaults back to --storage
        #[arg(long, requires = "storage")]
        persist: bool,
    },
    /// Build search request parameters from a URL query string
    Params {
        query: String,

        /// JSON file holding the index set's field list
        #[arg(long)]
        fields: Option<PathBuf>,
    },
    /// Translate a single operator between UI and API form
    Translate {
        operator: String,

        /// Field the operator applies to
        #[arg(long, default_value = "log")]
        field: String,

        /// Field type; only text-like types are rewritten
        #[arg(long, default_value = "text")]
        field_type: String,

        /// Relation between values (AND / OR)
        #[arg(long, value_parser = parse_relation)]
        relation: Option<Relation>,

        /// Wildcard matching instead of phrase matching
        #[arg(long)]
        include: Option<bool>,

        /// API operator to UI form instead of the reverse
        #[arg(long)]
        to_ui: bool,

        /// Keep the exact API operator when translating to UI form
        #[arg(long, requires = "to_ui")]
        initializing: bool,
    },
    /// Fold the conditions of a sql-mode query into its keyword
    Compile { query: String },
    /// Add a clicked field value to a query and print the new link
    Drill {
        query: String,

        /// Field the value belongs to
        #[arg(long)]
        field: String,

        /// Clicked value; repeat for several
        #[arg(long = "value", required = true)]
        values: Vec<String>,

        /// Exclude the value instead of matching it
        #[arg(long)]
        not: bool,

        /// JSON file holding the index set's field list
        #[arg(long)]
        fields: Option<PathBuf>,
    },
}

fn parse_relation(raw: &str) -> Result<Relation, String> {
    Relation::parse(raw).ok_or_else(|| format!("expected AND or OR, got '{raw}'"))
}

fn parse_epoch_millis(raw: &str) -> Result<DateTime<Utc>, String> {
    let millis: i64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not an integer"))?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| format!("{millis} is out of range"))
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}
