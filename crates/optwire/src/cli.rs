//! Clap derive structures for the `optwire` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use optwire_api::Verb;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// optwire -- inspect remote option sources from the command line
#[derive(Debug, Parser)]
#[command(
    name = "optwire",
    version,
    about = "Query named backend APIs and page through remote option lists",
    long_about = "Resolve API directories, dispatch raw requests, and drive the\n\
        paging/search engine of configured remote-backed fields.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "OPTWIRE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "OPTWIRE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured APIs
    Apis,

    /// Fetch and show an API's directory
    #[command(alias = "dir")]
    Directory(DirectoryArgs),

    /// Dispatch one request through a named API
    #[command(alias = "req")]
    Request(RequestArgs),

    /// Load options of a configured field
    #[command(alias = "opts")]
    Options(OptionsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Arguments ────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DirectoryArgs {
    /// API name
    pub api: String,
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// API name
    pub api: String,

    /// HTTP verb
    #[arg(long, short = 'X', default_value = "GET", value_parser = parse_verb)]
    pub verb: Verb,

    /// Directory entry resolving the base URL (omit to use the API root)
    #[arg(long, short = 't')]
    pub target: Option<String>,

    /// Sub-path appended to the base URL
    #[arg(long)]
    pub path: Option<String>,

    /// Query (or body) parameter, repeatable
    #[arg(long = "param", short = 'P', value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// JSON body; merged with --param values
    #[arg(long, short = 'd')]
    pub body: Option<String>,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    /// Field name from the [fields] config table
    pub field: String,

    /// Search term
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Continuation pages to load after the first
    #[arg(long, short = 'm', default_value = "0")]
    pub more: u32,

    /// Currently bound value; repeat for multi-value fields
    #[arg(long)]
    pub value: Vec<String>,

    /// Include loading/status sentinel rows
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the config file location
    Path,
    /// Show the effective configuration (secrets redacted)
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}

fn parse_verb(raw: &str) -> Result<Verb, String> {
    raw.parse()
        .map_err(|_| format!("unknown verb '{raw}' (expected GET, HEAD, DELETE, POST, PUT or PATCH)"))
}
