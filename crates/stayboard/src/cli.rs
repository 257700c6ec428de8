//! Clap derive structures for the `stayboard` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use stayboard_core::{EntityKind, Role, Units};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// stayboard -- live views and display terminals for short-stay rentals
#[derive(Debug, Parser)]
#[command(
    name = "stayboard",
    version,
    about = "Watch stayboard tables live or run an unattended display terminal",
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
    #[arg(long, env = "STAYBOARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Backend project URL (overrides config)
    #[arg(long, env = "STAYBOARD_URL", global = true)]
    pub url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "STAYBOARD_OUTPUT",
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

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a display terminal: pair, fetch configuration, play media
    #[command(alias = "d")]
    Display(DisplayArgs),

    /// Mirror a table live, printing it on every change
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Look up current weather through the cache
    Weather(WeatherArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DisplayArgs {
    /// Six-digit pairing code (prompted for when needed and omitted)
    #[arg(long)]
    pub code: Option<String>,

    /// Keep the device token in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Display surface id shared by every renderer of this screen
    #[arg(long, default_value = "main")]
    pub surface: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Table to watch
    pub table: TableArg,

    /// Operator user id the view is rendered for
    #[arg(long, env = "STAYBOARD_USER")]
    pub user: String,

    /// Operator role
    #[arg(long, default_value = "member")]
    pub role: RoleArg,

    /// Owner ids an admin manages (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub manages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TableArg {
    Listings,
    Guests,
    QrCodes,
    Devices,
}

impl From<TableArg> for EntityKind {
    fn from(table: TableArg) -> Self {
        match table {
            TableArg::Listings => Self::Listing,
            TableArg::Guests => Self::Guest,
            TableArg::QrCodes => Self::QrCode,
            TableArg::Devices => Self::Device,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    SuperAdmin,
    Admin,
    Member,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::SuperAdmin => Self::SuperAdmin,
            RoleArg::Admin => Self::Admin,
            RoleArg::Member => Self::Member,
        }
    }
}

#[derive(Debug, Args)]
pub struct WeatherArgs {
    /// City name, e.g. "Miami"
    pub city: String,

    /// Units (defaults to the configured units)
    #[arg(long)]
    pub units: Option<UnitsArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitsArg {
    Imperial,
    Metric,
}

impl From<UnitsArg> for Units {
    fn from(units: UnitsArg) -> Self {
        match units {
            UnitsArg::Imperial => Self::Imperial,
            UnitsArg::Metric => Self::Metric,
        }
    }
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a config file with guided setup
    Init,

    /// Display the resolved configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_parses_managed_owners() {
        let cli = Cli::try_parse_from([
            "stayboard", "watch", "qr-codes", "--user", "u1", "--role", "admin", "--manages",
            "o1,o2",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(EntityKind::from(args.table), EntityKind::QrCode);
        assert_eq!(Role::from(args.role), Role::Admin);
        assert_eq!(args.manages, vec!["o1".to_owned(), "o2".to_owned()]);
    }

    #[test]
    fn display_defaults() {
        let cli = Cli::try_parse_from(["stayboard", "display"]).unwrap_or_else(|e| panic!("{e}"));
        let Command::Display(args) = cli.command else {
            panic!("expected display");
        };
        assert_eq!(args.code, None);
        assert!(!args.ephemeral);
        assert_eq!(args.surface, "main");
    }
}
