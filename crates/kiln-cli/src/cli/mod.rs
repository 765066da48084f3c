//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums.  No business logic lives here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use kiln_core::domain::{CollisionPolicy, MatchStrategy};

pub mod global;
pub use global::GlobalArgs;

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "kiln",
    bin_name = "kiln",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Render component modules into platform manifests",
    long_about = "Kiln flattens the components of a module into primitive elements, \
                  matches them against a provider's transformers and renders the \
                  resulting platform resources.",
    after_help = "EXAMPLES:\n\
        \x20 kiln render shop.json --provider providers/kubernetes --elements catalog.json\n\
        \x20 kiln render shop.yaml -p k8s.json --format yaml --output manifests.yaml\n\
        \x20 kiln flatten shop.json --elements catalog.json\n\
        \x20 kiln provider providers/kubernetes",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Render a module into resources.
    #[command(
        visible_alias = "r",
        about = "Render a module into platform resources",
        after_help = "EXAMPLES:\n\
            \x20 kiln render shop.json -p k8s.json -e catalog.json\n\
            \x20 kiln render shop.json -p k8s.json --namespace prod --strategy all\n\
            \x20 kiln render shop.json -p k8s.json --keep-going --format yaml"
    )]
    Render(RenderArgs),

    /// Flatten a module and show its elements.
    #[command(
        about = "Flatten module components and show their elements",
        after_help = "EXAMPLES:\n\
            \x20 kiln flatten shop.json\n\
            \x20 kiln flatten shop.json --elements catalog.json --collision require-identical"
    )]
    Flatten(FlattenArgs),

    /// Inspect a provider.
    #[command(
        about = "Show provider metadata and transformers",
        after_help = "EXAMPLES:\n\
            \x20 kiln provider k8s.json\n\
            \x20 kiln provider providers/kubernetes"
    )]
    Provider(ProviderArgs),

    /// Inspect the effective configuration.
    #[command(
        about = "Configuration management",
        subcommand,
        after_help = "EXAMPLES:\n\
            \x20 kiln config show\n\
            \x20 kiln config get render.namespace\n\
            \x20 kiln config path"
    )]
    Config(ConfigCommands),
}

// ── render ────────────────────────────────────────────────────────────────────

/// Arguments for `kiln render`.
#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Module document: a file or a directory of files merged together.
    #[arg(value_name = "MODULE", help = "Module file or directory")]
    pub module: PathBuf,

    /// Provider file or directory.  Falls back to `providers.path`.
    #[arg(
        short = 'p',
        long = "provider",
        value_name = "PATH",
        help = "Provider file or directory"
    )]
    pub provider: Option<PathBuf>,

    /// Element catalogs consulted for composed references.
    #[arg(
        short = 'e',
        long = "elements",
        value_name = "PATH",
        help = "Element catalog (repeatable)"
    )]
    pub elements: Vec<PathBuf>,

    #[arg(
        short = 'n',
        long = "namespace",
        value_name = "NS",
        help = "Target namespace"
    )]
    pub namespace: Option<String>,

    #[arg(long = "strategy", value_enum, help = "Transformer selection strategy")]
    pub strategy: Option<StrategyArg>,

    /// Fail when an element is not covered by any transformer.
    #[arg(long = "strict", help = "Fail on elements no transformer covers")]
    pub strict: bool,

    #[arg(long = "sequential", help = "Run transformers one at a time")]
    pub sequential: bool,

    /// Collect every transformer failure instead of stopping at the first.
    #[arg(long = "keep-going", help = "Continue after transformer failures")]
    pub keep_going: bool,

    #[arg(long = "no-validate", help = "Skip input and output validation")]
    pub no_validate: bool,

    #[command(flatten)]
    pub flatten: CollisionArgs,

    #[arg(long = "format", value_enum, help = "Resource output format")]
    pub format: Option<ResourceFormat>,

    /// Write resources to a file instead of stdout.
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help = "Output file (default: stdout)"
    )]
    pub output: Option<PathBuf>,

    /// Run the pipeline but only report what would be written.
    #[arg(long = "dry-run", help = "Show what would be rendered without writing")]
    pub dry_run: bool,
}

// ── flatten ───────────────────────────────────────────────────────────────────

/// Arguments for `kiln flatten`.
#[derive(Debug, Args)]
pub struct FlattenArgs {
    #[arg(value_name = "MODULE", help = "Module file or directory")]
    pub module: PathBuf,

    #[arg(
        short = 'e',
        long = "elements",
        value_name = "PATH",
        help = "Element catalog (repeatable)"
    )]
    pub elements: Vec<PathBuf>,

    #[command(flatten)]
    pub flatten: CollisionArgs,
}

/// Flattening flags shared by `render` and `flatten`.
#[derive(Debug, Args)]
pub struct CollisionArgs {
    /// What to do when two composites expand to the same element.
    #[arg(
        long = "collision",
        value_enum,
        default_value = "last-write-wins",
        help = "Element collision policy"
    )]
    pub collision: CollisionArg,
}

// ── provider ──────────────────────────────────────────────────────────────────

/// Arguments for `kiln provider`.
#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Provider file or directory.  Falls back to `providers.path`.
    #[arg(value_name = "PATH", help = "Provider file or directory")]
    pub path: Option<PathBuf>,
}

// ── config subcommands ────────────────────────────────────────────────────────

/// Subcommands for `kiln config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the value of a configuration key.
    Get {
        /// Dotted key path, e.g. `render.namespace`.
        key: String,
    },
    /// Print the path to the default configuration file.
    Path,
}

// ── value enums ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum StrategyArg {
    /// Every covering transformer.
    All,
    /// Only the most specific covering transformers.
    Best,
}

impl From<StrategyArg> for MatchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::All => Self::All,
            StrategyArg::Best => Self::Best,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum CollisionArg {
    /// The later expansion replaces the earlier one.
    LastWriteWins,
    /// Differing definitions of one element are an error.
    RequireIdentical,
}

impl From<CollisionArg> for CollisionPolicy {
    fn from(arg: CollisionArg) -> Self {
        match arg {
            CollisionArg::LastWriteWins => Self::LastWriteWins,
            CollisionArg::RequireIdentical => Self::RequireIdentical,
        }
    }
}

/// Serialization of rendered resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ResourceFormat {
    /// A JSON array.
    #[default]
    Json,
    /// A YAML document stream.
    #[value(alias = "yml")]
    Yaml,
}

impl ResourceFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────
