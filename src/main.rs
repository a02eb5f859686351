mod cli;
mod core;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aic", about = "Codex and Claude token usage and cost report", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daily token usage and cost (default)
    Daily(DailyFlags),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the scan cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct DailyFlags {
    /// Log source: codex, claude or vertexai (default from config)
    #[arg(short, long)]
    provider: Option<String>,

    /// First day to report (YYYY-MM-DD)
    #[arg(long)]
    since: Option<String>,

    /// Last day to report (YYYY-MM-DD, default: today)
    #[arg(long)]
    until: Option<String>,

    /// Number of days ending at --until (default from config)
    #[arg(short, long)]
    days: Option<u32>,

    /// Discard the cache and rescan every log file
    #[arg(long)]
    force: bool,

    /// Show per-model and context breakdowns for each day
    #[arg(short, long)]
    all: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cache file path
    Path {
        /// Provider whose cache to show (default from config)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Delete cache files (every provider unless --provider is given)
    Clear {
        #[arg(short, long)]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    core::logging::init(cli.verbose);

    let config = core::config::AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default config");
        core::config::AppConfig::default()
    });

    let output_opts = cli::output::OutputOptions {
        format: cli::output::OutputFormat::resolve(cli.json, cli.format.as_deref(), &config.settings),
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color, &config.settings.color),
    };

    match cli.command {
        None => cli::daily_cmd::run(Default::default(), &config, &output_opts).await?,
        Some(Commands::Daily(flags)) => {
            let args = cli::daily_cmd::DailyArgs {
                provider: flags.provider,
                since: flags.since,
                until: flags.until,
                days: flags.days,
                force: flags.force,
                all: flags.all,
            };
            cli::daily_cmd::run(args, &config, &output_opts).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Path => cli::config_cmd::path(&output_opts)?,
        },
        Some(Commands::Cache { action }) => match action {
            CacheAction::Path { provider } => {
                cli::cache_cmd::path(provider.as_deref(), &config, &output_opts)?
            }
            CacheAction::Clear { provider } => {
                cli::cache_cmd::clear(provider.as_deref(), &config, &output_opts)?
            }
        },
    }

    Ok(())
}
