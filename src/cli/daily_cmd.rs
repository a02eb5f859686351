use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::config::AppConfig;
use crate::core::cost::day::{window_start, DayKey};
use crate::core::cost::provider::Provider;
use crate::core::cost::scanner;

#[derive(Debug, Clone, Default)]
pub struct DailyArgs {
    pub provider: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub days: Option<u32>,
    pub force: bool,
    pub all: bool,
}

/// `--provider` if given, else the configured default.
pub fn resolve_provider(flag: Option<&str>, config: &AppConfig) -> Result<Provider> {
    match flag {
        Some(id) => Provider::from_id(id).with_context(|| {
            format!("Unknown provider '{}' (expected codex, claude or vertexai)", id)
        }),
        None => Ok(config.scan.provider()),
    }
}

fn parse_date(flag: &str, text: &str) -> Result<NaiveDate> {
    DayKey::parse(text)
        .ok()
        .and_then(|key| key.to_date())
        .with_context(|| format!("Invalid --{} date '{}' (expected YYYY-MM-DD)", flag, text))
}

/// `--until` defaults to today, `--since` to `days` days back from it.
fn resolve_range(args: &DailyArgs, today: NaiveDate, default_days: u32) -> Result<(NaiveDate, NaiveDate)> {
    let until = match &args.until {
        Some(text) => parse_date("until", text)?,
        None => today,
    };
    let since = match &args.since {
        Some(text) => parse_date("since", text)?,
        None => {
            let days = args.days.unwrap_or(default_days);
            match window_start(until, days) {
                Some(since) => since,
                None => bail!("--days {} reaches before the earliest supported date", days),
            }
        }
    };
    if since > until {
        bail!("--since {} is after --until {}", since, until);
    }
    Ok((since, until))
}

pub async fn run(args: DailyArgs, config: &AppConfig, opts: &OutputOptions) -> Result<()> {
    let now = Local::now();
    let (since, until) = resolve_range(&args, now.date_naive(), config.scan.default_days)?;
    let provider = resolve_provider(args.provider.as_deref(), config)?;
    let options = config.scan.scan_options(provider, args.force);

    let is_cold_cache = args.force || !options.cache_store().path().exists();
    let scan = tokio::task::spawn_blocking(move || {
        scanner::load_daily_report(since, until, now, &options)
    });

    // Show spinner on stderr (text mode only)
    let spinner = if matches!(opts.format, OutputFormat::Text) {
        let msg = if is_cold_cache {
            format!("First scan, indexing {} logs...", provider.display_name())
        } else {
            format!("Scanning {} logs...", provider.display_name())
        };
        Some(tokio::spawn(async move {
            let frames = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let mut i = 0usize;
            loop {
                eprint!("\r {} {}", frames[i % frames.len()], msg);
                i = i.wrapping_add(1);
                tokio::time::sleep(std::time::Duration::from_millis(80)).await;
            }
        }))
    } else {
        None
    };

    let report = scan.await;

    // Stop spinner and clear the line
    if let Some(s) = spinner {
        s.abort();
        eprint!("\r\x1b[2K");
    }
    let report = report.context("Session scan panicked")?;

    match opts.format {
        OutputFormat::Text => {
            let since = since.format("%Y-%m-%d").to_string();
            let until = until.format("%Y-%m-%d").to_string();
            println!(
                "{}",
                renderer::render_daily(
                    &report,
                    provider.display_name(),
                    &since,
                    &until,
                    args.all,
                    opts.use_color
                )
            );
        }
        OutputFormat::Json => {
            let json = if opts.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", json);
        }
    }

    Ok(())
}
