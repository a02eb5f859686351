use tracing_subscriber::EnvFilter;

/// Overrides the default filter, e.g. `AIC_LOG=aic=trace`.
pub const LOG_ENV: &str = "AIC_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "aic=debug"
    } else {
        "aic=warn"
    }
}

fn build_filter(env_value: Option<&str>, verbose: bool) -> EnvFilter {
    env_value
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose)))
}

/// Install the stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool) {
    let env_value = std::env::var(LOG_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(env_value.as_deref(), verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
