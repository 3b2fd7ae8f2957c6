use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

/// Pick the filter directive: command line, then `RUST_LOG`, then the
/// config file, then [`DEFAULT_FILTER`].
pub fn directive(
    cli: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> String {
    cli.or(env).or(config).unwrap_or(DEFAULT_FILTER).to_owned()
}

/// Install the global subscriber, writing to stderr.
///
/// Stdout carries command responses, so nothing is logged there. A
/// directive that fails to parse falls back to [`DEFAULT_FILTER`]. Calling
/// this twice keeps the first subscriber.
pub fn init(cli: Option<&str>, config: Option<&str>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = directive(cli, env.as_deref(), config);
    let filter = EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
