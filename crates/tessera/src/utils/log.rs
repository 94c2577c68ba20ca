use tracing_subscriber::EnvFilter;

/// Log to stderr, leaving stdout for the result line.
///
/// `RUST_LOG` wins over `--verbose` when set.
pub fn init(verbose: bool) {
    let fallback = if verbose { "tessera=debug,tessera_fetch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
