use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// documents and envelope streams.
pub fn init(verbose: u8, json: bool) {
    // Prefer RUST_LOG, fall back to the -v level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    if json {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry().with(filter).with(layer).init();
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "eewpw=info,eewpw_parser=info",
        1 => "eewpw=debug,eewpw_parser=debug",
        _ => "eewpw=trace,eewpw_parser=trace",
    }
}
