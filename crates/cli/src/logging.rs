//! Tracing subscriber setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Initializes logging on stderr so stdout stays reserved for the JSON
/// report. `RUST_LOG` overrides the verbosity flag when set.
pub fn init_logging(verbose: u8) {
	let default = match verbose {
		0 => "warn,blewake=info",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
