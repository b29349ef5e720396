//! Lumen language server binary.
//!
//! Speaks LSP over stdin/stdout. Logs go to stderr, or to `--log-file`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use lumen_server::ServerConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "LUMEN_LOG";

/// Server command line arguments.
#[derive(Parser, Debug)]
#[command(name = "lumen-server", version)]
#[command(about = "Language server with debounced diagnostics, hover and completion")]
struct Args {
	/// Diagnostics debounce window after a change, in milliseconds
	#[arg(long, value_name = "MS")]
	debounce_ms: Option<u64>,

	/// Timeout for requests sent to the client, in milliseconds
	#[arg(long, value_name = "MS")]
	request_timeout_ms: Option<u64>,

	/// `source` label attached to diagnostics
	#[arg(long, value_name = "NAME")]
	diagnostic_source: Option<String>,

	/// Do not send a message when a document is opened
	#[arg(long)]
	no_open_message: bool,

	/// Verbose logging (overrides LUMEN_LOG)
	#[arg(short, long)]
	verbose: bool,

	/// Append logs to this file instead of stderr
	#[arg(long, value_name = "PATH")]
	log_file: Option<PathBuf>,
}

impl Args {
	fn config(&self) -> ServerConfig {
		let mut config = ServerConfig::default();
		if let Some(ms) = self.debounce_ms {
			config.debounce_ms = ms;
		}
		if let Some(ms) = self.request_timeout_ms {
			config.request_timeout_ms = ms;
		}
		if let Some(source) = &self.diagnostic_source {
			config.diagnostic_source.clone_from(source);
		}
		if self.no_open_message {
			config.show_open_message = false;
		}
		config
	}

	fn filter(&self) -> EnvFilter {
		if self.verbose {
			return EnvFilter::new("debug");
		}
		EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// stdout carries the protocol
	let builder = tracing_subscriber::fmt().with_env_filter(args.filter());
	match &args.log_file {
		Some(path) => {
			let file = OpenOptions::new().create(true).append(true).open(path)?;
			let subscriber = builder.with_ansi(false).with_writer(Mutex::new(file)).finish();
			tracing::subscriber::set_global_default(subscriber)?;
		}
		None => {
			let subscriber = builder.with_writer(std::io::stderr).finish();
			tracing::subscriber::set_global_default(subscriber)?;
		}
	}

	let config = args.config();
	info!(version = env!("CARGO_PKG_VERSION"), ?config, "starting lumen-server");

	lumen_server::serve(config, tokio::io::stdin(), tokio::io::stdout()).await?;

	info!("session ended");
	Ok(())
}
