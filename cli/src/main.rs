//! A3S Pack CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_pack_cli::commands::{dispatch, Cli, CODE_INVALID_ARGS};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(CODE_INVALID_ARGS);
        }
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.code());
    }
}
