//! keyferry CLI
//!
//! Encrypts a local secret with Cloud KMS, grants a service account the
//! decrypter role, stores the ciphertext in Cloud Storage and proves the
//! service account can read it back.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Must happen before any TLS connection is opened
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, config).await,
        Commands::Grant(args) => commands::grant::run(args, config).await,
        Commands::Revoke(args) => commands::revoke::run(args, config).await,
        Commands::Encrypt(args) => commands::encrypt::run(args, config).await,
        Commands::Decrypt(args) => commands::decrypt::run(args, config).await,
        Commands::Config(args) => commands::config::run(args, config).await,
    };

    if let Err(e) = result {
        output::error(&commands::render_error(&e));
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    // Explicit flags win over RUST_LOG
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
