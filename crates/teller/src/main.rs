// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use teller::config::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(&cli);

    if let Err(e) = teller::run(cli).await {
        error!("fatal: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}
