// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use brokerflow::config::Config;
use brokerflow::run::{init_tracing, run};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    let verdict = run(&config).await;
    println!("{}", verdict.summary_line());
    for path in &verdict.artifacts {
        println!("  {}", path.display());
    }
    std::process::exit(verdict.exit_code());
}
