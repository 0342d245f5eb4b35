//! heapwatch binary

use clap::Parser;
use heapwatch::{init_tracing, run, Cli};
use memory_profiler::TracingAllocator;
use serde_json::json;
use std::alloc::System;
use std::process::ExitCode;
use tracing::error;

#[global_allocator]
static GLOBAL: TracingAllocator<System> = TracingAllocator::new(System);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let output = run(&cli)
        .await
        .and_then(|value| Ok(serde_json::to_string_pretty(&value)?));

    match output {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", json!({ "error": format!("{:#}", e) }));
            ExitCode::FAILURE
        }
    }
}
