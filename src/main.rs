//! MCP Conformance - a conformance harness for line-delimited JSON-RPC servers
//!
//! Launches an MCP server over stdio, drives scenarios through it and
//! reports a PASS/FAIL/ERROR verdict for every message.

use clap::Parser;
use mcp_conformance::commands::{Commands, GlobalOptions};
use mcp_conformance::{cli, common::logging};

#[derive(Parser)]
#[command(name = "mcp-conformance", about = "Conformance tests for MCP stdio servers")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.options.verbose);

    match cli::dispatch(cli.command, cli.options).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
