// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Entry point. Exit codes: 0 clean shutdown, 1 fatal configuration,
//! 2 runtime self-corruption.

use clap::Parser;
use modulr_config::{ChainEnv, NodeConfig, RunRules};
use modulr_logger::{prelude::*, Level, ModulrLogger};
use modulr_node::{Node, NodeError, NodeState};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(name = "modulr-node", about = "Modulr co-chain node", version)]
struct Args {
    /// Path to the node config file (YAML). Defaults apply if omitted.
    #[clap(long, short = 'f')]
    config: Option<PathBuf>,
    /// Path to the co-chain run rules (TOML).
    #[clap(long)]
    run_rules: Option<PathBuf>,
    /// Log more.
    #[clap(long)]
    verbose: bool,
}

fn load_inputs(args: &Args) -> Result<(NodeConfig, ChainEnv, Option<RunRules>), NodeError> {
    let config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    let env = ChainEnv::discover()?;
    let run_rules = match &args.run_rules {
        Some(path) => Some(RunRules::load(path)?),
        None => None,
    };
    Ok((config, env, run_rules))
}

async fn run(args: Args) -> Result<i32, NodeError> {
    let (config, env, run_rules) = load_inputs(&args)?;
    let mut node = Node::init(config, env, run_rules)?;
    let ctx = node.context();
    node.start().await?;

    // Run until interrupted or the node corrupts itself.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, please wait for graceful shutdown");
                node.shutdown().await;
                return Ok(0);
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                if ctx.current_state() == NodeState::Error {
                    node.shutdown().await;
                    return Err(NodeError::SelfCorruption);
                }
            }
        }
    }
}

fn main() {
    let args = Args::parse();
    ModulrLogger::builder()
        .level(if args.verbose { Level::Debug } else { Level::Info })
        .build();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let code = match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(error) => {
            error!(error = %error, "Node terminated");
            error.exit_code()
        }
    };
    std::process::exit(code);
}
