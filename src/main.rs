//! Synthetic text-on-image dataset generator: filters font inventories down
//! to a usable library, then fans sample rendering out across a worker pool.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

mod cli;
mod corpus;
mod dispatch;
mod fonts;
mod generator;
mod io;
mod render;
mod validate;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::FilterFonts(args) => {
            let cfg = args.into_config()?;
            let report = validate::validate(&cfg)?;
            println!("{}", report.summary());
        }
        Command::Generate(args) => {
            let (cfg, corpus, pool) = args.into_parts()?;
            generator::run(&corpus, &pool, &cfg)?;
        }
    }
    Ok(())
}
