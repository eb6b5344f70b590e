use std::io;

use anyhow::Context;
use clap::Parser;

use converse_call_rs::cli::Args;
use converse_call_rs::{build_adapter, logging, run};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);
    let config = args.into_config();

    let adapter = build_adapter(&config).context("failed to set up Bedrock client")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run(&adapter, &config, &mut out).with_context(|| format!("converse call to {} failed", config.model_id))?;
    Ok(())
}
