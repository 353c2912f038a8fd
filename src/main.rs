use std::process;

use anyhow::Result;

use mig_discovery::logging;

fn main() {
    logging::init();

    if let Err(err) = run() {
        tracing::error!("Failed to get MIG GPUs: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let partitions = mig_discovery::discover_mig_partitions()?;
    println!("{}", serde_json::to_string_pretty(&partitions)?);
    Ok(())
}
