use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::experiment::Experiment;
use crate::ipam::IpamClient;

#[derive(Parser)]
#[command(
    name = "ipam-loadtest",
    version,
    about = "Load-test a NetBox-style IPAM service",
    long_about = "Drives three allocation/deallocation access patterns against freshly \
                  carved prefixes at every concurrency level from 1 to N, timing each \
                  round trip, and writes a per-worker timing workbook."
)]
pub struct Cli {
    /// Parent prefix the workers carve their child prefixes from
    pub parent_prefix: String,

    /// Prefix length of each carved child prefix
    pub prefix_length: u8,

    /// Maximum number of concurrently running workers
    pub workers: usize,

    /// Host (FQDN) of the IPAM service
    pub fqdn: String,

    /// Auth token for the IPAM API
    #[arg(env = "IPAM_LOADTEST_TOKEN")]
    pub token: String,

    /// Directory the report artifact is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let client = IpamClient::new(&cli.fqdn, &cli.token)?;
    let experiment = Experiment::new(
        Arc::new(client),
        cli.parent_prefix.clone(),
        cli.prefix_length,
        cli.workers,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let workbook = runtime.block_on(async { experiment.run().await })?;

    let filename = format!(
        "ipam_load_test_report_{}.csv",
        cli.parent_prefix.replace('/', "_")
    );
    let path = cli.output.join(filename);
    workbook.save(&path)?;
    println!("✓ Report written to {}", path.display());

    Ok(())
}
