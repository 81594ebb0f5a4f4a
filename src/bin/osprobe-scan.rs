use std::sync::Arc;

use clap::Parser;
use tracing::info;

use osprobe::adapters::{inventory, OsProbe, ProbeConfig, TcpPortCheck};
use osprobe::application::DiscoveryScanner;
use osprobe::config::{usage_exit, ScanArgs};
use osprobe::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = match ScanArgs::parse().validate() {
        Ok(args) => args,
        Err(e) => usage_exit::<ScanArgs>(&e),
    };

    logging::init(&args.log_level);

    let hosts = inventory::load_hosts(&args.hosts)?;
    let credentials = inventory::load_credentials(&args.credentials)?;
    info!(hosts = hosts.len(), "Scanning");

    let scanner = DiscoveryScanner::new(
        Arc::new(TcpPortCheck::new(args.port_timeout())),
        Arc::new(OsProbe::new(ProbeConfig::new(args.port_timeout(), args.session_timeout()))),
        Arc::new(credentials),
    );

    let descriptors = scanner.scan(hosts).await;
    let matched = descriptors.iter().filter(|d| d.is_valid()).count();

    inventory::write_targets(&args.output, &descriptors)?;
    info!(
        output = %args.output.display(),
        total = descriptors.len(),
        matched,
        "Wrote server descriptors"
    );

    Ok(())
}
