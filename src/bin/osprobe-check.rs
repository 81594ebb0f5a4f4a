//! Probe every server of a descriptor file once and print what each adapter reports.

use std::fmt::Write as _;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;

use osprobe::adapters::{inventory, OsProbe, ProbeConfig};
use osprobe::config::{usage_exit, CheckArgs};
use osprobe::domain::TargetDescriptor;
use osprobe::logging;
use osprobe::ports::{Probe, Session};

const ONLINE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = match CheckArgs::parse().validate() {
        Ok(args) => args,
        Err(e) => usage_exit::<CheckArgs>(&e),
    };
    logging::init(&args.log_level);

    let targets = inventory::load_targets(&args.targets)?;
    let timeout = args.session_timeout();
    let probe = OsProbe::new(ProbeConfig::new(ONLINE_TIMEOUT.min(timeout), timeout));

    let reports = join_all(targets.iter().map(|target| report(&probe, target))).await;
    for report in reports {
        println!("{}", report);
    }

    Ok(())
}

async fn report(probe: &OsProbe, target: &TargetDescriptor) -> String {
    let mut out = format!("{} ({}, port {})\n", target.host, target.os_kind, target.port);

    let online = probe.online(target).await;
    let _ = writeln!(out, "  online: {}", online);
    if !online {
        return out;
    }

    let connection = match probe.open(target).await {
        Ok(connection) => connection,
        Err(e) => {
            let _ = writeln!(out, "  accessible: false ({})", e);
            return out;
        }
    };
    let _ = writeln!(out, "  accessible: true");

    let _ = match connection.cpu_utilization().await {
        Ok(cpu) => writeln!(out, "  cpu: {:.2}%", cpu),
        Err(e) => writeln!(out, "  cpu: error ({})", e),
    };

    let _ = match connection.mem_utilization().await {
        Ok(mem) => writeln!(out, "  memory: {:.2}%", mem),
        Err(e) => writeln!(out, "  memory: error ({})", e),
    };

    match connection.disk_utilization().await {
        Ok(Some(disks)) => {
            for (mount, usage) in disks {
                let _ = writeln!(out, "  disk {}: {:.2}%", mount, usage);
            }
        }
        Ok(None) => {
            let _ = writeln!(out, "  disk: not reported");
        }
        Err(e) => {
            let _ = writeln!(out, "  disk: error ({})", e);
        }
    }

    match connection.nic_utilization().await {
        Ok(Some(nics)) => {
            for (name, counters) in nics {
                let _ = writeln!(
                    out,
                    "  nic {}: received {} bytes, sent {} bytes",
                    name, counters.received_bytes, counters.sent_bytes
                );
            }
        }
        Ok(None) => {
            let _ = writeln!(out, "  nic: not reported");
        }
        Err(e) => {
            let _ = writeln!(out, "  nic: error ({})", e);
        }
    }

    connection.close().await;
    out
}
