//! `ascend-smi` — command-line interface for Huawei Ascend NPU management.
//!
//! ```text
//! USAGE:
//!   ascend-smi enumerate                      List all cards and devices
//!   ascend-smi info <card> <device>           Chip info for one device
//!   ascend-smi health <card> <device>         Device health
//!   ascend-smi net-health <card> <device>     RoCE network health
//!   ascend-smi ip <card> <device> [--roce]    Port IP address and mask
//!   ascend-smi snapshot <card> <device>       Total/free resource report
//!   ascend-smi vdev list <card> <device>      Allocated vdev IDs and grants
//!   ascend-smi vdev create <card> <device> <id> <template>
//!   ascend-smi vdev destroy <card> <device> <id>
//! ```
//!
//! `--driver sim` swaps the vendor library for the in-memory simulator,
//! which is enough to exercise every subcommand on a machine without an
//! Ascend card.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ascend_mgmt::backends::sim::SimBackend;
use ascend_mgmt::{DcmiSession, DeviceHealth, NetworkPort, VdevManager};

#[derive(Parser)]
#[command(name = "ascend-smi", about = "Huawei Ascend NPU management CLI", version)]
struct Cli {
    /// Driver backend to use.
    #[arg(long, value_enum, default_value_t = DriverKind::Dcmi)]
    driver: DriverKind,

    /// Explicit path to libdcmi.so (default: probe well-known locations).
    #[arg(long)]
    library: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum DriverKind {
    /// Vendor driver via libdcmi.so.
    Dcmi,
    /// In-memory simulator.
    Sim,
}

#[derive(Subcommand)]
enum Cmd {
    /// List all cards and devices with their logical/physical IDs.
    Enumerate,
    /// Print chip identification for one device.
    Info { card: i32, device: i32 },
    /// Print device health.
    Health { card: i32, device: i32 },
    /// Print RoCE network health.
    NetHealth { card: i32, device: i32 },
    /// Print a port's IP address and netmask.
    Ip {
        card: i32,
        device: i32,
        /// Query the RoCE port instead of the virtual NIC.
        #[arg(long)]
        roce: bool,
    },
    /// Print the total/free resource snapshot.
    Snapshot { card: i32, device: i32 },
    /// Virtual-device lifecycle.
    #[command(subcommand)]
    Vdev(VdevCmd),
}

#[derive(Subcommand)]
enum VdevCmd {
    /// List allocated vdevs and their resource grants.
    List { card: i32, device: i32 },
    /// Create a vdev from a template (e.g. vir04).
    Create {
        card: i32,
        device: i32,
        vdev_id: u32,
        template: String,
        /// Deadline in milliseconds; on overrun the vdev is left pending.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Destroy a vdev.
    Destroy { card: i32, device: i32, vdev_id: u32 },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let session = match cli.driver {
        DriverKind::Sim => DcmiSession::with_backend(Arc::new(SimBackend::single_device()))?,
        DriverKind::Dcmi => match &cli.library {
            Some(path) => DcmiSession::open_at(path)?,
            None => DcmiSession::open()?,
        },
    };

    match cli.command {
        Cmd::Enumerate => cmd_enumerate(&session),
        Cmd::Info { card, device } => cmd_info(&session, card, device),
        Cmd::Health { card, device } => cmd_health(&session, card, device),
        Cmd::NetHealth { card, device } => cmd_net_health(&session, card, device),
        Cmd::Ip { card, device, roce } => cmd_ip(&session, card, device, roce),
        Cmd::Snapshot { card, device } => cmd_snapshot(&session, card, device),
        Cmd::Vdev(vdev) => cmd_vdev(&session, vdev),
    }
}

fn cmd_enumerate(session: &DcmiSession) -> Result<()> {
    let inventory = session.inventory();
    println!("Ascend devices: {}", inventory.len());
    println!();

    for dev in inventory.devices() {
        println!(
            "card {:>2} device {:>2}   logical {:>3}   physical {:>5}",
            dev.card_id, dev.device_id, dev.logical_id, dev.physical_id
        );
    }
    Ok(())
}

fn cmd_info(session: &DcmiSession, card: i32, device: i32) -> Result<()> {
    let chip = session.vdev_manager().chip_info(card, device)?;
    println!("Type    {}", chip.chip_type);
    println!("Name    {}", chip.chip_name);
    println!("Version {}", chip.chip_ver);
    Ok(())
}

fn cmd_health(session: &DcmiSession, card: i32, device: i32) -> Result<()> {
    match session.vdev_manager().device_health(card, device)? {
        DeviceHealth::Healthy => println!("healthy"),
        DeviceHealth::Fault(code) => println!("fault ({code:#x})"),
    }
    Ok(())
}

fn cmd_net_health(session: &DcmiSession, card: i32, device: i32) -> Result<()> {
    let status = session.vdev_manager().network_health(card, device)?;
    println!("{status:?}");
    Ok(())
}

fn cmd_ip(session: &DcmiSession, card: i32, device: i32, roce: bool) -> Result<()> {
    let logical = session
        .inventory()
        .by_position(card, device)
        .map(|d| d.logical_id)
        .ok_or_else(|| anyhow::anyhow!("card {card} device {device} not enumerated"))?;

    let port = if roce { NetworkPort::Roce } else { NetworkPort::Vnic };
    let ip = session.driver().ip_address(logical, port)?;
    println!("{} mask {}", ip.address, ip.mask);
    Ok(())
}

fn cmd_snapshot(session: &DcmiSession, card: i32, device: i32) -> Result<()> {
    let snapshot = session.vdev_manager().snapshot(card, device)?;

    println!(
        "aicore   total {:>6.1}   free {:>6.1}",
        snapshot.total.computing.aic, snapshot.free.computing.aic
    );
    println!(
        "aivector total {:>6.1}   free {:>6.1}",
        snapshot.total.computing.aiv, snapshot.free.computing.aiv
    );
    println!(
        "memory   total {:>4} MB   free {:>4} MB",
        snapshot.total.computing.memory_mb, snapshot.free.computing.memory_mb
    );
    println!(
        "vfg      total {:>6}   free {:>6}",
        snapshot.total.vfg_num, snapshot.free.vfg_num
    );
    if snapshot.total.vdev_ids.is_empty() {
        println!("vdevs    none");
    } else {
        println!("vdevs    {:?}", snapshot.total.vdev_ids);
    }
    Ok(())
}

fn cmd_vdev(session: &DcmiSession, cmd: VdevCmd) -> Result<()> {
    let mgr = session.vdev_manager();
    match cmd {
        VdevCmd::List { card, device } => cmd_vdev_list(&mgr, card, device),
        VdevCmd::Create {
            card,
            device,
            vdev_id,
            template,
            timeout_ms,
        } => {
            let deadline = timeout_ms.map(Duration::from_millis);
            let handle = mgr.create_vdev(card, device, vdev_id, &template, deadline)?;
            println!(
                "created vdev {} (vfg {}) at {}",
                handle.vdev_id, handle.vfg_id, handle.bdf
            );
            Ok(())
        }
        VdevCmd::Destroy { card, device, vdev_id } => {
            mgr.destroy_vdev(card, device, vdev_id)?;
            println!("destroyed vdev {vdev_id}");
            Ok(())
        }
    }
}

fn cmd_vdev_list(mgr: &VdevManager, card: i32, device: i32) -> Result<()> {
    let snapshot = mgr.snapshot(card, device)?;
    if snapshot.total.vdev_ids.is_empty() {
        println!("no vdevs allocated");
        return Ok(());
    }

    for vdev_id in snapshot.total.vdev_ids {
        match mgr.vdev(card, device, vdev_id) {
            Ok(desc) => println!(
                "vdev {:>3}  {}  vfg {}  aic {:.1}  mem {} MB{}",
                desc.vdev_id,
                desc.name,
                desc.vfg_id,
                desc.computing.aic,
                desc.computing.memory_mb,
                if desc.in_container { "  [in container]" } else { "" }
            ),
            Err(err) => println!("vdev {vdev_id:>3}  query failed: {err}"),
        }
    }
    Ok(())
}
