//! satip-sim: drives the SAT>IP device core against loopback collaborators.
//!
//! Creates the configured devices, tunes the first one, pulls packets from
//! it and prints the status pages a host would show.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, warn};

use satip_device::{
    init_logging, load_config, DeviceEnvironment, DeviceLink, DeviceRegistry, InfoPage,
    PidHandle, SectionFilterHandler, TunerSession,
};
use satip_protocol::{priority, Channel, PidType, Source, SourceKind};

mod loopback;

use loopback::{LoopbackDiscovery, LoopbackFilters, LoopbackHost, LoopbackTuner};

/// satip-sim - Loopback driver for the SAT>IP device core
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Number of devices to create (overrides the configuration)
    #[arg(short, long)]
    devices: Option<usize>,

    /// Number of TS packets to pull
    #[arg(short, long, default_value = "500")]
    packets: usize,

    /// Give up pulling after this many milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn demo_channel() -> Channel {
    let mut channel = Channel::new(
        1,
        "Das Erste HD",
        Source::satellite(192),
        11494,
        "HC23M5O35P0S1",
    );
    channel.srate = 22000;
    channel.sid = 10301;
    channel.vpid = 5101;
    channel.apids = vec![5102];
    channel
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(devices) = args.devices {
        config.device_count = devices;
    }
    if let Some(log_dir) = args.log_dir {
        config.logging.log_dir = Some(log_dir);
    }
    init_logging(&config.logging, args.verbose)?;

    let channel = demo_channel();
    let mut descriptions = HashMap::new();
    descriptions.insert(channel.source, "1 Astra 19.2E".to_string());
    let host = Arc::new(LoopbackHost::with_descriptions(descriptions));

    let env = DeviceEnvironment::new(
        config.clone(),
        Arc::new(LoopbackDiscovery::new(vec![
            SourceKind::Satellite,
            SourceKind::Terrestrial,
        ])),
        host.clone(),
        Arc::new(|link: DeviceLink, _size: usize| -> Box<dyn TunerSession> {
            Box::new(LoopbackTuner::new(link))
        }),
        Arc::new(|_index: usize, _size: usize| -> Box<dyn SectionFilterHandler> {
            Box::new(LoopbackFilters::default())
        }),
    );

    let registry = DeviceRegistry::initialize(config.device_count, &env);
    let device = registry.get(0).ok_or("no SAT>IP devices configured")?;
    info!("Device ready: {} ({})", device.device_name(), device.ready());

    let admission = device.provides_channel(Some(&channel), priority::MAX);
    info!(
        "Admission for '{}': admitted={} needs_detach={}",
        channel.name, admission.admitted, admission.needs_detach
    );
    if !admission.admitted {
        warn!("Device does not provide '{}'", channel.name);
        return Ok(());
    }

    device.set_channel_device(Some(&channel), true)?;
    if !device.has_lock(Duration::from_secs(1)) {
        warn!("No lock on transponder {}", channel.transponder());
    }

    for (pid, pid_type) in [(channel.vpid, PidType::Video), (channel.apid(0), PidType::Audio)] {
        device.set_pid(&PidHandle::new(pid as i32, true), pid_type, true)?;
    }
    let eit = device.open_filter(0x12, 0x4E, 0xF0)?;
    host.device(device.index()).attach(&[channel.vpid, channel.apid(0)]);

    device.open_dvr();
    let deadline = Instant::now() + Duration::from_millis(args.timeout_ms);
    let mut pulled = 0;
    while pulled < args.packets && Instant::now() < deadline {
        if device.get_ts_packet()?.is_some() {
            pulled += 1;
        }
    }
    info!("Pulled {} TS packets", pulled);

    println!("{}", registry.aggregate_status());
    println!("{}", device.information(InfoPage::All));

    device.close_filter(eit);
    registry.shutdown();
    device.set_channel_device(None, false)?;
    Ok(())
}
