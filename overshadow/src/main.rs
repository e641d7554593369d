//! LTE Broadcast Overshadowing Tool
//!
//! Senses the downlink timing of an LTE cell and overshadows its MIB with
//! timed transmissions of a forged one.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use interfaces::sim_rf::{SimRf, SimRfConfig};
use overshadow::{OvershadowConfig, OvershadowContext, SyncMode};
use phy::{SimBroadcastSynthesizer, SimDownlinkSync, SimPhyConfig};

/// LTE broadcast overshadowing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// RF device arguments (e.g. "driver=sim,sfn=100,sync_loss=0.01")
    #[arg(short = 'a', long)]
    device_args: Option<String>,

    /// RF TX gain in dB
    #[arg(short = 'g', long)]
    gain: Option<f32>,

    /// RF center frequency in Hz
    #[arg(short = 'f', long)]
    frequency: Option<f64>,

    /// Forged waveform amplitude
    #[arg(short = 'l', long)]
    amplitude: Option<f32>,

    /// Physical cell ID (0-503)
    #[arg(short = 'c', long)]
    cell_id: Option<u16>,

    /// Number of PRBs
    #[arg(short = 'p', long)]
    nof_prb: Option<u32>,

    /// Number of antenna ports
    #[arg(short = 'P', long)]
    nof_ports: Option<u8>,

    /// Timing mode
    #[arg(long, value_enum)]
    mode: Option<SyncMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command line values take precedence over the file
    fn apply(&self, config: &mut OvershadowConfig) {
        if let Some(args) = &self.device_args {
            config.rf.device_args = args.clone();
        }
        if let Some(gain) = self.gain {
            config.rf.tx_gain_db = gain;
        }
        if let Some(frequency) = self.frequency {
            config.rf.rx_frequency_hz = frequency;
            config.rf.tx_frequency_hz = Some(frequency);
        }
        if let Some(amplitude) = self.amplitude {
            config.rf.amplitude = amplitude;
        }
        if let Some(pci) = self.cell_id {
            config.cell.pci = pci;
        }
        if let Some(nof_prb) = self.nof_prb {
            config.cell.nof_prb = nof_prb;
        }
        if let Some(nof_ports) = self.nof_ports {
            config.cell.nof_ports = nof_ports;
        }
        if let Some(mode) = self.mode {
            config.sync.mode = mode;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

/// Value of `driver=` in a device argument string, `sim` when absent
fn rf_driver(device_args: &str) -> &str {
    device_args
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == "driver")
        .map(|(_, value)| value.trim())
        .unwrap_or("sim")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OvershadowConfig::from_yaml_file(path)?,
        None => OvershadowConfig::default(),
    };
    args.apply(&mut config);

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .init();

    info!("Starting LTE broadcast overshadowing");
    if let Some(path) = &args.config {
        info!("Configuration file: {}", path);
    }

    let ctx = OvershadowContext::new(config)?;
    let config = &ctx.config;
    let schedule = ctx.schedule;

    info!("Cell configuration:");
    info!("  PCI: {}", ctx.initial_cell.pci.0);
    info!("  PRBs: {}", ctx.initial_cell.nof_prb.count());
    info!("  Ports: {}", ctx.initial_cell.nof_ports);
    info!("RF configuration:");
    info!("  RX frequency: {:.3} MHz", config.rf.rx_frequency_hz / 1e6);
    info!("  TX frequency: {:.3} MHz", config.rf.tx_frequency() / 1e6);
    info!("  TX gain: {:.1} dB", config.rf.tx_gain_db);
    info!("  Amplitude: {:.2}", config.rf.amplitude);
    info!("Timing configuration ({} mode):", config.sync.mode);
    info!("  Action phase: {}", schedule.action_phase);
    info!("  Target frame advance: {}", schedule.target_frame_advance);
    info!(
        "  Transmit offset: {:.7} s (lead {:.7} s, compensation {:.7} s)",
        schedule.transmit_offset_s(),
        schedule.lead_time_s,
        schedule.pipeline_compensation_s
    );

    let driver = rf_driver(&config.rf.device_args);
    if driver != "sim" {
        anyhow::bail!("Unsupported RF driver: {}", driver);
    }
    let rf = SimRf::open(SimRfConfig::from_device_args(&config.rf.device_args)?)?;
    let phy_config = SimPhyConfig::from_device_args(&config.rf.device_args)?;
    let (rx, tx, monitor) = rf.split();

    let workers = ctx.spawn(
        rx,
        SimDownlinkSync::new(phy_config),
        tx,
        SimBroadcastSynthesizer::new(),
    )?;

    // Wait for an interrupt or for a worker to request shutdown
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = ctx.shutdown.cancelled() => {
            warn!("Worker requested shutdown");
        }
    }
    ctx.shutdown.cancel();

    let result = tokio::task::spawn_blocking(move || workers.join()).await?;

    let rf_stats = monitor.stats();
    info!("RF statistics:");
    info!("  RX subframes: {}, sync losses: {}", rf_stats.rx_subframes, rf_stats.sync_losses);
    info!(
        "  TX samples: {}, bursts: {}, late: {}",
        rf_stats.tx_samples, rf_stats.tx_bursts, rf_stats.tx_late
    );

    match result {
        Ok((sensing, injector)) => {
            info!("Sensing statistics:");
            info!("  Subframes: {}, sync misses: {}", sensing.subframes, sensing.sync_misses);
            info!(
                "  MIB decodes: {}, misses: {}",
                sensing.decode_successes, sensing.decode_misses
            );
            info!("Injector statistics:");
            info!(
                "  Transmissions: {}, failures: {}, skipped: {}",
                injector.transmissions, injector.transmit_failures, injector.skipped_unsynced
            );
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Stopped on fatal error: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file() {
        let args = Args::parse_from([
            "overshadow", "-g", "60", "-f", "1842.5e6", "-c", "301", "-p", "50", "-P", "2", "--mode", "single-shot",
        ]);
        let mut config = OvershadowConfig::from_yaml_str("cell:\n  pci: 7\nrf:\n  amplitude: 0.3\n").unwrap();
        args.apply(&mut config);
        assert_eq!(config.cell.pci, 301);
        assert_eq!(config.cell.nof_prb, 50);
        assert_eq!(config.cell.nof_ports, 2);
        assert_eq!(config.rf.tx_gain_db, 60.0);
        assert_eq!(config.rf.tx_frequency(), 1842.5e6);
        assert_eq!(config.rf.amplitude, 0.3);
        assert_eq!(config.sync.mode, SyncMode::SingleShot);
    }

    #[test]
    fn test_rf_driver_selection() {
        assert_eq!(rf_driver(""), "sim");
        assert_eq!(rf_driver("sfn=3, driver=uhd"), "uhd");
        assert_eq!(rf_driver("driver=sim"), "sim");
    }
}
