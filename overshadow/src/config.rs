//! YAML Configuration Structures
//!
//! Every field has a default matching the stock command line, so an empty
//! file (or no file at all) yields a runnable configuration.

use crate::OvershadowError;
use common::types::{CellParams, NofPrb, PhichLength, PhichResources, Pci};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OvershadowConfig {
    /// Radio front end
    #[serde(default)]
    pub rf: RfConfig,
    /// Cell to track
    #[serde(default)]
    pub cell: CellConfig,
    /// Timing and scheduling
    #[serde(default)]
    pub sync: SyncConfig,
    /// Fields advertised in the forged MIB
    #[serde(default)]
    pub forge: ForgeConfig,
    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

/// RF configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RfConfig {
    /// Receive center frequency in Hz
    #[serde(default = "default_frequency")]
    pub rx_frequency_hz: f64,
    /// Transmit center frequency in Hz; defaults to the receive frequency
    #[serde(default)]
    pub tx_frequency_hz: Option<f64>,
    /// Receive gain in dB
    #[serde(default = "default_gain")]
    pub rx_gain_db: f32,
    /// Transmit gain in dB
    #[serde(default = "default_gain")]
    pub tx_gain_db: f32,
    /// Linear amplitude applied to the forged waveform
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    /// Device arguments passed to the front end driver
    #[serde(default)]
    pub device_args: String,
}

fn default_frequency() -> f64 {
    2.4e9
}

fn default_gain() -> f32 {
    15.0
}

fn default_amplitude() -> f32 {
    0.8
}

impl Default for RfConfig {
    fn default() -> Self {
        Self {
            rx_frequency_hz: default_frequency(),
            tx_frequency_hz: None,
            rx_gain_db: default_gain(),
            tx_gain_db: default_gain(),
            amplitude: default_amplitude(),
            device_args: String::new(),
        }
    }
}

impl RfConfig {
    /// Effective transmit frequency
    pub fn tx_frequency(&self) -> f64 {
        self.tx_frequency_hz.unwrap_or(self.rx_frequency_hz)
    }
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Physical cell ID (0-503)
    #[serde(default)]
    pub pci: u16,
    /// Number of PRBs (6, 15, 25, 50, 75, 100)
    #[serde(default = "default_nof_prb")]
    pub nof_prb: u32,
    /// Number of antenna ports (1, 2, 4)
    #[serde(default = "default_nof_ports")]
    pub nof_ports: u8,
}

fn default_nof_prb() -> u32 {
    25
}

fn default_nof_ports() -> u8 {
    1
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            pci: 0,
            nof_prb: default_nof_prb(),
            nof_ports: default_nof_ports(),
        }
    }
}

/// Timing mode
///
/// `Continuous` keeps decoding the MIB at every subframe 0 so the frame
/// counter is re-anchored each time; `SingleShot` decodes until the first
/// success and free-runs from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Continuous,
    SingleShot,
}

impl SyncMode {
    /// Whether the sensing loop decodes the MIB after acquisition
    pub fn tracks_mib(&self) -> bool {
        matches!(self, SyncMode::Continuous)
    }

    /// Preset scheduling parameters for this mode
    pub fn preset(&self) -> ScheduleParams {
        match self {
            SyncMode::Continuous => ScheduleParams {
                action_phase: 0,
                target_frame_advance: 1,
                lead_time_s: DEFAULT_LEAD_TIME_S,
                pipeline_compensation_s: 1e-4,
            },
            SyncMode::SingleShot => ScheduleParams {
                action_phase: 0,
                target_frame_advance: 4,
                lead_time_s: DEFAULT_LEAD_TIME_S,
                pipeline_compensation_s: -60.0 / 15.36e6,
            },
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Continuous => write!(f, "continuous"),
            SyncMode::SingleShot => write!(f, "single_shot"),
        }
    }
}

/// One frame minus one front-end pipeline slot
pub const DEFAULT_LEAD_TIME_S: f64 = 0.0099;

/// Sync configuration: a mode plus optional overrides of its preset
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,
    /// Position in the 4-frame PBCH cycle at which to transmit
    #[serde(default)]
    pub action_phase: Option<u32>,
    /// Frames between the observed frame and the claimed frame number
    #[serde(default)]
    pub target_frame_advance: Option<u32>,
    /// Transmit lead relative to the observed subframe, seconds
    #[serde(default)]
    pub lead_time_s: Option<f64>,
    /// Front-end pipeline correction, seconds
    #[serde(default)]
    pub pipeline_compensation_s: Option<f64>,
}

/// Resolved scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleParams {
    pub action_phase: u32,
    pub target_frame_advance: u32,
    pub lead_time_s: f64,
    pub pipeline_compensation_s: f64,
}

impl ScheduleParams {
    /// Total offset added to the observation timestamp
    pub fn transmit_offset_s(&self) -> f64 {
        self.lead_time_s + self.pipeline_compensation_s
    }
}

impl SyncConfig {
    /// Mode preset with any configured overrides applied
    pub fn schedule(&self) -> ScheduleParams {
        let preset = self.mode.preset();
        ScheduleParams {
            action_phase: self.action_phase.unwrap_or(preset.action_phase),
            target_frame_advance: self.target_frame_advance.unwrap_or(preset.target_frame_advance),
            lead_time_s: self.lead_time_s.unwrap_or(preset.lead_time_s),
            pipeline_compensation_s: self
                .pipeline_compensation_s
                .unwrap_or(preset.pipeline_compensation_s),
        }
    }
}

/// Overrides for what the forged MIB advertises
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub nof_ports: Option<u8>,
    #[serde(default)]
    pub phich_length: Option<PhichLength>,
    #[serde(default)]
    pub phich_resources: Option<PhichResources>,
}

impl ForgeConfig {
    /// Cell as it will be advertised, starting from the sensed one
    pub fn apply(&self, sensed: &CellParams) -> CellParams {
        let mut forged = *sensed;
        if let Some(ports) = self.nof_ports {
            forged.nof_ports = ports;
        }
        if let Some(length) = self.phich_length {
            forged.phich_length = length;
        }
        if let Some(resources) = self.phich_resources {
            forged.phich_resources = resources;
        }
        forged
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OvershadowConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml_str(&contents)?)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Validate and build the cell the sensing loop starts from
    pub fn cell_params(&self) -> Result<CellParams, OvershadowError> {
        let pci = Pci::new(self.cell.pci)
            .ok_or_else(|| OvershadowError::Config(format!("Invalid PCI: {}", self.cell.pci)))?;
        let nof_prb = NofPrb::from_count(self.cell.nof_prb)
            .ok_or_else(|| OvershadowError::Config(format!("Invalid number of PRB: {}", self.cell.nof_prb)))?;
        if !CellParams::VALID_PORTS.contains(&self.cell.nof_ports) {
            return Err(OvershadowError::Config(format!(
                "Invalid number of ports: {}",
                self.cell.nof_ports
            )));
        }
        let mut cell = CellParams::new(pci, nof_prb, self.cell.nof_ports);
        cell.phich_resources = PhichResources::One;
        Ok(cell)
    }

    /// Reject configurations no thread should be started with
    pub fn validate(&self) -> Result<(), OvershadowError> {
        self.cell_params()?;

        if !(self.rf.rx_frequency_hz > 0.0) || !(self.rf.tx_frequency() > 0.0) {
            return Err(OvershadowError::Config("Center frequency must be positive".to_string()));
        }
        if !self.rf.amplitude.is_finite() || self.rf.amplitude < 0.0 {
            return Err(OvershadowError::Config(format!(
                "Invalid amplitude: {}",
                self.rf.amplitude
            )));
        }
        if let Some(ports) = self.forge.nof_ports {
            if !CellParams::VALID_PORTS.contains(&ports) {
                return Err(OvershadowError::Config(format!("Invalid forged port count: {}", ports)));
            }
        }

        let schedule = self.sync.schedule();
        if schedule.action_phase >= common::BCH_REPETITION_FRAMES {
            return Err(OvershadowError::Config(format!(
                "Action phase must be below {}, got {}",
                common::BCH_REPETITION_FRAMES,
                schedule.action_phase
            )));
        }
        if schedule.target_frame_advance == 0 || schedule.target_frame_advance >= common::SFN_PERIOD {
            return Err(OvershadowError::Config(format!(
                "Invalid target frame advance: {}",
                schedule.target_frame_advance
            )));
        }
        if !schedule.transmit_offset_s().is_finite() || schedule.transmit_offset_s() <= 0.0 {
            return Err(OvershadowError::Config(
                "Transmit lead must be a positive number of seconds".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = OvershadowConfig::from_yaml_str("").unwrap();
        assert_eq!(config.rf.rx_frequency_hz, 2.4e9);
        assert_eq!(config.rf.tx_frequency(), 2.4e9);
        assert_eq!(config.rf.amplitude, 0.8);
        assert_eq!(config.cell.nof_prb, 25);
        assert_eq!(config.sync.mode, SyncMode::Continuous);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
rf:
  rx_frequency_hz: 1842.5e6
  tx_frequency_hz: 1842.6e6
  tx_gain_db: 60
  amplitude: 0.5
  device_args: "sfn=100,realtime=1"
cell:
  pci: 301
  nof_prb: 50
  nof_ports: 2
sync:
  mode: single_shot
  action_phase: 3
forge:
  nof_ports: 4
  phich_length: extended
  phich_resources: two
log:
  level: debug
"#;
        let config = OvershadowConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.rf.tx_frequency(), 1842.6e6);
        assert_eq!(config.rf.rx_gain_db, 15.0);
        assert_eq!(config.rf.tx_gain_db, 60.0);
        assert_eq!(config.cell.pci, 301);
        assert_eq!(config.sync.mode, SyncMode::SingleShot);
        assert_eq!(config.forge.phich_length, Some(PhichLength::Extended));
        assert_eq!(config.forge.phich_resources, Some(PhichResources::Two));
        assert_eq!(config.log.level, "debug");

        let schedule = config.sync.schedule();
        assert_eq!(schedule.action_phase, 3);
        assert_eq!(schedule.target_frame_advance, 4);
        assert!(config.validate().is_ok());

        let cell = config.cell_params().unwrap();
        assert_eq!(cell.nof_prb, NofPrb::Prb50);
        assert_eq!(cell.nof_ports, 2);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = OvershadowConfig::from_yaml_str(include_str!("../overshadow.yml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.forge.nof_ports, Some(2));
        assert!(config.rf.device_args.contains("driver=sim"));
    }

    #[test]
    fn test_mode_presets() {
        let continuous = SyncMode::Continuous.preset();
        assert!(SyncMode::Continuous.tracks_mib());
        assert_eq!(continuous.target_frame_advance, 1);
        assert!((continuous.transmit_offset_s() - 0.01).abs() < 1e-12);

        let single = SyncMode::SingleShot.preset();
        assert!(!SyncMode::SingleShot.tracks_mib());
        assert_eq!(single.target_frame_advance, 4);
        assert!(single.transmit_offset_s() < DEFAULT_LEAD_TIME_S);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OvershadowConfig::default();
        config.cell.nof_prb = 42;
        assert!(matches!(config.validate(), Err(OvershadowError::Config(_))));

        let mut config = OvershadowConfig::default();
        config.cell.pci = 504;
        assert!(config.validate().is_err());

        let mut config = OvershadowConfig::default();
        config.cell.nof_ports = 3;
        assert!(config.validate().is_err());

        let mut config = OvershadowConfig::default();
        config.sync.action_phase = Some(4);
        assert!(config.validate().is_err());

        let mut config = OvershadowConfig::default();
        config.sync.lead_time_s = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = OvershadowConfig::default();
        config.rf.amplitude = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forge_overrides() {
        let sensed = CellParams::new(Pci(5), NofPrb::Prb25, 1);
        let forge = ForgeConfig {
            nof_ports: Some(2),
            phich_length: Some(PhichLength::Extended),
            phich_resources: None,
        };
        let forged = forge.apply(&sensed);
        assert_eq!(forged.nof_ports, 2);
        assert_eq!(forged.phich_length, PhichLength::Extended);
        assert_eq!(forged.phich_resources, sensed.phich_resources);
        assert_eq!(forged.pci, sensed.pci);
        assert_eq!(ForgeConfig::default().apply(&sensed), sensed);
    }
}
