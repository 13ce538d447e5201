use crate::clock::Interval;
use crate::error::{BuildError, FormatError};
use crate::job::ResourceSlot;
use crate::pool::check_slots;

use std::path::PathBuf;
use std::time::Duration;

/// Default client identity used when no slots are configured.
pub const DEFAULT_IDENTITY: &str = "AUTOQR";
/// Default receive port used when no slots are configured.
pub const DEFAULT_PORT: u16 = 104;
/// Default permitted window: overnight, 18:00 to 07:00.
pub const DEFAULT_PERIOD: [&str; 2] = ["1800", "0700"];
/// Default pause between releasing consecutive workers.
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 2;

/// Deployment settings for a scheduler.
///
/// With the `serde` feature this deserializes from e.g.
///
/// ```toml
/// worker_count = 2
/// periods = [["1800", "0700"], ["1200", "1300"]]
/// startup_delay_secs = 10
/// output_root = "/data/out"
///
/// [[resource_slots]]
/// identity = "AUTOQR1"
/// port = 11112
///
/// [[resource_slots]]
/// identity = "AUTOQR2"
/// port = 11113
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
  pub worker_count: usize,
  pub resource_slots: Vec<ResourceSlot>,
  /// Permitted windows as `[start, end]` pairs of `HHMM` strings. Empty means always permitted.
  pub periods: Vec<[String; 2]>,
  pub startup_delay_secs: u64,
  pub output_root: Option<PathBuf>,
  /// Number of elapsed-time samples kept for the rate estimate; `None` keeps all.
  pub sample_window: Option<usize>,
  pub gate_tick_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      worker_count: 1,
      resource_slots: vec![ResourceSlot::new(DEFAULT_IDENTITY, DEFAULT_PORT)],
      periods: vec![[DEFAULT_PERIOD[0].to_string(), DEFAULT_PERIOD[1].to_string()]],
      startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
      output_root: None,
      sample_window: None,
      gate_tick_secs: crate::gate::DEFAULT_GATE_TICK.as_secs(),
    }
  }
}

impl SchedulerConfig {
  /// Parses the configured periods. A malformed time is fatal to startup.
  pub fn intervals(&self) -> Result<Vec<Interval>, FormatError> {
    self
      .periods
      .iter()
      .map(|[start, end]| Interval::parse(start, end))
      .collect()
  }

  pub fn startup_delay(&self) -> Duration {
    Duration::from_secs(self.startup_delay_secs)
  }

  pub fn gate_tick(&self) -> Duration {
    Duration::from_secs(self.gate_tick_secs)
  }

  /// Checks the slots against the worker count and parses every period.
  pub fn validate(&self) -> Result<(), BuildError> {
    check_slots(&self.resource_slots, self.worker_count)?;
    self.intervals()?;
    Ok(())
  }

  /// Reads settings from TOML. Missing keys keep their defaults.
  #[cfg(feature = "toml_config")]
  pub fn from_toml_str(s: &str) -> Result<Self, BuildError> {
    let config: SchedulerConfig = toml::from_str(s).map_err(|e| BuildError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }
}
