mod common;
use crate::common::{body_counter, setup_tracing};
use nightgate::config::{DEFAULT_IDENTITY, DEFAULT_PORT};
use nightgate::{BuildError, FormatError, Interval, ResourceSlot, RetrievalScheduler, SchedulerBuilder, SchedulerConfig};
use std::sync::Arc;
use std::time::Duration as StdDuration;

#[test]
fn test_default_config() {
  let config = SchedulerConfig::default();
  assert_eq!(config.worker_count, 1);
  assert_eq!(config.resource_slots, vec![ResourceSlot::new(DEFAULT_IDENTITY, DEFAULT_PORT)]);
  assert_eq!(config.intervals().unwrap(), vec![Interval::parse("1800", "0700").unwrap()]);
  assert_eq!(config.startup_delay(), StdDuration::from_secs(2));
  assert_eq!(config.validate(), Ok(()));
}

#[test]
fn test_validate_rejects_missing_slots_and_bad_periods() {
  let config = SchedulerConfig {
    worker_count: 2,
    ..SchedulerConfig::default()
  };
  assert_eq!(
    config.validate(),
    Err(BuildError::InsufficientSlots { slots: 1, workers: 2 })
  );

  let config = SchedulerConfig {
    periods: vec![["1800".to_string(), "07:00".to_string()]],
    ..SchedulerConfig::default()
  };
  assert_eq!(
    config.validate(),
    Err(BuildError::InvalidWindow(FormatError::NotFourDigits("07:00".to_string())))
  );

  let config = SchedulerConfig {
    worker_count: 0,
    ..SchedulerConfig::default()
  };
  assert_eq!(config.validate(), Err(BuildError::ZeroWorkers));

  let config = SchedulerConfig {
    worker_count: 2,
    resource_slots: vec![ResourceSlot::new("AUTOQR1", 11112), ResourceSlot::new("AUTOQR2", 11112)],
    ..SchedulerConfig::default()
  };
  assert_eq!(
    config.validate(),
    Err(BuildError::DuplicateSlot(ResourceSlot::new("AUTOQR2", 11112)))
  );
}

#[tokio::test]
async fn test_builder_from_config() {
  setup_tracing();
  let config = SchedulerConfig {
    worker_count: 2,
    resource_slots: vec![ResourceSlot::new("AUTOQR1", 11112), ResourceSlot::new("AUTOQR2", 11113)],
    periods: vec![],
    output_root: Some("/data/out".into()),
    ..SchedulerConfig::default()
  };

  let scheduler = SchedulerBuilder::from_config(&config)
    .build_with(body_counter(Arc::default(), StdDuration::ZERO))
    .unwrap();
  assert_eq!(scheduler.worker_slots(), &config.resource_slots[..]);

  let out = scheduler.default_output_dir().unwrap();
  assert!(out.starts_with("/data/out"));
  assert_eq!(out.file_name().unwrap().len(), 4, "Dated directory is MMDD");

  scheduler.shutdown_graceful(Some(StdDuration::from_secs(1))).await.unwrap();

  let without_root = RetrievalScheduler::builder()
    .worker_count(1)
    .resource_slots(vec![ResourceSlot::new("AUTOQR", 104)])
    .build_with(body_counter(Arc::default(), StdDuration::ZERO))
    .unwrap();
  assert_eq!(without_root.default_output_dir(), None);
  without_root.shutdown_graceful(None).await.unwrap();
}

#[cfg(feature = "toml_config")]
#[test]
fn test_from_toml_str() {
  let config = SchedulerConfig::from_toml_str(
    r#"
worker_count = 2
periods = [["1800", "0700"], ["1200", "1300"]]
startup_delay_secs = 10
output_root = "/data/out"

[[resource_slots]]
identity = "AUTOQR1"
port = 11112

[[resource_slots]]
identity = "AUTOQR2"
port = 11113
"#,
  )
  .unwrap();

  assert_eq!(config.worker_count, 2);
  assert_eq!(config.resource_slots[1], ResourceSlot::new("AUTOQR2", 11113));
  assert_eq!(config.intervals().unwrap().len(), 2);
  assert_eq!(config.startup_delay(), StdDuration::from_secs(10));
  assert_eq!(config.gate_tick(), StdDuration::from_secs(60), "Missing keys keep their defaults");
  assert_eq!(config.sample_window, None);
}

#[cfg(feature = "toml_config")]
#[test]
fn test_from_toml_str_validates() {
  let err = SchedulerConfig::from_toml_str("worker_count = 3").unwrap_err();
  assert_eq!(err, BuildError::InsufficientSlots { slots: 1, workers: 3 });

  let err = SchedulerConfig::from_toml_str("worker_count = \"many\"").unwrap_err();
  assert!(matches!(err, BuildError::Config(_)));
}
