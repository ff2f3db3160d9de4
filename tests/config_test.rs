//! Tests for configuration files

use neurochain::config::{LimitsConfig, PipelineConfig, SchedulerConfig};
use neurochain::pipeline::{LimitsMode, PipelineBuilder};
use neurochain::NeurochainError;
use tempfile::TempDir;

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("neurochain.toml");

    let mut config = PipelineConfig::default();
    config.scheduler = SchedulerConfig::default().with_tick_rate(40);
    config.source.channel_count = 16;
    config.source.source_name = "eeg".to_string();
    config.limits = LimitsConfig {
        mode: LimitsMode::Local,
        buffer_length: 2.5,
    };
    config.save(&path).unwrap();

    let loaded = PipelineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_save_reports_directory_it_could_not_create() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let err = PipelineConfig::default()
        .save(blocker.join("neurochain.toml"))
        .unwrap_err();
    assert!(matches!(err, NeurochainError::WithContext { .. }));
    let text = err.to_string();
    assert!(text.starts_with("Failed to create config directory"));
    assert!(text.contains("blocker"));
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[scheduler\ntick_rate_hz = ").unwrap();

    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(matches!(err, NeurochainError::Config(_)));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn test_zero_tick_rate_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("neurochain.toml");
    std::fs::write(&path, "[scheduler]\ntick_rate_hz = 0\n").unwrap();

    assert!(matches!(
        PipelineConfig::load(&path),
        Err(NeurochainError::Config(_))
    ));
}

#[test]
fn test_load_or_default_falls_back() {
    let dir = TempDir::new().unwrap();

    let missing = dir.path().join("missing.toml");
    assert_eq!(
        PipelineConfig::load_or_default(Some(&missing)),
        PipelineConfig::default()
    );

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "source = 3").unwrap();
    assert_eq!(
        PipelineConfig::load_or_default(Some(&broken)),
        PipelineConfig::default()
    );
}

#[test]
fn test_config_drives_builder() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("neurochain.toml");
    std::fs::write(
        &path,
        r#"
        [source]
        channel_count = 3
        chunk_size = 20

        [limits]
        mode = "manual"
        "#,
    )
    .unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    let (mut pipeline, ids, chunks) = PipelineBuilder::new(config).build().unwrap();
    pipeline.initialize_all().unwrap();
    assert!(pipeline.tick().is_ok());

    let chunk = chunks.try_recv().unwrap();
    assert_eq!(chunk.data.shape(), (3, 20));
    assert_eq!(
        pipeline.parameter(ids.limits, "limits_mode").unwrap().as_str(),
        Some("manual")
    );
}
