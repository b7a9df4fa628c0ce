//! Layered configuration loading from `.quantbench/` and the environment.

use std::fs;
use std::path::Path;

use quantbench::domain::models::{ExtractionMode, ProviderKind};
use quantbench::infrastructure::config::ConfigLoader;
use tempfile::TempDir;

fn write(root: &Path, name: &str, body: &str) {
    let dir = root.join(".quantbench");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

const PROJECT: &str = r"
harvest:
  max_attempts: 4
  output_dir: data/raw
extraction:
  mode: pattern
targets:
  overall: 0.9
models:
  - id: gpt-5.2
    provider: openai
    slug: gpt-5.2
    display_name: GPT-5.2
";

#[test]
fn test_defaults_without_files() {
    let dir = TempDir::new().unwrap();
    let config = temp_env::with_vars_unset(["QUANTBENCH_HARVEST__MAX_ATTEMPTS"], || {
        ConfigLoader::load_from_dir(dir.path()).unwrap()
    });
    assert_eq!(config.harvest.max_attempts, 5);
    assert_eq!(config.evaluation.pass_threshold, 0.7);
    assert_eq!(config.models.len(), 7);
}

#[test]
fn test_local_overrides_project_and_env_overrides_both() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.yaml", PROJECT);
    write(dir.path(), "local.yaml", "harvest:\n  max_attempts: 6\n");

    let config = temp_env::with_vars(
        [
            ("QUANTBENCH_HARVEST__MAX_ATTEMPTS", Some("7")),
            ("QUANTBENCH_PROVIDERS__OPENAI__BASE_URL", Some("http://localhost:9999")),
        ],
        || ConfigLoader::load_from_dir(dir.path()).unwrap(),
    );

    assert_eq!(config.harvest.max_attempts, 7);
    assert_eq!(config.harvest.output_dir, "data/raw");
    assert_eq!(config.extraction.mode, ExtractionMode::Pattern);
    assert_eq!(config.targets.overall, 0.9);
    assert_eq!(config.providers.openai.base_url, "http://localhost:9999");
    assert_eq!(config.models.len(), 1);
    assert_eq!(config.models[0].provider, ProviderKind::OpenAi);
}

#[test]
fn test_local_file_applies_without_env() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.yaml", PROJECT);
    write(dir.path(), "local.yaml", "harvest:\n  max_attempts: 6\n");

    let config = temp_env::with_vars_unset(["QUANTBENCH_HARVEST__MAX_ATTEMPTS"], || {
        ConfigLoader::load_from_dir(dir.path()).unwrap()
    });
    assert_eq!(config.harvest.max_attempts, 6);
}

#[test]
fn test_invalid_layer_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.yaml", "evaluation:\n  pass_threshold: 1.5\n");

    let result = temp_env::with_vars_unset(["QUANTBENCH_EVALUATION__PASS_THRESHOLD"], || {
        ConfigLoader::load_from_dir(dir.path())
    });
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("pass_threshold"));
}

#[test]
fn test_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.yaml");
    fs::write(&path, "logging:\n  level: debug\n  format: json\n").unwrap();

    let config = temp_env::with_vars_unset(["QUANTBENCH_LOGGING__LEVEL"], || {
        ConfigLoader::load_from_file(&path).unwrap()
    });
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}
