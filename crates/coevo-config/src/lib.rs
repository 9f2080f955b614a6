use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "coevo.toml";
pub const DEFAULT_INTERFACE_SUFFIX: &str = ".proto";
pub const DEFAULT_MIN_SUPPORT: f64 = 0.005;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_MIN_LIFT: f64 = 1.0;

/// Worker threads kept free for the orchestrator and the OS.
const RESERVED_CPUS: usize = 2;

const DEFAULT_SKIP_PREFIXES: &[&str] = &[
    "docs/",
    ".github/",
    ".gitlab/",
    "vendor/",
    "third_party/",
    "node_modules/",
    "generated/",
    "gen/",
    "dist/",
    "build/",
    "target/",
    "out/",
];

const DEFAULT_SKIP_SUFFIXES: &[&str] = &[
    ".md",
    ".png",
    ".jpg",
    ".jpeg",
    ".gif",
    ".svg",
    ".lock",
    ".sum",
    ".pb.go",
    ".pb.cc",
    ".pb.h",
    ".pb.c",
    ".pb.java",
    ".pb.kt",
    ".pb.py",
    ".proto.lock",
    "_generated.go",
    "_gen.go",
    ".generated.go",
];

const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "*_pb.go",
    "*_grpc.pb.go",
    "*_grpc.pb.*",
    "*_pb2.py",
    "*_pb2_grpc.py",
    "zz_generated.*",
    "bindata.go",
    "mock_*.go",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoevoConfig {
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub skip: SkipConfig,
    #[serde(default)]
    pub rules: RuleThresholds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningConfig {
    #[serde(default = "default_interface_suffix")]
    pub interface_suffix: String,
    /// Most recent non-merge commits considered per repository. Applies to
    /// both counting phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_commits: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default = "default_true")]
    pub require_interface_file: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            interface_suffix: default_interface_suffix(),
            max_commits: None,
            workers: None,
            require_interface_file: true,
        }
    }
}

impl MiningConfig {
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(RESERVED_CPUS))
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipConfig {
    #[serde(default = "default_skip_prefixes")]
    pub prefixes: Vec<String>,
    #[serde(default = "default_skip_suffixes")]
    pub suffixes: Vec<String>,
    #[serde(default = "default_skip_patterns")]
    pub patterns: Vec<String>,
}

impl Default for SkipConfig {
    fn default() -> Self {
        Self {
            prefixes: default_skip_prefixes(),
            suffixes: default_skip_suffixes(),
            patterns: default_skip_patterns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    #[serde(default = "default_min_support")]
    pub min_support: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_lift")]
    pub min_lift: f64,
    #[serde(default = "default_min_n_both")]
    pub min_n_both: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_per_interface: Option<usize>,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            min_support: DEFAULT_MIN_SUPPORT,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            min_lift: DEFAULT_MIN_LIFT,
            min_n_both: default_min_n_both(),
            top_k_per_interface: None,
        }
    }
}

impl RuleThresholds {
    /// Keeps every observed pair.
    pub fn unfiltered() -> Self {
        Self {
            min_support: 0.0,
            min_confidence: 0.0,
            min_lift: 0.0,
            min_n_both: 1,
            top_k_per_interface: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Loads the config at `path`, falling back to defaults when the file does
/// not exist. The result is normalized and validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<CoevoConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(CoevoConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<CoevoConfig, ConfigError> {
    let parsed: CoevoConfig = toml::from_str(raw)?;
    let config = normalize_config(parsed);
    validate_config(&config)?;
    Ok(config)
}

pub fn write_default_config(path: impl AsRef<Path>) -> Result<CoevoConfig, ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let config = CoevoConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;
    Ok(config)
}

pub fn validate_config(config: &CoevoConfig) -> Result<(), ConfigError> {
    if config.mining.interface_suffix.len() < 2 {
        return Err(invalid(
            "mining.interface_suffix",
            "expected a file suffix such as \".proto\"",
        ));
    }
    if config.mining.workers == Some(0) {
        return Err(invalid("mining.workers", "must be at least 1"));
    }
    if config.mining.max_commits == Some(0) {
        return Err(invalid("mining.max_commits", "must be at least 1"));
    }

    let rules = &config.rules;
    check_probability("rules.min_support", rules.min_support)?;
    check_probability("rules.min_confidence", rules.min_confidence)?;
    if !rules.min_lift.is_finite() || rules.min_lift < 0.0 {
        return Err(invalid(
            "rules.min_lift",
            format!("must be a non-negative number, got {}", rules.min_lift),
        ));
    }
    if rules.top_k_per_interface == Some(0) {
        return Err(invalid("rules.top_k_per_interface", "must be at least 1"));
    }

    Ok(())
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("must be within [0, 1], got {value}")));
    }
    Ok(())
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

fn normalize_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn normalize_config(mut config: CoevoConfig) -> CoevoConfig {
    let suffix = config.mining.interface_suffix.trim().to_ascii_lowercase();
    config.mining.interface_suffix = if suffix.is_empty() || suffix.starts_with('.') {
        suffix
    } else {
        format!(".{suffix}")
    };

    config.skip.prefixes = normalize_entries(std::mem::take(&mut config.skip.prefixes));
    config.skip.suffixes = normalize_entries(std::mem::take(&mut config.skip.suffixes));
    config.skip.patterns = normalize_entries(std::mem::take(&mut config.skip.patterns));

    config
}

fn to_owned_list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn default_interface_suffix() -> String {
    DEFAULT_INTERFACE_SUFFIX.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_skip_prefixes() -> Vec<String> {
    to_owned_list(DEFAULT_SKIP_PREFIXES)
}

fn default_skip_suffixes() -> Vec<String> {
    to_owned_list(DEFAULT_SKIP_SUFFIXES)
}

fn default_skip_patterns() -> Vec<String> {
    to_owned_list(DEFAULT_SKIP_PATTERNS)
}

fn default_min_support() -> f64 {
    DEFAULT_MIN_SUPPORT
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_min_lift() -> f64 {
    DEFAULT_MIN_LIFT
}

fn default_min_n_both() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config(temp.path().join(CONFIG_FILE_NAME)).expect("load config");

        assert_eq!(config, CoevoConfig::default());
        assert_eq!(config.mining.interface_suffix, ".proto");
        assert!(config.skip.patterns.iter().any(|p| p == "*_pb2.py"));
        assert_eq!(config.rules.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let raw = r#"
[mining]
interface_suffix = "THRIFT"
max_commits = 500

[rules]
min_lift = 2.5
top_k_per_interface = 10
"#;
        let config = parse_config(raw).expect("parse config");

        assert_eq!(config.mining.interface_suffix, ".thrift");
        assert_eq!(config.mining.max_commits, Some(500));
        assert!(config.mining.require_interface_file);
        assert_eq!(config.rules.min_lift, 2.5);
        assert_eq!(config.rules.min_support, DEFAULT_MIN_SUPPORT);
        assert_eq!(config.rules.top_k_per_interface, Some(10));
        assert_eq!(config.skip, SkipConfig::default());
    }

    #[test]
    fn skip_entries_are_trimmed_and_lowercased() {
        let raw = r#"
[skip]
prefixes = [" Vendor/ ", ""]
suffixes = [".MD"]
patterns = ["Mock_*.go"]
"#;
        let config = parse_config(raw).expect("parse config");

        assert_eq!(config.skip.prefixes, vec!["vendor/".to_owned()]);
        assert_eq!(config.skip.suffixes, vec![".md".to_owned()]);
        assert_eq!(config.skip.patterns, vec!["mock_*.go".to_owned()]);
    }

    #[test]
    fn out_of_range_thresholds_are_rejected() {
        let err = parse_config("[rules]\nmin_confidence = 1.5\n").expect_err("should fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "rules.min_confidence",
                ..
            }
        ));

        let err = parse_config("[mining]\nworkers = 0\n").expect_err("should fail");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "mining.workers",
                ..
            }
        ));
    }

    #[test]
    fn default_config_round_trips_through_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);

        let written = write_default_config(&path).expect("write default config");
        let content = fs::read_to_string(&path).expect("read config file");
        assert!(content.contains("[rules]"));
        assert!(content.contains("interface_suffix = \".proto\""));

        let loaded = load_config(&path).expect("load config");
        assert_eq!(loaded, written);
    }

    #[test]
    fn effective_workers_is_never_zero() {
        let mining = MiningConfig {
            workers: None,
            ..MiningConfig::default()
        };
        assert!(mining.effective_workers() >= 1);

        let mining = MiningConfig {
            workers: Some(3),
            ..MiningConfig::default()
        };
        assert_eq!(mining.effective_workers(), 3);
    }
}
