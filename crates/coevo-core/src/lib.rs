use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

mod classify;
mod git;

pub use classify::{ClassifyError, PathClassifier, SkipRules, is_interface_path};
pub use git::{GitHistory, HistoryAccessError, repository_name};

/// Coarse role of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum PathCategory {
    Interface,
    Impl,
    Test,
    Build,
    Config,
    Infra,
    Ci,
    Other,
}

impl PathCategory {
    pub const ALL: [PathCategory; 8] = [
        Self::Interface,
        Self::Impl,
        Self::Test,
        Self::Build,
        Self::Config,
        Self::Infra,
        Self::Ci,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Impl => "impl",
            Self::Test => "test",
            Self::Build => "build",
            Self::Config => "config",
            Self::Infra => "infra",
            Self::Ci => "ci",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for PathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PathCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "interface" => Ok(Self::Interface),
            "impl" => Ok(Self::Impl),
            "test" => Ok(Self::Test),
            "build" => Ok(Self::Build),
            "config" => Ok(Self::Config),
            "infra" => Ok(Self::Infra),
            "ci" => Ok(Self::Ci),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "invalid category '{other}', expected one of: interface, impl, test, build, config, infra, ci, other"
            )),
        }
    }
}

/// Surviving paths touched by one non-merge commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub repo: String,
    pub commit: String,
    pub files: BTreeSet<String>,
    pub has_interface_change: bool,
}

impl Transaction {
    pub fn interface_files<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .map(String::as_str)
            .filter(move |path| is_interface_path(path, suffix))
    }

    pub fn cochange_files<'a>(&'a self, suffix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .iter()
            .map(String::as_str)
            .filter(move |path| !is_interface_path(path, suffix))
    }
}

/// Association metrics for one (interface file, co-changed file) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairStatistic {
    pub repo: String,
    pub interface_file: String,
    pub cochange_file: String,
    pub category: PathCategory,
    pub n_all_tx: u64,
    pub n_interface_tx: u64,
    pub n_file_tx: u64,
    pub n_both_tx: u64,
    pub support: f64,
    pub confidence: f64,
    pub baseline: f64,
    pub lift: f64,
}

impl PairStatistic {
    pub const COLUMNS: [&'static str; 12] = [
        "repo",
        "interface_file",
        "cochange_file",
        "category",
        "n_all_tx",
        "n_interface_tx",
        "n_file_tx",
        "n_both_tx",
        "support",
        "confidence",
        "baseline",
        "lift",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoSummary {
    pub repo: String,
    pub n_all_tx: u64,
    pub n_interface_tx: u64,
    pub n_unique_interface_files: u64,
    pub n_unique_cochange_files: u64,
    pub n_observed_pairs: u64,
    pub n_pairs: u64,
    pub skipped_commits: u64,
}

impl RepoSummary {
    pub const COLUMNS: [&'static str; 8] = [
        "repo",
        "n_all_tx",
        "n_interface_tx",
        "n_unique_interface_files",
        "n_unique_cochange_files",
        "n_observed_pairs",
        "n_pairs",
        "skipped_commits",
    ];

    pub fn empty(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }
}

pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_owned();
    }
    normalized
}
