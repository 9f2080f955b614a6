use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use coevo_core::{PathCategory, PathClassifier, Transaction};
use serde::{Deserialize, Serialize};

pub const NO_EXTENSION: &str = "no_ext";

/// Per-repository transaction-occurrence counts by category and by file
/// extension over the full commit universe. A category or extension counts
/// at most once per transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub repo: String,
    pub n_all_tx: u64,
    pub category_tx: BTreeMap<PathCategory, u64>,
    pub extension_tx: BTreeMap<String, u64>,
}

impl BaselineProfile {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }

    pub fn observe(&mut self, transaction: &Transaction, classifier: &PathClassifier) {
        self.n_all_tx += 1;

        let categories = transaction
            .files
            .iter()
            .map(|path| classifier.classify(path))
            .collect::<BTreeSet<_>>();
        for category in categories {
            *self.category_tx.entry(category).or_insert(0) += 1;
        }

        let extensions = transaction
            .files
            .iter()
            .map(|path| extension_key(path))
            .collect::<BTreeSet<_>>();
        for extension in extensions {
            *self.extension_tx.entry(extension).or_insert(0) += 1;
        }
    }
}

/// Lowercased `.ext` of the file name, or [`NO_EXTENSION`].
pub fn extension_key(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .filter(|extension| !extension.is_empty())
        .map(|extension| format!(".{extension}"))
        .unwrap_or_else(|| NO_EXTENSION.to_owned())
}
