use std::collections::BTreeSet;
use std::io::{BufRead, Write};

use coevo_core::{
    GitHistory, HistoryAccessError, PathCategory, PathClassifier, SkipRules, Transaction,
    is_interface_path, normalize_path,
};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Which commit population a transaction is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Universe {
    /// Every non-merge commit; used for baseline probabilities.
    All,
    /// Commits where at least one interface file survives exclusion.
    InterfaceTouching,
}

#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    skip: SkipRules,
    interface_suffix: String,
}

impl TransactionBuilder {
    pub fn new(skip: SkipRules, interface_suffix: impl Into<String>) -> Self {
        Self {
            skip,
            interface_suffix: interface_suffix.into(),
        }
    }

    pub fn interface_suffix(&self) -> &str {
        &self.interface_suffix
    }

    pub fn build(
        &self,
        history: &GitHistory,
        commit: &str,
        universe: Universe,
    ) -> Result<Option<Transaction>, HistoryAccessError> {
        let paths = history.change_set(commit)?;
        Ok(self.from_change_set(history.name(), commit, paths, universe))
    }

    /// Applies skip rules to a resolved change set. Returns `None` when the
    /// interface-touching universe is requested and no interface path
    /// survives.
    pub fn from_change_set<I>(
        &self,
        repo: &str,
        commit: &str,
        paths: I,
        universe: Universe,
    ) -> Option<Transaction>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let files = paths
            .into_iter()
            .map(|path| normalize_path(path.as_ref()))
            .filter(|path| !path.is_empty() && !self.skip.should_skip(path))
            .collect::<BTreeSet<_>>();
        let has_interface_change = files
            .iter()
            .any(|path| is_interface_path(path, &self.interface_suffix));

        if universe == Universe::InterfaceTouching && !has_interface_change {
            return None;
        }

        Some(Transaction {
            repo: repo.to_owned(),
            commit: commit.to_owned(),
            files,
            has_interface_change,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CochangeEntry {
    pub path: String,
    pub category: PathCategory,
}

/// One line of the persisted transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub repo: String,
    pub commit: String,
    pub interface_files: Vec<String>,
    pub cochange_files: Vec<CochangeEntry>,
}

impl TransactionRecord {
    pub fn from_transaction(transaction: &Transaction, classifier: &PathClassifier) -> Self {
        let suffix = classifier.interface_suffix();
        Self {
            repo: transaction.repo.clone(),
            commit: transaction.commit.clone(),
            interface_files: transaction
                .interface_files(suffix)
                .map(str::to_owned)
                .collect(),
            cochange_files: transaction
                .cochange_files(suffix)
                .map(|path| CochangeEntry {
                    path: path.to_owned(),
                    category: classifier.classify(path),
                })
                .collect(),
        }
    }

    pub fn into_transaction(self) -> Transaction {
        let has_interface_change = !self.interface_files.is_empty();
        let files = self
            .interface_files
            .into_iter()
            .chain(self.cochange_files.into_iter().map(|entry| entry.path))
            .collect();
        Transaction {
            repo: self.repo,
            commit: self.commit,
            files,
            has_interface_change,
        }
    }
}

pub fn write_transaction_log<W: Write>(
    mut writer: W,
    records: &[TransactionRecord],
) -> Result<(), AnalysisError> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_transaction_log<R: BufRead>(reader: R) -> Result<Vec<TransactionRecord>, AnalysisError> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use coevo_core::{PathCategory, PathClassifier, SkipRules};

    use super::{
        TransactionBuilder, TransactionRecord, Universe, read_transaction_log,
        write_transaction_log,
    };

    fn builder() -> TransactionBuilder {
        let skip = SkipRules::new(["gen/", "docs/"], [".md"], ["*_pb2.py"]).expect("skip rules");
        TransactionBuilder::new(skip, ".proto")
    }

    #[test]
    fn skipped_and_duplicate_paths_never_enter_a_transaction() {
        let tx = builder()
            .from_change_set(
                "demo",
                "c1",
                [
                    "api/user.proto",
                    "./api/user.proto",
                    "python/user_pb2.py",
                    "README.md",
                    "src/server.go",
                ],
                Universe::All,
            )
            .expect("all universe always yields a transaction");

        assert_eq!(
            tx.files,
            BTreeSet::from(["api/user.proto".to_owned(), "src/server.go".to_owned()])
        );
        assert!(tx.has_interface_change);
    }

    #[test]
    fn generated_interface_artifact_alone_does_not_qualify() {
        let builder = builder();
        let paths = ["gen/api/user.proto", "src/server.go"];

        assert!(
            builder
                .from_change_set("demo", "c1", paths, Universe::InterfaceTouching)
                .is_none()
        );

        let tx = builder
            .from_change_set("demo", "c1", paths, Universe::All)
            .expect("transaction");
        assert!(!tx.has_interface_change);
        assert_eq!(tx.files, BTreeSet::from(["src/server.go".to_owned()]));
    }

    #[test]
    fn fully_excluded_commit_still_counts_in_all_universe() {
        let tx = builder()
            .from_change_set("demo", "c1", ["docs/a.txt", "CHANGELOG.md"], Universe::All)
            .expect("transaction");
        assert!(tx.files.is_empty());
    }

    #[test]
    fn record_splits_interface_and_classified_cochanges() {
        let classifier = PathClassifier::new(".proto");
        let tx = builder()
            .from_change_set(
                "demo",
                "c1",
                ["api/user.proto", "src/server.go", "tests/server_test.go"],
                Universe::InterfaceTouching,
            )
            .expect("transaction");

        let record = TransactionRecord::from_transaction(&tx, &classifier);
        assert_eq!(record.interface_files, vec!["api/user.proto".to_owned()]);
        let categories = record
            .cochange_files
            .iter()
            .map(|entry| (entry.path.as_str(), entry.category))
            .collect::<Vec<_>>();
        assert_eq!(
            categories,
            vec![
                ("src/server.go", PathCategory::Impl),
                ("tests/server_test.go", PathCategory::Test),
            ]
        );

        assert_eq!(record.into_transaction(), tx);
    }

    #[test]
    fn log_lines_are_one_json_record_each() {
        let classifier = PathClassifier::new(".proto");
        let tx = builder()
            .from_change_set(
                "demo",
                "c1",
                ["api/user.proto", "src/server.go"],
                Universe::InterfaceTouching,
            )
            .expect("transaction");
        let records = vec![TransactionRecord::from_transaction(&tx, &classifier)];

        let mut buffer = Vec::new();
        write_transaction_log(&mut buffer, &records).expect("write log");
        let text = String::from_utf8(buffer.clone()).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"category\":\"impl\""));

        let read = read_transaction_log(buffer.as_slice()).expect("read log");
        assert_eq!(read, records);
    }
}
