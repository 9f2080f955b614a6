use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use coevo_core::{PairStatistic, PathCategory, RepoSummary};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::baseline::BaselineProfile;
use crate::corpus::RepoFailure;
use crate::miner::RepoMiningResult;
use crate::rules::rank_order;

pub const PAIRS_FILE_NAME: &str = "pairs.csv";
pub const REPO_PARTITION_PREFIX: &str = "repo=";

/// Corpus-wide share of transactions touching one category or extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineShare {
    pub key: String,
    pub tx_count: u64,
    pub tx_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusBaseline {
    /// Per-repository profiles, sorted by repository.
    pub repos: Vec<BaselineProfile>,
    pub total_n_tx: u64,
    /// Sorted by transaction count, most common first.
    pub categories: Vec<BaselineShare>,
    pub extensions: Vec<BaselineShare>,
}

impl CorpusBaseline {
    pub fn category_keys(&self) -> Vec<PathCategory> {
        let mut keys = self
            .repos
            .iter()
            .flat_map(|profile| profile.category_tx.keys().copied())
            .collect::<Vec<_>>();
        keys.sort_by_key(|category| category.as_str());
        keys.dedup();
        keys
    }

    pub fn extension_keys(&self) -> Vec<String> {
        let mut keys = self
            .repos
            .iter()
            .flat_map(|profile| profile.extension_tx.keys().cloned())
            .collect::<Vec<_>>();
        keys.sort();
        keys.dedup();
        keys
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusTables {
    pub summaries: Vec<RepoSummary>,
    pub pairs: Vec<PairStatistic>,
    pub baseline: CorpusBaseline,
    pub failures: Vec<RepoFailure>,
}

/// Single-threaded merge of per-repository results. Metrics are never
/// recomputed; each row keeps the repository it came from.
#[derive(Debug, Default)]
pub struct CorpusAggregator {
    summaries: Vec<RepoSummary>,
    pairs: Vec<PairStatistic>,
    baselines: Vec<BaselineProfile>,
    failures: Vec<RepoFailure>,
}

impl CorpusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a result whose rows disagree on their repository or whose
    /// repository has already been aggregated.
    pub fn check(&self, result: &RepoMiningResult) -> Result<(), AnalysisError> {
        let repo = result.summary.repo.as_str();
        if self.summaries.iter().any(|summary| summary.repo == repo) {
            return Err(AnalysisError::InconsistentTable {
                repo: repo.to_owned(),
                message: "repository was aggregated twice".to_owned(),
            });
        }
        if let Some(row) = result.pairs.iter().find(|row| row.repo != repo) {
            return Err(AnalysisError::InconsistentTable {
                repo: repo.to_owned(),
                message: format!("pair row carries repository {}", row.repo),
            });
        }
        if result.baseline.repo != repo {
            return Err(AnalysisError::InconsistentTable {
                repo: repo.to_owned(),
                message: format!("baseline profile carries repository {}", result.baseline.repo),
            });
        }
        Ok(())
    }

    pub fn push(&mut self, result: RepoMiningResult) -> Result<(), AnalysisError> {
        self.check(&result)?;
        self.summaries.push(result.summary);
        self.pairs.extend(result.pairs);
        self.baselines.push(result.baseline);
        Ok(())
    }

    pub fn push_failure(&mut self, failure: RepoFailure) {
        self.failures.push(failure);
    }

    pub fn finish(self) -> CorpusTables {
        let Self {
            mut summaries,
            mut pairs,
            mut baselines,
            mut failures,
        } = self;

        summaries.sort_by(|left, right| left.repo.cmp(&right.repo));
        pairs.sort_by(|left, right| left.repo.cmp(&right.repo).then_with(|| rank_order(left, right)));
        baselines.sort_by(|left, right| left.repo.cmp(&right.repo));
        failures.sort_by(|left, right| left.repo.cmp(&right.repo));

        let total_n_tx = baselines.iter().map(|profile| profile.n_all_tx).sum();
        let mut category_counts = BTreeMap::<String, u64>::new();
        let mut extension_counts = BTreeMap::<String, u64>::new();
        for profile in &baselines {
            for (category, count) in &profile.category_tx {
                *category_counts.entry(category.as_str().to_owned()).or_default() += count;
            }
            for (extension, count) in &profile.extension_tx {
                *extension_counts.entry(extension.clone()).or_default() += count;
            }
        }

        CorpusTables {
            summaries,
            pairs,
            baseline: CorpusBaseline {
                repos: baselines,
                total_n_tx,
                categories: shares(category_counts, total_n_tx),
                extensions: shares(extension_counts, total_n_tx),
            },
            failures,
        }
    }
}

fn shares(counts: BTreeMap<String, u64>, total_n_tx: u64) -> Vec<BaselineShare> {
    let mut shares = counts
        .into_iter()
        .map(|(key, tx_count)| BaselineShare {
            key,
            tx_count,
            tx_ratio: if total_n_tx == 0 {
                0.0
            } else {
                tx_count as f64 / total_n_tx as f64
            },
        })
        .collect::<Vec<_>>();
    shares.sort_by(|left, right| {
        right
            .tx_count
            .cmp(&left.tx_count)
            .then_with(|| left.key.cmp(&right.key))
    });
    shares
}

/// Lists `repo=*/pairs.csv` partitions under `pairs_dir`, sorted by path.
pub fn pair_table_partitions(pairs_dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let mut tables = Vec::new();
    for entry in fs::read_dir(pairs_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(REPO_PARTITION_PREFIX) {
            continue;
        }
        let table = entry.path().join(PAIRS_FILE_NAME);
        if table.is_file() {
            tables.push(table);
        }
    }
    tables.sort();
    Ok(tables)
}

/// Concatenates every per-repository pair table under `pairs_dir` into
/// `out_path`, keeping one header. Returns the number of merged tables.
/// Tables whose header differs from the first one abort the merge.
pub fn merge_pair_tables(pairs_dir: &Path, out_path: &Path) -> Result<usize, AnalysisError> {
    let tables = pair_table_partitions(pairs_dir)?;
    let mut expected: Option<String> = None;
    let mut bodies = Vec::with_capacity(tables.len());

    for table in &tables {
        let content = fs::read_to_string(table)?;
        let (header, body) = match content.split_once('\n') {
            Some((header, body)) => (header.trim_end_matches('\r'), body),
            None => (content.trim_end_matches('\r'), ""),
        };

        match &expected {
            None => expected = Some(header.to_owned()),
            Some(expected) if expected != header => {
                return Err(AnalysisError::ColumnMismatch {
                    path: table.clone(),
                    expected: expected.clone(),
                    found: header.to_owned(),
                });
            }
            Some(_) => {}
        }
        bodies.push(body.to_owned());
    }

    let Some(header) = expected else {
        tracing::warn!(dir = %pairs_dir.display(), "no pair tables to merge");
        return Ok(0);
    };

    if let Some(parent) = out_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(out_path)?;
    writeln!(out, "{header}")?;
    for body in &bodies {
        out.write_all(body.as_bytes())?;
        if !body.is_empty() && !body.ends_with('\n') {
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    tracing::info!(tables = tables.len(), out = %out_path.display(), "merged pair tables");
    Ok(tables.len())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use coevo_core::{PairStatistic, PathCategory, RepoSummary};
    use tempfile::tempdir;

    use super::{CorpusAggregator, merge_pair_tables};
    use crate::AnalysisError;
    use crate::baseline::BaselineProfile;
    use crate::miner::RepoMiningResult;

    fn pair(repo: &str, cochange: &str, lift: f64) -> PairStatistic {
        PairStatistic {
            repo: repo.to_owned(),
            interface_file: "api.proto".to_owned(),
            cochange_file: cochange.to_owned(),
            category: PathCategory::Impl,
            n_all_tx: 10,
            n_interface_tx: 5,
            n_file_tx: 4,
            n_both_tx: 2,
            support: 0.2,
            confidence: 0.4,
            baseline: 0.4,
            lift,
        }
    }

    fn result(repo: &str, pairs: Vec<PairStatistic>, n_all_tx: u64) -> RepoMiningResult {
        let mut baseline = BaselineProfile::new(repo);
        baseline.n_all_tx = n_all_tx;
        baseline.category_tx.insert(PathCategory::Impl, n_all_tx);
        baseline.extension_tx.insert(".go".to_owned(), n_all_tx / 2);
        RepoMiningResult {
            summary: RepoSummary {
                n_all_tx,
                n_pairs: pairs.len() as u64,
                ..RepoSummary::empty(repo)
            },
            pairs,
            baseline,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn aggregation_orders_by_repository_then_rank_without_recomputing() {
        let mut aggregator = CorpusAggregator::new();
        aggregator
            .push(result("zeta", vec![pair("zeta", "a.go", 1.5)], 10))
            .expect("push zeta");
        aggregator
            .push(result(
                "alpha",
                vec![pair("alpha", "low.go", 1.1), pair("alpha", "high.go", 3.0)],
                30,
            ))
            .expect("push alpha");

        let tables = aggregator.finish();
        let order = tables
            .pairs
            .iter()
            .map(|row| (row.repo.as_str(), row.cochange_file.as_str(), row.lift))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![("alpha", "high.go", 3.0), ("alpha", "low.go", 1.1), ("zeta", "a.go", 1.5)]
        );
        assert_eq!(tables.summaries[0].repo, "alpha");

        assert_eq!(tables.baseline.total_n_tx, 40);
        assert_eq!(tables.baseline.categories.len(), 1);
        assert_eq!(tables.baseline.categories[0].key, "impl");
        assert_eq!(tables.baseline.categories[0].tx_ratio, 1.0);
        assert_eq!(tables.baseline.extensions[0].tx_count, 20);
        assert_eq!(tables.baseline.extensions[0].tx_ratio, 0.5);
    }

    #[test]
    fn rows_from_another_repository_are_rejected() {
        let mut aggregator = CorpusAggregator::new();
        let err = aggregator
            .push(result("alpha", vec![pair("beta", "a.go", 1.0)], 3))
            .expect_err("mismatched repo column");
        assert!(matches!(err, AnalysisError::InconsistentTable { .. }));

        aggregator.push(result("alpha", Vec::new(), 3)).expect("push");
        assert!(aggregator.push(result("alpha", Vec::new(), 3)).is_err());
    }

    #[test]
    fn empty_corpus_has_zero_ratios() {
        let mut aggregator = CorpusAggregator::new();
        aggregator.push(result("empty", Vec::new(), 0)).expect("push");
        let tables = aggregator.finish();
        assert_eq!(tables.baseline.total_n_tx, 0);
        assert!(
            tables
                .baseline
                .categories
                .iter()
                .all(|share| share.tx_ratio == 0.0)
        );
    }

    #[test]
    fn merge_keeps_one_header_and_every_row() {
        let temp = tempdir().expect("tempdir");
        let pairs = temp.path().join("pairs");
        for (repo, rows) in [("b", "b,x\n"), ("a", "a,x\na,y\n")] {
            let dir = pairs.join(format!("repo={repo}"));
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(dir.join("pairs.csv"), format!("repo,cochange_file\n{rows}"))
                .expect("write");
        }
        fs::create_dir_all(pairs.join("stray")).expect("mkdir");

        let out = temp.path().join("all_pairs.csv");
        let merged = merge_pair_tables(&pairs, &out).expect("merge");

        assert_eq!(merged, 2);
        assert_eq!(
            fs::read_to_string(&out).expect("read"),
            "repo,cochange_file\na,x\na,y\nb,x\n"
        );
    }

    #[test]
    fn merge_fails_loudly_on_column_mismatch() {
        let temp = tempdir().expect("tempdir");
        let pairs = temp.path().join("pairs");
        for (repo, header) in [("a", "repo,cochange_file"), ("b", "repo,lift")] {
            let dir = pairs.join(format!("repo={repo}"));
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(dir.join("pairs.csv"), format!("{header}\n{repo},1\n")).expect("write");
        }

        let err = merge_pair_tables(&pairs, &temp.path().join("all_pairs.csv"))
            .expect_err("mismatched header");
        match err {
            AnalysisError::ColumnMismatch { expected, found, .. } => {
                assert_eq!(expected, "repo,cochange_file");
                assert_eq!(found, "repo,lift");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!temp.path().join("all_pairs.csv").exists());
    }
}
