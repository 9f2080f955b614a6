use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use coevo_config::CoevoConfig;
use coevo_core::{
    GitHistory, PairStatistic, PathClassifier, RepoSummary, SkipRules, Transaction,
};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::baseline::BaselineProfile;
use crate::counter::{Counters, InterfaceCounter};
use crate::rules::RuleEvaluator;
use crate::transactions::{TransactionBuilder, TransactionRecord, Universe};

/// Everything one repository contributes to the corpus tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMiningResult {
    pub summary: RepoSummary,
    pub pairs: Vec<PairStatistic>,
    pub baseline: BaselineProfile,
    /// Interface-touching transactions, sorted by commit id.
    pub transactions: Vec<TransactionRecord>,
}

impl RepoMiningResult {
    pub fn empty(repo: &str) -> Self {
        Self {
            summary: RepoSummary::empty(repo),
            pairs: Vec::new(),
            baseline: BaselineProfile::new(repo),
            transactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepositoryMiner {
    builder: TransactionBuilder,
    classifier: PathClassifier,
    evaluator: RuleEvaluator,
    max_commits: Option<usize>,
    require_interface_file: bool,
    keep_transactions: bool,
}

impl RepositoryMiner {
    pub fn from_config(config: &CoevoConfig) -> Result<Self, AnalysisError> {
        coevo_config::validate_config(config)?;

        let suffix = config.mining.interface_suffix.as_str();
        let skip = SkipRules::new(
            &config.skip.prefixes,
            &config.skip.suffixes,
            &config.skip.patterns,
        )?;

        Ok(Self {
            builder: TransactionBuilder::new(skip, suffix),
            classifier: PathClassifier::new(suffix),
            evaluator: RuleEvaluator::new(config.rules.clone()),
            max_commits: config.mining.max_commits,
            require_interface_file: config.mining.require_interface_file,
            keep_transactions: true,
        })
    }

    /// Whether results carry the interface transactions as
    /// [`TransactionRecord`]s. Without a log they are dropped after counting.
    pub fn with_transaction_log(mut self, keep: bool) -> Self {
        self.keep_transactions = keep;
        self
    }

    /// Runs both counting phases over one repository. Commits whose history
    /// cannot be read are logged and left out of both universes.
    pub fn mine(&self, path: &Path) -> Result<RepoMiningResult, AnalysisError> {
        let history = GitHistory::open(path)?;
        let repo = history.name().to_owned();
        let suffix = self.builder.interface_suffix();

        if self.require_interface_file && !history.has_interface_file(suffix)? {
            tracing::info!(repo = %repo, suffix, "no interface files at HEAD, skipping history walk");
            return Ok(RepoMiningResult::empty(&repo));
        }

        let commits = history.list_all_commits(self.max_commits)?;
        tracing::info!(repo = %repo, commits = commits.len(), "mining repository");

        // Interface transactions resolved in phase 1 are reused by phase 2,
        // so both phases see exactly the same commits.
        let mut failed = HashSet::<&str>::new();
        let mut interface_transactions = HashMap::<&str, Transaction>::new();
        let mut phase1 = InterfaceCounter::new(suffix);
        for commit in &commits {
            match self
                .builder
                .build(&history, commit, Universe::InterfaceTouching)
            {
                Ok(Some(transaction)) => {
                    phase1.observe(&transaction);
                    interface_transactions.insert(commit.as_str(), transaction);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(repo = %repo, commit = %commit, error = %err, "skipping unreadable commit");
                    failed.insert(commit.as_str());
                }
            }
        }
        tracing::debug!(
            repo = %repo,
            interface_transactions = phase1.interface_transactions(),
            "interface pass complete"
        );

        let mut phase2 = phase1.into_baseline();
        let mut baseline = BaselineProfile::new(&repo);
        let mut records = Vec::new();
        for commit in &commits {
            if failed.contains(commit.as_str()) {
                continue;
            }
            let transaction = match interface_transactions.remove(commit.as_str()) {
                Some(transaction) => {
                    if self.keep_transactions {
                        records.push(TransactionRecord::from_transaction(
                            &transaction,
                            &self.classifier,
                        ));
                    }
                    transaction
                }
                None => match self.builder.build(&history, commit, Universe::All) {
                    Ok(Some(transaction)) => transaction,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(repo = %repo, commit = %commit, error = %err, "skipping unreadable commit");
                        failed.insert(commit.as_str());
                        continue;
                    }
                },
            };
            phase2.observe(&transaction);
            baseline.observe(&transaction, &self.classifier);
        }

        let counters = phase2.finish();
        records.sort_by(|left, right| left.commit.cmp(&right.commit));
        let result = self.finish(&repo, counters, baseline, records, failed.len() as u64);

        tracing::info!(
            repo = %repo,
            n_all_tx = result.summary.n_all_tx,
            n_interface_tx = result.summary.n_interface_tx,
            n_pairs = result.summary.n_pairs,
            skipped_commits = result.summary.skipped_commits,
            "repository mined"
        );
        Ok(result)
    }

    /// Re-mines association rules from a persisted transaction log without
    /// touching history. The logged transactions form the whole universe, so
    /// baselines are conditional on interface-touching commits.
    pub fn replay(&self, records: Vec<TransactionRecord>) -> Vec<RepoMiningResult> {
        let mut by_repo = BTreeMap::<String, Vec<Transaction>>::new();
        for record in records {
            by_repo
                .entry(record.repo.clone())
                .or_default()
                .push(record.into_transaction());
        }

        by_repo
            .into_iter()
            .map(|(repo, mut transactions)| {
                transactions.sort_by(|left, right| left.commit.cmp(&right.commit));
                transactions.dedup_by(|left, right| left.commit == right.commit);

                let counters = Counters::count(
                    self.builder.interface_suffix(),
                    &transactions,
                    &transactions,
                );
                let mut baseline = BaselineProfile::new(&repo);
                for transaction in &transactions {
                    baseline.observe(transaction, &self.classifier);
                }
                let records = transactions
                    .iter()
                    .filter(|transaction| {
                        self.keep_transactions && transaction.has_interface_change
                    })
                    .map(|transaction| {
                        TransactionRecord::from_transaction(transaction, &self.classifier)
                    })
                    .collect();
                self.finish(&repo, counters, baseline, records, 0)
            })
            .collect()
    }

    fn finish(
        &self,
        repo: &str,
        counters: Counters,
        baseline: BaselineProfile,
        transactions: Vec<TransactionRecord>,
        skipped_commits: u64,
    ) -> RepoMiningResult {
        let pairs = self.evaluator.evaluate(repo, &counters, &self.classifier);
        let summary = RepoSummary {
            repo: repo.to_owned(),
            n_all_tx: counters.total_transactions,
            n_interface_tx: counters.interface_transactions,
            n_unique_interface_files: counters.unique_interface_files() as u64,
            n_unique_cochange_files: counters.unique_cochange_files() as u64,
            n_observed_pairs: counters.pair_cooccurrence.len() as u64,
            n_pairs: pairs.len() as u64,
            skipped_commits,
        };

        RepoMiningResult {
            summary,
            pairs,
            baseline,
            transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use coevo_config::{CoevoConfig, RuleThresholds};
    use coevo_core::PathCategory;

    use super::RepositoryMiner;
    use crate::transactions::{CochangeEntry, TransactionRecord};

    fn record(repo: &str, commit: &str, interfaces: &[&str], cochanges: &[&str]) -> TransactionRecord {
        TransactionRecord {
            repo: repo.to_owned(),
            commit: commit.to_owned(),
            interface_files: interfaces.iter().map(|path| (*path).to_owned()).collect(),
            cochange_files: cochanges
                .iter()
                .map(|path| CochangeEntry {
                    path: (*path).to_owned(),
                    category: PathCategory::Impl,
                })
                .collect(),
        }
    }

    #[test]
    fn replay_groups_by_repository_and_uses_log_as_universe() {
        let config = CoevoConfig {
            rules: RuleThresholds::unfiltered(),
            ..CoevoConfig::default()
        };
        let miner = RepositoryMiner::from_config(&config).expect("miner");

        let results = miner.replay(vec![
            record("beta", "b1", &["api.proto"], &["main.go"]),
            record("alpha", "a2", &["api.proto"], &["main.go"]),
            record("alpha", "a1", &["api.proto"], &["main.go", "util.go"]),
            record("alpha", "a1", &["api.proto"], &["main.go", "util.go"]),
        ]);

        let repos = results
            .iter()
            .map(|result| result.summary.repo.as_str())
            .collect::<Vec<_>>();
        assert_eq!(repos, vec!["alpha", "beta"]);

        let alpha = &results[0];
        assert_eq!(alpha.summary.n_all_tx, 2);
        assert_eq!(alpha.summary.n_interface_tx, 2);
        assert_eq!(alpha.summary.n_observed_pairs, 2);
        let main = alpha
            .pairs
            .iter()
            .find(|row| row.cochange_file == "main.go")
            .expect("main.go pair");
        assert_eq!(main.n_both_tx, 2);
        assert_eq!(main.confidence, 1.0);
        assert_eq!(main.lift, 1.0);
        assert_eq!(alpha.transactions.len(), 2);
    }

    #[test]
    fn invalid_config_is_rejected_before_mining() {
        let mut config = CoevoConfig::default();
        config.rules.min_support = 2.0;
        assert!(RepositoryMiner::from_config(&config).is_err());

        let mut config = CoevoConfig::default();
        config.skip.patterns = vec!["[unclosed".to_owned()];
        assert!(RepositoryMiner::from_config(&config).is_err());
    }
}
