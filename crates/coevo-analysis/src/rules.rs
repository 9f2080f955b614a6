use std::cmp::Ordering;
use std::collections::HashMap;

use coevo_config::RuleThresholds;
use coevo_core::{PairStatistic, PathClassifier};

use crate::counter::Counters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMetrics {
    pub support: f64,
    pub confidence: f64,
    pub baseline: f64,
    pub lift: f64,
}

/// Support, confidence, baseline, and lift for one pair. A zero denominator
/// yields 0.0 for that ratio.
pub fn pair_metrics(n_all_tx: u64, n_interface_tx: u64, n_file_tx: u64, n_both_tx: u64) -> PairMetrics {
    let support = ratio(n_both_tx, n_all_tx);
    let confidence = ratio(n_both_tx, n_interface_tx);
    let baseline = ratio(n_file_tx, n_all_tx);
    let lift = if baseline > 0.0 {
        confidence / baseline
    } else {
        0.0
    };

    PairMetrics {
        support,
        confidence,
        baseline,
        lift,
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Ranking order: lift, confidence, support (all descending), then the file
/// pair so the order is total.
pub fn rank_order(left: &PairStatistic, right: &PairStatistic) -> Ordering {
    right
        .lift
        .total_cmp(&left.lift)
        .then_with(|| right.confidence.total_cmp(&left.confidence))
        .then_with(|| right.support.total_cmp(&left.support))
        .then_with(|| left.interface_file.cmp(&right.interface_file))
        .then_with(|| left.cochange_file.cmp(&right.cochange_file))
}

#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    thresholds: RuleThresholds,
}

impl RuleEvaluator {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    /// One ranked row per observed pair, before any threshold is applied.
    pub fn statistics(
        &self,
        repo: &str,
        counters: &Counters,
        classifier: &PathClassifier,
    ) -> Vec<PairStatistic> {
        let mut rows = counters
            .pair_cooccurrence
            .iter()
            .filter(|(_, n_both_tx)| **n_both_tx > 0)
            .map(|((interface_file, cochange_file), n_both_tx)| {
                let n_interface_tx = counters.n_interface_tx(interface_file);
                let n_file_tx = counters.n_file_tx(cochange_file);
                let metrics = pair_metrics(
                    counters.total_transactions,
                    n_interface_tx,
                    n_file_tx,
                    *n_both_tx,
                );

                PairStatistic {
                    repo: repo.to_owned(),
                    interface_file: interface_file.clone(),
                    cochange_file: cochange_file.clone(),
                    category: classifier.classify(cochange_file),
                    n_all_tx: counters.total_transactions,
                    n_interface_tx,
                    n_file_tx,
                    n_both_tx: *n_both_tx,
                    support: metrics.support,
                    confidence: metrics.confidence,
                    baseline: metrics.baseline,
                    lift: metrics.lift,
                }
            })
            .collect::<Vec<_>>();
        rows.sort_by(rank_order);
        rows
    }

    /// Ranked rows that pass every threshold, truncated to the top K per
    /// interface file when configured.
    pub fn evaluate(
        &self,
        repo: &str,
        counters: &Counters,
        classifier: &PathClassifier,
    ) -> Vec<PairStatistic> {
        let rows = self
            .statistics(repo, counters, classifier)
            .into_iter()
            .filter(|row| self.passes(row))
            .collect::<Vec<_>>();
        self.limit_per_interface(rows)
    }

    pub fn passes(&self, row: &PairStatistic) -> bool {
        let thresholds = &self.thresholds;
        row.n_both_tx >= thresholds.min_n_both
            && row.support >= thresholds.min_support
            && row.confidence >= thresholds.min_confidence
            && row.lift >= thresholds.min_lift
    }

    fn limit_per_interface(&self, rows: Vec<PairStatistic>) -> Vec<PairStatistic> {
        let Some(top_k) = self.thresholds.top_k_per_interface else {
            return rows;
        };

        let mut kept_per_interface = HashMap::<String, usize>::new();
        rows.into_iter()
            .filter(|row| {
                let kept = kept_per_interface
                    .entry(row.interface_file.clone())
                    .or_insert(0);
                if *kept >= top_k {
                    return false;
                }
                *kept += 1;
                true
            })
            .collect()
    }
}
