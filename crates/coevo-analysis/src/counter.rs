use std::collections::{HashMap, HashSet};

use coevo_core::Transaction;

/// Phase 1: interface-conditional counts over interface-touching
/// transactions.
#[derive(Debug, Clone)]
pub struct InterfaceCounter {
    interface_suffix: String,
    interface_transactions: u64,
    interface_occurrence: HashMap<String, u64>,
    cochange_files: HashSet<String>,
    pair_cooccurrence: HashMap<(String, String), u64>,
}

/// Phase 2: unconditional occurrence counts over the full transaction
/// universe, restricted to the paths seen in phase 1.
#[derive(Debug, Clone)]
pub struct BaselineCounter {
    phase1: InterfaceCounter,
    total_transactions: u64,
    file_occurrence: HashMap<String, u64>,
}

/// Finished, read-only counters for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub total_transactions: u64,
    pub interface_transactions: u64,
    pub interface_occurrence: HashMap<String, u64>,
    pub cochange_files: HashSet<String>,
    pub file_occurrence: HashMap<String, u64>,
    pub pair_cooccurrence: HashMap<(String, String), u64>,
}

impl InterfaceCounter {
    pub fn new(interface_suffix: impl Into<String>) -> Self {
        Self {
            interface_suffix: interface_suffix.into(),
            interface_transactions: 0,
            interface_occurrence: HashMap::new(),
            cochange_files: HashSet::new(),
            pair_cooccurrence: HashMap::new(),
        }
    }

    pub fn observe(&mut self, transaction: &Transaction) {
        let suffix = self.interface_suffix.as_str();
        let interfaces = transaction.interface_files(suffix).collect::<Vec<_>>();
        if interfaces.is_empty() {
            return;
        }
        let cochanges = transaction.cochange_files(suffix).collect::<Vec<_>>();

        self.interface_transactions += 1;
        for interface in &interfaces {
            *self
                .interface_occurrence
                .entry((*interface).to_owned())
                .or_insert(0) += 1;
        }
        for cochange in &cochanges {
            if !self.cochange_files.contains(*cochange) {
                self.cochange_files.insert((*cochange).to_owned());
            }
        }
        for interface in &interfaces {
            for cochange in &cochanges {
                *self
                    .pair_cooccurrence
                    .entry(((*interface).to_owned(), (*cochange).to_owned()))
                    .or_insert(0) += 1;
            }
        }
    }

    pub fn interface_transactions(&self) -> u64 {
        self.interface_transactions
    }

    /// Switches to phase 2. Every path seen so far becomes a candidate with
    /// an initial occurrence count of zero.
    pub fn into_baseline(self) -> BaselineCounter {
        let file_occurrence = self
            .interface_occurrence
            .keys()
            .chain(self.cochange_files.iter())
            .map(|path| (path.clone(), 0))
            .collect();
        BaselineCounter {
            phase1: self,
            total_transactions: 0,
            file_occurrence,
        }
    }
}

impl BaselineCounter {
    pub fn observe(&mut self, transaction: &Transaction) {
        self.total_transactions += 1;
        for path in &transaction.files {
            if let Some(count) = self.file_occurrence.get_mut(path) {
                *count += 1;
            }
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.file_occurrence.len()
    }

    pub fn finish(self) -> Counters {
        Counters {
            total_transactions: self.total_transactions,
            interface_transactions: self.phase1.interface_transactions,
            interface_occurrence: self.phase1.interface_occurrence,
            cochange_files: self.phase1.cochange_files,
            file_occurrence: self.file_occurrence,
            pair_cooccurrence: self.phase1.pair_cooccurrence,
        }
    }
}

impl Counters {
    /// Runs both phases over in-memory transaction sequences.
    pub fn count<'a, P, A>(interface_suffix: &str, interface_transactions: P, all: A) -> Self
    where
        P: IntoIterator<Item = &'a Transaction>,
        A: IntoIterator<Item = &'a Transaction>,
    {
        let mut phase1 = InterfaceCounter::new(interface_suffix);
        for transaction in interface_transactions {
            phase1.observe(transaction);
        }
        let mut phase2 = phase1.into_baseline();
        for transaction in all {
            phase2.observe(transaction);
        }
        phase2.finish()
    }

    pub fn n_interface_tx(&self, interface_file: &str) -> u64 {
        self.interface_occurrence
            .get(interface_file)
            .copied()
            .unwrap_or(0)
    }

    pub fn n_file_tx(&self, file: &str) -> u64 {
        self.file_occurrence.get(file).copied().unwrap_or(0)
    }

    pub fn unique_interface_files(&self) -> usize {
        self.interface_occurrence.len()
    }

    pub fn unique_cochange_files(&self) -> usize {
        self.cochange_files.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use coevo_core::Transaction;

    use super::{Counters, InterfaceCounter};

    fn tx(commit: &str, files: &[&str]) -> Transaction {
        let files = files
            .iter()
            .map(|file| (*file).to_owned())
            .collect::<BTreeSet<_>>();
        Transaction {
            repo: "demo".to_owned(),
            commit: commit.to_owned(),
            has_interface_change: files.iter().any(|file| file.ends_with(".proto")),
            files,
        }
    }

    #[test]
    fn phase_one_counts_pairs_once_per_transaction() {
        let interface_txs = vec![
            tx("c1", &["a.proto", "b.proto", "x.go"]),
            tx("c2", &["a.proto", "x.go", "y.yaml"]),
            tx("c3", &["a.proto"]),
        ];
        let counters = Counters::count(".proto", &interface_txs, &interface_txs);

        assert_eq!(counters.interface_transactions, 3);
        assert_eq!(counters.n_interface_tx("a.proto"), 3);
        assert_eq!(counters.n_interface_tx("b.proto"), 1);
        assert_eq!(
            counters
                .pair_cooccurrence
                .get(&("a.proto".to_owned(), "x.go".to_owned())),
            Some(&2)
        );
        assert_eq!(
            counters
                .pair_cooccurrence
                .get(&("b.proto".to_owned(), "x.go".to_owned())),
            Some(&1)
        );
        assert!(
            !counters
                .pair_cooccurrence
                .contains_key(&("a.proto".to_owned(), "b.proto".to_owned()))
        );
        assert_eq!(counters.unique_interface_files(), 2);
        assert_eq!(counters.unique_cochange_files(), 2);
    }

    #[test]
    fn phase_two_counts_only_candidates_across_full_history() {
        let interface_txs = vec![tx("c1", &["a.proto", "x.go"])];
        let all = vec![
            tx("c1", &["a.proto", "x.go"]),
            tx("c2", &["x.go", "unrelated.go"]),
            tx("c3", &["unrelated.go"]),
            tx("c4", &[]),
        ];
        let counters = Counters::count(".proto", &interface_txs, &all);

        assert_eq!(counters.total_transactions, 4);
        assert_eq!(counters.n_file_tx("x.go"), 2);
        assert_eq!(counters.n_file_tx("a.proto"), 1);
        assert!(!counters.file_occurrence.contains_key("unrelated.go"));
    }

    #[test]
    fn every_paired_path_has_an_occurrence_entry() {
        let interface_txs = vec![tx("c1", &["a.proto", "x.go"])];
        let counters = Counters::count(".proto", &interface_txs, &Vec::new());

        for (interface, cochange) in counters.pair_cooccurrence.keys() {
            assert!(counters.file_occurrence.contains_key(interface));
            assert!(counters.file_occurrence.contains_key(cochange));
        }
        assert_eq!(counters.n_file_tx("x.go"), 0);
    }

    #[test]
    fn transactions_without_interface_files_are_ignored_in_phase_one() {
        let mut phase1 = InterfaceCounter::new(".proto");
        phase1.observe(&tx("c1", &["x.go", "y.go"]));
        assert_eq!(phase1.interface_transactions(), 0);

        let phase2 = phase1.into_baseline();
        assert_eq!(phase2.candidate_count(), 0);
    }
}
