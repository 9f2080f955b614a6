//! Transaction extraction and association-rule mining over git history.

pub mod aggregate;
pub mod baseline;
pub mod corpus;
pub mod counter;
pub mod error;
pub mod miner;
pub mod rules;
pub mod transactions;

pub use aggregate::{
    BaselineShare, CorpusAggregator, CorpusBaseline, CorpusTables, PAIRS_FILE_NAME,
    REPO_PARTITION_PREFIX, merge_pair_tables, pair_table_partitions,
};
pub use baseline::{BaselineProfile, NO_EXTENSION, extension_key};
pub use corpus::{CorpusOutcome, RepoFailure, TransactionSink, discover_repositories, mine_corpus};
pub use counter::{BaselineCounter, Counters, InterfaceCounter};
pub use error::AnalysisError;
pub use miner::{RepoMiningResult, RepositoryMiner};
pub use rules::{PairMetrics, RuleEvaluator, pair_metrics, rank_order};
pub use transactions::{
    CochangeEntry, TransactionBuilder, TransactionRecord, Universe, read_transaction_log,
    write_transaction_log,
};
