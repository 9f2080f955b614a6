use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result, bail};
use coevo_analysis::{
    CorpusAggregator, RepoFailure, RepositoryMiner, TransactionSink, discover_repositories,
    merge_pair_tables, mine_corpus, read_transaction_log,
};
use coevo_config::{CoevoConfig, load_config, validate_config, write_default_config};

use crate::cli::{InitConfigArgs, MergePairsArgs, MineArgs, ReplayArgs};
use crate::report::{EventLogSink, ReportError, ReportWriter, write_pair_table};

#[derive(Debug)]
pub struct MineReport {
    pub mined: usize,
    pub failed: usize,
    pub write_errors: Vec<ReportError>,
}

impl MineReport {
    pub fn is_success(&self) -> bool {
        self.write_errors.is_empty()
    }
}

pub fn run_mine(args: &MineArgs) -> Result<MineReport> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if args.workers.is_some() {
        config.mining.workers = args.workers;
    }
    if args.max_commits.is_some() {
        config.mining.max_commits = args.max_commits;
    }
    validate_config(&config).context("invalid command-line overrides")?;

    let repos = discover_repositories(&args.repos_dir)
        .with_context(|| format!("failed to list repositories in {}", args.repos_dir.display()))?;

    let events = (!args.no_events).then(|| EventLogSink::new(&args.out_dir));
    let outcome = mine_corpus(
        &repos,
        &config,
        events.as_ref().map(|sink| sink as &dyn TransactionSink),
    )
    .context("failed to mine corpus")?;

    let mut writer = ReportWriter::new(&args.out_dir);
    if let Some(events) = events {
        writer.absorb(events.into_errors());
    }

    let mut aggregator = CorpusAggregator::new();
    for result in outcome.results {
        if let Err(err) = aggregator.check(&result) {
            tracing::error!(repo = %result.summary.repo, error = %err, "dropping inconsistent result");
            aggregator.push_failure(RepoFailure {
                path: args.repos_dir.join(&result.summary.repo),
                repo: result.summary.repo,
                error: err.to_string(),
            });
            continue;
        }
        writer.write_repository(&result);
        aggregator.push(result)?;
    }
    for failure in outcome.failures {
        aggregator.push_failure(failure);
    }

    let tables = aggregator.finish();
    let mined = tables.summaries.len();
    let failed = tables.failures.len();
    writer.write_corpus(&tables);
    if args.merge_all {
        writer.write_all_pairs(&tables);
    }

    tracing::info!(
        out = %writer.root().display(),
        mined,
        failed,
        pairs = tables.pairs.len(),
        "wrote corpus report"
    );
    Ok(MineReport {
        mined,
        failed,
        write_errors: writer.finish(),
    })
}

/// Re-mines rules from a transaction log and writes one pair table for
/// every repository found in it. Returns the number of rows written.
pub fn run_replay(args: &ReplayArgs) -> Result<usize> {
    let config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    let file = File::open(&args.events)
        .with_context(|| format!("failed to open transaction log {}", args.events.display()))?;
    let records = read_transaction_log(BufReader::new(file))
        .with_context(|| format!("failed to read transaction log {}", args.events.display()))?;

    let miner = RepositoryMiner::from_config(&config)?;
    let results = miner.replay(records);
    let mut aggregator = CorpusAggregator::new();
    for result in results {
        tracing::info!(
            repo = %result.summary.repo,
            n_interface_tx = result.summary.n_interface_tx,
            n_pairs = result.summary.n_pairs,
            "replayed repository"
        );
        aggregator.push(result)?;
    }

    let tables = aggregator.finish();
    write_pair_table(&args.out, &tables.pairs)?;
    Ok(tables.pairs.len())
}

pub fn run_init_config(args: &InitConfigArgs) -> Result<CoevoConfig> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.path.display()
        );
    }
    write_default_config(&args.path)
        .with_context(|| format!("failed to write config {}", args.path.display()))
}

/// Pools every `repo=*/pairs.csv` partition found under a pairs directory,
/// including ones left by earlier runs.
pub fn run_merge_pairs(args: &MergePairsArgs) -> Result<usize> {
    merge_pair_tables(&args.pairs_dir, &args.out).with_context(|| {
        format!(
            "failed to merge pair tables from {}",
            args.pairs_dir.display()
        )
    })
}
