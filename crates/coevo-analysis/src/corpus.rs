use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use coevo_config::CoevoConfig;
use coevo_core::repository_name;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::miner::{RepoMiningResult, RepositoryMiner};
use crate::transactions::TransactionRecord;

/// A repository that could not be mined. Recorded instead of aborting the
/// corpus run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFailure {
    pub repo: String,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct CorpusOutcome {
    pub results: Vec<RepoMiningResult>,
    pub failures: Vec<RepoFailure>,
}

/// Lists the direct children of `dir` that contain a `.git` entry, sorted by
/// path.
pub fn discover_repositories(dir: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    if !dir.is_dir() {
        return Err(AnalysisError::Configuration(format!(
            "repository directory {} does not exist",
            dir.display()
        )));
    }

    let mut repos = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(".git").exists() {
            repos.push(path);
        }
    }
    repos.sort();

    if repos.is_empty() {
        return Err(AnalysisError::Configuration(format!(
            "no git repositories found under {}",
            dir.display()
        )));
    }
    Ok(repos)
}

/// Receives each repository's interface transactions on the worker that
/// mined them. Records are dropped from the result once persisted.
pub trait TransactionSink: Sync {
    fn persist(&self, repo: &str, records: &[TransactionRecord]);
}

/// Mines every repository on a bounded worker pool. Failures, panics
/// included, are collected per repository; only configuration problems
/// abort the run. Repositories sharing a name with an earlier path are
/// reported as failures instead of being mined.
pub fn mine_corpus(
    repos: &[PathBuf],
    config: &CoevoConfig,
    sink: Option<&dyn TransactionSink>,
) -> Result<CorpusOutcome, AnalysisError> {
    if repos.is_empty() {
        return Err(AnalysisError::Configuration(
            "no repositories to mine".to_owned(),
        ));
    }

    let miner = RepositoryMiner::from_config(config)?.with_transaction_log(sink.is_some());
    let workers = config.mining.effective_workers();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("coevo-miner-{index}"))
        .build()
        .map_err(|err| {
            AnalysisError::Configuration(format!("failed to start worker pool: {err}"))
        })?;

    let mut outcome = CorpusOutcome::default();
    let mut first_seen = HashMap::<String, &Path>::new();
    let mut scheduled = Vec::with_capacity(repos.len());
    for path in repos {
        let repo = repository_name(path);
        if let Some(first) = first_seen.get(repo.as_str()) {
            let error = AnalysisError::RepositoryProcessing {
                repo: repo.clone(),
                message: format!("name already used by {}", first.display()),
            };
            tracing::error!(repo = %repo, path = %path.display(), error = %error, "duplicate repository name");
            outcome.failures.push(RepoFailure {
                repo,
                path: path.clone(),
                error: error.to_string(),
            });
            continue;
        }
        first_seen.insert(repo.clone(), path.as_path());
        scheduled.push((repo, path.as_path()));
    }

    tracing::info!(repos = scheduled.len(), workers, "mining corpus");
    let mined = pool.install(|| {
        scheduled
            .par_iter()
            .map(|(repo, path)| mine_isolated(&miner, repo, path, sink))
            .collect::<Vec<_>>()
    });

    for result in mined {
        match result {
            Ok(result) => outcome.results.push(result),
            Err(failure) => outcome.failures.push(failure),
        }
    }
    outcome
        .results
        .sort_by(|left, right| left.summary.repo.cmp(&right.summary.repo));
    outcome
        .failures
        .sort_by(|left, right| left.repo.cmp(&right.repo).then_with(|| left.path.cmp(&right.path)));

    tracing::info!(
        mined = outcome.results.len(),
        failed = outcome.failures.len(),
        "corpus mining complete"
    );
    Ok(outcome)
}

fn mine_isolated(
    miner: &RepositoryMiner,
    repo: &str,
    path: &Path,
    sink: Option<&dyn TransactionSink>,
) -> Result<RepoMiningResult, RepoFailure> {
    let mined = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut result = miner.mine(path)?;
        if let Some(sink) = sink {
            sink.persist(repo, &result.transactions);
            result.transactions = Vec::new();
        }
        Ok::<_, AnalysisError>(result)
    }));

    let error = match mined {
        Ok(Ok(result)) => return Ok(result),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };

    tracing::error!(repo = %repo, error = %error, "repository failed");
    Err(RepoFailure {
        repo: repo.to_owned(),
        path: path.to_path_buf(),
        error,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use coevo_config::CoevoConfig;
    use tempfile::tempdir;

    use super::{discover_repositories, mine_corpus, panic_message};

    #[test]
    fn discovery_keeps_only_git_children_in_order() {
        let temp = tempdir().expect("tempdir");
        for name in ["zeta", "alpha", "plain"] {
            fs::create_dir_all(temp.path().join(name)).expect("mkdir");
        }
        fs::create_dir_all(temp.path().join("zeta/.git")).expect("mkdir");
        fs::create_dir_all(temp.path().join("alpha/.git")).expect("mkdir");
        fs::write(temp.path().join("loose.txt"), "x").expect("write");

        let repos = discover_repositories(temp.path()).expect("discover");
        let names = repos
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn discovery_without_repositories_is_a_configuration_error() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("plain")).expect("mkdir");

        assert!(discover_repositories(temp.path()).is_err());
        assert!(discover_repositories(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert!(mine_corpus(&[], &CoevoConfig::default(), None).is_err());
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
