//! CSV and JSON-lines artifacts written under `<out>/rq0/`.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use coevo_analysis::{
    AnalysisError, CorpusTables, PAIRS_FILE_NAME, REPO_PARTITION_PREFIX, RepoFailure,
    RepoMiningResult, TransactionRecord, TransactionSink, write_transaction_log,
};
use coevo_core::{PairStatistic, RepoSummary};
use thiserror::Error;

pub const REPORT_DIR_NAME: &str = "rq0";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write transaction log {path}: {source}")]
    EventLog {
        path: PathBuf,
        #[source]
        source: AnalysisError,
    },
}

/// Writes `events/<repo>.jsonl` from the mining workers, so transaction
/// records never outlive their repository.
#[derive(Debug)]
pub struct EventLogSink {
    dir: PathBuf,
    errors: Mutex<Vec<ReportError>>,
}

impl EventLogSink {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            dir: out_dir.join(REPORT_DIR_NAME).join("events"),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{repo}.jsonl"))
    }

    pub fn into_errors(self) -> Vec<ReportError> {
        self.errors
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransactionSink for EventLogSink {
    fn persist(&self, repo: &str, records: &[TransactionRecord]) {
        let path = self.path(repo);
        if let Err(err) = write_events(&path, records) {
            tracing::error!(repo, error = %err, "failed to write transaction log");
            self.errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(err);
        }
    }
}

/// Writes every artifact it is asked for and keeps going after a failed
/// write. Failures are logged as they happen and returned by [`finish`].
///
/// [`finish`]: ReportWriter::finish
#[derive(Debug)]
pub struct ReportWriter {
    root: PathBuf,
    errors: Vec<ReportError>,
}

impl ReportWriter {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            root: out_dir.join(REPORT_DIR_NAME),
            errors: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pairs_dir(&self) -> PathBuf {
        self.root.join("pairs")
    }

    pub fn pairs_path(&self, repo: &str) -> PathBuf {
        self.pairs_dir()
            .join(format!("{REPO_PARTITION_PREFIX}{repo}"))
            .join(PAIRS_FILE_NAME)
    }

    pub fn write_repository(&mut self, result: &RepoMiningResult) {
        let path = self.pairs_path(&result.summary.repo);
        let written = write_csv(&path, &PairStatistic::COLUMNS, result.pairs.iter().map(pair_row));
        self.record(written);
    }

    pub fn write_corpus(&mut self, tables: &CorpusTables) {
        let written = write_csv(
            &self.root.join("repo_summary.csv"),
            &RepoSummary::COLUMNS,
            tables.summaries.iter().map(summary_row),
        );
        self.record(written);

        let written = write_csv(
            &self.root.join("failures.csv"),
            &["repo", "path", "error"],
            tables.failures.iter().map(failure_row),
        );
        self.record(written);

        self.write_baseline(tables);
    }

    /// Pools the pair rows of this run only, in aggregate order.
    pub fn write_all_pairs(&mut self, tables: &CorpusTables) {
        let written = write_pair_table(&self.root.join("all_pairs.csv"), &tables.pairs);
        self.record(written);
    }

    /// Takes over failures reported elsewhere, such as by an [`EventLogSink`].
    pub fn absorb(&mut self, errors: Vec<ReportError>) {
        self.errors.extend(errors);
    }

    pub fn finish(self) -> Vec<ReportError> {
        self.errors
    }

    fn write_baseline(&mut self, tables: &CorpusTables) {
        let dir = self.root.join("baseline");
        let baseline = &tables.baseline;

        let written = write_csv(
            &dir.join("repo_baseline.csv"),
            &["repo", "n_all_tx"],
            baseline
                .repos
                .iter()
                .map(|profile| vec![profile.repo.clone(), profile.n_all_tx.to_string()]),
        );
        self.record(written);

        for (file, key_column, shares) in [
            ("category_baseline.csv", "category", &baseline.categories),
            ("ext_baseline.csv", "ext", &baseline.extensions),
        ] {
            let written = write_csv(
                &dir.join(file),
                &[key_column, "tx_count", "tx_ratio"],
                shares.iter().map(|share| {
                    vec![
                        share.key.clone(),
                        share.tx_count.to_string(),
                        float_field(share.tx_ratio),
                    ]
                }),
            );
            self.record(written);
        }

        let categories = baseline.category_keys();
        let mut header = vec!["repo".to_owned(), "n_all_tx".to_owned()];
        header.extend(categories.iter().map(|category| format!("cat_{category}")));
        let written = write_csv(
            &dir.join("category_by_repo.csv"),
            &header,
            baseline.repos.iter().map(|profile| {
                let mut row = vec![profile.repo.clone(), profile.n_all_tx.to_string()];
                row.extend(categories.iter().map(|category| {
                    profile
                        .category_tx
                        .get(category)
                        .copied()
                        .unwrap_or(0)
                        .to_string()
                }));
                row
            }),
        );
        self.record(written);

        let extensions = baseline.extension_keys();
        let mut header = vec!["repo".to_owned(), "n_all_tx".to_owned()];
        header.extend(extensions.iter().map(|extension| format!("ext_{extension}")));
        let written = write_csv(
            &dir.join("ext_by_repo.csv"),
            &header,
            baseline.repos.iter().map(|profile| {
                let mut row = vec![profile.repo.clone(), profile.n_all_tx.to_string()];
                row.extend(extensions.iter().map(|extension| {
                    profile
                        .extension_tx
                        .get(extension)
                        .copied()
                        .unwrap_or(0)
                        .to_string()
                }));
                row
            }),
        );
        self.record(written);
    }

    fn record(&mut self, result: Result<(), ReportError>) {
        if let Err(err) = result {
            tracing::error!(error = %err, "failed to write output");
            self.errors.push(err);
        }
    }
}

pub fn write_pair_table(path: &Path, pairs: &[PairStatistic]) -> Result<(), ReportError> {
    write_csv(path, &PairStatistic::COLUMNS, pairs.iter().map(pair_row))
}

pub fn write_csv<H, R>(path: &Path, header: &[H], rows: R) -> Result<(), ReportError>
where
    H: AsRef<str>,
    R: IntoIterator<Item = Vec<String>>,
{
    write_csv_inner(path, header, rows).map_err(|source| ReportError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })
}

fn write_csv_inner<H, R>(path: &Path, header: &[H], rows: R) -> io::Result<()>
where
    H: AsRef<str>,
    R: IntoIterator<Item = Vec<String>>,
{
    let mut writer = BufWriter::new(create_file(path)?);
    write_record(&mut writer, header.iter().map(|field| field.as_ref()))?;
    for row in rows {
        write_record(&mut writer, row.iter().map(String::as_str))?;
    }
    writer.flush()
}

fn write_record<'a, W, I>(writer: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a str>,
{
    for (index, field) in fields.into_iter().enumerate() {
        if index > 0 {
            writer.write_all(b",")?;
        }
        writer.write_all(escape_field(field).as_bytes())?;
    }
    writer.write_all(b"\n")
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn write_events(path: &Path, records: &[TransactionRecord]) -> Result<(), ReportError> {
    let file = create_file(path).map_err(|source| ReportError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })?;
    write_transaction_log(BufWriter::new(file), records).map_err(|source| {
        ReportError::EventLog {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn create_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

fn float_field(value: f64) -> String {
    format!("{value:?}")
}

fn pair_row(row: &PairStatistic) -> Vec<String> {
    vec![
        row.repo.clone(),
        row.interface_file.clone(),
        row.cochange_file.clone(),
        row.category.to_string(),
        row.n_all_tx.to_string(),
        row.n_interface_tx.to_string(),
        row.n_file_tx.to_string(),
        row.n_both_tx.to_string(),
        float_field(row.support),
        float_field(row.confidence),
        float_field(row.baseline),
        float_field(row.lift),
    ]
}

fn summary_row(summary: &RepoSummary) -> Vec<String> {
    vec![
        summary.repo.clone(),
        summary.n_all_tx.to_string(),
        summary.n_interface_tx.to_string(),
        summary.n_unique_interface_files.to_string(),
        summary.n_unique_cochange_files.to_string(),
        summary.n_observed_pairs.to_string(),
        summary.n_pairs.to_string(),
        summary.skipped_commits.to_string(),
    ]
}

fn failure_row(failure: &RepoFailure) -> Vec<String> {
    vec![
        failure.repo.clone(),
        failure.path.display().to_string(),
        failure.error.clone(),
    ]
}
