//! File-level encrypt/decrypt of task and result CSVs.
//!
//! Each operation reads the whole input, resolves its columns, runs the
//! per-row transform on scoped worker threads and gathers the results
//! back in input order. The output file is written only once every row
//! has been accounted for.

use crate::columns::{check_unique_names, EncryptedColumns, ResultColumns, TaskColumns};
use crate::config::CodecConfig;
use crate::error::{CodecError, CodecResult, ErrorKind};
use crate::settings::KeyStore;
use crate::table::{parse_csv, write_csv, CsvTable};
use crate::types::{EncryptedRow, TaskPayload, ENCRYPTED_HEADERS, RESULT_HEADERS, TASK_HEADERS};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use taskseal_crypto::{load_keys, open_row, seal_row, RoleKeys, SealedRow, TaskKeys};
use tracing::{debug, info, warn};

/// What to do when a single row fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowPolicy {
    /// Abort the whole file on the first failing row.
    #[default]
    FailFast,
    /// Leave failing rows out of the output and list them in the report.
    SkipAndReport,
}

impl FromStr for RowPolicy {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" => Ok(RowPolicy::FailFast),
            "skip-and-report" => Ok(RowPolicy::SkipAndReport),
            other => Err(CodecError::Config(format!("unknown row policy '{other}'"))),
        }
    }
}

/// A row left out under [`RowPolicy::SkipAndReport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based data row index in the input file.
    pub row: usize,
    pub name: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a file operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodecReport {
    pub rows_written: usize,
    pub skipped: Vec<RowFailure>,
}

type RowOutcome = CodecResult<Vec<String>>;

/// Encrypts and decrypts whole CSV files.
#[derive(Clone, Debug, Default)]
pub struct CsvCodec {
    /// Worker threads; 0 means one per available core.
    workers: usize,
    policy: RowPolicy,
}

impl CsvCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            workers: config.workers,
            policy: config.row_policy,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_policy(mut self, policy: RowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RowPolicy {
        self.policy
    }

    /// Merges, encrypts and signs a task CSV with the Input keys.
    pub fn encrypt_tasks(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        keys: &TaskKeys,
    ) -> CodecResult<CodecReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let table = parse_csv(input)?;
        let columns = TaskColumns::resolve(&table)?;
        check_unique_names(&table, columns.name_index())?;

        let role = keys.inputs();
        self.transform(
            Job {
                input,
                output,
                table: &table,
                name_index: columns.name_index(),
                headers: &ENCRYPTED_HEADERS,
                label: "encrypt tasks",
            },
            |record| {
                let (name, payload) = columns.merge_row(record)?.into_parts();
                let plaintext = serde_json::to_vec(&payload)?;
                Ok(seal(name, &plaintext, role)?.into_record())
            },
        )
    }

    /// Verifies and decrypts an encrypted task CSV with the Input keys.
    pub fn decrypt_tasks(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        keys: &TaskKeys,
    ) -> CodecResult<CodecReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let table = parse_csv(input)?;
        let columns = EncryptedColumns::resolve(&table)?;
        check_unique_names(&table, columns.name_index())?;

        let role = keys.inputs();
        self.transform(
            Job {
                input,
                output,
                table: &table,
                name_index: columns.name_index(),
                headers: &TASK_HEADERS,
                label: "decrypt tasks",
            },
            |record| {
                let row = columns.parse_row(record)?;
                let plaintext = open(&row, role)?;
                let payload: TaskPayload = serde_json::from_slice(&plaintext).map_err(|e| {
                    CodecError::Schema(format!("decrypted task payload is malformed: {e}"))
                })?;
                Ok(vec![row.name, payload.task_type, payload.content])
            },
        )
    }

    /// Encrypts and signs a `name,result` CSV with the Output keys.
    pub fn encrypt_results(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        keys: &TaskKeys,
    ) -> CodecResult<CodecReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let table = parse_csv(input)?;
        let columns = ResultColumns::resolve(&table)?;
        check_unique_names(&table, columns.name_index())?;

        let role = keys.outputs();
        self.transform(
            Job {
                input,
                output,
                table: &table,
                name_index: columns.name_index(),
                headers: &ENCRYPTED_HEADERS,
                label: "encrypt results",
            },
            |record| {
                let row = columns.parse_row(record)?;
                let plaintext = serde_json::to_vec(&row.result)?;
                Ok(seal(row.name, &plaintext, role)?.into_record())
            },
        )
    }

    /// Verifies and decrypts an encrypted result CSV with the Output keys.
    ///
    /// The output keeps `result` as a single JSON column.
    pub fn decrypt_results(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        keys: &TaskKeys,
    ) -> CodecResult<CodecReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let table = parse_csv(input)?;
        let columns = EncryptedColumns::resolve(&table)?;
        check_unique_names(&table, columns.name_index())?;

        let role = keys.outputs();
        self.transform(
            Job {
                input,
                output,
                table: &table,
                name_index: columns.name_index(),
                headers: &RESULT_HEADERS,
                label: "decrypt results",
            },
            |record| {
                let row = columns.parse_row(record)?;
                let plaintext = open(&row, role)?;
                let result: serde_json::Value =
                    serde_json::from_slice(&plaintext).map_err(|e| {
                        CodecError::Schema(format!("decrypted result is malformed: {e}"))
                    })?;
                Ok(vec![row.name, result.to_string()])
            },
        )
    }

    fn transform<F>(&self, job: Job<'_>, row_fn: F) -> CodecResult<CodecReport>
    where
        F: Fn(&[String]) -> RowOutcome + Sync,
    {
        let outcomes = self.map_rows(job.table.rows(), &row_fn);

        let mut out = CsvTable::new(job.headers.iter().copied());
        let mut report = CodecReport::default();
        for (i, (record, outcome)) in job.table.rows().iter().zip(outcomes).enumerate() {
            let row = i + 1;
            match outcome {
                Ok(fields) => out.push_row(fields),
                Err(e) => match self.policy {
                    RowPolicy::FailFast => return Err(e.at_row(job.input, row)),
                    RowPolicy::SkipAndReport => {
                        let name = record.get(job.name_index).cloned();
                        warn!(
                            input = %job.input.display(),
                            row,
                            name = name.as_deref().unwrap_or_default(),
                            error = %e,
                            "skipping row"
                        );
                        report.skipped.push(RowFailure {
                            row,
                            name,
                            kind: e.kind(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        write_csv(job.output, &out)?;
        report.rows_written = out.len();

        info!(
            input = %job.input.display(),
            output = %job.output.display(),
            rows_written = report.rows_written,
            skipped = report.skipped.len(),
            "{} complete",
            job.label
        );
        Ok(report)
    }

    /// Applies `row_fn` to every row, returning outcomes in row order.
    fn map_rows<F>(&self, rows: &[Vec<String>], row_fn: &F) -> Vec<RowOutcome>
    where
        F: Fn(&[String]) -> RowOutcome + Sync,
    {
        let workers = self.worker_count().min(rows.len());
        if workers <= 1 {
            return rows.iter().map(|r| row_fn(r)).collect();
        }

        let chunk_size = rows.len().div_ceil(workers);
        debug!(rows = rows.len(), workers, chunk_size, "processing rows in parallel");

        std::thread::scope(|scope| {
            let handles: Vec<_> = rows
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || chunk.iter().map(|r| row_fn(r)).collect::<Vec<_>>()))
                .collect();

            // Chunks are contiguous, so joining in spawn order restores row order.
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        }
    }
}

struct Job<'a> {
    input: &'a Path,
    output: &'a Path,
    table: &'a CsvTable,
    name_index: usize,
    headers: &'a [&'a str],
    label: &'static str,
}

fn seal(name: String, plaintext: &[u8], keys: &RoleKeys) -> CodecResult<EncryptedRow> {
    let sealed = seal_row(plaintext, keys)?;
    Ok(EncryptedRow {
        name,
        ciphertext: sealed.ciphertext_base64(),
        signature: sealed.signature_base64(),
    })
}

fn open(row: &EncryptedRow, keys: &RoleKeys) -> CodecResult<Vec<u8>> {
    let sealed = SealedRow::from_base64(&row.ciphertext, &row.signature)?;
    Ok(open_row(&sealed, keys)?)
}

/// Encrypts a task CSV with the Input keys from `keys_file`.
///
/// The keys file is loaded and validated before any row is read.
pub fn encrypt_csv_file_from_keys_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    keys_file: impl AsRef<Path>,
) -> CodecResult<CodecReport> {
    let keys = load_keys(keys_file)?;
    CsvCodec::new().encrypt_tasks(input, output, &keys)
}

/// Decrypts an encrypted task CSV with the Input keys from `keys_file`.
pub fn decrypt_csv_file_from_keys_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    keys_file: impl AsRef<Path>,
) -> CodecResult<CodecReport> {
    let keys = load_keys(keys_file)?;
    CsvCodec::new().decrypt_tasks(input, output, &keys)
}

/// Encrypts a result CSV with the Output keys currently held by `store`.
pub fn encrypt_result_csv_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    store: &KeyStore,
) -> CodecResult<CodecReport> {
    let keys = store.current()?;
    CsvCodec::new().encrypt_results(input, output, &keys)
}

/// Decrypts an encrypted result CSV with the Output keys held by `store`.
pub fn decrypt_result_csv_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    store: &KeyStore,
) -> CodecResult<CodecReport> {
    let keys = store.current()?;
    CsvCodec::new().decrypt_results(input, output, &keys)
}
