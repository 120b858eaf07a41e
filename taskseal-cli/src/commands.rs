use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use taskseal_crypto::{generate_and_save_keys, load_keys};
use taskseal_csv::{
    flatten_result_columns, merge_csv_columns, parse_csv, CodecConfig, CodecReport, CsvCodec,
    KeyStore, RowPolicy,
};
use tracing::debug;

/// Builds the effective config: file, then environment, then flags.
pub fn load_config(
    path: Option<&Path>,
    workers: Option<usize>,
    skip_failed: bool,
) -> Result<CodecConfig> {
    let config = match path {
        Some(path) => CodecConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CodecConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if skip_failed {
        config.row_policy = RowPolicy::SkipAndReport;
    }
    debug!(?config, "effective configuration");
    Ok(config)
}

fn keys_path(config: &CodecConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| config.keys_file.clone())
}

pub fn generate_keys(config: &CodecConfig, keys_file: Option<PathBuf>) -> Result<()> {
    let path = keys_path(config, keys_file);
    if path.exists() {
        bail!(
            "{} already exists; remove it first to rotate keys",
            path.display()
        );
    }
    generate_and_save_keys(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}

pub fn merge(input: &Path, output: &Path) -> Result<()> {
    let rows = merge_csv_columns(input, output)?;
    println!("merged {rows} rows into {}", output.display());
    Ok(())
}

pub fn encrypt_tasks(
    config: &CodecConfig,
    keys_file: Option<PathBuf>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let keys = load_keys(keys_path(config, keys_file))?;
    let report = CsvCodec::from_config(config).encrypt_tasks(input, output, &keys)?;
    finish("encrypted", output, &report)
}

pub fn decrypt_tasks(
    config: &CodecConfig,
    keys_file: Option<PathBuf>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let keys = load_keys(keys_path(config, keys_file))?;
    let report = CsvCodec::from_config(config).decrypt_tasks(input, output, &keys)?;
    finish("decrypted", output, &report)
}

pub fn encrypt_results(
    config: &CodecConfig,
    keys_file: Option<PathBuf>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let store = KeyStore::from_keys_file(keys_path(config, keys_file))?;
    let keys = store.current()?;
    let report = CsvCodec::from_config(config).encrypt_results(input, output, &keys)?;
    finish("encrypted", output, &report)
}

pub fn decrypt_results(
    config: &CodecConfig,
    keys_file: Option<PathBuf>,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let store = KeyStore::from_keys_file(keys_path(config, keys_file))?;
    let keys = store.current()?;
    let report = CsvCodec::from_config(config).decrypt_results(input, output, &keys)?;
    finish("decrypted", output, &report)
}

pub fn flatten_results(input: &Path, output: &Path) -> Result<()> {
    let rows = flatten_result_columns(input, output)?;
    println!("flattened {rows} rows into {}", output.display());
    Ok(())
}

pub fn show(input: &Path) -> Result<()> {
    let table = parse_csv(input)?;
    println!("{}", table.headers().join(" | "));
    for row in table.rows() {
        println!("{}", row.join(" | "));
    }
    Ok(())
}

fn finish(verb: &str, output: &Path, report: &CodecReport) -> Result<()> {
    println!("{verb} {} rows into {}", report.rows_written, output.display());
    for failure in &report.skipped {
        eprintln!(
            "skipped row {} ({}): {}",
            failure.row,
            failure.name.as_deref().unwrap_or("<unnamed>"),
            failure.message
        );
    }
    if !report.skipped.is_empty() {
        bail!("{} rows could not be processed", report.skipped.len());
    }
    Ok(())
}
