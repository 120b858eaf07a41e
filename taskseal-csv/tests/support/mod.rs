#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use taskseal_crypto::{generate_keys, save_keys, TaskKeys};

/// Key generation is slow; every test in a binary shares one key set.
pub fn keys() -> &'static TaskKeys {
    static KEYS: OnceLock<TaskKeys> = OnceLock::new();
    KEYS.get_or_init(|| generate_keys().unwrap())
}

/// A second, unrelated key set for wrong-key tests.
pub fn other_keys() -> &'static TaskKeys {
    static KEYS: OnceLock<TaskKeys> = OnceLock::new();
    KEYS.get_or_init(|| generate_keys().unwrap())
}

pub fn write_keys_file(dir: &Path) -> PathBuf {
    let path = dir.join("tasks_keys.json");
    save_keys(keys(), &path).unwrap();
    path
}

/// Writes `rows` under `headers` as a CSV file using the csv crate.
pub fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<String>]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(headers).unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.flush().unwrap();
}

pub fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

pub fn row(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

pub fn sample_tasks() -> Vec<Vec<String>> {
    vec![
        row(&["Task 1", "execute_actions", "ACTION=buy;SYMBOL=BTC/USDT;AMOUNT=0.01"]),
        row(&["Task 2", "monitor", "{\"interval\": 60, \"target\": \"ETH\"}"]),
        row(&["Task 3", "report", "multi-line\ncontent, with \"quotes\""]),
    ]
}
