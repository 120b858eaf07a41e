//! Secure CSV exchange of task definitions and task results.
//!
//! An operator writes tasks as CSV rows, seals each row for the node and
//! later receives sealed result rows back:
//!
//! ```text
//! tasks.csv --merge--> name,type,content --encrypt_tasks--> name,ciphertext,signature
//! results  <--decrypt_results-- name,ciphertext,signature <--encrypt_results-- name,result
//! ```
//!
//! Task rows travel under the Input keys and result rows under the Output
//! keys (see [`taskseal_crypto`]). Only `name` is ever written in the
//! clear. Every file operation either writes a complete output file or
//! leaves the destination untouched.

mod codec;
mod columns;
mod config;
mod error;
mod settings;
mod table;
mod types;

pub use codec::{
    decrypt_csv_file_from_keys_file, decrypt_result_csv_file, encrypt_csv_file_from_keys_file,
    encrypt_result_csv_file, CodecReport, CsvCodec, RowFailure, RowPolicy,
};
pub use columns::{flatten_result_columns, merge_csv_columns};
pub use config::{CodecConfig, ENV_KEYS_FILE, ENV_ROW_POLICY, ENV_WORKERS};
pub use error::{CodecError, CodecResult, ErrorKind};
pub use settings::{decrypt_task_content, set_keys_in_settings, KeyStore};
pub use table::{parse_csv, CsvTable};
pub use types::{
    EncryptedRow, ResultRow, TaskPayload, TaskRow, COLUMN_CIPHERTEXT, COLUMN_CONTENT, COLUMN_NAME,
    COLUMN_RESULT, COLUMN_SIGNATURE, COLUMN_TYPE, ENCRYPTED_HEADERS, RESULT_HEADERS, TASK_HEADERS,
};
