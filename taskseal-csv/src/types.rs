//! Row types for the task and result CSV schemas.

use serde::{Deserialize, Serialize};

pub const COLUMN_NAME: &str = "name";
pub const COLUMN_TYPE: &str = "type";
pub const COLUMN_CONTENT: &str = "content";
pub const COLUMN_RESULT: &str = "result";
pub const COLUMN_CIPHERTEXT: &str = "ciphertext";
pub const COLUMN_SIGNATURE: &str = "signature";

/// Header of a narrow (post-merge) plaintext task CSV.
pub const TASK_HEADERS: [&str; 3] = [COLUMN_NAME, COLUMN_TYPE, COLUMN_CONTENT];

/// Header of a plaintext result CSV.
pub const RESULT_HEADERS: [&str; 2] = [COLUMN_NAME, COLUMN_RESULT];

/// Header of an encrypted task or result CSV.
pub const ENCRYPTED_HEADERS: [&str; 3] = [COLUMN_NAME, COLUMN_CIPHERTEXT, COLUMN_SIGNATURE];

/// A plaintext task definition in the narrow schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub content: String,
}

impl TaskRow {
    pub fn into_record(self) -> Vec<String> {
        vec![self.name, self.task_type, self.content]
    }

    /// Splits off the fields that travel inside the ciphertext.
    pub fn into_parts(self) -> (String, TaskPayload) {
        (
            self.name,
            TaskPayload {
                content: self.content,
                task_type: self.task_type,
            },
        )
    }
}

/// The encrypted part of a task row.
///
/// Field order is alphabetical so the serialized form is canonical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub content: String,
    #[serde(rename = "type")]
    pub task_type: String,
}

/// A plaintext task result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub name: String,
    pub result: serde_json::Value,
}

impl ResultRow {
    /// Renders the row with `result` as compact JSON with sorted keys.
    pub fn into_record(self) -> Vec<String> {
        vec![self.name, self.result.to_string()]
    }
}

/// A sealed task or result row as stored in an encrypted CSV.
///
/// `name` stays in the clear; `ciphertext` and `signature` are base64.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRow {
    pub name: String,
    pub ciphertext: String,
    pub signature: String,
}

impl EncryptedRow {
    pub fn into_record(self) -> Vec<String> {
        vec![self.name, self.ciphertext, self.signature]
    }
}
