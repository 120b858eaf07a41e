//! CSV codec error types.

use std::path::PathBuf;
use taskseal_crypto::CryptoError;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while transforming, encrypting or decrypting CSV files.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("no keys loaded in settings")]
    KeysNotLoaded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{}: row {row}: {source}", path.display())]
    Row {
        path: PathBuf,
        /// 1-based data row index (the header is not counted).
        row: usize,
        source: Box<CodecError>,
    },
}

/// Flat classification of every failure the codec can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeyGeneration,
    KeyFileWrite,
    KeyFileNotFound,
    KeyFileCorrupt,
    SignatureVerification,
    Decryption,
    Encryption,
    Schema,
    KeysNotLoaded,
    Io,
    Config,
}

impl CodecError {
    /// Wraps a per-row failure with its location.
    pub fn at_row(self, path: impl Into<PathBuf>, row: usize) -> Self {
        CodecError::Row {
            path: path.into(),
            row,
            source: Box::new(self),
        }
    }

    /// Classifies the error, looking through row wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::Crypto(e) => match e {
                CryptoError::KeyGeneration(_) => ErrorKind::KeyGeneration,
                CryptoError::KeyFileWrite { .. } => ErrorKind::KeyFileWrite,
                CryptoError::KeyFileNotFound(_) => ErrorKind::KeyFileNotFound,
                CryptoError::KeyFileCorrupt(_) => ErrorKind::KeyFileCorrupt,
                CryptoError::SignatureVerification => ErrorKind::SignatureVerification,
                CryptoError::Decryption(_) => ErrorKind::Decryption,
                CryptoError::Encryption(_) => ErrorKind::Encryption,
            },
            CodecError::Schema(_) | CodecError::Serialization(_) => ErrorKind::Schema,
            CodecError::KeysNotLoaded => ErrorKind::KeysNotLoaded,
            CodecError::Io(_) => ErrorKind::Io,
            CodecError::Csv(e) => match e.kind() {
                csv::ErrorKind::Utf8 { .. }
                | csv::ErrorKind::UnequalLengths { .. }
                | csv::ErrorKind::Deserialize { .. } => ErrorKind::Schema,
                _ => ErrorKind::Io,
            },
            CodecError::Config(_) => ErrorKind::Config,
            CodecError::Row { source, .. } => source.kind(),
        }
    }

    /// Returns the failing row index, if the error is tied to a row.
    pub fn row(&self) -> Option<usize> {
        match self {
            CodecError::Row { row, .. } => Some(*row),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_wrapper_keeps_kind_and_location() {
        let err = CodecError::from(CryptoError::SignatureVerification).at_row("tasks.csv", 3);
        assert_eq!(err.kind(), ErrorKind::SignatureVerification);
        assert_eq!(err.row(), Some(3));
        assert_eq!(err.to_string(), "tasks.csv: row 3: signature verification failed");
    }

    #[test]
    fn malformed_csv_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.csv");
        std::fs::write(&path, b"name,type,content\nTask 1,t,caf\xe9\n").unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let err = reader
            .records()
            .find_map(Result::err)
            .map(CodecError::from)
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let io = CodecError::from(std::io::Error::other("disk gone"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn crypto_errors_display_transparently() {
        let err = CodecError::from(CryptoError::KeyFileCorrupt("missing X".into()));
        assert_eq!(err.to_string(), "keys file is corrupt: missing X");
        assert_eq!(err.kind(), ErrorKind::KeyFileCorrupt);
        assert_eq!(err.row(), None);
    }
}
