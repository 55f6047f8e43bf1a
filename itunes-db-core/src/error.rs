//! Error types for itunes-db-core

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML at byte {position}: {message}")]
    MalformedXml { position: usize, message: String },

    #[error("Missing field \"{field}\" in {context}")]
    MissingField { field: String, context: String },

    #[error("Type mismatch for \"{field}\" in {context}: expected {expected}, found {actual}")]
    TypeMismatch {
        field: String,
        context: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Playlist \"{playlist}\" references unknown track {track_id}")]
    DanglingReference { playlist: String, track_id: i64 },

    #[error("Duplicate {field} {value}")]
    DuplicateId { field: &'static str, value: String },

    #[error("Load worker failed: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Discriminator for [`Error`], stable across message wording changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    MalformedXml,
    MissingField,
    TypeMismatch,
    DanglingReference,
    DuplicateId,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::Io,
            Error::MalformedXml { .. } => ErrorKind::MalformedXml,
            Error::MissingField { .. } => ErrorKind::MissingField,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::DanglingReference { .. } => ErrorKind::DanglingReference,
            Error::DuplicateId { .. } => ErrorKind::DuplicateId,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn malformed(position: usize, message: impl Into<String>) -> Self {
        Error::MalformedXml {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "IOError",
            ErrorKind::MalformedXml => "MalformedXML",
            ErrorKind::MissingField => "MissingField",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::DanglingReference => "DanglingReference",
            ErrorKind::DuplicateId => "DuplicateId",
            ErrorKind::Internal => "Internal",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = Error::missing("Track ID", "track 12");
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(err.to_string(), "Missing field \"Track ID\" in track 12");

        let err = Error::malformed(42, "unclosed <dict>");
        assert_eq!(err.kind(), ErrorKind::MalformedXml);
        assert!(err.to_string().contains("byte 42"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = Error::Io {
            path: PathBuf::from("/nope.xml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::MalformedXml.to_string(), "MalformedXML");
        assert_eq!(ErrorKind::DanglingReference.to_string(), "DanglingReference");
    }
}
