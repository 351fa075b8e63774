//! Error-kind taxonomy.
//!
//! Each component has its own error type; [`ErrorKind`] is the coarse,
//! user-facing classification every one of them maps to. It is what the CLI
//! prints next to a failing module and what `check-updates` records for an
//! `unknown` outcome.

use std::fmt;

use serde::Serialize;

use crate::build::{BuildError, CmdError};
use crate::checker::{CheckError, QueryError};
use crate::cleanup::CleanupError;
use crate::manifest::SchemaError;
use crate::sequence::DuplicateModuleError;
use crate::source::{SourceError, SourceFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
  /// Malformed manifest; reported before any fetch.
  SchemaError,
  DuplicateModuleError,
  SourceFetchError,
  /// Checksum mismatch. Always fatal.
  IntegrityError,
  PatchError,
  BuildCommandError,
  /// Checker-only; retried with backoff before being surfaced.
  TransientFetchError,
  VersionQueryError,
  IoError,
  Cancelled,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::SchemaError => "SchemaError",
      Self::DuplicateModuleError => "DuplicateModuleError",
      Self::SourceFetchError => "SourceFetchError",
      Self::IntegrityError => "IntegrityError",
      Self::PatchError => "PatchError",
      Self::BuildCommandError => "BuildCommandError",
      Self::TransientFetchError => "TransientFetchError",
      Self::VersionQueryError => "VersionQueryError",
      Self::IoError => "IoError",
      Self::Cancelled => "Cancelled",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl SchemaError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Read { .. } => ErrorKind::IoError,
      Self::Syntax { .. } | Self::Field { .. } => ErrorKind::SchemaError,
    }
  }
}

impl DuplicateModuleError {
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::DuplicateModuleError
  }
}

impl CmdError {
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::BuildCommandError
  }
}

impl SourceError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Fetch { .. } | Self::Git(_) | Self::Extract(_) => ErrorKind::SourceFetchError,
      Self::Integrity { .. } => ErrorKind::IntegrityError,
      Self::Patch { .. } => ErrorKind::PatchError,
      Self::Command(_) => ErrorKind::BuildCommandError,
      Self::Io(_) => ErrorKind::IoError,
    }
  }
}

impl SourceFailure {
  pub fn kind(&self) -> ErrorKind {
    self.error.kind()
  }
}

impl BuildError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Command(_) => ErrorKind::BuildCommandError,
      Self::Io(_) => ErrorKind::IoError,
    }
  }
}

impl CleanupError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Pattern { .. } => ErrorKind::SchemaError,
      Self::Io { .. } => ErrorKind::IoError,
    }
  }
}

impl QueryError {
  pub fn kind(&self) -> ErrorKind {
    ErrorKind::VersionQueryError
  }
}

impl CheckError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Transient { .. } => ErrorKind::TransientFetchError,
      Self::Fetch { .. } | Self::InvalidResponse { .. } => ErrorKind::SourceFetchError,
      Self::InvalidPattern { .. } | Self::NoMatch { .. } | Self::NoCurrentVersion { .. } | Self::Query(_) => {
        ErrorKind::VersionQueryError
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;
  use crate::util::hash::{Checksum, ContentHash, DigestAlgorithm};

  #[test]
  fn source_errors_map_to_documented_kinds() {
    let integrity = SourceError::Integrity {
      url: "https://example.com/a.tar.gz".to_string(),
      expected: Checksum::parse(DigestAlgorithm::Sha256, &"a".repeat(64)).unwrap(),
      actual: ContentHash("b".repeat(64)),
    };
    assert_eq!(integrity.kind(), ErrorKind::IntegrityError);

    let patch = SourceError::Patch {
      path: PathBuf::from("fix.patch"),
      details: "hunk failed".to_string(),
    };
    assert_eq!(patch.kind(), ErrorKind::PatchError);

    let failure = SourceFailure {
      index: 2,
      kind: "archive",
      error: SourceError::Fetch {
        url: "u".to_string(),
        message: "HTTP 404".to_string(),
      },
    };
    assert_eq!(failure.kind(), ErrorKind::SourceFetchError);
  }

  #[test]
  fn checker_errors() {
    let transient = CheckError::Transient {
      url: "u".to_string(),
      message: "timed out".to_string(),
    };
    assert_eq!(transient.kind(), ErrorKind::TransientFetchError);
    assert_eq!(CheckError::from(QueryError::eval("x")).kind(), ErrorKind::VersionQueryError);
  }

  #[test]
  fn kinds_serialize_as_their_names() {
    assert_eq!(serde_json::to_value(ErrorKind::IntegrityError).unwrap(), "IntegrityError");
    assert_eq!(ErrorKind::Cancelled.to_string(), "Cancelled");
  }
}
