//! File content hashing.
//!
//! Build freshness is decided by comparing SHA-1 digests of dependency and
//! output files against the ones recorded in `.shastore`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to read {path} for hashing: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// SHA-1 hex digest of a file's current contents.
pub fn get_sha(path: &Path) -> Result<String, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha1::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn known_digest() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("hello.txt");
    fs::write(&file_path, "hello world").unwrap();

    assert_eq!(get_sha(&file_path).unwrap(), "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
  }

  #[test]
  fn empty_file_digest() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("empty");
    fs::write(&file_path, "").unwrap();

    assert_eq!(get_sha(&file_path).unwrap(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
  }

  #[test]
  fn digest_changes_with_content() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("file.txt");

    fs::write(&file_path, "original").unwrap();
    let before = get_sha(&file_path).unwrap();
    fs::write(&file_path, "modified").unwrap();
    let after = get_sha(&file_path).unwrap();

    assert_ne!(before, after);
  }

  #[test]
  fn missing_file_is_an_error() {
    let temp = tempdir().unwrap();
    let err = get_sha(&temp.path().join("nope")).unwrap_err();
    assert!(err.to_string().contains("nope"));
  }
}
