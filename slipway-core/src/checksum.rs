//! Integrity proof generation
//!
//! Computes a SHA-256 digest over an artifact and persists the hex digest
//! in a sibling `<file>.sha256` file, which is uploaded next to the
//! artifact during publishing.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BuildError, Result};

/// Computes the SHA-256 digest of a file and writes it to `<file>.sha256`.
///
/// Returns the hex-encoded digest. Fails with a checksum I/O error when the
/// file does not exist, cannot be read, or the proof cannot be written.
pub fn generate(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| BuildError::ChecksumIo {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| BuildError::ChecksumIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    let digest = hex::encode(hasher.finalize());

    let proof = proof_path(path);
    std::fs::write(&proof, &digest).map_err(|e| BuildError::ChecksumIo {
        path: proof.clone(),
        source: e,
    })?;

    debug!("Generated checksum for {}: {}", path.display(), digest);
    Ok(digest)
}

/// Path of the integrity-proof file colocated with an artifact
pub fn proof_path(path: &Path) -> PathBuf {
    let mut proof = path.as_os_str().to_os_string();
    proof.push(".sha256");
    PathBuf::from(proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_generate_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "artifact.tar.gz", b"payload bytes");

        let first = generate(&path).unwrap();
        let second = generate(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_writes_colocated_proof() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "artifact.tar.gz", b"payload bytes");

        let digest = generate(&path).unwrap();
        let proof = dir.path().join("artifact.tar.gz.sha256");
        assert_eq!(std::fs::read_to_string(proof).unwrap(), digest);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_file(dir.path(), "a.bin", b"payload bytes");
        let b = write_file(dir.path(), "b.bin", b"payload byteZ");

        assert_ne!(generate(&a).unwrap(), generate(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate(&dir.path().join("absent.tar.gz"));
        assert!(matches!(result, Err(BuildError::ChecksumIo { .. })));
    }

    #[test]
    fn test_proof_path_appends_suffix() {
        let path = proof_path(Path::new("/tmp/app-1.0-linux-s390x.tar.gz"));
        assert_eq!(
            path,
            PathBuf::from("/tmp/app-1.0-linux-s390x.tar.gz.sha256")
        );
    }
}
