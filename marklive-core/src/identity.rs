//! Resource identity: deterministic fingerprints of canonical resource keys.
//!
//! A file is identified by its canonical absolute path, a memory resource by
//! the caller-supplied key. The digest is SHA-256 over the canonical text and
//! the kind is part of the id, so a file path and a memory key spelled the
//! same never collide.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::{ResourceId, ResourceKind};

/// Fingerprint `canonical` as a resource of `kind`. Pure: same input, same id.
pub fn fingerprint(kind: ResourceKind, canonical: &str) -> ResourceId {
    let digest = Sha256::digest(canonical.as_bytes());
    ResourceId::from_digest(kind, &hex::encode(digest))
}

/// Resolve `path` to its canonical absolute form. Fails when the file does
/// not exist or cannot be resolved.
pub fn canonical_file(path: &Path) -> io::Result<PathBuf> {
    std::fs::canonicalize(path)
}

/// Id of an already canonical file path.
pub fn file_id(canonical: &Path) -> ResourceId {
    fingerprint(ResourceKind::File, &canonical.to_string_lossy())
}

/// Canonicalise `path` and return it together with its id.
pub fn resolve_file(path: &Path) -> io::Result<(PathBuf, ResourceId)> {
    let canonical = canonical_file(path)?;
    let id = file_id(&canonical);
    Ok((canonical, id))
}

/// Id of an in-memory resource.
pub fn memory_id(key: &str) -> ResourceId {
    fingerprint(ResourceKind::Memory, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case(ResourceKind::File, "/tmp/a.md")]
    #[case(ResourceKind::Memory, "x")]
    #[case(ResourceKind::Memory, "")]
    fn fingerprint_is_pure(#[case] kind: ResourceKind, #[case] canonical: &str) {
        assert_eq!(fingerprint(kind, canonical), fingerprint(kind, canonical));
    }

    #[test]
    fn same_text_different_kind_gives_different_ids() {
        let file = fingerprint(ResourceKind::File, "/tmp/a.md");
        let mem = fingerprint(ResourceKind::Memory, "/tmp/a.md");
        assert_ne!(file, mem);
        assert_eq!(file.kind(), ResourceKind::File);
        assert_eq!(mem.kind(), ResourceKind::Memory);
    }

    #[test]
    fn different_keys_give_different_ids() {
        assert_ne!(memory_id("a"), memory_id("b"));
    }

    #[test]
    fn known_sha256_digest() {
        // sha256("abc")
        let id = memory_id("abc");
        assert_eq!(
            id.as_str(),
            "m-ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn relative_and_absolute_spellings_resolve_to_one_id() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "# Hi").unwrap();

        let dotted = dir.path().join(".").join("a.md");
        let (_, direct) = resolve_file(&file).unwrap();
        let (_, via_dot) = resolve_file(&dotted).unwrap();
        assert_eq!(direct, via_dot);
    }

    #[test]
    fn resolving_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_file(&dir.path().join("missing.md")).is_err());
    }
}
