//! Local integrity checks against a [`Listing`].
//!
//! Object ids are git blob ids: the hash of `"blob <size>\0"` followed by the
//! raw content, SHA-1 for 40-hex ids and SHA-256 for 64-hex ids.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use updraft_core::{HashAlgorithm, Listing, ObjectId};

const BUF_SIZE: usize = 64 * 1024;

/// Blob id of an in-memory buffer.
pub fn blob_id_of_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha1 => hash_bytes::<Sha1>(bytes),
        HashAlgorithm::Sha256 => hash_bytes::<Sha256>(bytes),
    }
}

/// Blob id of a file, streamed through a fixed 64 KiB buffer.
pub fn compute_blob_id(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    match algorithm {
        HashAlgorithm::Sha1 => hash_stream::<Sha1>(&mut file, size),
        HashAlgorithm::Sha256 => hash_stream::<Sha256>(&mut file, size),
    }
}

fn hash_bytes<D: Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn hash_stream<D: Digest>(reader: &mut impl Read, size: u64) -> io::Result<String> {
    let mut hasher = D::new();
    hasher.update(format!("blob {size}\0").as_bytes());
    let mut buf = vec![0u8; BUF_SIZE];
    let mut read_total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        read_total += n as u64;
    }
    // The header already committed to `size`; a file that changed length
    // underneath us cannot produce a trustworthy id.
    if read_total != size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {size} bytes, read {read_total}"),
        ));
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the file at `path` hashes to `expected`.
///
/// Unknown id lengths and I/O errors count as a mismatch.
pub fn file_matches(path: &Path, expected: &ObjectId) -> bool {
    let Some(algorithm) = expected.algorithm() else {
        tracing::debug!("unrecognised object id '{}' for {}", expected, path.display());
        return false;
    };
    match compute_blob_id(path, algorithm) {
        Ok(actual) => expected.matches(&actual),
        Err(e) => {
            tracing::debug!("cannot hash {}: {e}", path.display());
            false
        }
    }
}

/// Whether every blob in `listing` exists under `local_root` with a matching
/// object id. Extra local files are ignored.
pub fn verify(listing: &Listing, local_root: &Path) -> bool {
    for item in listing.blobs() {
        let path = local_root.join(&item.native_path);
        if !path.is_file() {
            tracing::debug!("verify: missing {}", path.display());
            return false;
        }
        if !file_matches(&path, &item.object_id) {
            tracing::debug!("verify: content mismatch at {}", path.display());
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use updraft_core::{ObjectKind, RemoteItem};

    fn item(path: &str, id: &str) -> RemoteItem {
        RemoteItem {
            relative_path: path.to_string(),
            native_path: updraft_core::layout::native_relative_path(path).unwrap(),
            kind: ObjectKind::Blob,
            object_id: ObjectId::from(id),
            size: 0,
            mode: "100644".into(),
            mutable_url: format!("https://raw.test/{path}"),
            pinned_url: None,
        }
    }

    fn listing(items: Vec<RemoteItem>) -> Listing {
        Listing {
            reference: "main".into(),
            commit: "c".into(),
            items,
            truncated: false,
            committed_at: None,
        }
    }

    #[test]
    fn known_git_blob_ids() {
        assert_eq!(
            blob_id_of_bytes(b"", HashAlgorithm::Sha1),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
        assert_eq!(
            blob_id_of_bytes(b"hello\n", HashAlgorithm::Sha1),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(
            blob_id_of_bytes(b"", HashAlgorithm::Sha256),
            "473a0f4c3be8a93681a267e3b1e9a7dcda1185436fe141f7749120a303721813"
        );
        assert_eq!(
            blob_id_of_bytes(b"hello\n", HashAlgorithm::Sha256),
            "2cf8d83d9ee29543b34a87727421fdecb7e3f3a183d337639025de576db9ebb4"
        );
    }

    #[test]
    fn streaming_matches_in_memory_across_buffer_boundary() {
        let tmp = TempDir::new().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(256 * 300).collect();
        let path = tmp.path().join("big.bin");
        fs::write(&path, &content).unwrap();

        let streamed = compute_blob_id(&path, HashAlgorithm::Sha1).unwrap();
        assert_eq!(streamed, "b0ae7e65ee352e982340b7abfee52b373b6d1673");
        assert_eq!(streamed, blob_id_of_bytes(&content, HashAlgorithm::Sha1));
    }

    #[test]
    fn any_single_byte_flip_is_detected() {
        let tmp = TempDir::new().unwrap();
        let original = b"#!/bin/sh\necho updraft\n".to_vec();
        let id = blob_id_of_bytes(&original, HashAlgorithm::Sha1);
        let path = tmp.path().join("tool.sh");

        for i in 0..original.len() {
            let mut flipped = original.clone();
            flipped[i] ^= 0x01;
            fs::write(&path, &flipped).unwrap();
            assert!(
                !file_matches(&path, &ObjectId::from(id.as_str())),
                "flip at byte {i} went unnoticed"
            );
        }
        fs::write(&path, &original).unwrap();
        assert!(file_matches(&path, &ObjectId::from(id.as_str())));
    }

    #[test]
    fn verify_accepts_uppercase_ids_and_ignores_extras() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("dir")).unwrap();
        fs::write(tmp.path().join("dir/a.txt"), b"abc").unwrap();
        fs::write(tmp.path().join("extra.txt"), b"not listed").unwrap();

        let id = "F2BA8F84AB5C1BCE84A7B441CB1959CFC7093B7F";
        assert!(verify(&listing(vec![item("dir/a.txt", id)]), tmp.path()));
    }

    #[test]
    fn verify_fails_on_missing_mismatch_or_bad_id() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"abc").unwrap();
        let good = "f2ba8f84ab5c1bce84a7b441cb1959cfc7093b7f";

        assert!(!verify(&listing(vec![item("a.txt", good), item("b.txt", good)]), tmp.path()));
        assert!(!verify(
            &listing(vec![item("a.txt", "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391")]),
            tmp.path()
        ));
        assert!(!verify(&listing(vec![item("a.txt", "f2ba8f84")]), tmp.path()));
    }

    #[test]
    fn trees_are_not_checked() {
        let tmp = TempDir::new().unwrap();
        let mut tree = item("nested", "0000000000000000000000000000000000000000");
        tree.kind = ObjectKind::Tree;
        assert!(verify(&listing(vec![tree]), tmp.path()));
    }
}
