use crate::{ContentDigest, IngestError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub fn digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest::from_hex_unchecked(format!("{:x}", hasher.finalize()))
}

pub fn digest_file(path: &Path) -> Result<ContentDigest, IngestError> {
    let bytes = fs::read(path)?;
    Ok(digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::{digest, digest_file};
    use crate::ContentDigest;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn digest_matches_known_sha256() {
        assert_eq!(
            digest(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest(b"").as_str().len(), ContentDigest::HEX_LEN);
    }

    #[test]
    fn single_byte_change_changes_digest() {
        assert_ne!(digest(b"line one\nline two\n"), digest(b"line one\nline twp\n"));
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        assert_eq!(first, digest(b"abc"));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = digest_file(&dir.path().join("nope.txt"));
        assert!(matches!(result, Err(crate::IngestError::Io(_))));
        Ok(())
    }
}
