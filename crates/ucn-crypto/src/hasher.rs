use sha2::{Digest, Sha256};
use ucn_types::{BlockHash, BlockRecord};

use crate::codec::CanonicalCodec;

/// SHA-256 content hasher for blocks.
///
/// A block's address is the SHA-256 digest of its canonical encoding,
/// rendered as `sha256:<hex>`. There is no domain tag: the pre-image is
/// exactly the bytes produced by [`CanonicalCodec`].
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw bytes.
    pub fn hash(bytes: &[u8]) -> BlockHash {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        BlockHash::from_digest(digest)
    }

    /// Hash the canonical encoding of the given fields.
    pub fn hash_fields(protocol: &str, previous_hash: &str, data: &[u8]) -> BlockHash {
        Self::hash(&CanonicalCodec::encode(protocol, previous_hash, data))
    }

    /// Content address of a record.
    pub fn block_hash(record: &BlockRecord) -> BlockHash {
        Self::hash(&CanonicalCodec::encode_record(record))
    }

    /// Verify that a record produces the expected address.
    pub fn verify(record: &BlockRecord, expected: &BlockHash) -> bool {
        Self::block_hash(record) == *expected
    }
}

/// Types whose identity is the hash of their canonical encoding.
pub trait ContentAddressed {
    fn content_address(&self) -> BlockHash;
}

impl ContentAddressed for BlockRecord {
    fn content_address(&self) -> BlockHash {
        ContentHasher::block_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "sha256:d0c7f548d3117670fbe890fe72e891851affcdea0b8f0b95444e7b2596296847";

    #[test]
    fn genesis_fixture_hash() {
        let record = BlockRecord::new("test_protocol", b"test_data".to_vec(), "", 0);
        assert_eq!(ContentHasher::block_hash(&record).to_string(), FIXTURE);
        assert_eq!(record.content_address().to_string(), FIXTURE);
    }

    #[test]
    fn hash_fields_matches_block_hash() {
        let record = BlockRecord::new("p", b"payload".to_vec(), FIXTURE, 1);
        assert_eq!(
            ContentHasher::hash_fields("p", FIXTURE, b"payload"),
            ContentHasher::block_hash(&record)
        );
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(ContentHasher::hash(b"hello"), ContentHasher::hash(b"hello"));
    }

    #[test]
    fn empty_input_is_sha256_of_nothing() {
        assert_eq!(
            ContentHasher::hash(b"").to_string(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn index_does_not_affect_address() {
        let a = BlockRecord::new("p", b"d".to_vec(), "", 0);
        let b = BlockRecord::new("p", b"d".to_vec(), "", 3);
        assert_eq!(a.content_address(), b.content_address());
    }

    #[test]
    fn each_field_changes_address() {
        let base = BlockRecord::new("p", b"d".to_vec(), "", 0);
        let other_protocol = BlockRecord::new("q", b"d".to_vec(), "", 0);
        let other_data = BlockRecord::new("p", b"e".to_vec(), "", 0);
        let other_prev = BlockRecord::new("p", b"d".to_vec(), FIXTURE, 0);
        assert_ne!(base.content_address(), other_protocol.content_address());
        assert_ne!(base.content_address(), other_data.content_address());
        assert_ne!(base.content_address(), other_prev.content_address());
    }

    #[test]
    fn verify_detects_tampering() {
        let record = BlockRecord::new("p", b"original".to_vec(), "", 0);
        let hash = record.content_address();
        assert!(ContentHasher::verify(&record, &hash));

        let tampered = BlockRecord::new("p", b"tampered".to_vec(), "", 0);
        assert!(!ContentHasher::verify(&tampered, &hash));
    }
}
