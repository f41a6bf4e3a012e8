use ed25519_dalek::{Verifier, VerifyingKey};
use sha3::{Digest, Sha3_256};

use crate::error::{LedgerError, LedgerResult};
use crate::ids::{AssetId, Signature, TxId};

/// Length of the checksum appended to account numbers and seeds.
pub const CHECKSUM_LENGTH: usize = 4;

/// SHA3-256 over the concatenation of `parts`.
pub fn sha3_256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_LENGTH] {
    let digest = sha3_256(&[data]);
    let mut out = [0u8; CHECKSUM_LENGTH];
    out.copy_from_slice(&digest[..CHECKSUM_LENGTH]);
    out
}

/// Identifier of a record: the hash of its fully signed canonical bytes.
/// Pure; equal input always yields an equal id.
pub fn derive_id(record_bytes: &[u8]) -> TxId {
    TxId::new(sha3_256(&[record_bytes]))
}

/// Content identifier of an asset, derived from its fingerprint.
pub fn asset_id(fingerprint: &str) -> AssetId {
    AssetId::new(sha3_256(&[fingerprint.as_bytes()]))
}

/// Verify a signature against a message with a provided public key
pub fn verify_signature(
    public_key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> LedgerResult<()> {
    public_key
        .verify(message, &signature.to_dalek())
        .map_err(|_| LedgerError::InvalidAccount("signature does not match signer".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_id_is_deterministic() {
        let bytes = b"\x05\x20signed record bytes";
        assert_eq!(derive_id(bytes), derive_id(bytes));
        assert_ne!(derive_id(bytes), derive_id(b"\x05\x20signed record byteS"));
    }

    #[test]
    fn test_sha3_known_vector() {
        assert_eq!(
            hex::encode(sha3_256(&[b""])),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        // Hashing in parts matches hashing the concatenation
        assert_eq!(sha3_256(&[b"ab", b"c"]), sha3_256(&[b"abc"]));
    }

    #[test]
    fn test_asset_id_from_fingerprint() {
        let id = asset_id("01e8a7e0f8c4");
        assert_eq!(id, asset_id("01e8a7e0f8c4"));
        assert_ne!(id, asset_id("01e8a7e0f8c5"));
        assert_eq!(checksum(b"abc").len(), CHECKSUM_LENGTH);
    }
}
