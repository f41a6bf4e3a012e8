use serde::{Deserialize, Serialize};

use super::ASSET_TAG;
use crate::account::AccountNumber;
use crate::crypto::{asset_id, verify_signature};
use crate::encoding::{compact_metadata, expand_metadata, write_bytes, write_string, write_varint, CanonicalSerialize};
use crate::error::LedgerResult;
use crate::ids::{AssetId, Signature};

pub const MIN_NAME_LENGTH: usize = 1;
pub const MAX_NAME_LENGTH: usize = 64;
pub const MIN_FINGERPRINT_LENGTH: usize = 1;
pub const MAX_FINGERPRINT_LENGTH: usize = 1024;
pub const MAX_METADATA_LENGTH: usize = 2048;

/// Ordered key/value pairs attached to an asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, keeping its original position if already present
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn compact(&self) -> String {
        compact_metadata(self.iter())
    }

    pub fn from_compact(compact: &str) -> Self {
        Self(expand_metadata(compact))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

/// Registration of a new asset on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub name: String,
    pub fingerprint: String,
    /// Compacted form, see [`Metadata::compact`]
    pub metadata: String,
    pub registrant: AccountNumber,
    pub signature: Signature,
}

impl AssetRecord {
    pub(crate) fn message(
        name: &str,
        fingerprint: &str,
        metadata: &str,
        registrant: &AccountNumber,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, ASSET_TAG);
        write_string(&mut buf, name);
        write_string(&mut buf, fingerprint);
        write_string(&mut buf, metadata);
        registrant.write_canonical(&mut buf);
        buf
    }

    pub fn signing_message(&self) -> Vec<u8> {
        Self::message(&self.name, &self.fingerprint, &self.metadata, &self.registrant)
    }

    /// The asset's content identifier.
    pub fn id(&self) -> AssetId {
        asset_id(&self.fingerprint)
    }

    pub fn metadata_pairs(&self) -> Metadata {
        Metadata::from_compact(&self.metadata)
    }

    pub fn verify(&self) -> LedgerResult<()> {
        verify_signature(
            self.registrant.verifying_key(),
            &self.signing_message(),
            &self.signature,
        )
    }
}

impl CanonicalSerialize for AssetRecord {
    fn canonical_serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.signing_message());
        write_bytes(buf, self.signature.as_bytes());
    }
}
