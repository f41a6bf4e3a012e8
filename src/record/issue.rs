use serde::{Deserialize, Serialize};

use super::ISSUE_TAG;
use crate::account::AccountNumber;
use crate::crypto::{derive_id, verify_signature};
use crate::encoding::{write_bytes, write_varint, CanonicalSerialize};
use crate::error::LedgerResult;
use crate::ids::{AssetId, BitmarkId, Signature};

/// Issuance of one bitmark of an asset to its issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(rename = "asset")]
    pub asset_id: AssetId,
    pub owner: AccountNumber,
    pub nonce: u64,
    pub signature: Signature,
}

impl IssueRecord {
    pub(crate) fn message(asset_id: &AssetId, owner: &AccountNumber, nonce: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, ISSUE_TAG);
        write_bytes(&mut buf, asset_id.as_bytes());
        owner.write_canonical(&mut buf);
        write_varint(&mut buf, nonce);
        buf
    }

    pub fn signing_message(&self) -> Vec<u8> {
        Self::message(&self.asset_id, &self.owner, self.nonce)
    }

    /// Id of the issue transaction, which is also the new bitmark's id.
    pub fn id(&self) -> BitmarkId {
        derive_id(&self.to_bytes())
    }

    pub fn verify(&self) -> LedgerResult<()> {
        verify_signature(self.owner.verifying_key(), &self.signing_message(), &self.signature)
    }
}

impl CanonicalSerialize for IssueRecord {
    fn canonical_serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.signing_message());
        write_bytes(buf, self.signature.as_bytes());
    }
}
