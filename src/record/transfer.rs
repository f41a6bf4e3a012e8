//! Transfer records: the single-signature fast path and the two-phase
//! offer / countersign handshake.
//!
//! Both shapes sign the same layout, `tag ‖ link ‖ 0x00 ‖ receiver`. The
//! zero byte marks "no payment attached"; payments are not supported.

use serde::{Deserialize, Serialize};

use super::{OFFER_TAG, TRANSFER_TAG};
use crate::account::AccountNumber;
use crate::crypto::{derive_id, verify_signature};
use crate::encoding::{write_bytes, write_varint, CanonicalSerialize};
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{Signature, TxId};
use crate::types::Bitmark;

const NO_PAYMENT: u8 = 0x00;

fn transfer_message(tag: u64, link: &TxId, receiver: &AccountNumber) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, tag);
    write_bytes(&mut buf, link.as_bytes());
    buf.push(NO_PAYMENT);
    receiver.write_canonical(&mut buf);
    buf
}

/// Ownership change signed by the current owner alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub link: TxId,
    /// The receiver
    pub owner: AccountNumber,
    pub signature: Signature,
}

impl TransferRecord {
    pub(crate) fn message(link: &TxId, receiver: &AccountNumber) -> Vec<u8> {
        transfer_message(TRANSFER_TAG, link, receiver)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        Self::message(&self.link, &self.owner)
    }

    pub fn id(&self) -> TxId {
        derive_id(&self.to_bytes())
    }

    /// Checks the signature against the owner being replaced.
    pub fn verify(&self, previous_owner: &AccountNumber) -> LedgerResult<()> {
        verify_signature(previous_owner.verifying_key(), &self.signing_message(), &self.signature)
    }
}

impl CanonicalSerialize for TransferRecord {
    fn canonical_serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.signing_message());
        write_bytes(buf, self.signature.as_bytes());
    }
}

/// First half of a two-phase transfer: the sender's signed intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOfferRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitmark: Option<Box<Bitmark>>,
    pub link: TxId,
    /// The receiver
    pub owner: AccountNumber,
    pub signature: Signature,
}

impl TransferOfferRecord {
    pub(crate) fn message(link: &TxId, receiver: &AccountNumber) -> Vec<u8> {
        transfer_message(OFFER_TAG, link, receiver)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        Self::message(&self.link, &self.owner)
    }

    /// Bytes the receiver signs to accept: the offer message and the
    /// sender's signature.
    pub fn countersign_message(&self) -> Vec<u8> {
        let mut buf = self.signing_message();
        write_bytes(&mut buf, self.signature.as_bytes());
        buf
    }

    pub fn verify(&self, sender: &AccountNumber) -> LedgerResult<()> {
        verify_signature(sender.verifying_key(), &self.signing_message(), &self.signature)
    }

    pub fn with_countersignature(&self, countersignature: Signature) -> CountersignedTransferRecord {
        CountersignedTransferRecord {
            link: self.link,
            owner: self.owner.clone(),
            signature: self.signature,
            countersignature,
        }
    }
}

/// A transfer offer completed by the receiver's countersignature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountersignedTransferRecord {
    pub link: TxId,
    pub owner: AccountNumber,
    pub signature: Signature,
    pub countersignature: Signature,
}

impl CountersignedTransferRecord {
    pub fn offer_message(&self) -> Vec<u8> {
        TransferOfferRecord::message(&self.link, &self.owner)
    }

    pub fn countersign_message(&self) -> Vec<u8> {
        let mut buf = self.offer_message();
        write_bytes(&mut buf, self.signature.as_bytes());
        buf
    }

    /// Final transaction id recorded on the ledger.
    pub fn id(&self) -> TxId {
        derive_id(&self.to_bytes())
    }

    /// Checks the sender's signature and the receiver's countersignature.
    pub fn verify(&self, sender: &AccountNumber) -> LedgerResult<()> {
        verify_signature(sender.verifying_key(), &self.offer_message(), &self.signature)?;
        verify_signature(
            self.owner.verifying_key(),
            &self.countersign_message(),
            &self.countersignature,
        )
        .map_err(|_| LedgerError::InvalidAccount("countersignature does not match receiver".to_string()))
    }
}

impl CanonicalSerialize for CountersignedTransferRecord {
    fn canonical_serialize(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.countersign_message());
        write_bytes(buf, self.countersignature.as_bytes());
    }
}
