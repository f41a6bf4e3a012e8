//! Record builder.
//!
//! Assembles the canonical message for each record kind, validates its
//! fields and has the caller's [`RecordSigner`] authorize it. Nothing here
//! talks to the network.

pub mod asset;
pub mod issue;
pub mod transfer;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::debug;

pub use asset::{AssetRecord, Metadata};
pub use issue::IssueRecord;
pub use transfer::{CountersignedTransferRecord, TransferOfferRecord, TransferRecord};

use crate::account::{AccountNumber, Network};
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{AssetId, TxId};
use crate::signer::RecordSigner;
use crate::types::Bitmark;

pub const ASSET_TAG: u64 = 2;
pub const ISSUE_TAG: u64 = 3;
pub const TRANSFER_TAG: u64 = 4;
/// Shared by offers and countersigned transfers.
pub const OFFER_TAG: u64 = 5;

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `unix_seconds * 1000 + counter % 1000`: distinct for up to a thousand
/// issues per second from one process.
pub fn next_nonce() -> u64 {
    let counter = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let seconds = Utc::now().timestamp().max(0) as u64;
    seconds * 1000 + counter % 1000
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> LedgerResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(LedgerError::Validation(format!(
            "{} length must be between {} and {} characters, got {}",
            field, min, max, len
        )));
    }
    Ok(())
}

/// Builds and signs records for accounts on one network.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuilder {
    network: Network,
}

impl RecordBuilder {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn check_account(&self, role: &str, account: &AccountNumber) -> LedgerResult<()> {
        if account.network() != self.network {
            return Err(LedgerError::InvalidAccount(format!(
                "{} {} belongs to {}, expected {}",
                role,
                account.short(),
                account.network(),
                self.network
            )));
        }
        Ok(())
    }

    pub fn build_asset<S: RecordSigner>(
        &self,
        name: &str,
        fingerprint: &str,
        metadata: &Metadata,
        registrant: &S,
    ) -> LedgerResult<AssetRecord> {
        check_length("name", name, asset::MIN_NAME_LENGTH, asset::MAX_NAME_LENGTH)?;
        check_length(
            "fingerprint",
            fingerprint,
            asset::MIN_FINGERPRINT_LENGTH,
            asset::MAX_FINGERPRINT_LENGTH,
        )?;
        let compact = metadata.compact();
        check_length("metadata", &compact, 0, asset::MAX_METADATA_LENGTH)?;
        self.check_account("registrant", registrant.account_number())?;

        let registrant_number = registrant.account_number().clone();
        let message = AssetRecord::message(name, fingerprint, &compact, &registrant_number);
        let signature = registrant.sign(&message);
        debug!(name, registrant = %registrant_number.short(), "asset record signed");

        Ok(AssetRecord {
            name: name.to_string(),
            fingerprint: fingerprint.to_string(),
            metadata: compact,
            registrant: registrant_number,
            signature,
        })
    }

    /// `asset_index` is the hex asset id; a nonce is generated when omitted.
    pub fn build_issue<S: RecordSigner>(
        &self,
        asset_index: &str,
        issuer: &S,
        nonce: Option<u64>,
    ) -> LedgerResult<IssueRecord> {
        let asset_id = AssetId::from_hex(asset_index)?;
        self.check_account("issuer", issuer.account_number())?;

        let owner = issuer.account_number().clone();
        let nonce = nonce.unwrap_or_else(next_nonce);
        let signature = issuer.sign(&IssueRecord::message(&asset_id, &owner, nonce));

        let record = IssueRecord {
            asset_id,
            owner,
            nonce,
            signature,
        };
        debug!(asset = %asset_id, nonce, bitmark = %record.id(), "issue record signed");
        Ok(record)
    }

    /// Single-signature transfer of the bitmark whose head is `head`.
    pub fn build_transfer<S: RecordSigner>(
        &self,
        head: &TxId,
        receiver: &AccountNumber,
        owner: &S,
    ) -> LedgerResult<TransferRecord> {
        self.check_account("owner", owner.account_number())?;
        self.check_account("receiver", receiver)?;

        let signature = owner.sign(&TransferRecord::message(head, receiver));
        debug!(link = %head, to = %receiver.short(), "transfer record signed");
        Ok(TransferRecord {
            link: *head,
            owner: receiver.clone(),
            signature,
        })
    }

    pub fn build_offer<S: RecordSigner>(
        &self,
        head: &TxId,
        receiver: &AccountNumber,
        sender: &S,
        bitmark: Option<Bitmark>,
    ) -> LedgerResult<TransferOfferRecord> {
        self.check_account("sender", sender.account_number())?;
        self.check_account("receiver", receiver)?;

        let signature = sender.sign(&TransferOfferRecord::message(head, receiver));
        debug!(link = %head, to = %receiver.short(), "transfer offer signed");
        Ok(TransferOfferRecord {
            bitmark: bitmark.map(Box::new),
            link: *head,
            owner: receiver.clone(),
            signature,
        })
    }

    /// Accepts `offer` on behalf of `receiver`, who must be the account the
    /// offer names.
    pub fn countersign<S: RecordSigner>(
        &self,
        offer: &TransferOfferRecord,
        receiver: &S,
    ) -> LedgerResult<CountersignedTransferRecord> {
        if receiver.account_number() != &offer.owner {
            return Err(LedgerError::InvalidAccount(format!(
                "offer is addressed to {}, not {}",
                offer.owner.short(),
                receiver.account_number().short()
            )));
        }

        let countersignature = receiver.sign(&offer.countersign_message());
        let record = offer.with_countersignature(countersignature);
        debug!(link = %record.link, tx = %record.id(), "transfer offer countersigned");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, Seed};
    use crate::crypto::asset_id;
    use crate::encoding::CanonicalSerialize;
    use crate::ids::Signature;

    fn sender() -> Account {
        Account::from_seed_value(Seed::new(Network::Testnet, [1u8; 32]))
    }

    fn receiver() -> Account {
        Account::from_seed_value(Seed::new(Network::Testnet, [2u8; 32]))
    }

    fn head() -> TxId {
        TxId::new([0xaa; 32])
    }

    #[test]
    fn test_fixed_accounts() {
        assert_eq!(
            sender().account_number().as_str(),
            "fcdkkndbsHXbRY4ybvd7eR1rnSg2aKQ8oid1r4pZKB8VWDwjy6"
        );
        assert_eq!(
            receiver().account_number().as_str(),
            "exLh3dt7FyN2N2ANLApTFHmS24BfrpXW37q6xLS53fNUdFkxJ7"
        );
        assert_eq!(
            sender().export_seed(),
            "5XEECs59752NVP7V37Z5tuYwwRmLV7kTapki1ZCZXP9YNgbdXPaghe6"
        );
    }

    #[test]
    fn test_countersigned_id_matches_fixed_vector() {
        let builder = RecordBuilder::new(Network::Testnet);
        let (sender, receiver) = (sender(), receiver());

        let offer = builder
            .build_offer(&head(), receiver.account_number(), &sender, None)
            .unwrap();
        assert_eq!(
            offer.signature.to_hex(),
            "ff32ea5271ebeef0ed3980b91d4b75a20c1a4e7e4894c49591c577f5e2842da0\
             60478dd6a44bea3e00a687f2a7814534e7744825da3e955dcce0ba113f1b8a0d"
        );

        let countersigned = builder.countersign(&offer, &receiver).unwrap();
        assert_eq!(
            countersigned.id().to_hex(),
            "edb2bbd61d4615aadf8088c1c606c7fa0861fe2aa1be86155a1fb2cb33be7936"
        );
        assert!(countersigned.verify(sender.account_number()).is_ok());
        assert!(countersigned.verify(receiver.account_number()).is_err());
    }

    #[test]
    fn test_any_mutation_changes_countersigned_id() {
        let builder = RecordBuilder::new(Network::Testnet);
        let record = builder
            .countersign(
                &builder
                    .build_offer(&head(), receiver().account_number(), &sender(), None)
                    .unwrap(),
                &receiver(),
            )
            .unwrap();
        let original = record.id();

        let mut link = *record.link.as_bytes();
        link[31] ^= 0x01;
        let mut mutated = record.clone();
        mutated.link = TxId::new(link);
        assert_ne!(mutated.id(), original);

        let mut sig = *record.signature.as_bytes();
        sig[0] ^= 0x80;
        let mut mutated = record.clone();
        mutated.signature = Signature::new(sig);
        assert_ne!(mutated.id(), original);

        let mut countersig = *record.countersignature.as_bytes();
        countersig[63] ^= 0x01;
        let mut mutated = record.clone();
        mutated.countersignature = Signature::new(countersig);
        assert_ne!(mutated.id(), original);

        let mut mutated = record.clone();
        mutated.owner = sender().account_number().clone();
        assert_ne!(mutated.id(), original);

        // Every single-byte flip of the canonical encoding yields a new id
        let bytes = record.to_bytes();
        for i in 0..bytes.len() {
            let mut flipped = bytes.clone();
            flipped[i] ^= 0x01;
            assert_ne!(crate::crypto::derive_id(&flipped), original, "byte {}", i);
        }
    }

    #[test]
    fn test_countersign_requires_named_receiver() {
        let builder = RecordBuilder::new(Network::Testnet);
        let offer = builder
            .build_offer(&head(), receiver().account_number(), &sender(), None)
            .unwrap();
        assert!(matches!(
            builder.countersign(&offer, &sender()),
            Err(LedgerError::InvalidAccount(_))
        ));
    }

    #[test]
    fn test_single_signature_transfer_vector() {
        let builder = RecordBuilder::new(Network::Testnet);
        let record = builder
            .build_transfer(&head(), receiver().account_number(), &sender())
            .unwrap();
        assert_eq!(
            record.id().to_hex(),
            "0fcbd6b540132c5394f09e7119108420293384d5e7bed208921b0a3e45fc943d"
        );
        assert!(record.verify(sender().account_number()).is_ok());
        assert!(record.verify(receiver().account_number()).is_err());
    }

    #[test]
    fn test_issue_vector_and_asset_index_checks() {
        let builder = RecordBuilder::new(Network::Testnet);
        let asset = asset_id("fingerprint-1");
        assert_eq!(
            asset.to_hex(),
            "9594262687e3647d95ecc94c51e475530d64b4746b9f4fefe1400cd35bfaf455"
        );

        let issue = builder
            .build_issue(&asset.to_hex(), &sender(), Some(1000))
            .unwrap();
        assert_eq!(
            issue.id().to_hex(),
            "49aac20a99afb6ad2a977c02bef710334850877156563bfd6dbce2ff0a0ed221"
        );
        assert!(issue.verify().is_ok());

        assert!(matches!(
            builder.build_issue(&"ab".repeat(31), &sender(), None),
            Err(LedgerError::Encoding(_))
        ));
        assert!(matches!(
            builder.build_issue("zz", &sender(), None),
            Err(LedgerError::Encoding(_))
        ));
    }

    #[test]
    fn test_generated_nonces_are_distinct() {
        let builder = RecordBuilder::new(Network::Testnet);
        let asset = asset_id("fingerprint-2").to_hex();
        let ids: std::collections::HashSet<_> = (0..50)
            .map(|_| builder.build_issue(&asset, &sender(), None).unwrap().id())
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_nonces_from_concurrent_threads_are_distinct() {
        let nonces: Vec<u64> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| (0..100).map(|_| next_nonce()).collect::<Vec<_>>()))
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        let distinct: std::collections::HashSet<_> = nonces.iter().copied().collect();
        assert_eq!(nonces.len(), 400);
        assert_eq!(distinct.len(), 400);
    }

    #[test]
    fn test_asset_bounds() {
        let builder = RecordBuilder::new(Network::Testnet);
        let account = sender();
        let metadata = Metadata::new();

        assert!(builder.build_asset("", "fp", &metadata, &account).is_err());
        assert!(builder
            .build_asset(&"n".repeat(65), "fp", &metadata, &account)
            .is_err());
        // Bounds count characters, not bytes
        assert!(builder
            .build_asset(&"é".repeat(64), "fp", &metadata, &account)
            .is_ok());
        assert!(builder
            .build_asset("name", &"f".repeat(1025), &metadata, &account)
            .is_err());

        let large: Metadata = vec![("k", "v".repeat(2047))].into_iter().collect();
        assert!(matches!(
            builder.build_asset("name", "fp", &large, &account),
            Err(LedgerError::Validation(_))
        ));

        let record = builder
            .build_asset("name", "fp", &vec![("a", "1")].into_iter().collect(), &account)
            .unwrap();
        assert!(record.verify().is_ok());
        assert_eq!(record.id(), asset_id("fp"));
    }

    #[test]
    fn test_network_mismatch_is_invalid_account() {
        let builder = RecordBuilder::new(Network::Livenet);
        assert!(matches!(
            builder.build_transfer(&head(), receiver().account_number(), &sender()),
            Err(LedgerError::InvalidAccount(_))
        ));
    }
}
