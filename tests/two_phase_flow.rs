use std::sync::Arc;
use std::time::Duration;

use bitmark_flow::account::{Account, Network, Seed};
use bitmark_flow::client::{LedgerApi, MemoryLedger};
use bitmark_flow::engine::TransferEngine;
use bitmark_flow::error::LedgerError;
use bitmark_flow::ids::BitmarkId;
use bitmark_flow::ownership::OwnershipState;
use bitmark_flow::record::{Metadata, RecordBuilder};
use bitmark_flow::retry::RetryPolicy;
use bitmark_flow::types::{BitmarkQuery, BitmarkStatus};
use tokio::time::sleep;

fn account(byte: u8) -> Account {
    Account::from_seed_value(Seed::new(Network::Testnet, [byte; 32]))
}

fn engine() -> TransferEngine<MemoryLedger> {
    TransferEngine::new(Arc::new(MemoryLedger::new()), Network::Testnet)
        .with_retry(RetryPolicy::fixed(3, Duration::from_millis(5)))
        .with_polling(Duration::from_millis(10), 4)
}

async fn settled_bitmarks(engine: &TransferEngine<MemoryLedger>, owner: &Account, count: usize) -> Vec<BitmarkId> {
    let mut metadata = Metadata::new();
    metadata.insert("author", "flow tests");
    let ids = engine
        .register_and_issue(owner, "Sunset", "fp-two-phase", &metadata, count)
        .await
        .unwrap();
    engine.ledger().confirm_all().await;
    assert!(engine.bitmark_tracker().check_all_confirmed(&ids).await);
    ids
}

#[tokio::test]
async fn test_offer_accept_confirm() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let ids = settled_bitmarks(&engine, &sender, 2).await;
    let bitmark_id = ids[0];

    let offer = engine
        .offer(&sender, &bitmark_id, receiver.account_number(), Some(serde_json::json!({ "note": "gift" })))
        .await
        .unwrap();
    assert_eq!(engine.ledger().open_offers().await.len(), 1);
    assert_eq!(
        engine.ownership(&bitmark_id).await.unwrap().pending_offer(),
        Some(offer.offer_id.as_str())
    );

    let stored = engine.get_offer(&offer.offer_id).await.unwrap();
    assert_eq!(&stored.to, receiver.account_number());
    assert_eq!(stored.extra_info["note"], "gift");

    let expected = RecordBuilder::new(Network::Testnet)
        .countersign(&offer.record, &receiver)
        .unwrap()
        .id();
    let tx_id = engine.accept(&receiver, &offer.offer_id).await.unwrap();
    assert_eq!(tx_id, expected);
    assert!(engine.ledger().open_offers().await.is_empty());

    // Recorded but not yet authoritative
    let state = engine.ownership(&bitmark_id).await.unwrap();
    assert_eq!(state.owner(), receiver.account_number());
    assert_eq!(state.authoritative_owner(), sender.account_number());
    assert!(!engine.tracker().check_all_confirmed(&[tx_id]).await);

    engine.ledger().confirm_all().await;
    engine
        .await_confirmations(&[tx_id], sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(
        engine.ownership(&bitmark_id).await.unwrap(),
        OwnershipState::owned(receiver.account_number().clone(), tx_id)
    );
    let bitmark = engine.bitmark(&bitmark_id).await.unwrap();
    assert_eq!(&bitmark.owner, receiver.account_number());
    assert_eq!(bitmark.status, BitmarkStatus::Settled);
    assert_eq!(bitmark.provenance.len(), 2);

    // The other bitmark is untouched
    let other = engine.bitmark(&ids[1]).await.unwrap();
    assert_eq!(&other.owner, sender.account_number());
}

#[tokio::test]
async fn test_receiver_offers_onward_before_confirmation() {
    let engine = engine();
    let (a, b, c) = (account(1), account(2), account(3));
    let bitmark_id = settled_bitmarks(&engine, &a, 1).await[0];

    let tx1 = engine
        .transfer(&a, &bitmark_id, b.account_number())
        .await
        .unwrap();

    // b acts while tx1 is still pending
    let offer = engine
        .offer(&b, &bitmark_id, c.account_number(), None)
        .await
        .unwrap();
    assert_eq!(
        engine.ownership(&bitmark_id).await.unwrap().pending_offer(),
        Some(offer.offer_id.as_str())
    );

    let tx2 = engine.accept(&c, &offer.offer_id).await.unwrap();
    let state = engine.ownership(&bitmark_id).await.unwrap();
    assert_eq!(state.owner(), c.account_number());
    assert_eq!(state.authoritative_owner(), b.account_number());

    engine.ledger().confirm_all().await;
    engine
        .await_confirmations(&[tx1, tx2], sleep(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(
        engine.ownership(&bitmark_id).await.unwrap(),
        OwnershipState::owned(c.account_number().clone(), tx2)
    );
    let bitmark = engine.bitmark(&bitmark_id).await.unwrap();
    assert_eq!(&bitmark.owner, c.account_number());
    assert_eq!(bitmark.head_id, tx2);
}

#[tokio::test]
async fn test_receiver_finds_and_accepts_offer() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let ids = settled_bitmarks(&engine, &sender, 3).await;

    engine
        .offer(&sender, &ids[1], receiver.account_number(), None)
        .await
        .unwrap();

    let offered = engine
        .bitmarks(&BitmarkQuery::new().offer_to(receiver.account_number().clone()))
        .await
        .unwrap();
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0].id, ids[1]);
    assert_eq!(offered[0].status, BitmarkStatus::Offering);

    let owned = engine
        .bitmarks(&BitmarkQuery::new().owned_by(sender.account_number().clone()).limit(2))
        .await
        .unwrap();
    assert_eq!(owned.len(), 2);

    let pending = engine.incoming_offers(receiver.account_number()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(engine.offers(sender.account_number()).await.unwrap().sent, pending);

    engine.accept(&receiver, &pending[0].id).await.unwrap();
    assert!(engine
        .incoming_offers(receiver.account_number())
        .await
        .unwrap()
        .is_empty());
    let now_owned = engine
        .bitmarks(&BitmarkQuery::new().owned_by(receiver.account_number().clone()))
        .await
        .unwrap();
    assert_eq!(now_owned.len(), 1);
    assert_eq!(now_owned[0].id, ids[1]);
}

#[tokio::test]
async fn test_reject_leaves_ownership_unchanged() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let bitmark_id = settled_bitmarks(&engine, &sender, 1).await[0];

    let offer = engine
        .offer(&sender, &bitmark_id, receiver.account_number(), None)
        .await
        .unwrap();
    let would_be = RecordBuilder::new(Network::Testnet)
        .countersign(&offer.record, &receiver)
        .unwrap()
        .id();

    engine.reject(&receiver, &offer.offer_id).await.unwrap();

    assert!(engine.ledger().open_offers().await.is_empty());
    assert_eq!(
        engine.ownership(&bitmark_id).await.unwrap(),
        OwnershipState::owned(sender.account_number().clone(), bitmark_id)
    );
    let bitmark = engine.bitmark(&bitmark_id).await.unwrap();
    assert_eq!(&bitmark.owner, sender.account_number());
    assert_eq!(bitmark.head_id, bitmark_id);
    assert_eq!(bitmark.status, BitmarkStatus::Settled);
    assert!(matches!(
        engine.ledger().get_tx(&would_be).await,
        Err(LedgerError::Service { status: 404, .. })
    ));

    // The sender can offer again
    engine
        .offer(&sender, &bitmark_id, receiver.account_number(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_offer_against_moved_head_is_stale() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let bitmark_id = settled_bitmarks(&engine, &sender, 1).await[0];

    let old_offer = RecordBuilder::new(Network::Testnet)
        .build_offer(&bitmark_id, receiver.account_number(), &sender, None)
        .unwrap();
    engine
        .transfer(&sender, &bitmark_id, receiver.account_number())
        .await
        .unwrap();

    let err = engine.submit_offer(&sender, &old_offer, None).await.unwrap_err();
    assert!(matches!(err, LedgerError::StaleOwnership(_)), "got {:?}", err);

    let err = engine
        .offer(&sender, &bitmark_id, receiver.account_number(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::StaleOwnership(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_only_the_receiver_can_answer() {
    let engine = engine();
    let (sender, receiver, stranger) = (account(1), account(2), account(3));
    let bitmark_id = settled_bitmarks(&engine, &sender, 1).await[0];

    let offer = engine
        .offer(&sender, &bitmark_id, receiver.account_number(), None)
        .await
        .unwrap();

    assert!(matches!(
        engine.accept(&stranger, &offer.offer_id).await,
        Err(LedgerError::InvalidAccount(_))
    ));
    assert!(matches!(
        engine.reject(&stranger, &offer.offer_id).await,
        Err(LedgerError::InvalidAccount(_))
    ));
    assert_eq!(engine.ledger().open_offers().await.len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let bitmark_id = settled_bitmarks(&engine, &sender, 1).await[0];

    engine
        .ledger()
        .fail_next(LedgerError::Network("connection reset".to_string()))
        .await;
    engine
        .ledger()
        .fail_next(LedgerError::Network("connection reset".to_string()))
        .await;

    let tx_id = engine
        .transfer(&sender, &bitmark_id, receiver.account_number())
        .await
        .unwrap();
    assert_eq!(engine.bitmark(&bitmark_id).await.unwrap().head_id, tx_id);
}

#[tokio::test]
async fn test_direct_countersigned_transfer() {
    let engine = engine();
    let (sender, receiver) = (account(1), account(2));
    let bitmark_id = settled_bitmarks(&engine, &sender, 1).await[0];

    let builder = RecordBuilder::new(Network::Testnet);
    let offer = builder
        .build_offer(&bitmark_id, receiver.account_number(), &sender, None)
        .unwrap();
    let record = builder.countersign(&offer, &receiver).unwrap();

    let tx_id = engine.submit_countersigned(&record).await.unwrap();
    assert_eq!(tx_id, record.id());

    let bitmark = engine.bitmark(&bitmark_id).await.unwrap();
    assert_eq!(&bitmark.owner, receiver.account_number());
    assert_eq!(bitmark.head_id, tx_id);

    // Replaying against the old head conflicts
    assert!(matches!(
        engine.submit_countersigned(&record).await,
        Err(LedgerError::StaleOwnership(_))
    ));
}
