use std::sync::Arc;
use std::time::Duration;

use bitmark_flow::account::{Account, Network, Seed};
use bitmark_flow::client::{HttpLedger, LedgerApi, OfferReply};
use bitmark_flow::engine::TransferEngine;
use bitmark_flow::error::LedgerError;
use bitmark_flow::ids::TxId;
use bitmark_flow::record::{Metadata, RecordBuilder, TransferOfferRecord};
use bitmark_flow::retry::RetryPolicy;
use bitmark_flow::types::BitmarkQuery;
use mockito::{Matcher, Server};
use serde_json::json;

fn account(byte: u8) -> Account {
    Account::from_seed_value(Seed::new(Network::Testnet, [byte; 32]))
}

fn ledger(server: &Server) -> HttpLedger {
    HttpLedger::new(&server.url(), Duration::from_secs(5)).unwrap()
}

fn bitmark_body(id: &TxId, owner: &Account) -> serde_json::Value {
    json!({
        "bitmark": {
            "id": id.to_hex(),
            "head_id": id.to_hex(),
            "owner": owner.account_number().as_str(),
            "asset_id": "cc".repeat(32),
            "issuer": owner.account_number().as_str(),
            "head": "settled",
            "status": "settled",
            "block_number": 12,
            "provenance": []
        }
    })
}

#[tokio::test]
async fn test_issue_posts_assets_and_issues() {
    let mut server = Server::new_async().await;
    let owner = account(1);
    let builder = RecordBuilder::new(Network::Testnet);
    let asset = builder
        .build_asset("Sunset", "fp-http", &Metadata::new(), &owner)
        .unwrap();
    let issue = builder
        .build_issue(&asset.id().to_hex(), &owner, Some(7))
        .unwrap();

    let mock = server
        .mock("POST", "/v3/issue")
        .match_body(Matcher::PartialJson(json!({
            "assets": [{ "name": "Sunset", "fingerprint": "fp-http" }],
            "issues": [{ "nonce": 7 }]
        })))
        .with_status(200)
        .with_body(json!([{ "txId": issue.id().to_hex() }]).to_string())
        .create_async()
        .await;

    let ids = ledger(&server).issue(Some(&asset), &[issue.clone()]).await.unwrap();
    assert_eq!(ids, vec![issue.id()]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transfer_returns_tx_id() {
    let mut server = Server::new_async().await;
    let (owner, receiver) = (account(1), account(2));
    let head = TxId::new([0xaa; 32]);
    let record = RecordBuilder::new(Network::Testnet)
        .build_transfer(&head, receiver.account_number(), &owner)
        .unwrap();

    let mock = server
        .mock("POST", "/v2/transfer")
        .match_body(Matcher::PartialJson(json!({
            "transfer": { "link": head.to_hex(), "owner": receiver.account_number().as_str() }
        })))
        .with_status(200)
        .with_body(json!([{ "txId": record.id().to_hex() }]).to_string())
        .create_async()
        .await;

    assert_eq!(ledger(&server).transfer(&record).await.unwrap(), record.id());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_offer_requests_are_signed() {
    let mut server = Server::new_async().await;
    let (sender, receiver) = (account(1), account(2));
    let builder = RecordBuilder::new(Network::Testnet);
    let record = builder
        .build_offer(&TxId::new([0xaa; 32]), receiver.account_number(), &sender, None)
        .unwrap();
    let countersignature = builder.countersign(&record, &receiver).unwrap().countersignature;

    let create = server
        .mock("POST", "/v2/transfer_offers")
        .match_header("requester", sender.account_number().as_str())
        .match_header("timestamp", Matcher::Regex("^[0-9]+$".to_string()))
        .match_header("signature", Matcher::Regex("^[0-9a-f]{128}$".to_string()))
        .match_body(Matcher::PartialJson(json!({
            "from": sender.account_number().as_str(),
            "extra_info": { "note": "hi" }
        })))
        .with_status(200)
        .with_body(r#"{"offer_id":"5ee8cbdb-1f7e"}"#)
        .create_async()
        .await;

    let reply = server
        .mock("PATCH", "/v2/transfer_offers")
        .match_header("requester", receiver.account_number().as_str())
        .match_header("signature", Matcher::Regex("^[0-9a-f]{128}$".to_string()))
        .match_body(Matcher::Json(json!({
            "id": "5ee8cbdb-1f7e",
            "reply": { "action": "reject", "countersignature": countersignature.to_hex() }
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let ledger = ledger(&server);
    let offer_id = ledger
        .submit_offer(&sender, &record, Some(json!({ "note": "hi" })))
        .await
        .unwrap();
    assert_eq!(offer_id, "5ee8cbdb-1f7e");

    let tx = ledger
        .respond_offer(&receiver, &offer_id, &OfferReply::reject(countersignature))
        .await
        .unwrap();
    assert_eq!(tx, None);

    create.assert_async().await;
    reply.assert_async().await;
}

#[tokio::test]
async fn test_conflicting_offer_is_stale_and_not_retried() {
    let mut server = Server::new_async().await;
    let (sender, receiver) = (account(1), account(2));
    let bitmark_id = TxId::new([0x11; 32]);

    let lookup = server
        .mock("GET", format!("/v1/bitmarks/{}", bitmark_id).as_str())
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("asset".to_string(), "true".to_string()),
            Matcher::UrlEncoded("provenance".to_string(), "true".to_string()),
        ]))
        .with_status(200)
        .with_body(bitmark_body(&bitmark_id, &sender).to_string())
        .create_async()
        .await;
    let offer = server
        .mock("POST", "/v2/transfer_offers")
        .with_status(409)
        .with_body(r#"{"code":2013,"message":"link does not match head"}"#)
        .expect(1)
        .create_async()
        .await;

    let engine = TransferEngine::new(Arc::new(ledger(&server)), Network::Testnet)
        .with_retry(RetryPolicy::fixed(5, Duration::from_millis(10)));
    let err = engine
        .offer(&sender, &bitmark_id, receiver.account_number(), None)
        .await
        .unwrap_err();

    match err {
        LedgerError::StaleOwnership(message) => assert!(message.contains("link does not match head")),
        other => panic!("expected StaleOwnership, got {:?}", other),
    }
    lookup.assert_async().await;
    offer.assert_async().await;
}

#[tokio::test]
async fn test_offer_by_non_owner_fails_before_submission() {
    let mut server = Server::new_async().await;
    let (owner, other) = (account(1), account(2));
    let bitmark_id = TxId::new([0x22; 32]);

    server
        .mock("GET", format!("/v1/bitmarks/{}", bitmark_id).as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(bitmark_body(&bitmark_id, &owner).to_string())
        .create_async()
        .await;
    let offer = server
        .mock("POST", "/v2/transfer_offers")
        .expect(0)
        .create_async()
        .await;

    let engine = TransferEngine::new(Arc::new(ledger(&server)), Network::Testnet);
    assert!(matches!(
        engine
            .offer(&other, &bitmark_id, owner.account_number(), None)
            .await,
        Err(LedgerError::StaleOwnership(_))
    ));
    offer.assert_async().await;
}

#[tokio::test]
async fn test_accept_via_http() {
    let mut server = Server::new_async().await;
    let (sender, receiver) = (account(1), account(2));
    let builder = RecordBuilder::new(Network::Testnet);
    let record = builder
        .build_offer(&TxId::new([0xaa; 32]), receiver.account_number(), &sender, None)
        .unwrap();
    let countersigned = builder.countersign(&record, &receiver).unwrap();

    server
        .mock("GET", "/v2/transfer_offers")
        .match_query(Matcher::UrlEncoded("offer_id".to_string(), "offer-9".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "offer": {
                    "id": "offer-9",
                    "from": sender.account_number().as_str(),
                    "to": receiver.account_number().as_str(),
                    "record": record,
                    "extra_info": {},
                    "created_at": "2024-05-01T10:00:00Z",
                    "open": true
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let patch = server
        .mock("PATCH", "/v2/transfer_offers")
        .match_body(Matcher::Json(json!({
            "id": "offer-9",
            "reply": {
                "action": "accept",
                "countersignature": countersigned.countersignature.to_hex()
            }
        })))
        .with_status(200)
        .with_body(json!({ "tx_id": countersigned.id().to_hex() }).to_string())
        .create_async()
        .await;

    let engine = TransferEngine::new(Arc::new(ledger(&server)), Network::Testnet);
    let tx_id = engine.accept(&receiver, "offer-9").await.unwrap();
    assert_eq!(tx_id, countersigned.id());
    patch.assert_async().await;
}

#[tokio::test]
async fn test_tx_status_and_raw_error_bodies() {
    let mut server = Server::new_async().await;
    let owner = account(1);
    let confirmed = TxId::new([0x33; 32]);
    let broken = TxId::new([0x44; 32]);

    server
        .mock("GET", format!("/v1/txs/{}", confirmed).as_str())
        .match_query(Matcher::UrlEncoded("pending".to_string(), "true".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "tx": {
                    "id": confirmed.to_hex(),
                    "owner": owner.account_number().as_str(),
                    "status": "confirmed",
                    "previous_id": "",
                    "bitmark_id": confirmed.to_hex(),
                    "asset_id": "cc".repeat(32),
                    "block_number": 42
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", format!("/v1/txs/{}", broken).as_str())
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;

    let ledger = ledger(&server);
    let tx = ledger.get_tx(&confirmed).await.unwrap();
    assert_eq!(tx.previous_id, None);
    assert_eq!(tx.bitmark_id, Some(confirmed));
    assert_eq!(tx.block_number, 42);

    assert_eq!(
        ledger.get_tx(&broken).await,
        Err(LedgerError::Service {
            status: 502,
            code: 0,
            message: "Bad Gateway".to_string()
        })
    );
}

#[tokio::test]
async fn test_query_bitmarks_sends_filter() {
    let mut server = Server::new_async().await;
    let (owner, receiver) = (account(1), account(2));
    let bitmark_id = TxId::new([0x55; 32]);
    let mut body = bitmark_body(&bitmark_id, &owner)["bitmark"].clone();
    body["offer"] = json!({
        "id": "offer-3",
        "from": owner.account_number().as_str(),
        "to": receiver.account_number().as_str()
    });

    let mock = server
        .mock("GET", "/v1/bitmarks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("offer_to".to_string(), receiver.account_number().to_string()),
            Matcher::UrlEncoded("limit".to_string(), "10".to_string()),
            Matcher::UrlEncoded("asset".to_string(), "true".to_string()),
        ]))
        .with_status(200)
        .with_body(json!({ "bitmarks": [body] }).to_string())
        .create_async()
        .await;

    let query = BitmarkQuery::new()
        .offer_to(receiver.account_number().clone())
        .limit(10);
    let found = ledger(&server).query_bitmarks(&query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, bitmark_id);
    assert_eq!(found[0].offer.as_ref().map(|o| &o.to), Some(receiver.account_number()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_offers_splits_sent_and_received() {
    let mut server = Server::new_async().await;
    let (me, other) = (account(1), account(2));
    let builder = RecordBuilder::new(Network::Testnet);
    let outgoing = builder
        .build_offer(&TxId::new([0xaa; 32]), other.account_number(), &me, None)
        .unwrap();
    let incoming = builder
        .build_offer(&TxId::new([0xbb; 32]), me.account_number(), &other, None)
        .unwrap();
    let offer = |id: &str, from: &Account, to: &Account, record: &TransferOfferRecord| {
        json!({
            "id": id,
            "from": from.account_number().as_str(),
            "to": to.account_number().as_str(),
            "record": record,
            "extra_info": {},
            "created_at": "2024-05-01T10:00:00Z",
            "open": true
        })
    };

    let mock = server
        .mock("GET", "/v2/transfer_offers")
        .match_query(Matcher::UrlEncoded(
            "requester".to_string(),
            me.account_number().to_string(),
        ))
        .with_status(200)
        .with_body(
            json!({
                "offers": {
                    "from": [offer("offer-1", &me, &other, &outgoing)],
                    "to": [offer("offer-2", &other, &me, &incoming)]
                }
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let engine = TransferEngine::new(Arc::new(ledger(&server)), Network::Testnet);
    let offers = engine.offers(me.account_number()).await.unwrap();
    assert_eq!(offers.sent.len(), 1);
    assert_eq!(offers.sent[0].id, "offer-1");
    assert_eq!(offers.received[0].record, incoming);

    let incoming_offers = engine.incoming_offers(me.account_number()).await.unwrap();
    assert_eq!(incoming_offers.len(), 1);
    assert_eq!(incoming_offers[0].id, "offer-2");
    mock.assert_async().await;
}
