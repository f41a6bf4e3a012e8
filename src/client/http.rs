// HTTP client for the ledger service API
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{LedgerApi, OfferReply, Requester};
use crate::error::{LedgerError, LedgerResult};
use crate::ids::{BitmarkId, TxId};
use crate::record::{AssetRecord, CountersignedTransferRecord, IssueRecord, TransferOfferRecord, TransferRecord};
use crate::account::AccountNumber;
use crate::types::{empty_as_none, AccountOffers, Bitmark, BitmarkQuery, TransferOffer, TxInfo};

/// Context part shared by every signed offer call.
const OFFER_CONTEXT: &str = "transferOffer";

#[derive(Deserialize)]
struct ServiceErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct TxRef {
    #[serde(rename = "txId")]
    tx_id: TxId,
}

#[derive(Deserialize)]
struct OfferCreated {
    offer_id: String,
}

#[derive(Deserialize)]
struct OfferCompleted {
    #[serde(default, deserialize_with = "empty_as_none")]
    tx_id: Option<TxId>,
}

#[derive(Deserialize)]
struct OfferEnvelope {
    offer: TransferOffer,
}

#[derive(Deserialize)]
struct TxEnvelope {
    tx: TxInfo,
}

#[derive(Deserialize)]
struct BitmarkEnvelope {
    bitmark: Bitmark,
}

#[derive(Deserialize)]
struct BitmarkList {
    #[serde(default)]
    bitmarks: Vec<Bitmark>,
}

#[derive(Deserialize)]
struct OfferList {
    #[serde(default)]
    offers: AccountOffers,
}

/// Message covered by the `signature` header: the context parts, the
/// requester's account number and the timestamp, joined with `|`.
pub fn request_signing_message(parts: &[&str], account_number: &str, timestamp: &str) -> String {
    let mut all: Vec<&str> = parts.to_vec();
    all.push(account_number);
    all.push(timestamp);
    all.join("|")
}

fn service_error(status: u16, body: &str) -> LedgerError {
    match serde_json::from_str::<ServiceErrorBody>(body) {
        Ok(err) => LedgerError::Service {
            status,
            code: err.code,
            message: err.message,
        },
        Err(_) => LedgerError::Service {
            status,
            code: 0,
            message: body.to_string(),
        },
    }
}

pub struct HttpLedger {
    endpoint: String,
    client: Client,
}

impl HttpLedger {
    pub fn new(endpoint: &str, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn signed(&self, request: RequestBuilder, requester: Requester<'_>, parts: &[&str]) -> RequestBuilder {
        let account_number = requester.account_number().to_string();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let message = request_signing_message(parts, &account_number, &timestamp);
        let signature = requester.sign(message.as_bytes());

        request
            .header("requester", account_number)
            .header("timestamp", timestamp)
            .header("signature", signature.to_hex())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> LedgerResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "ledger service rejected request");
            return Err(service_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            LedgerError::Serialization(format!("unexpected response: {} ({})", body, e))
        })
    }

    async fn post_transfer(&self, path: &str, body: serde_json::Value) -> LedgerResult<TxId> {
        let result: Vec<TxRef> = self
            .send(self.client.post(self.url(path)).json(&body))
            .await?;
        result
            .into_iter()
            .next()
            .map(|r| r.tx_id)
            .ok_or_else(|| LedgerError::Serialization("empty transfer response".to_string()))
    }
}

#[async_trait]
impl LedgerApi for HttpLedger {
    async fn issue(
        &self,
        asset: Option<&AssetRecord>,
        issues: &[IssueRecord],
    ) -> LedgerResult<Vec<BitmarkId>> {
        let mut body = json!({ "issues": issues });
        if let Some(asset) = asset {
            body["assets"] = json!([asset]);
        }

        debug!(count = issues.len(), "submitting issues");
        let result: Vec<TxRef> = self
            .send(self.client.post(self.url("/v3/issue")).json(&body))
            .await?;
        Ok(result.into_iter().map(|r| r.tx_id).collect())
    }

    async fn transfer(&self, record: &TransferRecord) -> LedgerResult<TxId> {
        debug!(link = %record.link, "submitting transfer");
        self.post_transfer("/v2/transfer", json!({ "transfer": record }))
            .await
    }

    async fn submit_countersigned_transfer(
        &self,
        record: &CountersignedTransferRecord,
    ) -> LedgerResult<TxId> {
        debug!(link = %record.link, "submitting countersigned transfer");
        self.post_transfer("/v1/transfer", json!({ "transfer": record }))
            .await
    }

    async fn submit_offer(
        &self,
        requester: Requester<'_>,
        record: &TransferOfferRecord,
        extra_info: Option<serde_json::Value>,
    ) -> LedgerResult<String> {
        let record_json = serde_json::to_string(record)?;
        let body = json!({
            "from": requester.account_number(),
            "record": record,
            "extra_info": extra_info,
        });

        debug!(link = %record.link, "submitting transfer offer");
        let request = self.signed(
            self.client.post(self.url("/v2/transfer_offers")).json(&body),
            requester,
            &[OFFER_CONTEXT, &record_json],
        );
        let result: OfferCreated = self.send(request).await?;
        Ok(result.offer_id)
    }

    async fn respond_offer(
        &self,
        requester: Requester<'_>,
        offer_id: &str,
        reply: &OfferReply,
    ) -> LedgerResult<Option<TxId>> {
        let body = json!({ "id": offer_id, "reply": reply });

        debug!(offer_id, action = %reply.action, "replying to transfer offer");
        let request = self.signed(
            self.client.patch(self.url("/v2/transfer_offers")).json(&body),
            requester,
            &[OFFER_CONTEXT, "patch"],
        );
        let result: OfferCompleted = self.send(request).await?;
        Ok(result.tx_id)
    }

    async fn get_offer(&self, offer_id: &str) -> LedgerResult<TransferOffer> {
        let request = self
            .client
            .get(self.url("/v2/transfer_offers"))
            .query(&[("offer_id", offer_id)]);
        let result: OfferEnvelope = self.send(request).await?;
        Ok(result.offer)
    }

    async fn get_tx(&self, id: &TxId) -> LedgerResult<TxInfo> {
        let request = self
            .client
            .get(self.url(&format!("/v1/txs/{}", id)))
            .query(&[("pending", "true")]);
        let result: TxEnvelope = self.send(request).await?;
        Ok(result.tx)
    }

    async fn get_bitmark(&self, id: &BitmarkId) -> LedgerResult<Bitmark> {
        let request = self
            .client
            .get(self.url(&format!("/v1/bitmarks/{}", id)))
            .query(&[("asset", "true"), ("provenance", "true")]);
        let result: BitmarkEnvelope = self.send(request).await?;
        Ok(result.bitmark)
    }

    async fn query_bitmarks(&self, query: &BitmarkQuery) -> LedgerResult<Vec<Bitmark>> {
        let request = self
            .client
            .get(self.url("/v1/bitmarks"))
            .query(&query.query_pairs());
        let result: BitmarkList = self.send(request).await?;
        Ok(result.bitmarks)
    }

    async fn list_offers(&self, account: &AccountNumber) -> LedgerResult<AccountOffers> {
        let request = self
            .client
            .get(self.url("/v2/transfer_offers"))
            .query(&[("requester", account.as_str())]);
        let result: OfferList = self.send(request).await?;
        Ok(result.offers)
    }
}
