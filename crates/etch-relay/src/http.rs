//! HTTP relay client
//!
//! Implements the relay effect traits over the relay's JSON API with
//! [`reqwest`]. Binary payloads travel hex encoded in JSON bodies, and
//! record keys travel hex encoded in URL paths so opaque keys survive URL
//! syntax. Missing records and unknown transactions are 404s, not errors.

use async_trait::async_trait;
use etch_core::{
    BalanceStatus, Batch, ConfirmEffects, EtchError, OwnerAddress, PaymentRef, ReadEffects,
    Receipt, ReceiptStatus, RecordKey, RelaySession, Result, SessionEffects, StoredRecord,
    SubmitAck, SubmitEffects, TxRef, WriteDescriptor, WriteId, WritePayload,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default session lifetime requested from the relay, in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

// =============================================================================
// Configuration
// =============================================================================

/// HTTP relay client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRelayConfig {
    /// Relay base URL, e.g. `https://relay.example.com`
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Session lifetime to request, in seconds
    pub session_ttl_secs: u64,
}

impl HttpRelayConfig {
    /// Create a configuration for the given relay URL with default tuning.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the session lifetime to request.
    pub fn with_session_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.session_ttl_secs = ttl_secs;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(EtchError::invalid("relay base url must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(EtchError::invalid("request timeout must be positive"));
        }
        Ok(())
    }
}

// =============================================================================
// Client
// =============================================================================

/// Relay client speaking the JSON API.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: reqwest::Client,
    config: HttpRelayConfig,
}

impl HttpRelay {
    /// Create a client, validating the configuration.
    pub fn new(config: HttpRelayConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| EtchError::network(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &HttpRelayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct SessionRequest {
    owner: String,
    ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
    expires_at: u64,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    label: String,
    /// Record value, hex encoded
    value: String,
}

#[derive(Debug, Serialize)]
struct WriteDto {
    id: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    /// Payload bytes, hex encoded
    value: String,
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    writes: Vec<WriteDto>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    acks: Vec<AckDto>,
}

#[derive(Debug, Deserialize)]
struct AckDto {
    id: String,
    #[serde(default)]
    tx: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    status: String,
    confirmations: u32,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    sufficient: bool,
    #[serde(default)]
    needed: u64,
}

#[derive(Debug, Serialize)]
struct FundingRequest {
    owner: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
struct FundingResponse {
    payment: String,
}

fn write_to_dto(descriptor: &WriteDescriptor) -> WriteDto {
    let id = descriptor.id.to_hex();
    match &descriptor.payload {
        WritePayload::Normal { key, label, value } => WriteDto {
            id,
            kind: "normal".to_string(),
            key: Some(key.as_str().to_string()),
            label: Some(label.clone()),
            value: hex::encode(value),
        },
        WritePayload::Fragment { data } => WriteDto {
            id,
            kind: "fragment".to_string(),
            key: None,
            label: None,
            value: hex::encode(data),
        },
        WritePayload::Directory {
            key,
            label,
            directory,
        } => WriteDto {
            id,
            kind: "directory".to_string(),
            key: Some(key.as_str().to_string()),
            label: Some(label.clone()),
            value: hex::encode(directory.encode().as_bytes()),
        },
    }
}

fn ack_from_dto(dto: AckDto) -> Result<SubmitAck> {
    let id = WriteId::from_hex(&dto.id)
        .map_err(|err| EtchError::serialization(format!("invalid ack write id: {err}")))?;
    if let Some(reason) = dto.error {
        return Ok(SubmitAck::Rejected { id, reason });
    }
    match dto.tx {
        Some(tx) => Ok(SubmitAck::Accepted {
            id,
            tx: TxRef::new(tx),
        }),
        None => Err(EtchError::serialization(
            "ack carries neither a transaction nor an error",
        )),
    }
}

fn parse_receipt_status(status: &str) -> Result<ReceiptStatus> {
    match status {
        "pending" => Ok(ReceiptStatus::Pending),
        "executed" => Ok(ReceiptStatus::Executed),
        "reverted" => Ok(ReceiptStatus::Reverted),
        other => Err(EtchError::serialization(format!(
            "unknown transaction status: {other}"
        ))),
    }
}

/// Error body of a failed response, falling back to the status line.
async fn failure_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {body}")
    }
}

// =============================================================================
// Effect implementations
// =============================================================================

#[async_trait]
impl ReadEffects for HttpRelay {
    async fn read_record(
        &self,
        owner: &OwnerAddress,
        key: &RecordKey,
    ) -> Result<Option<StoredRecord>> {
        let url = self.url(&format!(
            "v1/records/{}/{}",
            owner.as_str(),
            hex::encode(key.as_str())
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("record read failed: {err}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EtchError::read(format!(
                "record read failed: {}",
                failure_detail(response).await
            )));
        }

        let record: RecordResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid record response: {err}")))?;
        let value = hex::decode(&record.value)
            .map_err(|err| EtchError::serialization(format!("invalid record value hex: {err}")))?;
        Ok(Some(StoredRecord::new(record.label, value)))
    }

    async fn fragment_exists(&self, owner: &OwnerAddress, id: &WriteId) -> Result<bool> {
        let url = self.url(&format!("v1/fragments/{}/{}", owner.as_str(), id.to_hex()));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("fragment probe failed: {err}")))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(EtchError::read(format!(
                "fragment probe failed: {}",
                failure_detail(response).await
            ))),
        }
    }
}

#[async_trait]
impl SubmitEffects for HttpRelay {
    async fn submit_batch(&self, session: &RelaySession, batch: &Batch) -> Result<Vec<SubmitAck>> {
        let body = BatchRequest {
            writes: batch.descriptors.iter().map(write_to_dto).collect(),
        };
        let response = self
            .client
            .post(self.url("v1/batches"))
            .bearer_auth(&session.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("batch submission failed: {err}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(EtchError::session(format!(
                    "relay refused the session: {}",
                    failure_detail(response).await
                )));
            }
            status if !status.is_success() => {
                return Err(EtchError::submit(format!(
                    "relay refused the batch: {}",
                    failure_detail(response).await
                )));
            }
            _ => {}
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid batch response: {err}")))?;
        if parsed.acks.len() != batch.len() {
            return Err(EtchError::submit(format!(
                "relay acknowledged {} of {} writes",
                parsed.acks.len(),
                batch.len()
            )));
        }
        debug!(writes = batch.len(), "batch accepted by relay");
        parsed.acks.into_iter().map(ack_from_dto).collect()
    }
}

#[async_trait]
impl ConfirmEffects for HttpRelay {
    async fn fetch_receipt(&self, tx: &TxRef) -> Result<Option<Receipt>> {
        let url = self.url(&format!("v1/txs/{}", tx.as_str()));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("receipt fetch failed: {err}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EtchError::confirmation(format!(
                "receipt fetch failed: {}",
                failure_detail(response).await
            )));
        }

        let parsed: TxResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid receipt response: {err}")))?;
        Ok(Some(Receipt {
            tx: tx.clone(),
            status: parse_receipt_status(&parsed.status)?,
            confirmations: parsed.confirmations,
        }))
    }
}

#[async_trait]
impl SessionEffects for HttpRelay {
    async fn open_session(&self, owner: &OwnerAddress) -> Result<RelaySession> {
        let body = SessionRequest {
            owner: owner.as_str().to_string(),
            ttl_secs: self.config.session_ttl_secs,
        };
        let response = self
            .client
            .post(self.url("v1/sessions"))
            .json(&body)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("session open failed: {err}")))?;

        if !response.status().is_success() {
            return Err(EtchError::session(format!(
                "session open failed: {}",
                failure_detail(response).await
            )));
        }

        let parsed: SessionResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid session response: {err}")))?;
        Ok(RelaySession {
            token: parsed.token,
            owner: owner.clone(),
            expires_at: parsed.expires_at,
        })
    }

    async fn check_balance(&self, owner: &OwnerAddress) -> Result<BalanceStatus> {
        let url = self.url(&format!("v1/balance/{}", owner.as_str()));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("balance check failed: {err}")))?;

        if !response.status().is_success() {
            return Err(EtchError::funding(format!(
                "balance check failed: {}",
                failure_detail(response).await
            )));
        }

        let parsed: BalanceResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid balance response: {err}")))?;
        if parsed.sufficient {
            Ok(BalanceStatus::Sufficient)
        } else {
            Ok(BalanceStatus::Insufficient {
                needed: parsed.needed,
            })
        }
    }

    async fn request_funding(&self, owner: &OwnerAddress, amount: u64) -> Result<PaymentRef> {
        let body = FundingRequest {
            owner: owner.as_str().to_string(),
            amount,
        };
        let response = self
            .client
            .post(self.url("v1/funding"))
            .json(&body)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("funding request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(EtchError::funding(format!(
                "funding request failed: {}",
                failure_detail(response).await
            )));
        }

        let parsed: FundingResponse = response
            .json()
            .await
            .map_err(|err| EtchError::serialization(format!("invalid funding response: {err}")))?;
        Ok(PaymentRef::new(parsed.payment))
    }

    async fn verify_funding(&self, owner: &OwnerAddress, payment: &PaymentRef) -> Result<()> {
        let url = self.url(&format!("v1/funding/{}/verify", payment.as_str()));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|err| EtchError::network(format!("funding verification failed: {err}")))?;

        if !response.status().is_success() {
            // The relay's own message decides retryability upstream.
            return Err(EtchError::funding(failure_detail(response).await));
        }
        debug!(owner = %owner, payment = %payment, "funding verified by relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etch_core::ChunkDirectory;

    fn relay(base_url: &str) -> HttpRelay {
        HttpRelay::new(HttpRelayConfig::new(base_url)).expect("client builds")
    }

    #[test]
    fn test_config_validation() {
        assert!(HttpRelayConfig::new("").validate().is_err());
        let config = HttpRelayConfig::new("https://relay.example.com")
            .with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
        assert!(HttpRelayConfig::new("https://relay.example.com")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_url_joining_tolerates_trailing_slash() {
        let plain = relay("https://relay.example.com");
        let slashed = relay("https://relay.example.com/");
        assert_eq!(
            plain.url("v1/sessions"),
            "https://relay.example.com/v1/sessions"
        );
        assert_eq!(plain.url("v1/sessions"), slashed.url("v1/sessions"));
    }

    #[test]
    fn test_write_dto_shapes() {
        let key = RecordKey::new("greeting").unwrap();
        let normal = WriteDescriptor::normal(key.clone(), "hello", vec![0xAB, 0xCD]);
        let json = serde_json::to_value(write_to_dto(&normal)).unwrap();
        assert_eq!(json["kind"], "normal");
        assert_eq!(json["key"], "greeting");
        assert_eq!(json["label"], "hello");
        assert_eq!(json["value"], "abcd");

        let fragment = WriteDescriptor::fragment(vec![0x01]);
        let json = serde_json::to_value(write_to_dto(&fragment)).unwrap();
        assert_eq!(json["kind"], "fragment");
        assert_eq!(json["value"], "01");
        // Keyless writes omit the key and label fields entirely.
        assert!(json.get("key").is_none());
        assert!(json.get("label").is_none());

        let directory = WriteDescriptor::directory(
            key,
            "hello",
            ChunkDirectory::new(vec![fragment.id]),
        );
        let json = serde_json::to_value(write_to_dto(&directory)).unwrap();
        assert_eq!(json["kind"], "directory");
        let value = json["value"].as_str().unwrap();
        let decoded = String::from_utf8(hex::decode(value).unwrap()).unwrap();
        assert!(decoded.starts_with("v1:"));
    }

    #[test]
    fn test_ack_mapping() {
        let id = WriteId::new([7u8; 32]);

        let accepted = ack_from_dto(AckDto {
            id: id.to_hex(),
            tx: Some("tx-1".to_string()),
            error: None,
        })
        .unwrap();
        assert_eq!(
            accepted,
            SubmitAck::Accepted {
                id,
                tx: TxRef::new("tx-1")
            }
        );

        let rejected = ack_from_dto(AckDto {
            id: id.to_hex(),
            tx: None,
            error: Some("too large".to_string()),
        })
        .unwrap();
        assert_eq!(
            rejected,
            SubmitAck::Rejected {
                id,
                reason: "too large".to_string()
            }
        );

        let malformed = ack_from_dto(AckDto {
            id: id.to_hex(),
            tx: None,
            error: None,
        });
        assert!(malformed.is_err());

        let bad_id = ack_from_dto(AckDto {
            id: "nothex".to_string(),
            tx: Some("tx-1".to_string()),
            error: None,
        });
        assert!(bad_id.is_err());
    }

    #[test]
    fn test_receipt_status_parsing() {
        assert_eq!(
            parse_receipt_status("pending").unwrap(),
            ReceiptStatus::Pending
        );
        assert_eq!(
            parse_receipt_status("executed").unwrap(),
            ReceiptStatus::Executed
        );
        assert_eq!(
            parse_receipt_status("reverted").unwrap(),
            ReceiptStatus::Reverted
        );
        assert!(parse_receipt_status("confirmed").is_err());
    }

    #[test]
    fn test_ack_dto_tolerates_missing_fields() {
        let dto: AckDto = serde_json::from_str(r#"{"id":"aa"}"#).unwrap();
        assert!(dto.tx.is_none());
        assert!(dto.error.is_none());

        let dto: AckDto =
            serde_json::from_str(r#"{"id":"aa","tx":"tx-9","extra":true}"#).unwrap();
        assert_eq!(dto.tx.as_deref(), Some("tx-9"));
    }

    #[test]
    fn test_balance_response_defaults_needed() {
        let parsed: BalanceResponse = serde_json::from_str(r#"{"sufficient":true}"#).unwrap();
        assert!(parsed.sufficient);
        assert_eq!(parsed.needed, 0);
    }
}
