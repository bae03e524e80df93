// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Broker Adapters
//!
//! - [`KafkaRestBroker`] produces to Kafka through a REST proxy speaking the
//!   v2 JSON API (`POST /topics/{topic}`). The call returns only once the proxy
//!   reports the partition offset, i.e. after the broker acknowledged.
//! - [`InMemoryBroker`] keeps deliveries in memory, with scripted failures and
//!   hangs for exercising the relay.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::domain::broker::{BrokerError, DeliveryAck, MessageBroker};

// ============================================================================
// Kafka REST proxy
// ============================================================================

const KAFKA_JSON_V2: &str = "application/vnd.kafka.json.v2+json";
const KAFKA_V2: &str = "application/vnd.kafka.v2+json";

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: Vec<ProduceRecord<'a>>,
}

#[derive(Serialize)]
struct ProduceRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<PartitionOffset>,
}

#[derive(Deserialize)]
struct PartitionOffset {
    partition: Option<i32>,
    offset: Option<i64>,
    error_code: Option<i64>,
    error: Option<String>,
}

pub struct KafkaRestBroker {
    client: reqwest::Client,
    endpoint: String,
}

impl KafkaRestBroker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }
}

#[async_trait]
impl MessageBroker for KafkaRestBroker {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<DeliveryAck, BrokerError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let body = serde_json::to_vec(&ProduceRequest {
            records: vec![ProduceRecord { key, value }],
        })
        .map_err(|e| BrokerError::Serialization(e.to_string()))?;

        let url = format!("{}/topics/{}", self.endpoint, topic);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, KAFKA_JSON_V2)
            .header(ACCEPT, KAFKA_V2)
            .body(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("HTTP {status}: {detail}");
            return Err(if status.is_client_error() {
                BrokerError::Rejected(message)
            } else {
                BrokerError::Transport(message)
            });
        }

        let produced: ProduceResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::Transport(format!("unreadable produce response: {e}")))?;
        let Some(offset) = produced.offsets.into_iter().next() else {
            return Err(BrokerError::Transport("produce response had no offsets".to_string()));
        };
        if let Some(error) = offset.error {
            return Err(BrokerError::Rejected(match offset.error_code {
                Some(code) => format!("{error} (code {code})"),
                None => error,
            }));
        }

        Ok(DeliveryAck {
            partition: offset.partition,
            offset: offset.offset,
        })
    }
}

// ============================================================================
// In-memory broker
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[derive(Default)]
struct BrokerState {
    attempts: Vec<Delivery>,
    delivered: Vec<Delivery>,
    fail_next: u32,
    hang_next: u32,
    reject_containing: Vec<String>,
}

enum Outcome {
    Deliver(i64),
    Fail,
    Reject(String),
    Hang,
}

#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next += n;
    }

    /// Never acknowledge the next `n` sends.
    pub fn hang_next(&self, n: u32) {
        self.state.lock().hang_next += n;
    }

    /// Reject every payload containing `needle`, forever.
    pub fn reject_payloads_containing(&self, needle: impl Into<String>) {
        self.state.lock().reject_containing.push(needle.into());
    }

    /// Acknowledged messages, in send order.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.state.lock().delivered.clone()
    }

    /// Every send call, acknowledged or not, in call order.
    pub fn attempt_log(&self) -> Vec<Delivery> {
        self.state.lock().attempts.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts.len()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn send(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> Result<DeliveryAck, BrokerError> {
        let delivery = Delivery {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload: payload.to_vec(),
        };

        let outcome = {
            let mut state = self.state.lock();
            state.attempts.push(delivery.clone());
            let text = delivery.payload_str().into_owned();
            let rejected = state
                .reject_containing
                .iter()
                .find(|needle| text.contains(needle.as_str()))
                .cloned();

            if state.hang_next > 0 {
                state.hang_next -= 1;
                Outcome::Hang
            } else if state.fail_next > 0 {
                state.fail_next -= 1;
                Outcome::Fail
            } else if let Some(needle) = rejected {
                Outcome::Reject(needle)
            } else {
                state.delivered.push(delivery);
                Outcome::Deliver(state.delivered.len() as i64 - 1)
            }
        };

        match outcome {
            Outcome::Deliver(offset) => Ok(DeliveryAck {
                partition: Some(0),
                offset: Some(offset),
            }),
            Outcome::Fail => Err(BrokerError::Transport("broker unavailable".to_string())),
            Outcome::Reject(needle) => Err(BrokerError::Rejected(format!("payload matched '{needle}'"))),
            Outcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(BrokerError::Transport("broker never answered".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn kafka_rest_produces_keyed_json_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/topics/forum.events")
            .match_header("content-type", KAFKA_JSON_V2)
            .match_body(Matcher::Json(json!({
                "records": [{ "key": "thread-1", "value": { "event_type": "ThreadCreated" } }]
            })))
            .with_status(200)
            .with_header("content-type", KAFKA_V2)
            .with_body(r#"{"key_schema_id":null,"value_schema_id":null,"offsets":[{"partition":2,"offset":17,"error_code":null,"error":null}]}"#)
            .create_async()
            .await;

        let broker = KafkaRestBroker::new(format!("{}/", server.url()));
        let ack = broker
            .send("forum.events", Some("thread-1"), br#"{"event_type":"ThreadCreated"}"#)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(ack.partition, Some(2));
        assert_eq!(ack.offset, Some(17));
    }

    #[tokio::test]
    async fn kafka_rest_omits_null_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/topics/t")
            .match_body(Matcher::Json(json!({ "records": [{ "value": { "a": 1 } }] })))
            .with_status(200)
            .with_body(r#"{"offsets":[{"partition":0,"offset":1}]}"#)
            .create_async()
            .await;

        let broker = KafkaRestBroker::new(server.url());
        broker.send("t", None, br#"{"a":1}"#).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn kafka_rest_maps_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/topics/bad")
            .with_status(422)
            .with_body(r#"{"error_code":42201,"message":"Unrecognized field"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/topics/down")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("POST", "/topics/partial")
            .with_status(200)
            .with_body(r#"{"offsets":[{"partition":null,"offset":null,"error_code":40403,"error":"Topic not authorized"}]}"#)
            .create_async()
            .await;

        let broker = KafkaRestBroker::new(server.url());
        let payload = br#"{"a":1}"#;

        assert!(matches!(broker.send("bad", None, payload).await, Err(BrokerError::Rejected(_))));
        assert!(matches!(broker.send("down", None, payload).await, Err(BrokerError::Transport(_))));
        assert!(matches!(broker.send("partial", None, payload).await, Err(BrokerError::Rejected(_))));
        assert!(matches!(
            broker.send("bad", None, b"not json").await,
            Err(BrokerError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_broker_follows_its_script() {
        let broker = InMemoryBroker::new();
        broker.fail_next(1);
        broker.reject_payloads_containing("poison");

        assert!(broker.send("t", None, b"first").await.is_err());
        assert!(broker.send("t", Some("k"), b"poison pill").await.is_err());
        let ack = broker.send("t", Some("k"), b"fine").await.unwrap();

        assert_eq!(ack.offset, Some(0));
        assert_eq!(broker.attempts(), 3);
        assert_eq!(broker.deliveries().len(), 1);
        assert_eq!(broker.deliveries()[0].payload_str(), "fine");
    }
}
