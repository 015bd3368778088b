//! # Subgraph Client
//!
//! GraphQL-over-HTTP transport for subgraph endpoints, plus `SubgraphCollection`,
//! the `PageSource` that turns one collection query into a paginated fetch.
//!
//! Every request goes through the endpoint's shared `RateGate` first. Transport
//! failures, non-2xx statuses, GraphQL `errors` arrays, and responses missing the
//! requested collection are all surfaced as `SnapshotError`s so the retry layer
//! can handle them uniformly.

use crate::error::{Result, SnapshotError};
use crate::pagination::{PageCursor, PageSource};
use crate::rate_gate::RateGate;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Rate-limited GraphQL client bound to a single subgraph endpoint.
pub struct SubgraphClient {
    client: reqwest::Client,
    endpoint: String,
    gate: Arc<RateGate>,
}

impl SubgraphClient {
    pub fn new(endpoint: &str, gate: Arc<RateGate>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, endpoint, gate))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str, gate: Arc<RateGate>) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            gate,
        }
    }

    /// Sends one query and returns the raw `data` object.
    pub async fn query(&self, query: &str, variables: &Value) -> Result<Value> {
        self.gate.acquire().await;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotError::Status {
                endpoint: self.endpoint.clone(),
                status,
            });
        }

        let body = response.bytes().await?;
        decode_data(&self.endpoint, &body)
    }

    /// Sends one query and decodes `data[collection]` into typed items.
    pub async fn query_collection<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
        collection: &str,
    ) -> Result<Vec<T>> {
        let data = self.query(query, variables).await?;
        decode_collection(&self.endpoint, data, collection)
    }
}

fn decode_data(endpoint: &str, body: &[u8]) -> Result<Value> {
    let envelope: GraphQlEnvelope = serde_json::from_slice(body)?;

    if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
        let messages = errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SnapshotError::GraphQl {
            endpoint: endpoint.to_string(),
            messages,
        });
    }

    envelope.data.ok_or_else(|| SnapshotError::GraphQl {
        endpoint: endpoint.to_string(),
        messages: "response has neither data nor errors".to_string(),
    })
}

fn decode_collection<T: DeserializeOwned>(
    endpoint: &str,
    mut data: Value,
    collection: &str,
) -> Result<Vec<T>> {
    let items = data
        .get_mut(collection)
        .map(Value::take)
        .filter(|v| !v.is_null())
        .ok_or_else(|| SnapshotError::MissingCollection {
            endpoint: endpoint.to_string(),
            collection: collection.to_string(),
        })?;
    Ok(serde_json::from_value(items)?)
}

/// One subgraph collection query, paginated through GraphQL variables.
///
/// The query must declare `$first` plus `$lastId` (cursor strategy) or `$skip`
/// (offset strategy); any other variables come from `variables`.
pub struct SubgraphCollection<T> {
    name: String,
    client: Arc<SubgraphClient>,
    query: String,
    collection: String,
    variables: Map<String, Value>,
    _item: PhantomData<fn() -> T>,
}

impl<T> SubgraphCollection<T> {
    pub fn new(
        name: &str,
        client: Arc<SubgraphClient>,
        query: &str,
        collection: &str,
        variables: Map<String, Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            client,
            query: query.to_string(),
            collection: collection.to_string(),
            variables,
            _item: PhantomData,
        }
    }

    fn page_variables(&self, cursor: &PageCursor, page_size: usize) -> Value {
        let mut vars = self.variables.clone();
        vars.insert("first".to_string(), json!(page_size));
        match cursor {
            PageCursor::After(last_id) => {
                vars.insert("lastId".to_string(), json!(last_id));
            }
            PageCursor::Skip(skip) => {
                vars.insert("skip".to_string(), json!(skip));
            }
        }
        Value::Object(vars)
    }
}

#[async_trait]
impl<T> PageSource<T> for SubgraphCollection<T>
where
    T: DeserializeOwned + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Vec<T>> {
        let variables = self.page_variables(cursor, page_size);
        debug!("[{}] querying {} ({})", self.name, self.collection, cursor);
        self.client
            .query_collection(&self.query, &variables, &self.collection)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Holder {
        id: String,
        balance: String,
    }

    #[test]
    fn test_decode_collection() {
        let body = br#"{"data":{"userBalances":[{"id":"0x01","balance":"10"},{"id":"0x02","balance":"20"}]}}"#;
        let data = decode_data("e", body).unwrap();
        let holders: Vec<Holder> = decode_collection("e", data, "userBalances").unwrap();
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[1].balance, "20");
    }

    #[test]
    fn test_graphql_errors_are_surfaced() {
        let body = br#"{"errors":[{"message":"indexing_error"},{"message":"block not found"}]}"#;
        match decode_data("e", body) {
            Err(SnapshotError::GraphQl { messages, .. }) => {
                assert_eq!(messages, "indexing_error; block not found")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_or_null_collection() {
        let data = decode_data("e", br#"{"data":{"other":[]}}"#).unwrap();
        let result: Result<Vec<Holder>> = decode_collection("e", data, "userBalances");
        assert!(matches!(result, Err(SnapshotError::MissingCollection { .. })));

        let data = decode_data("e", br#"{"data":{"userBalances":null}}"#).unwrap();
        let result: Result<Vec<Holder>> = decode_collection("e", data, "userBalances");
        assert!(matches!(result, Err(SnapshotError::MissingCollection { .. })));
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        assert!(matches!(decode_data("e", b"<html>502</html>"), Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn test_page_variables() {
        let gate = Arc::new(RateGate::new(5, Duration::from_secs(1)).unwrap());
        let client = Arc::new(SubgraphClient::with_client(reqwest::Client::new(), "http://localhost", gate));
        let mut fixed = Map::new();
        fixed.insert("block".to_string(), json!(123));
        let collection: SubgraphCollection<Holder> =
            SubgraphCollection::new("holders", client, "query {}", "userBalances", fixed);

        let vars = collection.page_variables(&PageCursor::After("0xab".to_string()), 1000);
        assert_eq!(vars, json!({ "block": 123, "first": 1000, "lastId": "0xab" }));

        let vars = collection.page_variables(&PageCursor::Skip(2000), 1000);
        assert_eq!(vars, json!({ "block": 123, "first": 1000, "skip": 2000 }));
    }
}
