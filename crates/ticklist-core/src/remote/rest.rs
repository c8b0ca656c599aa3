//! REST backend client
//!
//! Talks to the hosted backend: row reads and writes over its REST surface,
//! session lookup over its auth endpoints, and change notifications over its
//! realtime websocket.
//!
//! One row per (user, collection); upserts target the `user_id` conflict
//! column so repeated pushes replace the prior row. Collection payloads ride
//! in the row's `data` column as a JSON array.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::message::{change_topic, ChangePayload, Frame};
use super::{AuthBackend, AuthUser, ChangeEvent, Profile, RemoteData, RemoteStore, Subscription, UsageEvent};
use crate::error::RemoteError;
use crate::models::{Collection, Record};

/// Keep-alive cadence for the realtime socket
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Client for the hosted backend
pub struct RestRemote {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

/// A collection row as returned by the REST surface
#[derive(Debug, Deserialize)]
struct DataRow {
    #[serde(default)]
    data: Option<Value>,
}

/// The auth endpoint's user shape
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    avatar_url: String,
}

impl RestRemote {
    /// Create a client for the given backend
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
            access_token: RwLock::new(None),
        }
    }

    /// Install or clear the session token used for authorized requests
    pub fn set_access_token(&self, token: Option<String>) {
        let mut guard = self
            .access_token
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }

    fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bearer credential: the session token when present, the anonymous key
    /// otherwise
    fn bearer(&self) -> String {
        self.access_token().unwrap_or_else(|| self.api_key.clone())
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, endpoint)
    }

    /// Websocket endpoint for change notifications
    fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.api_key
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    fn patch(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .patch(url)
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }
}

/// Map an auth-failure status, otherwise require success
fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized);
    }
    if !status.is_success() {
        return Err(RemoteError::Transport(format!("backend returned {status}")));
    }
    Ok(response)
}

/// Parse a row's `data` column into records
///
/// `None`/null means the row exists without a payload, which still counts as
/// present-but-empty. A non-array payload is logged and treated the same.
fn parse_records(data: Option<Value>) -> Vec<Record> {
    match data {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.into_iter().filter_map(Record::from_value).collect(),
        Some(other) => {
            warn!("ignoring non-array collection payload: {}", other);
            Vec::new()
        }
    }
}

/// Turn a change frame payload into the event handed to the engine
fn change_event(collection: Collection, payload: Value) -> ChangeEvent {
    let parsed: ChangePayload = match serde_json::from_value(payload) {
        Ok(parsed) => parsed,
        Err(_) => {
            return ChangeEvent {
                collection,
                data: None,
                updated_at: None,
            }
        }
    };

    let row = parsed.row();
    let data = row.and_then(|r| r.get("data")).and_then(|d| match d {
        Value::Array(items) => Some(
            items
                .iter()
                .cloned()
                .filter_map(Record::from_value)
                .collect::<Vec<_>>(),
        ),
        _ => None,
    });
    let updated_at = row
        .and_then(|r| r.get("updated_at"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or(parsed.commit_timestamp);

    ChangeEvent {
        collection,
        data,
        updated_at,
    }
}

/// Pump one joined realtime topic into the event channel
async fn run_channel(
    mut write: WsSink,
    mut read: WsSource,
    topic: String,
    collection: Collection,
    tx: mpsc::UnboundedSender<ChangeEvent>,
) {
    let mut reference: u64 = 2;
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let Ok(frame) = Frame::heartbeat(reference).encode() else { continue };
                reference += 1;
                if write.send(Message::Text(frame)).await.is_err() {
                    debug!(%topic, "heartbeat failed, closing channel");
                    break;
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = Frame::decode(&text) else {
                        debug!(%topic, "ignoring undecodable frame");
                        continue;
                    };
                    if frame.topic != topic || !frame.is_change() {
                        continue;
                    }
                    if tx.send(change_event(collection, frame.payload)).is_err() {
                        // Receiver is gone, nothing left to deliver to
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(%topic, "realtime channel closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(%topic, "realtime channel error: {e}");
                    break;
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn fetch(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<RemoteData, RemoteError> {
        let response = self
            .get(&self.rest_url(collection.remote_table()))
            .query(&[
                ("select", "data,updated_at".to_string()),
                ("user_id", format!("eq.{user_id}")),
            ])
            .send()
            .await?;
        let response = expect_success(response)?;

        let mut rows: Vec<DataRow> = response.json().await?;
        let Some(row) = rows.pop() else {
            return Ok(RemoteData::Absent);
        };
        Ok(RemoteData::from_rows(Some(parse_records(row.data))))
    }

    async fn upsert(
        &self,
        collection: Collection,
        user_id: &str,
        records: &[Record],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let body = json!([{
            "user_id": user_id,
            "data": records,
            "updated_at": updated_at,
        }]);

        let response = self
            .post(&self.rest_url(collection.remote_table()))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
        user_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>, RemoteError> {
        let url = self.realtime_url();
        let (ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| RemoteError::Channel(e.to_string()))?;
        let (mut write, read) = ws_stream.split();

        let topic = change_topic(collection.remote_table(), user_id);
        let join = Frame::join(&topic, 1).encode()?;
        write
            .send(Message::Text(join))
            .await
            .map_err(|e| RemoteError::Channel(e.to_string()))?;
        debug!(%topic, "joined realtime channel");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_channel(write, read, topic, collection, tx));
        Ok(rx)
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError> {
        let response = self
            .get(&self.rest_url("user_profiles"))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{user_id}"))])
            .send()
            .await?;
        let response = expect_success(response)?;

        let mut rows: Vec<Profile> = response.json().await?;
        Ok(rows.pop())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), RemoteError> {
        let response = self
            .post(&self.rest_url("user_profiles"))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&json!([profile]))
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }

    async fn touch_last_login(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        let response = self
            .patch(&self.rest_url("user_profiles"))
            .query(&[("id", format!("eq.{user_id}"))])
            .json(&json!({"last_login": at}))
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, RemoteError> {
        let response = self
            .get(&self.rest_url("subscriptions"))
            .query(&[
                ("select", "user_id,status".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("status", "eq.active".to_string()),
            ])
            .send()
            .await?;
        let response = expect_success(response)?;

        let mut rows: Vec<Subscription> = response.json().await?;
        Ok(rows.pop())
    }

    async fn record_event(&self, event: &UsageEvent) -> Result<(), RemoteError> {
        let response = self
            .post(&self.rest_url("analytics_events"))
            .header("Prefer", "return=minimal")
            .json(&json!([event]))
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for RestRemote {
    async fn current_session(&self) -> Result<Option<AuthUser>, RemoteError> {
        let Some(token) = self.access_token() else {
            return Ok(None);
        };

        let response = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        // An expired or revoked token means signed out, not an error
        if response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        let response = expect_success(response)?;

        let user: UserResponse = response.json().await?;
        Ok(Some(AuthUser {
            id: user.id,
            email: user.email,
            full_name: user.user_metadata.full_name,
            avatar_url: user.user_metadata.avatar_url,
        }))
    }

    fn sign_in_url(&self, provider: &str) -> String {
        format!("{}?provider={}", self.auth_url("authorize"), provider)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let token = self.access_token();
        // The local token is dropped no matter what the backend says
        self.set_access_token(None);

        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;
        expect_success(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_url_scheme() {
        let remote = RestRemote::new("https://backend.example.com", "anon");
        assert!(remote
            .realtime_url()
            .starts_with("wss://backend.example.com/realtime/v1/websocket"));

        let remote = RestRemote::new("http://localhost:54321/", "anon");
        assert!(remote
            .realtime_url()
            .starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }

    #[test]
    fn test_sign_in_url() {
        let remote = RestRemote::new("https://backend.example.com", "anon");
        assert_eq!(
            remote.sign_in_url("google"),
            "https://backend.example.com/auth/v1/authorize?provider=google"
        );
    }

    #[test]
    fn test_parse_records() {
        assert!(parse_records(None).is_empty());
        assert!(parse_records(Some(Value::Null)).is_empty());
        assert!(parse_records(Some(json!({"not": "an array"}))).is_empty());

        let records = parse_records(Some(json!([{"id": "a"}, "skipped", {"id": "b"}])));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_change_event_extracts_row_data() {
        let payload = json!({
            "record": {
                "user_id": "u-1",
                "data": [{"id": "t-1", "title": "remote"}],
                "updated_at": "2025-06-01T12:00:00Z"
            }
        });

        let event = change_event(Collection::Tasks, payload);
        let data = event.data.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].id(), Some("t-1"));
        assert!(event.updated_at.is_some());
    }

    #[test]
    fn test_change_event_without_data_field() {
        let payload = json!({"record": {"user_id": "u-1"}});
        let event = change_event(Collection::Tasks, payload);
        assert!(event.data.is_none());

        let event = change_event(Collection::Tasks, json!("garbage"));
        assert!(event.data.is_none());
    }

    #[test]
    fn test_bearer_prefers_session_token() {
        let remote = RestRemote::new("https://backend.example.com", "anon");
        assert_eq!(remote.bearer(), "anon");

        remote.set_access_token(Some("session-token".to_string()));
        assert_eq!(remote.bearer(), "session-token");

        remote.set_access_token(None);
        assert_eq!(remote.bearer(), "anon");
    }
}
