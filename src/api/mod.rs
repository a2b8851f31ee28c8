//! Request layer: transport seam and the sequenced API client.
//!
//! Provides the single path every API call takes: commands are wrapped in a
//! one-element JSON array, posted to `{base_url}?id={seq}[&sid={session}]`,
//! and unwrapped from a one-element response array or a bare numeric error
//! code. Transient failures (transport errors and the server's "try again"
//! code) are retried with a short pause; the sequence number advances on
//! every attempt, successful or not.
//!
//! ## Features
//!
//! - **Transport seam**: HTTP is consumed through the [`Transport`] trait,
//!   so tests substitute an in-memory server
//! - **Monotonic sequencing**: a randomly seeded atomic counter appears as
//!   the `id` query parameter of every request
//! - **Session plumbing**: the session id, once established, rides along as
//!   the `sid` parameter
//! - **Typed errors**: negative application codes surface as crate errors
//!   instead of leaking protocol integers

use crate::libs::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod commands;

pub use commands::Request;

/// Application error code meaning "try again".
pub const ERR_AGAIN: i64 = -3;

/// Pause between retries of a transient failure.
const RETRY_PAUSE: Duration = Duration::from_millis(200);

/// The HTTP capability the core consumes.
///
/// One method per exchange shape the protocol uses: a JSON command post, a
/// chunk range fetch, and a chunk post that may answer with a completion
/// handle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts a JSON body and returns the response body.
    async fn post_json(&self, url: &str, body: &str) -> Result<String>;

    /// Fetches one chunk range; the range is encoded in the URL.
    async fn get_chunk(&self, url: &str) -> Result<Vec<u8>>;

    /// Posts one ciphertext chunk; the body returned is empty or a
    /// completion handle.
    async fn post_chunk(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// [`Transport`] over a shared reqwest client.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport applying `timeout` to every exchange.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &str) -> Result<String> {
        let res = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_owned())
            .send()
            .await?
            .error_for_status()?;
        Ok(res.text().await?)
    }

    async fn get_chunk(&self, url: &str) -> Result<Vec<u8>> {
        let res = self.http.get(url).send().await?.error_for_status()?;
        Ok(res.bytes().await?.to_vec())
    }

    async fn post_chunk(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let res = self.http.post(url).body(body).send().await?.error_for_status()?;
        Ok(res.bytes().await?.to_vec())
    }
}

/// Sequenced API client shared by every operation of one `Mega` instance.
pub struct Api {
    transport: Arc<dyn Transport>,
    base_url: String,
    retries: u32,
    sequence: AtomicU64,
    session_id: RwLock<Option<String>>,
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("base_url", &self.base_url)
            .field("retries", &self.retries)
            .field("sequence", &self.sequence)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Api {
    /// Creates a client; the sequence counter is seeded with 32 random bits.
    pub fn new(transport: Arc<dyn Transport>, base_url: String, retries: u32) -> Self {
        Self {
            transport,
            base_url,
            retries,
            sequence: AtomicU64::new(rand::rngs::OsRng.next_u32() as u64),
            session_id: RwLock::new(None),
        }
    }

    /// Attaches the session id carried by all subsequent requests.
    pub fn set_session(&self, session_id: String) {
        *self.session_id.write() = Some(session_id);
    }

    /// The current session id, if a login succeeded.
    pub fn session(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// The transport, shared with the transfer engine's chunk workers.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// The current sequence counter value.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Issues one command and returns the raw response object.
    ///
    /// Retries transport failures and "try again" answers up to the
    /// configured budget, advancing the sequence number on each attempt.
    pub async fn request(&self, request: &Request) -> Result<Value> {
        let body = serde_json::to_string(&[request])?;
        let mut attempt: u32 = 0;
        loop {
            let url = self.next_url();
            debug!(url = %url, attempt, "api request");

            let outcome = match self.transport.post_json(&url, &body).await {
                Ok(text) => parse_response(&text),
                Err(err) => Err(err),
            };

            match outcome {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "transient api failure, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(Error::Eagain(_)) => return Err(Error::Eagain(attempt + 1)),
                other => return other,
            }
        }
    }

    /// Issues one command and deserializes the response object.
    pub async fn request_as<T: DeserializeOwned>(&self, request: &Request) -> Result<T> {
        let value = self.request(request).await?;
        serde_json::from_value(value).map_err(|err| Error::BadResp(err.to_string()))
    }

    /// Builds the next request URL, consuming one sequence number.
    fn next_url(&self) -> String {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        match self.session() {
            Some(sid) => format!("{}?id={}&sid={}", self.base_url, id, sid),
            None => format!("{}?id={}", self.base_url, id),
        }
    }
}

/// Unwraps a response body: a one-element array of an object, a one-element
/// array of a numeric code, or a bare numeric code.
fn parse_response(text: &str) -> Result<Value> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| Error::BadResp("response is not JSON".into()))?;

    let item = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        scalar @ Value::Number(_) => scalar,
        _ => return Err(Error::BadResp("expected a one-element response array".into())),
    };

    match item {
        Value::Number(code) => {
            let code = code
                .as_i64()
                .ok_or_else(|| Error::BadResp("non-integer status code".into()))?;
            match code {
                0 => Ok(Value::Number(0.into())),
                ERR_AGAIN => Err(Error::Eagain(0)),
                _ => Err(Error::Api(code)),
            }
        }
        object => Ok(object),
    }
}
