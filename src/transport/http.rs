//! HTTP client for the room API.

use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RoomApi;
use crate::config::ClientConfig;
use crate::error::{Result, SantaError};
use crate::model::{
    Ack, CreatePollRequest, CreateRoomRequest, HealthStatus, JoinRequest, Participant, Poll,
    Room, StartGameResponse, VoteRequest,
};

/// JSON-over-HTTP client for the room API.
///
/// Endpoints are addressed as path segments below `api_base`; each segment is
/// percent-encoded, so room codes and ids never need escaping by the caller.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api_base: String,
    web_base: String,
    client: reqwest::Client,
}

/// FastAPI error body. `detail` is a string for `HTTPException`s and a list
/// for validation failures.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SantaError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            api_base: config.api_base.clone(),
            web_base: config.web_base(),
            client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// One request/response round trip.
    ///
    /// Serializes `body` as JSON when present and decodes the reply as `R`.
    /// A non-success status becomes [`SantaError::Api`] carrying the server's
    /// `detail`, or [`SantaError::NotFound`] for "not found" replies.
    pub async fn call<B, R>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = endpoint_url(&self.api_base, segments)?;
        debug!(%method, %url, "api call");

        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.detail)
                .map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
            return Err(SantaError::from_status(status.as_u16(), detail));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `GET /health` at the server root (outside the API prefix).
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = endpoint_url(&self.web_base, &["health"])?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SantaError::from_status(status.as_u16(), None));
        }
        Ok(resp.json().await?)
    }
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| SantaError::Config(format!("bad URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| SantaError::Config(format!("URL {base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl RoomApi for ApiClient {
    async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room> {
        self.call(Method::POST, &["rooms"], Some(req)).await
    }

    async fn join_room(&self, req: &JoinRequest) -> Result<Participant> {
        self.call(Method::POST, &["rooms", "join"], Some(req)).await
    }

    async fn fetch_room(&self, code: &str) -> Result<Room> {
        self.call(Method::GET, &["rooms", code], None::<&()>).await
    }

    async fn delete_room(&self, code: &str) -> Result<()> {
        let _: Ack = self.call(Method::DELETE, &["rooms", code], None::<&()>).await?;
        Ok(())
    }

    async fn start_game(&self, code: &str) -> Result<StartGameResponse> {
        self.call(Method::POST, &["rooms", code, "start"], None::<&()>).await
    }

    async fn remove_participant(&self, code: &str, participant_id: &str) -> Result<()> {
        let _: Ack = self
            .call(
                Method::DELETE,
                &["rooms", code, "participants", participant_id],
                None::<&()>,
            )
            .await?;
        Ok(())
    }

    async fn create_poll(&self, code: &str, req: &CreatePollRequest) -> Result<Poll> {
        self.call(Method::POST, &["rooms", code, "polls"], Some(req)).await
    }

    async fn vote_poll(&self, code: &str, poll_id: &str, req: &VoteRequest) -> Result<()> {
        let _: Ack = self
            .call(Method::POST, &["rooms", code, "polls", poll_id, "vote"], Some(req))
            .await?;
        Ok(())
    }
}
