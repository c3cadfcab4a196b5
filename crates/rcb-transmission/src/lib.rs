//! Transmission daemon adapter (JSON RPC over HTTP).
//!
//! Implements `DownloadQueue` against `http://localhost:<port>/transmission/rpc`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use rcb_core::{
    errors::Error,
    ports::{AddOutcome, DownloadQueue, RemoveOutcome, Torrent, TorrentStatus},
    Result,
};

pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";
/// Attempts per request, counting session-id refreshes and send errors.
pub const NUM_RETRIES: usize = 3;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "status",
    "name",
    "rateDownload",
    "rateUpload",
    "percentDone",
    "totalSize",
    "errorString",
];

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    arguments: RpcArguments,
}

#[derive(Debug, Default, Deserialize)]
struct RpcArguments {
    #[serde(rename = "torrent-duplicate", default)]
    torrent_duplicate: Option<serde_json::Value>,
    #[serde(default)]
    torrents: Vec<RpcTorrent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTorrent {
    id: i64,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    rate_download: i64,
    #[serde(default)]
    rate_upload: i64,
    #[serde(default)]
    percent_done: f64,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    error_string: String,
}

impl From<RpcTorrent> for Torrent {
    fn from(t: RpcTorrent) -> Self {
        Torrent {
            id: t.id,
            name: t.name,
            status: TorrentStatus::from_code(t.status),
            percent_done: t.percent_done,
            total_size: t.total_size,
            rate_download: t.rate_download,
            rate_upload: t.rate_upload,
            error_string: t.error_string,
        }
    }
}

#[derive(Debug)]
pub struct TransmissionClient {
    http: reqwest::Client,
    rpc_url: String,
    credentials: Option<(String, String)>,
    /// Last session id handed out by the daemon.
    session_id: Mutex<String>,
}

impl TransmissionClient {
    /// Client for the daemon on localhost. Credentials are used only when both are set.
    pub fn new(port: u16, username: Option<String>, password: Option<String>) -> Result<Self> {
        Self::with_url(
            format!("http://localhost:{port}/transmission/rpc"),
            username,
            password,
        )
    }

    pub fn with_url(
        rpc_url: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::External(format!("transmission client build error: {e}")))?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
            credentials: username.zip(password),
            session_id: Mutex::new(String::new()),
        })
    }

    /// POST one request, refreshing the session id on 409 and retrying send errors.
    async fn post(&self, request: &RpcRequest<'_>) -> Result<String> {
        for attempt in 1..=NUM_RETRIES {
            let session_id = self.session_id.lock().await.clone();
            let mut req = self
                .http
                .post(&self.rpc_url)
                .header(SESSION_ID_HEADER, session_id)
                .json(request);
            if let Some((user, pass)) = &self.credentials {
                req = req.basic_auth(user, Some(pass));
            }

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(attempt, "error while sending request: {e}");
                    continue;
                }
            };

            let status = resp.status();
            if status == StatusCode::CONFLICT {
                let fresh = resp
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(fresh) = fresh {
                    tracing::debug!(attempt, "refreshed transmission session id");
                    *self.session_id.lock().await = fresh;
                    continue;
                }
                tracing::warn!("couldn't find '{SESSION_ID_HEADER}' value from http headers");
            }

            let body = resp
                .text()
                .await
                .map_err(|e| Error::Rpc(format!("failed to read RPC response: {e}")))?;
            if status != StatusCode::OK {
                tracing::warn!("error from RPC server: HTTP {}", status.as_u16());
                return Err(Error::Rpc(format!("HTTP {} ({body})", status.as_u16())));
            }
            return Ok(body);
        }

        Err(Error::Rpc(format!(
            "no more retries for this request: {}",
            request.method
        )))
    }

    async fn call(&self, method: &str, arguments: serde_json::Value) -> Result<RpcResponse> {
        let body = self.post(&RpcRequest { method, arguments }).await?;
        serde_json::from_str(&body).map_err(|_| Error::MalformedResponse(body))
    }
}

#[async_trait]
impl DownloadQueue for TransmissionClient {
    async fn list(&self) -> Result<Vec<Torrent>> {
        let resp = self
            .call("torrent-get", json!({ "fields": TORRENT_FIELDS }))
            .await?;
        if resp.result != "success" {
            return Err(Error::Rpc("failed to list torrents".to_string()));
        }
        Ok(resp.arguments.torrents.into_iter().map(Torrent::from).collect())
    }

    async fn add(&self, source: &str) -> Result<AddOutcome> {
        let resp = self
            .call("torrent-add", json!({ "filename": source }))
            .await?;
        Ok(match (resp.result.as_str(), resp.arguments.torrent_duplicate) {
            ("success", Some(_)) => AddOutcome::Duplicate,
            ("success", None) => AddOutcome::Added,
            _ => AddOutcome::Rejected,
        })
    }

    async fn remove(&self, id: i64, delete_local_data: bool) -> Result<RemoveOutcome> {
        let resp = self
            .call(
                "torrent-remove",
                json!({ "ids": [id], "delete-local-data": delete_local_data }),
            )
            .await?;
        Ok(if resp.result == "success" {
            RemoveOutcome::Removed
        } else {
            RemoveOutcome::Rejected
        })
    }
}
