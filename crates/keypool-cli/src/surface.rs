//! Request surface: one JSON request per input line, one JSON response per output line.
//!
//! Status codes follow HTTP (201 created, 200 ok, 404 absent, 400 bad request,
//! 503 store failure). Store failures are logged here and answered with a generic
//! message.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use keypool_core::app::PoolCounts;
use keypool_core::domain::ErrorKind;
use keypool_core::ports::{Clock, LeaseStore};
use keypool_core::{LeaseError, LeaseRegistry, TokenId, TokenInfo};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Create,
    Acquire,
    Info {
        #[serde(rename = "keyId")]
        key_id: String,
    },
    Delete {
        #[serde(rename = "keyId")]
        key_id: String,
    },
    Release {
        #[serde(rename = "keyId")]
        key_id: String,
    },
    KeepAlive {
        #[serde(rename = "keyId")]
        key_id: String,
    },
    Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub info: Option<TokenInfo>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub counts: Option<PoolCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    fn with_key(status: u16, id: TokenId) -> Self {
        Self {
            key_id: Some(id.to_string()),
            ..Self::status(status)
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::status(status)
        }
    }

    fn from_lease_error(err: LeaseError) -> Self {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::NoneAvailable => Self::error(404, "not found"),
            ErrorKind::Infrastructure => {
                warn!(error = %err, "request failed on the lease store");
                Self::error(503, "store unavailable")
            }
        }
    }
}

fn respond<T>(result: Result<T, LeaseError>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => Response::from_lease_error(e),
    }
}

/// Dispatch one request to the registry.
pub async fn handle<S: LeaseStore, C: Clock>(
    registry: &LeaseRegistry<S, C>,
    request: Request,
) -> Response {
    let key_id = match &request {
        Request::Info { key_id }
        | Request::Delete { key_id }
        | Request::Release { key_id }
        | Request::KeepAlive { key_id } => match key_id.parse::<TokenId>() {
            Ok(id) => Some(id),
            // an id we could never have issued does not exist
            Err(_) => return Response::error(404, "not found"),
        },
        Request::Create | Request::Acquire | Request::Status => None,
    };

    match (request, key_id) {
        (Request::Create, _) => respond(registry.create().await, |id| Response::with_key(201, id)),
        (Request::Acquire, _) => {
            respond(registry.acquire().await, |id| Response::with_key(200, id))
        }
        (Request::Status, _) => respond(registry.counts().await, |counts| Response {
            counts: Some(counts),
            ..Response::status(200)
        }),
        (Request::Info { .. }, Some(id)) => respond(registry.info(id).await, |info| Response {
            info: Some(info),
            ..Response::status(200)
        }),
        (Request::Delete { .. }, Some(id)) => {
            respond(registry.delete(id).await, |()| Response::status(200))
        }
        (Request::Release { .. }, Some(id)) => {
            respond(registry.release(id).await, |()| Response::status(200))
        }
        (Request::KeepAlive { .. }, Some(id)) => {
            respond(registry.keep_alive(id).await, |()| Response::status(200))
        }
        (_, None) => Response::error(404, "not found"),
    }
}

/// Answer requests until `reader` reaches end of input.
pub async fn serve<S, C, R, W>(registry: &LeaseRegistry<S, C>, reader: R, mut writer: W) -> Result<()>
where
    S: LeaseStore,
    C: Clock,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("reading request")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                debug!(?request, "handling request");
                handle(registry, request).await
            }
            Err(e) => Response::error(400, format!("bad request: {e}")),
        };

        let mut out = serde_json::to_string(&response).context("encoding response")?;
        out.push('\n');
        writer
            .write_all(out.as_bytes())
            .await
            .context("writing response")?;
        writer.flush().await.context("flushing response")?;
    }
    Ok(())
}
