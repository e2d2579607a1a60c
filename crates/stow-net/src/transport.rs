//! HTTP transport to storage nodes.
//!
//! [`HttpTransport`] wraps a pooled `reqwest` client and provides:
//! - Streaming `PUT` of an object with an explicit `Content-Length`.
//! - `GET` of an object as a response that can be streamed onward.
//!
//! Every response is consumed to the end before the outcome is reported,
//! including error responses.

use std::time::Duration;

use bytes::Bytes;
use futures_lite::Stream;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{StatusCode, Url};
use stow_types::{NodeAddr, NodeId};
use tracing::{debug, trace};

use crate::error::NetError;

/// Statuses a node may answer a successful `PUT` with.
const ACCEPTED_PUT_STATUSES: [StatusCode; 2] = [StatusCode::CREATED, StatusCode::NO_CONTENT];

/// HTTP client for the node object API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the client's default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose connection attempts give up after `timeout`.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(NetError::Client)?;
        Ok(Self { client })
    }

    /// Write an object to `node` by streaming `body` in one `PUT`.
    ///
    /// `len` is sent as the `Content-Length`; `body` must yield exactly that
    /// many bytes. Only `201 Created` and `204 No Content` count as success.
    pub async fn put_stream<S, E>(
        &self,
        node: &NodeId,
        addr: &NodeAddr,
        path: &str,
        len: u64,
        body: S,
    ) -> Result<StatusCode, NetError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let url = object_url(addr, path)?;
        debug!(%node, %url, len, "sending object to node");

        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(|source| NetError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = drain(response, url.as_str()).await?;

        if ACCEPTED_PUT_STATUSES.contains(&status) {
            trace!(%node, path, %status, "node accepted object");
            Ok(status)
        } else {
            Err(NetError::Status {
                method: "PUT",
                path: path.to_string(),
                node: node.clone(),
                status: status.as_u16(),
            })
        }
    }

    /// Request an object from `node`.
    ///
    /// Returns `Ok(None)` if the node does not hold it. On success the
    /// response body is left unread for the caller to stream, together with
    /// its declared length.
    pub async fn get_object(
        &self,
        node: &NodeId,
        addr: &NodeAddr,
        path: &str,
    ) -> Result<Option<(u64, reqwest::Response)>, NetError> {
        let url = object_url(addr, path)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| NetError::Request {
                url: url.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => {
                let len = response
                    .content_length()
                    .ok_or_else(|| NetError::MissingLength {
                        path: path.to_string(),
                        node: node.clone(),
                    })?;
                Ok(Some((len, response)))
            }
            StatusCode::NOT_FOUND => {
                drain(response, url.as_str()).await?;
                Ok(None)
            }
            _ => {
                let status = drain(response, url.as_str()).await?;
                Err(NetError::Status {
                    method: "GET",
                    path: path.to_string(),
                    node: node.clone(),
                    status: status.as_u16(),
                })
            }
        }
    }
}

/// URL of object `path` on `addr`.
///
/// Each `/`-separated segment of the key is percent-encoded, so `?`, `#`
/// and `%` reach the node as part of the key.
pub(crate) fn object_url(addr: &NodeAddr, path: &str) -> Result<Url, NetError> {
    let invalid = |reason: String| NetError::InvalidUrl {
        addr: addr.to_string(),
        reason,
    };
    let mut url = Url::parse(&format!("http://{addr}/")).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("address cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(path.strip_prefix('/').unwrap_or(path).split('/'));
    Ok(url)
}

/// Read `response` to the end, discarding its body. Returns its status.
async fn drain(mut response: reqwest::Response, url: &str) -> Result<StatusCode, NetError> {
    let status = response.status();
    while response
        .chunk()
        .await
        .map_err(|source| NetError::Request {
            url: url.to_string(),
            source,
        })?
        .is_some()
    {}
    Ok(status)
}
