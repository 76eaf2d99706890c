//! Shared HTTP plumbing: endpoint resolution, sending with deadline and
//! cancellation, status classification, and JSON body decoding.
//!
//! Every await on the network (the send and each body read) is raced against
//! the caller's cancellation token.

use std::future::Future;

use reqwest::{RequestBuilder, StatusCode};
use sage_core::{Request, SageError};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Joins a base URL override with a fixed API path, or falls back to the default.
///
/// `https://host` and `https://host/` resolve to the same endpoint.
pub(crate) fn endpoint(base_url: Option<&str>, path: &str, default: &str) -> String {
    match base_url.filter(|b| !b.is_empty()) {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => default.to_string(),
    }
}

/// Sends the request, honoring the caller's timeout and cancellation token.
pub(crate) async fn send(builder: RequestBuilder, req: &Request) -> Result<reqwest::Response, SageError> {
    let builder = match req.timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    };

    let pending = async { builder.send().await.map_err(|e| SageError::Transport(e.to_string())) };
    cancellable(pending, req.cancel.as_ref()).await
}

/// Awaits `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F, T>(fut: F, cancel: Option<&CancellationToken>) -> Result<T, SageError>
where
    F: Future<Output = Result<T, SageError>>,
{
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("request cancelled by caller");
                Err(SageError::Cancelled)
            }
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Consumes a non-success response and turns it into a classified error.
///
/// `extract` pulls the provider's own message out of the error body; when it
/// cannot, the raw body is used instead.
pub(crate) async fn status_error(
    provider: &str,
    response: reqwest::Response,
    extract: fn(&str) -> Option<String>,
    cancel: Option<&CancellationToken>,
) -> SageError {
    let status = response.status();
    let read = async { Ok(response.text().await.unwrap_or_default()) };
    let body = match cancellable(read, cancel).await {
        Ok(body) => body,
        Err(e) => return e,
    };
    warn!(provider, status = status.as_u16(), "provider returned error status");
    classify(status, extract(&body).unwrap_or(body))
}

pub(crate) fn classify(status: StatusCode, message: String) -> SageError {
    match status {
        StatusCode::UNAUTHORIZED => SageError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => SageError::RateLimited(message),
        _ => SageError::Api { status: status.as_u16(), message },
    }
}

/// Reads the whole body and decodes it as `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    cancel: Option<&CancellationToken>,
) -> Result<T, SageError> {
    let read = async { response.bytes().await.map_err(|e| SageError::Transport(e.to_string())) };
    let bytes = cancellable(read, cancel).await?;
    serde_json::from_slice(&bytes).map_err(|e| SageError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_normalized() {
        let default = "https://api.example.com/v1/x";
        assert_eq!(
            endpoint(Some("https://proxy.local"), "/v1/x", default),
            endpoint(Some("https://proxy.local/"), "/v1/x", default),
        );
        assert_eq!(endpoint(Some("https://proxy.local/"), "/v1/x", default), "https://proxy.local/v1/x");
        assert_eq!(endpoint(None, "/v1/x", default), default);
        assert_eq!(endpoint(Some(""), "/v1/x", default), default);
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, "bad key".into()),
            SageError::Unauthorized("bad key".into())
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            SageError::RateLimited("slow down".into())
        );
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            SageError::Api { status: 500, message: "boom".into() }
        );
    }

    #[tokio::test]
    async fn cancellable_stops_a_stalled_future() {
        let token = CancellationToken::new();
        token.cancel();

        let stalled = futures::future::pending::<Result<(), SageError>>();
        assert_eq!(cancellable(stalled, Some(&token)).await, Err(SageError::Cancelled));
    }

    #[tokio::test]
    async fn cancellable_without_token_awaits_the_future() {
        let ready = async { Ok::<_, SageError>(42) };
        assert_eq!(cancellable(ready, None).await, Ok(42));

        let token = CancellationToken::new();
        let ready = async { Ok::<_, SageError>(7) };
        assert_eq!(cancellable(ready, Some(&token)).await, Ok(7));
    }
}
