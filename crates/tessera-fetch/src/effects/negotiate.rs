//! Capability negotiation: learn length, name and range support before
//! fetching anything.

use http::StatusCode;
use tracing::debug;

use crate::core::{accepts_byte_ranges, content_length, content_range_total, disposition_filename};
use crate::data::{FetchOptions, ResourceMetadata};
use crate::effects::http::{HttpClient, ResponseHead};
use crate::error::NegotiationError;

/// Query `url` with `HEAD`, falling back to a one-byte ranged `GET` for
/// servers that refuse `HEAD`.
pub async fn negotiate<C: HttpClient>(
    client: &C,
    url: &str,
    options: &FetchOptions,
) -> Result<ResourceMetadata, NegotiationError> {
    let head = client
        .head(url, &options.headers)
        .await
        .map_err(|e| unreachable_error(url, &e))?;

    if head.status.is_success() {
        let total = content_length(&head.headers)?;
        return Ok(ResourceMetadata {
            total,
            filename: disposition_filename(&head.headers),
            range_supported: total.is_some() && accepts_byte_ranges(&head.headers),
        });
    }

    if matches!(head.status, StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED) {
        debug!(url, status = head.status.as_u16(), "HEAD refused, probing with a ranged GET");
        return negotiate_with_range(client, url, options).await;
    }

    Err(status_error(url, &head))
}

async fn negotiate_with_range<C: HttpClient>(
    client: &C,
    url: &str,
    options: &FetchOptions,
) -> Result<ResourceMetadata, NegotiationError> {
    let response = client
        .get(url, Some(0..=0), &options.headers)
        .await
        .map_err(|e| unreachable_error(url, &e))?;
    let head = response.head;
    let filename = disposition_filename(&head.headers);

    match head.status {
        StatusCode::PARTIAL_CONTENT => {
            let total = content_range_total(&head.headers)?;
            Ok(ResourceMetadata { total, filename, range_supported: total.is_some() })
        }
        // Only an empty resource answers `bytes=0-0` with 416.
        StatusCode::RANGE_NOT_SATISFIABLE => {
            let total = content_range_total(&head.headers)?.or(Some(0));
            Ok(ResourceMetadata { total, filename, range_supported: false })
        }
        status if status.is_success() => Ok(ResourceMetadata {
            total: content_length(&head.headers)?,
            filename,
            range_supported: false,
        }),
        _ => Err(status_error(url, &head)),
    }
}

fn unreachable_error(url: &str, error: &dyn std::error::Error) -> NegotiationError {
    NegotiationError::Unreachable { url: url.to_string(), reason: error.to_string() }
}

fn status_error(url: &str, head: &ResponseHead) -> NegotiationError {
    NegotiationError::Status { url: url.to_string(), status: head.status.as_u16() }
}
