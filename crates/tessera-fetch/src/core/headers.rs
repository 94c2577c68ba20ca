//! Header interpretation for negotiation and range requests.

use http::HeaderMap;
use http::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE};
use percent_encoding::percent_decode_str;

use crate::core::naming::sanitize_filename;
use crate::error::NegotiationError;

/// Format an inclusive byte range as a `Range` header value.
///
/// ```
/// use tessera_fetch::core::range_header;
///
/// assert_eq!(range_header(0, 0), "bytes=0-0");
/// assert_eq!(range_header(500, 999), "bytes=500-999");
/// ```
pub fn range_header(start: u64, end: u64) -> String { format!("bytes={start}-{end}") }

/// Declared body length, if any.
pub fn content_length(headers: &HeaderMap) -> Result<Option<u64>, NegotiationError> {
    let Some(value) = headers.get(CONTENT_LENGTH) else {
        return Ok(None);
    };
    let malformed = || NegotiationError::Malformed {
        header: "Content-Length",
        value:  String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };
    value
        .to_str()
        .map_err(|_| malformed())?
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| malformed())
}

/// Whether `Accept-Ranges` lists the `bytes` unit.
pub fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
}

/// Complete length from a `Content-Range: bytes <first>-<last>/<total>`
/// header. An unknown length (`*`) yields `None`.
pub fn content_range_total(headers: &HeaderMap) -> Result<Option<u64>, NegotiationError> {
    let Some((_, total, raw)) = content_range(headers)? else {
        return Ok(None);
    };
    match total.as_str() {
        "*" => Ok(None),
        total => total.parse::<u64>().map(Some).map_err(|_| malformed_range(raw)),
    }
}

/// First byte position of a `Content-Range` header, if one was sent.
pub fn content_range_first(headers: &HeaderMap) -> Result<Option<u64>, NegotiationError> {
    let Some((span, _, raw)) = content_range(headers)? else {
        return Ok(None);
    };
    span.split_once('-')
        .and_then(|(first, _)| first.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| malformed_range(raw))
}

/// Split a `Content-Range` value into span, total and the raw text.
fn content_range(headers: &HeaderMap) -> Result<Option<(String, String, String)>, NegotiationError> {
    let Some(value) = headers.get(CONTENT_RANGE) else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(value.as_bytes()).into_owned();

    let parts = text
        .trim()
        .strip_prefix("bytes")
        .map(str::trim_start)
        .and_then(|rest| rest.split_once('/'))
        .map(|(span, total)| (span.trim().to_string(), total.trim().to_string()));
    match parts {
        Some((span, total)) => Ok(Some((span, total, text))),
        None => Err(malformed_range(text)),
    }
}

fn malformed_range(value: String) -> NegotiationError { NegotiationError::Malformed { header: "Content-Range", value } }

/// Server-suggested file name from `Content-Disposition`.
pub fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_disposition)
}

/// Extract the file name from a `Content-Disposition` value.
///
/// The RFC 5987 `filename*` form wins over plain `filename`. Only the last
/// path component survives.
///
/// ```
/// use tessera_fetch::core::parse_disposition;
///
/// assert_eq!(parse_disposition(r#"attachment; filename="a.zip""#).as_deref(), Some("a.zip"));
/// assert_eq!(
///     parse_disposition("attachment; filename=x; filename*=UTF-8''na%C3%AFve.txt").as_deref(),
///     Some("naïve.txt"),
/// );
/// ```
pub fn parse_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => extended = decode_extended(raw.trim()),
            "filename" => plain = Some(unquote(raw.trim())),
            _ => {}
        }
    }

    extended
        .and_then(|name| sanitize_filename(&name))
        .or_else(|| plain.and_then(|name| sanitize_filename(&name)))
}

/// Split on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut from = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(&value[from..i]);
                from = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[from..]);
    params
}

fn unquote(raw: &str) -> String {
    match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => raw.to_string(),
    }
}

/// `charset'language'percent-encoded`
fn decode_extended(raw: &str) -> Option<String> {
    let raw = raw.trim_matches('"');
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;

    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    if charset.eq_ignore_ascii_case("utf-8") || charset.is_empty() {
        String::from_utf8(bytes).ok()
    } else {
        // ISO-8859-1 maps byte-for-byte onto the first 256 code points.
        Some(bytes.into_iter().map(char::from).collect())
    }
}
