//! `data:` URL fetcher

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use crate::error::TransportError;
use crate::fetcher::{FetchResponse, Fetcher};
use crate::headers::split_content_type;
use crate::job::{ResponseMeta, TransportRequest};

const DEFAULT_MEDIA_TYPE: &str = "text/plain";
const DEFAULT_CHARSET: &str = "US-ASCII";

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mimetype: String,
    pub charset: Option<String>,
    pub body: Vec<u8>,
}

impl DataUrl {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| TransportError::InvalidDataUrl("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| TransportError::InvalidDataUrl("missing comma".to_string()))?;

        let (header, is_base64) = match header.trim_end().rsplit_once(';') {
            Some((head, marker)) if marker.trim().eq_ignore_ascii_case("base64") => (head, true),
            _ => (header, false),
        };

        let (mimetype, charset) = split_content_type(header);
        let (mimetype, charset) = if mimetype.is_empty() {
            (
                DEFAULT_MEDIA_TYPE.to_string(),
                charset.or_else(|| Some(DEFAULT_CHARSET.to_string())),
            )
        } else {
            (mimetype, charset)
        };

        let body = if is_base64 {
            decode_base64(&percent_decode(payload)?)?
        } else {
            percent_decode(payload)?
        };

        Ok(Self {
            mimetype,
            charset,
            body,
        })
    }
}

fn decode_base64(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| TransportError::InvalidDataUrl(format!("invalid base64: {}", e)))
}

/// Percent-decode without treating '+' specially
fn percent_decode(input: &str) -> Result<Vec<u8>, TransportError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = bytes
            .get(i + 1..i + 3)
            .and_then(|pair| std::str::from_utf8(pair).ok())
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| TransportError::InvalidDataUrl("invalid percent-escape".to_string()))?;
        out.push(escape);
        i += 3;
    }

    Ok(out)
}

/// Serves `data:` URLs without touching the network
#[derive(Debug, Default, Clone)]
pub struct DataUrlFetcher;

#[async_trait]
impl Fetcher for DataUrlFetcher {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError> {
        let data = DataUrl::parse(request.url.as_str())?;
        let meta = ResponseMeta {
            mimetype: Some(data.mimetype.clone()),
            charset: data.charset,
            ..Default::default()
        };
        let body = stream::once(async move { Ok(Bytes::from(data.body)) }).boxed();

        Ok(FetchResponse {
            mimetype: Some(data.mimetype),
            error_page: false,
            meta,
            body,
        })
    }
}
