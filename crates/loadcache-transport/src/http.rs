//! HTTP(S) fetcher

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{
    ACCEPT, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, EXPIRES, HeaderMap, HeaderName,
    PRAGMA, REFERER,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::fetcher::{FetchResponse, Fetcher};
use crate::headers::{content_disposition_filename, parse_expiry, split_content_type};
use crate::job::{ResponseMeta, TransportRequest};
use crate::policy::CachePolicy;

/// Streams HTTP responses with `reqwest`
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());

        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        if config.skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;
        info!("Created HTTP fetcher ({})", config.user_agent);

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError> {
        // There is no persistent cache underneath us to answer from
        if request.policy == CachePolicy::CacheOnly {
            return Err(TransportError::NotCached(request.url.to_string()));
        }

        let mut builder = self.client.get(request.url.clone());
        if let Some(accept) = &request.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }
        if let Some(referrer) = &request.referrer {
            builder = builder.header(REFERER, referrer.as_str());
        }
        if let Some(directive) = request.policy.request_directive() {
            builder = builder.header(CACHE_CONTROL, directive);
            if request.policy == CachePolicy::Reload {
                builder = builder.header(PRAGMA, "no-cache");
            }
        }

        debug!("GET {} ({})", request.url, request.policy);
        let response = builder.send().await?;
        let status = response.status();
        let meta = response_meta(status.as_u16(), response.headers());
        let error_page = status.is_client_error() || status.is_server_error();
        if error_page {
            debug!("{} answered with {}", request.url, status);
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(FetchResponse {
            mimetype: meta.mimetype.clone(),
            error_page,
            meta,
            body,
        })
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn response_meta(status: u16, headers: &HeaderMap) -> ResponseMeta {
    let (mimetype, charset) = match header_str(headers, CONTENT_TYPE) {
        Some(value) => split_content_type(value),
        None => (String::new(), None),
    };

    ResponseMeta {
        status: Some(status),
        expires: parse_expiry(
            header_str(headers, CACHE_CONTROL),
            header_str(headers, EXPIRES),
            Utc::now(),
        ),
        charset,
        mimetype: (!mimetype.is_empty()).then_some(mimetype),
        suggested_filename: header_str(headers, CONTENT_DISPOSITION).and_then(content_disposition_filename),
    }
}
