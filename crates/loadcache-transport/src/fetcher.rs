//! Fetchers and the streaming transport built on them

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::data_url::DataUrlFetcher;
use crate::error::TransportError;
use crate::file::FileFetcher;
use crate::gate::PriorityGate;
use crate::http::HttpFetcher;
use crate::job::{JobHandle, JobOutcome, JobSink, ResponseMeta, Transport, TransportRequest};

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// An opened response whose body has not been read yet
pub struct FetchResponse {
    /// Mimetype reported before any body bytes arrive
    pub mimetype: Option<String>,
    /// The origin answered with an error status
    pub error_page: bool,
    pub meta: ResponseMeta,
    pub body: ByteStream,
}

/// Opens a URL and hands back its body as a stream
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError> {
        (**self).open(request).await
    }
}

/// Routes requests to a fetcher by URL scheme
#[derive(Default, Clone)]
pub struct SchemeFetcher {
    routes: HashMap<String, Arc<dyn Fetcher>>,
}

impl SchemeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// http, https, data and file
    pub fn standard(config: &TransportConfig) -> Result<Self, TransportError> {
        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config)?);
        Ok(Self::new()
            .route("http", http.clone())
            .route("https", http)
            .route("data", Arc::new(DataUrlFetcher))
            .route("file", Arc::new(FileFetcher)))
    }

    pub fn route(mut self, scheme: &str, fetcher: Arc<dyn Fetcher>) -> Self {
        self.routes.insert(scheme.to_ascii_lowercase(), fetcher);
        self
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.routes.contains_key(&scheme.to_ascii_lowercase())
    }
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn open(&self, request: &TransportRequest) -> Result<FetchResponse, TransportError> {
        let scheme = request.url.scheme();
        let fetcher = self
            .routes
            .get(scheme)
            .ok_or_else(|| TransportError::UnsupportedScheme(scheme.to_string()))?;
        fetcher.open(request).await
    }
}

/// Transport running one tokio task per job, admitted through a
/// [`PriorityGate`]
///
/// `start` must be called from within a tokio runtime.
pub struct StreamingTransport<F> {
    fetcher: Arc<F>,
    gate: PriorityGate,
}

impl<F: Fetcher + 'static> StreamingTransport<F> {
    pub fn new(fetcher: F, max_concurrent: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            gate: PriorityGate::new(max_concurrent),
        }
    }

    pub fn gate(&self) -> &PriorityGate {
        &self.gate
    }
}

impl StreamingTransport<SchemeFetcher> {
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self::new(SchemeFetcher::standard(config)?, config.max_concurrent))
    }
}

impl<F: Fetcher + 'static> Transport for StreamingTransport<F> {
    fn start(&self, request: TransportRequest, sink: JobSink) -> JobHandle {
        let id = sink.job();
        let priority = Arc::new(AtomicI32::new(request.priority));
        let fetcher = self.fetcher.clone();
        let gate = self.gate.clone();
        let admission = priority.clone();

        let task = tokio::spawn(async move {
            let _permit = gate.acquire(admission).await;
            debug!("Starting {} for {}", id, request.url);
            run_job(fetcher.as_ref(), &request, &sink).await;
        });

        JobHandle::new(id, priority, Some(task.abort_handle()))
    }
}

async fn run_job<F: Fetcher + ?Sized>(fetcher: &F, request: &TransportRequest, sink: &JobSink) {
    let response = match fetcher.open(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!("{} failed to open {}: {}", sink.job(), request.url, e);
            sink.finished(JobOutcome::Failed(e));
            return;
        }
    };

    if let Some(mimetype) = response.mimetype {
        sink.mimetype(mimetype);
    }

    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => {
                if !sink.data(bytes) {
                    warn!("Dispatcher went away while {} was streaming", sink.job());
                    return;
                }
            }
            Err(e) => {
                sink.finished(JobOutcome::Failed(e));
                return;
            }
        }
    }

    sink.finished(JobOutcome::Completed {
        error_page: response.error_page,
        meta: response.meta,
    });
}
