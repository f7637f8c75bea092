//! Fetch dispatcher
//!
//! The [`Loader`] turns resources into transport jobs and routes the events
//! of those jobs back to the resources. Every in-flight job has exactly one
//! [`Request`]; the registry deduplicates before a second job could start.
//!
//! Transports report on a single channel. Events are only applied when the
//! owner of the cache drains that channel through [`Cache::pump`] or
//! [`Cache::run_until_idle`], so all resource callbacks run on the draining
//! thread, one event at a time.
//!
//! [`Cache::pump`]: crate::Cache::pump
//! [`Cache::run_until_idle`]: crate::Cache::run_until_idle

use bytes::{Bytes, BytesMut};
use loadcache_transport::{
    JobEvent, JobHandle, JobId, JobMessage, JobOutcome, JobReceiver, JobSender, JobSink,
    Transport, TransportError, TransportRequest,
};
use metrics::counter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use url::Url;

use crate::cache::CacheShared;
use crate::decode::is_supported_mimetype;
use crate::doc_loader::{DocLoader, DocLoaderId};
use crate::error::ResourceError;
use crate::resource::{ResourceHandle, ResourceKind};

const EVENT_CAPACITY: usize = 256;

/// Progress notifications for observers such as progress bars
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    RequestStarted {
        doc_loader: Option<DocLoaderId>,
        resource: ResourceHandle,
    },
    RequestDone {
        doc_loader: Option<DocLoaderId>,
        resource: ResourceHandle,
    },
    RequestFailed {
        doc_loader: Option<DocLoaderId>,
        resource: ResourceHandle,
        error: ResourceError,
    },
}

/// Document a fetch is made on behalf of
#[derive(Debug, Clone)]
pub(crate) struct FetchOrigin {
    pub(crate) doc_loader: DocLoaderId,
    pub(crate) referrer: Option<String>,
}

/// One in-flight transport job for a resource
pub(crate) struct Request {
    resource: ResourceHandle,
    doc_loader: Option<DocLoaderId>,
    incremental: bool,
    buffer: BytesMut,
    /// Bytes of `buffer` already handed to the resource
    delivered: usize,
    job: JobHandle,
}

#[derive(Default)]
struct LoaderState {
    requests: HashMap<JobId, Request>,
}

pub(crate) struct LoaderShared {
    state: Mutex<LoaderState>,
    transport: Arc<dyn Transport>,
    tx: JobSender,
    rx: tokio::sync::Mutex<JobReceiver>,
    events: broadcast::Sender<LoaderEvent>,
}

impl LoaderShared {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(LoaderState::default()),
            transport,
            tx,
            rx: tokio::sync::Mutex::new(rx),
            events,
        }
    }

    /// Start a transport job for `resource` under the id `job`
    pub(crate) fn start(
        &self,
        job: JobId,
        origin: Option<&FetchOrigin>,
        resource: &ResourceHandle,
        incremental: bool,
        priority: i32,
    ) {
        let sink = JobSink::new(job, self.tx.clone());
        let mut state = self.state.lock();

        let handle = match Url::parse(resource.url()) {
            Ok(url) => {
                let request = TransportRequest {
                    url,
                    policy: resource.cache_policy(),
                    accept: Some(resource.accept().to_string()),
                    referrer: origin.and_then(|o| o.referrer.clone()),
                    priority,
                };
                self.transport.start(request, sink)
            }
            Err(e) => {
                sink.finished(JobOutcome::Failed(TransportError::InvalidUrl(format!(
                    "{}: {}",
                    resource.url(),
                    e
                ))));
                JobHandle::detached(job, priority)
            }
        };

        debug!(
            "Loading {} as {} ({}, priority {})",
            resource.url(),
            job,
            resource.kind(),
            priority
        );
        state.requests.insert(
            job,
            Request {
                resource: resource.clone(),
                doc_loader: origin.map(|o| o.doc_loader),
                incremental,
                buffer: BytesMut::new(),
                delivered: 0,
                job: handle,
            },
        );
        drop(state);

        counter!("loadcache_fetches_started_total").increment(1);
        self.publish(LoaderEvent::RequestStarted {
            doc_loader: origin.map(|o| o.doc_loader),
            resource: resource.clone(),
        });
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub(crate) fn count_for(&self, doc_loader: DocLoaderId) -> usize {
        self.state
            .lock()
            .requests
            .values()
            .filter(|r| r.doc_loader == Some(doc_loader))
            .count()
    }

    pub(crate) fn job_for_url(&self, url: &str) -> Option<JobId> {
        self.state
            .lock()
            .requests
            .iter()
            .find(|(_, r)| r.resource.url() == url)
            .map(|(job, _)| *job)
    }

    pub(crate) fn set_priority(&self, url: &str, priority: i32) -> bool {
        let state = self.state.lock();
        match state.requests.values().find(|r| r.resource.url() == url) {
            Some(request) => {
                request.job.set_priority(priority);
                true
            }
            None => false,
        }
    }

    /// Kill every outstanding job without touching their resources
    pub(crate) fn kill_all(&self) -> usize {
        let requests: Vec<Request> = self.state.lock().requests.drain().map(|(_, r)| r).collect();
        let count = requests.len();
        for request in requests {
            request.job.kill();
        }
        count
    }

    fn take_for(&self, doc_loader: DocLoaderId) -> Vec<Request> {
        let mut state = self.state.lock();
        let jobs: Vec<JobId> = state
            .requests
            .iter()
            .filter(|(_, r)| r.doc_loader == Some(doc_loader))
            .map(|(job, _)| *job)
            .collect();
        jobs.iter()
            .filter_map(|job| state.requests.remove(job))
            .collect()
    }

    /// Put a request back under a new owning document
    fn hand_over(&self, mut request: Request, doc_loader: DocLoaderId) {
        request.doc_loader = Some(doc_loader);
        self.state.lock().requests.insert(request.job.id(), request);
    }

    fn publish(&self, event: LoaderEvent) {
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }
}

/// Cancel every request made on behalf of `doc_loader`. Their resources are
/// removed from the registry and partial bodies are dropped.
///
/// A request whose resource another live document still uses is handed over
/// to that document and keeps running.
pub(crate) fn cancel_requests(cache: &CacheShared, doc_loader: DocLoaderId) -> usize {
    let mut count = 0;
    for request in cache.loader.take_for(doc_loader) {
        if let Some(owner) = cache.other_user(&request.resource, doc_loader) {
            debug!(
                "Handing {} ({}) over to {}",
                request.resource.url(),
                request.job.id(),
                owner
            );
            cache.loader.hand_over(request, owner);
            continue;
        }
        count += 1;
        debug!(
            "Cancelling {} ({})",
            request.resource.url(),
            request.job.id()
        );
        cache.remove_cache_entry(&request.resource);
        cache.detach_request(&request.resource);
        request.job.kill();
        counter!("loadcache_fetches_cancelled_total").increment(1);
    }
    count
}

/// Apply every event already queued. Returns the number handled, or 0 when
/// another thread is draining.
pub(crate) fn pump(cache: &CacheShared) -> usize {
    let Ok(mut rx) = cache.loader.rx.try_lock() else {
        return 0;
    };
    let mut handled = 0;
    while let Ok(message) = rx.try_recv() {
        dispatch(cache, message);
        handled += 1;
    }
    handled
}

/// Apply events as they arrive until no request is outstanding
pub(crate) async fn run_until_idle(cache: &CacheShared) {
    loop {
        let mut rx = cache.loader.rx.lock().await;
        while let Ok(message) = rx.try_recv() {
            dispatch(cache, message);
        }
        if cache.loader.outstanding() == 0 {
            return;
        }
        match rx.recv().await {
            Some(message) => dispatch(cache, message),
            None => return,
        }
    }
}

fn dispatch(cache: &CacheShared, message: JobMessage) {
    let JobMessage { job, event } = message;
    match event {
        JobEvent::Mimetype(mimetype) => {
            let resource = cache
                .loader
                .state
                .lock()
                .requests
                .get(&job)
                .map(|r| r.resource.clone());
            match resource {
                Some(resource) => {
                    if !mimetype.contains('/') {
                        warn!("Ignoring malformed mimetype {:?} for {}", mimetype, resource.url());
                    }
                    resource.set_mimetype(&mimetype);
                }
                None => debug!("Mimetype for unknown {}", job),
            }
        }
        JobEvent::Data(bytes) => on_data(cache, job, bytes),
        JobEvent::Finished(outcome) => on_finished(cache, job, outcome),
    }
}

fn on_data(cache: &CacheShared, job: JobId, bytes: Bytes) {
    let delivery = {
        let mut state = cache.loader.state.lock();
        let Some(request) = state.requests.get_mut(&job) else {
            debug!("Data for unknown {}", job);
            return;
        };
        request.buffer.extend_from_slice(&bytes);
        if request.incremental {
            request.delivered = request.buffer.len();
        }
        (request.resource.clone(), request.incremental)
    };

    match delivery {
        (resource, true) => resource.data(&bytes, false),
        (resource, false) => resource.mark_loading(),
    }
}

fn on_finished(cache: &CacheShared, job: JobId, outcome: JobOutcome) {
    let Some(request) = cache.loader.state.lock().requests.remove(&job) else {
        debug!("Completion of unknown {}", job);
        return;
    };
    let Request {
        resource,
        doc_loader,
        buffer,
        delivered,
        ..
    } = request;

    let result = match outcome {
        JobOutcome::Failed(e) => Err(ResourceError::new(e.code(), e.to_string())),
        JobOutcome::Completed { error_page, meta } => {
            if let Some(mimetype) = &meta.mimetype
                && resource.mimetype().is_empty()
            {
                resource.set_mimetype(mimetype);
            }
            let salvaged = resource.kind() == ResourceKind::Image
                && is_supported_mimetype(&resource.mimetype());
            if error_page && !salvaged {
                let code = meta.status.map_or(0, i32::from);
                Err(ResourceError::new(code, format!("Error page served for {}", resource.url())))
            } else {
                Ok(meta)
            }
        }
    };

    match result {
        Ok(meta) => {
            if let Some(charset) = meta.charset {
                resource.set_charset(charset);
            }
            resource.set_expire_date(meta.expires);
            resource.data(&buffer[delivered..], true);
            if resource.kind() == ResourceKind::Image {
                resource.set_suggested_filename(meta.suggested_filename);
            }
            counter!("loadcache_fetches_completed_total").increment(1);
            cache.loader.publish(LoaderEvent::RequestDone {
                doc_loader,
                resource: resource.clone(),
            });
        }
        Err(error) => {
            counter!("loadcache_fetches_failed_total").increment(1);
            resource.report_error(error.clone());
            cache.loader.publish(LoaderEvent::RequestFailed {
                doc_loader,
                resource: resource.clone(),
                error,
            });
        }
    }

    resource.finish();
    cache.detach_request(&resource);
}

/// Public face of the dispatcher of one cache
#[derive(Clone)]
pub struct Loader {
    cache: Arc<CacheShared>,
}

impl Loader {
    pub(crate) fn new(cache: Arc<CacheShared>) -> Self {
        Self { cache }
    }

    /// Start fetching `resource`. A resource that already has a request in
    /// flight is left alone.
    pub fn load(
        &self,
        doc_loader: Option<&DocLoader>,
        resource: &ResourceHandle,
        incremental: bool,
        priority: i32,
    ) {
        let origin = doc_loader.map(DocLoader::origin);
        let mut state = self.cache.state.lock();
        self.cache
            .begin_fetch_locked(&mut state, origin.as_ref(), resource, incremental, priority);
    }

    /// Requests outstanding on behalf of a document
    pub fn num_requests(&self, doc_loader: &DocLoader) -> usize {
        self.cache.loader.count_for(doc_loader.id())
    }

    /// Requests outstanding in total
    pub fn outstanding(&self) -> usize {
        self.cache.loader.outstanding()
    }

    pub fn cancel_requests(&self, doc_loader: &DocLoader) {
        let count = cancel_requests(&self.cache, doc_loader.id());
        if count > 0 {
            debug!("Cancelled {} requests of {}", count, doc_loader.id());
        }
    }

    /// Job currently fetching `url`
    pub fn job_for_request(&self, url: &str) -> Option<JobId> {
        self.cache.loader.job_for_url(url)
    }

    /// Change the admission priority of the job fetching `url`
    pub fn set_priority(&self, url: &str, priority: i32) -> bool {
        self.cache.loader.set_priority(url, priority)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.cache.loader.events.subscribe()
    }
}
