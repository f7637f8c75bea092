//! Transport jobs
//!
//! A job is one outstanding fetch. It reports back exclusively through a
//! [`JobSink`], which feeds a single channel drained by the dispatcher, so all
//! callbacks for all jobs arrive on one consumer in arrival order.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use url::Url;

use crate::error::TransportError;
use crate::policy::CachePolicy;

/// Identifier of one transport job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Allocate a fresh, process-unique job id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        JobId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Everything a transport needs to start a fetch
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub policy: CachePolicy,
    /// Comma separated list of acceptable mimetypes, may contain wildcards
    pub accept: Option<String>,
    pub referrer: Option<String>,
    /// -10 to 10, smaller values are admitted first
    pub priority: i32,
}

impl TransportRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            policy: CachePolicy::default(),
            accept: None,
            referrer: None,
            priority: 0,
        }
    }
}

/// Metadata the transport learned about a completed response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub status: Option<u16>,
    pub expires: Option<DateTime<Utc>>,
    pub charset: Option<String>,
    pub mimetype: Option<String>,
    pub suggested_filename: Option<String>,
}

/// Terminal result of a job
#[derive(Debug)]
pub enum JobOutcome {
    /// The body was delivered in full. `error_page` is set when the origin
    /// answered with an error status but still sent a body.
    Completed { error_page: bool, meta: ResponseMeta },
    Failed(TransportError),
}

impl JobOutcome {
    pub fn ok(meta: ResponseMeta) -> Self {
        JobOutcome::Completed {
            error_page: false,
            meta,
        }
    }
}

#[derive(Debug)]
pub enum JobEvent {
    /// Mimetype as sniffed or reported by the origin
    Mimetype(String),
    Data(Bytes),
    Finished(JobOutcome),
}

#[derive(Debug)]
pub struct JobMessage {
    pub job: JobId,
    pub event: JobEvent,
}

pub type JobSender = mpsc::UnboundedSender<JobMessage>;
pub type JobReceiver = mpsc::UnboundedReceiver<JobMessage>;

/// Reporting endpoint handed to a transport for one job
#[derive(Debug, Clone)]
pub struct JobSink {
    job: JobId,
    tx: JobSender,
}

impl JobSink {
    pub fn new(job: JobId, tx: JobSender) -> Self {
        Self { job, tx }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    /// Returns false once the dispatcher has gone away
    pub fn mimetype(&self, mimetype: impl Into<String>) -> bool {
        self.send(JobEvent::Mimetype(mimetype.into()))
    }

    pub fn data(&self, bytes: Bytes) -> bool {
        self.send(JobEvent::Data(bytes))
    }

    pub fn finished(&self, outcome: JobOutcome) -> bool {
        self.send(JobEvent::Finished(outcome))
    }

    fn send(&self, event: JobEvent) -> bool {
        self.tx
            .send(JobMessage {
                job: self.job,
                event,
            })
            .is_ok()
    }
}

/// Control handle for a running job
pub struct JobHandle {
    id: JobId,
    priority: Arc<AtomicI32>,
    abort: Option<AbortHandle>,
    killed: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn new(id: JobId, priority: Arc<AtomicI32>, abort: Option<AbortHandle>) -> Self {
        Self {
            id,
            priority,
            abort,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle with no task behind it, for transports driven from outside
    pub fn detached(id: JobId, priority: i32) -> Self {
        Self::new(id, Arc::new(AtomicI32::new(priority)), None)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Changes the admission priority. Only affects a job still waiting
    /// for a transport slot.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Relaxed);
    }

    /// Shared view of the admission priority, for transports that queue
    pub fn priority_cell(&self) -> Arc<AtomicI32> {
        self.priority.clone()
    }

    /// Flag raised once [`JobHandle::kill`] has been called
    pub fn kill_flag(&self) -> Arc<AtomicBool> {
        self.killed.clone()
    }

    /// Tears the job down. No further events are produced by the task; events
    /// already queued are left for the dispatcher to discard.
    pub fn kill(self) {
        self.killed.store(true, Ordering::Relaxed);
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .finish_non_exhaustive()
    }
}

/// Starts transport jobs
///
/// `start` must return immediately; all progress is pushed through the sink.
pub trait Transport: Send + Sync {
    fn start(&self, request: TransportRequest, sink: JobSink) -> JobHandle;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn start(&self, request: TransportRequest, sink: JobSink) -> JobHandle {
        (**self).start(request, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::next();
        let b = JobId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = JobSink::new(JobId::next(), tx);
        assert!(sink.mimetype("text/css"));
        drop(rx);
        assert!(!sink.data(Bytes::from_static(b"x")));
    }

    #[test]
    fn test_detached_handle_priority() {
        let handle = JobHandle::detached(JobId::next(), -4);
        assert_eq!(handle.priority(), -4);
        handle.set_priority(3);
        assert_eq!(handle.priority(), 3);

        let killed = handle.kill_flag();
        assert!(!killed.load(Ordering::Relaxed));
        handle.kill();
        assert!(killed.load(Ordering::Relaxed));
    }
}
