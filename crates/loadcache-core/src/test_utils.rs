//! Scripted transport and recording client shared by the unit tests

use bytes::Bytes;
use loadcache_transport::{
    JobHandle, JobId, JobOutcome, JobSink, ResponseMeta, Transport, TransportError,
    TransportRequest,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use url::Url;

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::decode::ImageRect;
use crate::doc_loader::{DocLoader, DocumentSettings};
use crate::loader::Loader;
use crate::resource::{ResourceClient, ResourceHandle};

/// A job started on the scripted transport. The test plays the remote side.
#[derive(Clone)]
pub struct StartedJob {
    request: TransportRequest,
    sink: JobSink,
    killed: Arc<AtomicBool>,
    priority: Arc<AtomicI32>,
}

impl StartedJob {
    pub fn id(&self) -> JobId {
        self.sink.job()
    }

    pub fn request(&self) -> TransportRequest {
        self.request.clone()
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn mimetype(&self, mimetype: &str) {
        self.sink.mimetype(mimetype);
    }

    pub fn data(&self, bytes: &[u8]) {
        self.sink.data(Bytes::copy_from_slice(bytes));
    }

    pub fn finish(&self, meta: ResponseMeta) {
        self.sink.finished(JobOutcome::ok(meta));
    }

    pub fn error_page(&self, status: u16) {
        self.sink.finished(JobOutcome::Completed {
            error_page: true,
            meta: ResponseMeta {
                status: Some(status),
                ..Default::default()
            },
        });
    }

    pub fn fail(&self, error: TransportError) {
        self.sink.finished(JobOutcome::Failed(error));
    }
}

/// Records every started job and lets the test drive it
#[derive(Default)]
pub struct ScriptedTransport {
    jobs: Mutex<Vec<StartedJob>>,
}

impl ScriptedTransport {
    pub fn started(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn jobs(&self) -> Vec<StartedJob> {
        self.jobs.lock().clone()
    }

    pub fn last(&self) -> StartedJob {
        self.jobs.lock().last().cloned().expect("no job started")
    }
}

impl Transport for ScriptedTransport {
    fn start(&self, request: TransportRequest, sink: JobSink) -> JobHandle {
        let handle = JobHandle::detached(sink.job(), request.priority);
        self.jobs.lock().push(StartedJob {
            request,
            sink,
            killed: handle.kill_flag(),
            priority: handle.priority_cell(),
        });
        handle
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Finished(String),
    StyleSheet {
        url: String,
        sheet: String,
        charset: String,
        mimetype: String,
    },
    Image(ImageRect),
    Error(i32, String),
}

#[derive(Default)]
pub struct RecordingClient {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingClient {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.count(|e| matches!(e, ClientEvent::Finished(_)))
    }

    pub fn errors(&self) -> usize {
        self.count(|e| matches!(e, ClientEvent::Error(..)))
    }

    pub fn sheets(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ClientEvent::StyleSheet { sheet, .. } => Some(sheet.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, f: impl Fn(&ClientEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| f(e)).count()
    }
}

impl ResourceClient for RecordingClient {
    fn notify_finished(&self, resource: &ResourceHandle) {
        self.events
            .lock()
            .push(ClientEvent::Finished(resource.url().to_string()));
    }

    fn set_style_sheet(&self, url: &str, sheet: &str, charset: &str, mimetype: &str) {
        self.events.lock().push(ClientEvent::StyleSheet {
            url: url.to_string(),
            sheet: sheet.to_string(),
            charset: charset.to_string(),
            mimetype: mimetype.to_string(),
        });
    }

    fn update_image(&self, rect: ImageRect, _resource: &ResourceHandle) {
        self.events.lock().push(ClientEvent::Image(rect));
    }

    fn error(&self, code: i32, message: &str) {
        self.events
            .lock()
            .push(ClientEvent::Error(code, message.to_string()));
    }
}

/// A cache over a scripted transport
pub struct TestCache {
    pub cache: Cache,
    pub transport: Arc<ScriptedTransport>,
    settings: DocumentSettings,
}

impl TestCache {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(f: impl FnOnce(&mut DocumentSettings)) -> Self {
        let mut settings = DocumentSettings::default();
        f(&mut settings);
        let transport = Arc::new(ScriptedTransport::default());
        Self {
            cache: Cache::new(CacheConfig::default(), transport.clone()),
            transport,
            settings,
        }
    }

    pub fn doc_loader(&self) -> DocLoader {
        DocLoader::new(&self.cache, self.settings.clone())
    }

    pub fn doc_loader_at(&self, base: &str) -> DocLoader {
        let dl = self.doc_loader();
        dl.set_base_url(Url::parse(base).expect("valid base url"));
        dl
    }

    pub fn loader(&self) -> Loader {
        self.cache.loader()
    }
}
