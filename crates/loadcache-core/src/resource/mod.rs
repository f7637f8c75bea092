//! Cached resources
//!
//! A [`CachedResource`] is the single shared record for one URL: its load
//! status, decoded payload, accounting size and the clients observing it.
//! Handles are reference counted; the cache, document loaders, fetch tickets
//! and consumers all hold the same [`ResourceHandle`].

mod client;
mod payload;

pub use client::ResourceClient;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use loadcache_transport::{CachePolicy, JobId};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::cache::CacheShared;
use crate::decode::AnimationPolicy;
use crate::error::ResourceError;
use payload::{Notice, Payload, Update};

pub type ResourceHandle = Arc<CachedResource>;

const IMAGE_ACCEPT: &str =
    "image/png, image/jpeg, video/x-mng, image/jp2, image/gif;q=0.5,*/*;q=0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Stylesheet,
    Script,
    Image,
    Audio,
    Font,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Stylesheet,
        ResourceKind::Script,
        ResourceKind::Image,
        ResourceKind::Audio,
        ResourceKind::Font,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Stylesheet => "stylesheet",
            ResourceKind::Script => "script",
            ResourceKind::Image => "image",
            ResourceKind::Audio => "audio",
            ResourceKind::Font => "font",
        }
    }

    /// Transport priority; smaller values are fetched first
    pub fn priority(&self) -> i32 {
        match self {
            ResourceKind::Stylesheet => -8,
            ResourceKind::Script => -6,
            ResourceKind::Font => -4,
            ResourceKind::Image => 0,
            ResourceKind::Audio => 2,
        }
    }

    /// Whether body bytes are handed over as they arrive
    pub fn incremental(&self) -> bool {
        matches!(self, ResourceKind::Image)
    }

    /// Whether requesting the resource starts its fetch. Images wait for the
    /// document loader to decide.
    pub fn loads_on_request(&self) -> bool {
        !matches!(self, ResourceKind::Image)
    }

    /// Accept header sent when fetching this kind
    pub fn accept_header(&self, requested: Option<&str>) -> String {
        match self {
            ResourceKind::Stylesheet => {
                let requested = requested.filter(|a| !a.is_empty()).unwrap_or("text/css");
                format!("{},*/*;q=0.1", requested)
            }
            ResourceKind::Image => IMAGE_ACCEPT.to_string(),
            _ => "*/*".to_string(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource kind: {0}")]
pub struct ParseResourceKindError(String);

impl FromStr for ResourceKind {
    type Err = ParseResourceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stylesheet" | "css" => Ok(ResourceKind::Stylesheet),
            "script" | "js" => Ok(ResourceKind::Script),
            "image" => Ok(ResourceKind::Image),
            "audio" | "sound" => Ok(ResourceKind::Audio),
            "font" => Ok(ResourceKind::Font),
            other => Err(ParseResourceKindError(other.to_string())),
        }
    }
}

/// Load status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Never requested from the transport
    Unknown,
    /// A fetch ticket exists, no bytes yet
    Pending,
    Loading,
    Cached,
    /// Injected content, never evicted
    Persistent,
    Error,
}

impl Status {
    /// Whether the status is final for the current load
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Cached | Status::Persistent | Status::Error)
    }
}

/// How a speculatively loaded resource was eventually used
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadResult {
    NotReferenced,
    /// Referenced by a consumer other than the preload scanner
    Referenced,
    ReferencedWhileLoading,
    ReferencedWhileComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ResourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct CachedResource {
    id: ResourceId,
    url: String,
    kind: ResourceKind,
    policy: CachePolicy,
    accept: String,
    cache: Weak<CacheShared>,
    inner: Mutex<ResourceInner>,
}

pub(crate) struct ResourceInner {
    pub(crate) status: Status,
    pub(crate) size: usize,
    pub(crate) access_count: u32,
    pub(crate) request: Option<JobId>,
    /// Detached from the registry, waiting for its last reference
    pub(crate) free: bool,
    clients: Vec<Arc<dyn ResourceClient>>,
    expires: Option<DateTime<Utc>>,
    mimetype: String,
    charset: Option<String>,
    charset_hint: Option<String>,
    preload_count: u32,
    preload_result: PreloadResult,
    prospective: bool,
    error: Option<ResourceError>,
    raw: Vec<u8>,
    payload: Payload,
}

impl ResourceInner {
    pub(crate) fn can_delete(&self) -> bool {
        self.clients.is_empty() && self.request.is_none() && self.preload_count == 0
    }

    pub(crate) fn allow_in_lru(&self) -> bool {
        self.can_delete() && !self.free && self.status != Status::Persistent
    }

    fn is_loaded(&self) -> bool {
        self.status.is_terminal()
    }
}

impl CachedResource {
    pub(crate) fn new(
        url: impl Into<String>,
        kind: ResourceKind,
        policy: CachePolicy,
        accept: String,
        animation: AnimationPolicy,
        cache: Weak<CacheShared>,
    ) -> ResourceHandle {
        Arc::new(Self {
            id: ResourceId::next(),
            url: url.into(),
            kind,
            policy,
            accept,
            cache,
            inner: Mutex::new(ResourceInner {
                status: Status::Unknown,
                size: 0,
                access_count: 0,
                request: None,
                free: false,
                clients: Vec::new(),
                expires: None,
                mimetype: String::new(),
                charset: None,
                charset_hint: None,
                preload_count: 0,
                preload_result: PreloadResult::NotReferenced,
                prospective: false,
                error: None,
                raw: Vec::new(),
                payload: Payload::new(kind, animation),
            }),
        })
    }

    /// A resource whose content was supplied directly instead of fetched
    pub(crate) fn injected(
        url: impl Into<String>,
        kind: ResourceKind,
        content: &str,
        cache: Weak<CacheShared>,
    ) -> ResourceHandle {
        let resource = Self::new(
            url,
            kind,
            CachePolicy::Cache,
            kind.accept_header(None),
            AnimationPolicy::default(),
            cache,
        );
        {
            let mut inner = resource.inner.lock();
            let text: Arc<str> = content.into();
            inner.payload = match kind {
                ResourceKind::Stylesheet => Payload::Stylesheet(Some(text)),
                _ => Payload::Script(Some(text)),
            };
            inner.status = Status::Persistent;
            inner.size = content.len();
        }
        resource
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ResourceInner> {
        self.inner.lock()
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn accept(&self) -> &str {
        &self.accept
    }

    pub fn status(&self) -> Status {
        self.inner.lock().status
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().is_loaded()
    }

    pub fn is_valid(&self) -> bool {
        self.inner.lock().error.is_none()
    }

    pub fn had_error(&self) -> bool {
        self.inner.lock().status == Status::Error
    }

    pub fn error(&self) -> Option<ResourceError> {
        self.inner.lock().error.clone()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    pub fn access_count(&self) -> u32 {
        self.inner.lock().access_count
    }

    /// Number of registered clients
    pub fn count(&self) -> usize {
        self.inner.lock().clients.len()
    }

    pub fn can_delete(&self) -> bool {
        self.inner.lock().can_delete()
    }

    pub fn allow_in_lru(&self) -> bool {
        self.inner.lock().allow_in_lru()
    }

    pub fn is_free(&self) -> bool {
        self.inner.lock().free
    }

    pub fn request(&self) -> Option<JobId> {
        self.inner.lock().request
    }

    pub fn mimetype(&self) -> String {
        self.inner.lock().mimetype.clone()
    }

    pub(crate) fn set_mimetype(&self, mimetype: &str) {
        let mut inner = self.inner.lock();
        inner.mimetype = if mimetype.contains('/') {
            mimetype.to_string()
        } else {
            String::new()
        };
    }

    /// Charset the content was decoded with, or the transport charset
    /// before decoding
    pub fn charset(&self) -> Option<String> {
        self.inner.lock().charset.clone()
    }

    pub fn set_charset(&self, charset: impl Into<String>) {
        self.inner.lock().charset = Some(charset.into());
    }

    /// Charset suggested by the requesting document
    pub fn set_charset_hint(&self, charset: impl Into<String>) {
        self.inner.lock().charset_hint = Some(charset.into());
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().expires
    }

    pub(crate) fn set_expire_date(&self, expires: Option<DateTime<Utc>>) {
        self.inner.lock().expires = expires;
    }

    /// True once the expiry date has passed. Resources without one never
    /// expire.
    pub fn is_expired(&self) -> bool {
        self.inner
            .lock()
            .expires
            .is_some_and(|expires| expires <= Utc::now())
    }

    pub fn is_preloaded(&self) -> bool {
        self.inner.lock().preload_count > 0
    }

    pub fn preload_result(&self) -> PreloadResult {
        self.inner.lock().preload_result
    }

    pub(crate) fn increase_preload_count(&self) {
        self.inner.lock().preload_count += 1;
    }

    pub(crate) fn decrease_preload_count(&self) {
        let mut inner = self.inner.lock();
        inner.preload_count = inner.preload_count.saturating_sub(1);
    }

    /// Mark the resource as requested speculatively by the preload scanner
    pub fn set_prospective(&self, prospective: bool) {
        self.inner.lock().prospective = prospective;
    }

    pub fn sheet(&self) -> Option<Arc<str>> {
        match self.kind {
            ResourceKind::Stylesheet => self.inner.lock().payload.text(),
            _ => None,
        }
    }

    pub fn script(&self) -> Option<Arc<str>> {
        match self.kind {
            ResourceKind::Script => self.inner.lock().payload.text(),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<Arc<DynamicImage>> {
        self.inner.lock().payload.decoder().and_then(|d| d.image())
    }

    pub fn image_geometry(&self) -> Option<(u32, u32)> {
        self.inner.lock().payload.decoder().and_then(|d| d.geometry())
    }

    pub fn animation(&self) -> Option<AnimationPolicy> {
        self.inner.lock().payload.decoder().map(|d| d.animation())
    }

    pub fn set_animation(&self, animation: AnimationPolicy) {
        self.inner.lock().set_animation(animation);
    }

    /// Filename from the response's content disposition
    pub fn suggested_filename(&self) -> Option<String> {
        self.inner.lock().suggested_filename()
    }

    pub(crate) fn set_suggested_filename(&self, filename: Option<String>) {
        self.inner.lock().set_suggested_filename(filename);
    }

    pub fn audio(&self) -> Option<Bytes> {
        match self.kind {
            ResourceKind::Audio => self.inner.lock().payload.bytes(),
            _ => None,
        }
    }

    /// Unpacked sfnt font data
    pub fn font(&self) -> Option<Bytes> {
        match self.kind {
            ResourceKind::Font => self.inner.lock().payload.bytes(),
            _ => None,
        }
    }

    /// Register a client
    ///
    /// The client immediately receives the notifications matching the current
    /// state. A referenced resource leaves the eviction ledger.
    pub fn register_client(self: &Arc<Self>, client: Arc<dyn ResourceClient>) {
        let notices = {
            let mut inner = self.inner.lock();
            if inner.preload_result == PreloadResult::NotReferenced {
                inner.preload_result = if inner.is_loaded() {
                    PreloadResult::ReferencedWhileComplete
                } else if inner.prospective {
                    PreloadResult::ReferencedWhileLoading
                } else {
                    PreloadResult::Referenced
                };
            }
            inner.clients.push(client.clone());
            inner.access_count += 1;
            inner.replay(self.kind, &self.url)
        };

        if let Some(cache) = self.cache.upgrade() {
            cache.remove_from_lru(self);
        }
        self.deliver(&[client], &notices);
    }

    /// Unregister a client
    ///
    /// Runs a non-forced flush first, then re-enters the eviction ledger if
    /// the resource became deletable.
    pub fn unregister_client<C: ResourceClient + ?Sized>(self: &Arc<Self>, client: &Arc<C>) {
        let cache = self.cache.upgrade();
        if let Some(cache) = &cache {
            cache.flush(false);
        }

        {
            let mut inner = self.inner.lock();
            let target = Arc::as_ptr(client).cast::<()>();
            let Some(position) = inner
                .clients
                .iter()
                .position(|c| Arc::as_ptr(c).cast::<()>() == target)
            else {
                warn!("Client is not registered with {}", self.url);
                return;
            };
            inner.clients.remove(position);
        }

        if let Some(cache) = &cache {
            cache.insert_in_lru(self);
        }
    }

    /// Take a chunk of body bytes. `eof` marks the final chunk, after which
    /// the payload is complete and clients are told.
    pub(crate) fn data(self: &Arc<Self>, chunk: &[u8], eof: bool) {
        let update = self.inner.lock().receive(self.kind, chunk, eof);
        self.apply(update);
    }

    /// Record a fetch failure and notify clients
    pub(crate) fn report_error(self: &Arc<Self>, error: ResourceError) {
        debug!("{} failed: {}", self.url, error);
        let update = self.inner.lock().fail(self.kind, error);
        self.apply(update);
    }

    /// Settle the final accounting size once the load is over
    pub(crate) fn finish(self: &Arc<Self>) {
        let size = {
            let mut inner = self.inner.lock();
            if !inner.status.is_terminal() {
                inner.status = Status::Cached;
            }
            inner.final_size()
        };
        if let Some(size) = size {
            self.set_size(size);
        }
    }

    /// Body bytes have started arriving
    pub(crate) fn mark_loading(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.status, Status::Unknown | Status::Pending) {
            inner.status = Status::Loading;
        }
    }

    /// Change the accounted size, moving the resource to its new bucket
    pub(crate) fn set_size(self: &Arc<Self>, size: usize) {
        match self.cache.upgrade() {
            Some(cache) => cache.resize(self, size),
            None => self.inner.lock().size = size,
        }
    }

    fn apply(self: &Arc<Self>, update: Update) {
        if let Some(size) = update.size {
            self.set_size(size);
        }
        if update.notices.is_empty() {
            return;
        }
        let clients = self.inner.lock().clients.clone();
        self.deliver(&clients, &update.notices);
    }

    fn deliver(self: &Arc<Self>, clients: &[Arc<dyn ResourceClient>], notices: &[Notice]) {
        for notice in notices {
            for client in clients {
                match notice {
                    Notice::StyleSheet {
                        sheet,
                        charset,
                        mimetype,
                    } => client.set_style_sheet(&self.url, sheet, charset, mimetype),
                    Notice::Image(rect) => client.update_image(*rect, self),
                    Notice::Finished => client.notify_finished(self),
                    Notice::Error(error) => client.error(error.code, &error.message),
                }
            }
        }
    }
}

impl fmt::Debug for CachedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CachedResource");
        out.field("url", &self.url).field("kind", &self.kind);
        if let Some(inner) = self.inner.try_lock() {
            out.field("status", &inner.status)
                .field("size", &inner.size)
                .field("clients", &inner.clients.len());
        }
        out.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ImageRect;
    use crate::decode::bitmap::png_fixture;
    use crate::test_utils::{ClientEvent, RecordingClient};

    fn detached(url: &str, kind: ResourceKind) -> ResourceHandle {
        CachedResource::new(
            url,
            kind,
            CachePolicy::Verify,
            kind.accept_header(None),
            AnimationPolicy::Enabled,
            Weak::new(),
        )
    }

    #[test]
    fn test_kind_properties() {
        assert_eq!(ResourceKind::Stylesheet.priority(), -8);
        assert_eq!(ResourceKind::Audio.priority(), 2);
        assert!(ResourceKind::Image.incremental());
        assert!(!ResourceKind::Image.loads_on_request());
        assert_eq!(
            ResourceKind::Stylesheet.accept_header(None),
            "text/css,*/*;q=0.1"
        );
        assert_eq!(
            ResourceKind::Stylesheet.accept_header(Some("text/x-foo")),
            "text/x-foo,*/*;q=0.1"
        );
        assert_eq!(ResourceKind::Font.accept_header(Some("font/woff")), "*/*");
        assert_eq!("css".parse::<ResourceKind>().unwrap(), ResourceKind::Stylesheet);
        assert!("video".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_mimetype_needs_slash() {
        let res = detached("http://a/x.css", ResourceKind::Stylesheet);
        res.set_mimetype("text/css");
        assert_eq!(res.mimetype(), "text/css");
        res.set_mimetype("garbage");
        assert_eq!(res.mimetype(), "");
    }

    #[test]
    fn test_stylesheet_charset_rule() {
        let res = detached("http://a/x.css", ResourceKind::Stylesheet);
        res.set_charset_hint("utf-8");
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());

        res.data(b"@charset \"iso-8859-1\"; p:after{content:\"\xe9\"}", true);
        assert_eq!(res.status(), Status::Cached);
        assert_eq!(res.charset().as_deref(), Some("windows-1252"));
        assert!(res.sheet().unwrap().contains('\u{e9}'));
        assert!(matches!(
            client.events().as_slice(),
            [ClientEvent::StyleSheet { .. }]
        ));
    }

    #[test]
    fn test_stylesheet_transport_charset_beats_hint() {
        let res = detached("http://a/x.css", ResourceKind::Stylesheet);
        res.set_charset("utf-8");
        res.set_charset_hint("koi8-r");
        res.data("p{content:\"\u{e9}\"}".as_bytes(), true);
        assert_eq!(res.charset().as_deref(), Some("UTF-8"));
        assert!(res.sheet().unwrap().contains('\u{e9}'));
    }

    #[test]
    fn test_script_bom_is_stripped() {
        let res = detached("http://a/x.js", ResourceKind::Script);
        res.data(b"\xef\xbb\xbfvar a;", true);
        assert_eq!(res.script().as_deref(), Some("var a;"));
        assert_eq!(res.size(), 9);
    }

    #[test]
    fn test_chunks_accumulate_until_eof() {
        let res = detached("http://a/x.js", ResourceKind::Script);
        res.data(b"var ", false);
        assert_eq!(res.status(), Status::Loading);
        assert_eq!(res.script(), None);
        res.data(b"a;", true);
        assert_eq!(res.script().as_deref(), Some("var a;"));
    }

    #[test]
    fn test_image_reports_geometry_then_finish() {
        let res = detached("http://a/x.png", ResourceKind::Image);
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());

        let png = png_fixture(4, 5);
        res.data(&png, false);
        res.data(&[], true);
        res.finish();

        assert_eq!(res.image_geometry(), Some((4, 5)));
        assert_eq!(res.size(), 4 * 5 * 2);
        let events = client.events();
        assert_eq!(events.first(), Some(&ClientEvent::Image(ImageRect::sized(4, 5))));
        assert_eq!(events.last(), Some(&ClientEvent::Finished(res.url().to_string())));
    }

    #[test]
    fn test_client_joining_mid_load_gets_geometry() {
        let res = detached("http://a/x.png", ResourceKind::Image);
        res.data(&png_fixture(4, 5), false);
        assert_eq!(res.status(), Status::Loading);
        assert_eq!(res.image_geometry(), Some((4, 5)));

        let late = Arc::new(RecordingClient::default());
        res.register_client(late.clone());
        assert_eq!(late.events(), vec![ClientEvent::Image(ImageRect::sized(4, 5))]);

        res.data(&[], true);
        res.finish();
        assert_eq!(late.finished_count(), 1);

        // Nothing is known yet about an image with no bytes
        let empty = detached("http://a/y.png", ResourceKind::Image);
        let early = Arc::new(RecordingClient::default());
        empty.register_client(early.clone());
        assert!(early.events().is_empty());
    }

    #[test]
    fn test_image_error_placeholder() {
        let res = detached("http://a/x.png", ResourceKind::Image);
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());

        res.report_error(ResourceError::new(7, "gone"));
        assert!(res.had_error());
        assert_eq!(
            client.events(),
            vec![
                ClientEvent::Image(ImageRect::sized(16, 16)),
                ClientEvent::Finished(res.url().to_string()),
            ]
        );
    }

    #[test]
    fn test_stylesheet_error_notifies_error() {
        let res = detached("http://a/x.css", ResourceKind::Stylesheet);
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());
        res.report_error(ResourceError::new(2, "refused"));
        assert_eq!(client.events(), vec![ClientEvent::Error(2, "refused".to_string())]);

        // Late registration replays the error
        let late = Arc::new(RecordingClient::default());
        res.register_client(late.clone());
        assert_eq!(late.events(), vec![ClientEvent::Error(2, "refused".to_string())]);
    }

    #[test]
    fn test_font_decode_failure() {
        let res = detached("http://a/x.woff", ResourceKind::Font);
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());
        res.data(b"", true);
        assert!(res.had_error());
        assert_eq!(res.error().unwrap().code, crate::error::DecodeError::CODE);
        assert_eq!(client.finished_count(), 1);
    }

    #[test]
    fn test_data_after_terminal_is_ignored() {
        let res = detached("http://a/x.js", ResourceKind::Script);
        res.data(b"a", true);
        res.data(b"b", true);
        assert_eq!(res.script().as_deref(), Some("a"));
    }

    #[test]
    fn test_preload_result_on_first_reference() {
        let loading = detached("http://a/1.js", ResourceKind::Script);
        loading.set_prospective(true);
        loading.register_client(Arc::new(RecordingClient::default()));
        assert_eq!(loading.preload_result(), PreloadResult::ReferencedWhileLoading);

        let done = detached("http://a/2.js", ResourceKind::Script);
        done.data(b"x", true);
        done.register_client(Arc::new(RecordingClient::default()));
        assert_eq!(done.preload_result(), PreloadResult::ReferencedWhileComplete);

        let plain = detached("http://a/3.js", ResourceKind::Script);
        plain.register_client(Arc::new(RecordingClient::default()));
        plain.set_prospective(true);
        plain.register_client(Arc::new(RecordingClient::default()));
        assert_eq!(plain.preload_result(), PreloadResult::Referenced);
    }

    #[test]
    fn test_unregister_matches_identity() {
        let res = detached("http://a/x.js", ResourceKind::Script);
        let a = Arc::new(RecordingClient::default());
        let b = Arc::new(RecordingClient::default());
        res.register_client(a.clone());
        res.register_client(b.clone());
        assert_eq!(res.access_count(), 2);

        res.unregister_client(&a);
        assert_eq!(res.count(), 1);
        res.unregister_client(&a);
        assert_eq!(res.count(), 1);
        res.unregister_client(&b);
        assert!(res.can_delete());
    }

    #[test]
    fn test_expiry() {
        let res = detached("http://a/x.js", ResourceKind::Script);
        assert!(!res.is_expired());
        res.set_expire_date(Some(Utc::now() - chrono::Duration::seconds(1)));
        assert!(res.is_expired());
        res.set_expire_date(Some(Utc::now() + chrono::Duration::hours(1)));
        assert!(!res.is_expired());
    }
}
