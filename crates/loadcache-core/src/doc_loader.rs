//! Per-document consumer context
//!
//! A [`DocLoader`] requests resources on behalf of one document. It applies
//! the document's security checks and revalidation policy, remembers every
//! resource the document touched, tracks speculative preloads, and tears all
//! of that down when dropped.

use loadcache_transport::CachePolicy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use url::Url;

use crate::cache::Cache;
use crate::decode::AnimationPolicy;
use crate::error::CoreError;
use crate::loader::{self, FetchOrigin};
use crate::resource::{PreloadResult, ResourceHandle, ResourceId, ResourceKind, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocLoaderId(u64);

impl DocLoaderId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DocLoaderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DocLoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "docloader#{}", self.0)
    }
}

/// Per-document loading behaviour
///
/// The revalidation policy of a new document comes from
/// [`CacheConfig::default_policy`](crate::CacheConfig::default_policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSettings {
    #[serde(default = "default_true")]
    pub autoload_images: bool,
    #[serde(default)]
    pub show_animations: AnimationPolicy,
    #[serde(default = "default_true")]
    pub scripts_enabled: bool,
    /// Only allow `file:` and `data:` URLs
    #[serde(default)]
    pub only_local_references: bool,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            autoload_images: true,
            show_animations: AnimationPolicy::default(),
            scripts_enabled: true,
            only_local_references: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Outcome of the speculative loads of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadCounts {
    pub total: usize,
    /// Referenced by the document while loading or after completion
    pub hits: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadStats {
    pub stylesheets: PreloadCounts,
    pub scripts: PreloadCounts,
    pub images: PreloadCounts,
}

struct DocLoaderState {
    policy: CachePolicy,
    settings: DocumentSettings,
    base_url: Option<Url>,
    /// URLs already revalidated by this document
    reloaded_urls: HashSet<String>,
    doc_objects: HashMap<ResourceId, ResourceHandle>,
    preloads: HashMap<ResourceId, ResourceHandle>,
}

pub(crate) struct DocLoaderShared {
    id: DocLoaderId,
    state: Mutex<DocLoaderState>,
}

impl DocLoaderShared {
    pub(crate) fn id(&self) -> DocLoaderId {
        self.id
    }

    pub(crate) fn uses(&self, resource: &ResourceHandle) -> bool {
        self.state.lock().doc_objects.contains_key(&resource.id())
    }

    /// Forget a resource the registry dropped
    pub(crate) fn remove_cached_object(&self, resource: &ResourceHandle) {
        self.state.lock().doc_objects.remove(&resource.id());
    }
}

pub struct DocLoader {
    cache: Cache,
    shared: Arc<DocLoaderShared>,
}

impl DocLoader {
    pub fn new(cache: &Cache, settings: DocumentSettings) -> Self {
        let shared = Arc::new(DocLoaderShared {
            id: DocLoaderId::next(),
            state: Mutex::new(DocLoaderState {
                policy: cache.config().default_policy,
                settings,
                base_url: None,
                reloaded_urls: HashSet::new(),
                doc_objects: HashMap::new(),
                preloads: HashMap::new(),
            }),
        });
        cache.shared().register_doc_loader(&shared);
        debug!("Created {} ({})", shared.id, cache.config().default_policy);

        Self {
            cache: cache.clone(),
            shared,
        }
    }

    pub fn id(&self) -> DocLoaderId {
        self.shared.id
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn settings(&self) -> DocumentSettings {
        self.shared.state.lock().settings.clone()
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.shared.state.lock().policy
    }

    pub fn set_cache_policy(&self, policy: CachePolicy) {
        self.shared.state.lock().policy = policy;
    }

    pub fn base_url(&self) -> Option<Url> {
        self.shared.state.lock().base_url.clone()
    }

    /// URL of the document, used to complete relative URLs and as referrer
    pub fn set_base_url(&self, url: Url) {
        self.shared.state.lock().base_url = Some(url);
    }

    pub fn autoload_images(&self) -> bool {
        self.shared.state.lock().settings.autoload_images
    }

    /// Turning auto-loading on starts every image of this document that was
    /// never fetched
    pub fn set_autoload_images(&self, enable: bool) {
        let pending: Vec<ResourceHandle> = {
            let mut state = self.shared.state.lock();
            let was_enabled = state.settings.autoload_images;
            state.settings.autoload_images = enable;
            if !enable || was_enabled {
                return;
            }
            state
                .doc_objects
                .values()
                .filter(|r| r.kind() == ResourceKind::Image && r.status() == Status::Unknown)
                .cloned()
                .collect()
        };

        if !pending.is_empty() {
            debug!("{} loading {} deferred images", self.id(), pending.len());
        }
        let loader = self.cache.loader();
        for image in pending {
            loader.load(
                Some(self),
                &image,
                ResourceKind::Image.incremental(),
                ResourceKind::Image.priority(),
            );
        }
    }

    pub fn show_animations(&self) -> AnimationPolicy {
        self.shared.state.lock().settings.show_animations
    }

    pub fn set_show_animations(&self, animation: AnimationPolicy) {
        let images: Vec<ResourceHandle> = {
            let mut state = self.shared.state.lock();
            if state.settings.show_animations == animation {
                return;
            }
            state.settings.show_animations = animation;
            state
                .doc_objects
                .values()
                .filter(|r| r.kind() == ResourceKind::Image)
                .cloned()
                .collect()
        };
        for image in images {
            image.set_animation(animation);
        }
    }

    pub fn scripts_enabled(&self) -> bool {
        self.shared.state.lock().settings.scripts_enabled
    }

    pub fn set_scripts_enabled(&self, enable: bool) {
        self.shared.state.lock().settings.scripts_enabled = enable;
    }

    pub(crate) fn origin(&self) -> FetchOrigin {
        FetchOrigin {
            doc_loader: self.id(),
            referrer: self.base_url().map(|u| u.to_string()),
        }
    }

    /// Resolve `url` against the document URL
    pub fn complete_url(&self, url: &str) -> Result<Url, CoreError> {
        match self.base_url() {
            Some(base) => Ok(base.join(url)?),
            None => Ok(Url::parse(url)?),
        }
    }

    fn check_url(&self, url: &str) -> Result<Url, CoreError> {
        let url = self.complete_url(url)?;
        let local_only = self.shared.state.lock().settings.only_local_references;
        if local_only && !matches!(url.scheme(), "file" | "data") {
            return Err(CoreError::Refused(format!(
                "{} is not a local reference",
                url
            )));
        }
        Ok(url)
    }

    fn security_check(&self, url: &str) -> Option<Url> {
        match self.check_url(url) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("{} refusing {}: {}", self.id(), url, e);
                None
            }
        }
    }

    /// Whether a media element may load `url`; nothing is fetched
    pub fn will_load_media_element(&self, url: &str) -> bool {
        self.security_check(url).is_some()
    }

    pub fn request_style_sheet(
        &self,
        url: &str,
        charset: Option<&str>,
        accept: Option<&str>,
    ) -> Option<ResourceHandle> {
        let url = self.security_check(url)?;
        let resource =
            self.cache
                .request_object(self, url.as_str(), ResourceKind::Stylesheet, accept);
        if let Some(charset) = charset {
            resource.set_charset_hint(charset);
        }
        Some(resource)
    }

    pub fn request_script(&self, url: &str, charset: Option<&str>) -> Option<ResourceHandle> {
        if !self.scripts_enabled() {
            debug!("{} refusing script {}: scripting disabled", self.id(), url);
            return None;
        }
        let url = self.security_check(url)?;
        let resource = self
            .cache
            .request_object(self, url.as_str(), ResourceKind::Script, None);
        if let Some(charset) = charset {
            resource.set_charset_hint(charset);
        }
        Some(resource)
    }

    /// Request an image. It is only fetched while auto-loading is enabled;
    /// otherwise it stays [`Status::Unknown`].
    pub fn request_image(&self, url: &str) -> Option<ResourceHandle> {
        let url = self.security_check(url)?;
        let resource = self
            .cache
            .request_object(self, url.as_str(), ResourceKind::Image, None);
        if resource.status() == Status::Unknown && self.autoload_images() {
            self.cache.loader().load(
                Some(self),
                &resource,
                ResourceKind::Image.incremental(),
                ResourceKind::Image.priority(),
            );
        }
        Some(resource)
    }

    pub fn request_sound(&self, url: &str) -> Option<ResourceHandle> {
        let url = self.security_check(url)?;
        Some(
            self.cache
                .request_object(self, url.as_str(), ResourceKind::Audio, None),
        )
    }

    pub fn request_font(&self, url: &str) -> Option<ResourceHandle> {
        let url = self.security_check(url)?;
        Some(
            self.cache
                .request_object(self, url.as_str(), ResourceKind::Font, None),
        )
    }

    /// Decide whether the registry should drop what it has for `url` and
    /// fetch again. Each URL is revalidated at most once per document.
    pub fn need_reload(&self, url: &str, existing: Option<&ResourceHandle>) -> bool {
        let mut state = self.shared.state.lock();
        if state.reloaded_urls.contains(url) {
            return false;
        }

        let reload = match state.policy {
            CachePolicy::Verify => {
                existing.is_some_and(|e| e.is_expired() && !e.is_preloaded())
            }
            CachePolicy::Reload | CachePolicy::Refresh => {
                existing.is_none_or(|e| !e.is_preloaded())
            }
            CachePolicy::Cache | CachePolicy::CacheOnly => false,
        };
        if reload {
            state.reloaded_urls.insert(url.to_string());
        }
        reload
    }

    /// Remember a resource loaded before the document asked for it
    pub fn register_preload(&self, resource: &ResourceHandle) {
        if resource.is_loaded() {
            return;
        }
        {
            let mut state = self.shared.state.lock();
            if state.preloads.contains_key(&resource.id()) {
                return;
            }
            state.preloads.insert(resource.id(), resource.clone());
        }
        resource.increase_preload_count();
        resource.set_prospective(true);
        self.cache.shared().remove_from_lru(resource);
    }

    /// Release every preload. Those never referenced, or that failed, leave
    /// the registry.
    pub fn clear_preloads(&self) {
        let preloads: Vec<ResourceHandle> = self
            .shared
            .state
            .lock()
            .preloads
            .drain()
            .map(|(_, r)| r)
            .collect();

        for resource in preloads {
            resource.decrease_preload_count();
            if resource.preload_result() == PreloadResult::NotReferenced || resource.had_error() {
                debug!("Dropping unused preload {}", resource.url());
                self.cache.remove_cache_entry(&resource);
            } else {
                self.cache.shared().insert_in_lru(&resource);
            }
        }
    }

    pub fn preload_stats(&self) -> PreloadStats {
        let state = self.shared.state.lock();
        let mut stats = PreloadStats::default();
        for resource in state.preloads.values() {
            let counts = match resource.kind() {
                ResourceKind::Stylesheet => &mut stats.stylesheets,
                ResourceKind::Script => &mut stats.scripts,
                ResourceKind::Image => &mut stats.images,
                _ => continue,
            };
            counts.total += 1;
            if resource.preload_result() >= PreloadResult::ReferencedWhileLoading {
                counts.hits += 1;
            }
        }
        stats
    }

    /// Requests still in flight for this document
    pub fn num_requests(&self) -> usize {
        self.cache.loader().num_requests(self)
    }

    /// Resources this document touched that are still registered
    pub fn doc_objects(&self) -> Vec<ResourceHandle> {
        self.shared.state.lock().doc_objects.values().cloned().collect()
    }

    pub fn uses(&self, resource: &ResourceHandle) -> bool {
        self.shared
            .state
            .lock()
            .doc_objects
            .contains_key(&resource.id())
    }

    pub(crate) fn insert_cached_object(&self, resource: &ResourceHandle) {
        self.shared
            .state
            .lock()
            .doc_objects
            .entry(resource.id())
            .or_insert_with(|| resource.clone());
    }
}

impl Drop for DocLoader {
    fn drop(&mut self) {
        let stats = self.preload_stats();
        if stats != PreloadStats::default() {
            debug!("{} preload stats: {:?}", self.id(), stats);
        }
        self.clear_preloads();
        let cancelled = loader::cancel_requests(self.cache.shared(), self.id());
        self.cache.shared().unregister_doc_loader(&self.shared);
        debug!("Dropped {} ({} requests cancelled)", self.id(), cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::test_utils::{RecordingClient, ScriptedTransport, TestCache};
    use loadcache_transport::ResponseMeta;

    #[test]
    fn test_policy_comes_from_cache_config() {
        let config = CacheConfig {
            default_policy: CachePolicy::Reload,
            ..Default::default()
        };
        let cache = Cache::new(config, Arc::new(ScriptedTransport::default()));
        let dl = DocLoader::new(&cache, DocumentSettings::default());
        assert_eq!(dl.cache_policy(), CachePolicy::Reload);

        dl.set_cache_policy(CachePolicy::Cache);
        assert_eq!(dl.cache_policy(), CachePolicy::Cache);
        assert_eq!(cache.config().default_policy, CachePolicy::Reload);
    }

    #[test]
    fn test_security_checks() {
        let t = TestCache::with_settings(|s| s.only_local_references = true);
        let dl = t.doc_loader();
        assert!(dl.request_style_sheet("http://a/x.css", None, None).is_none());
        assert!(dl.request_style_sheet("not a url", None, None).is_none());
        assert!(!dl.will_load_media_element("https://a/v.ogg"));
        assert!(dl.will_load_media_element("data:audio/ogg,xyz"));
        assert!(dl.request_script("file:///tmp/x.js", None).is_some());
        assert_eq!(t.transport.started(), 1);
        assert_eq!(t.cache.len(), 1);
    }

    #[test]
    fn test_scripts_disabled() {
        let t = TestCache::with_settings(|s| s.scripts_enabled = false);
        let dl = t.doc_loader();
        assert!(dl.request_script("http://a/x.js", None).is_none());
        assert!(t.cache.is_empty());

        dl.set_scripts_enabled(true);
        assert!(dl.request_script("http://a/x.js", None).is_some());
    }

    #[test]
    fn test_relative_urls_resolve_against_base() {
        let t = TestCache::new();
        let dl = t.doc_loader_at("http://a/dir/page.html");
        let res = dl.request_font("../fonts/x.woff").unwrap();
        assert_eq!(res.url(), "http://a/fonts/x.woff");
        assert!(dl.uses(&res));
    }

    #[test]
    fn test_charset_hint_applied() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let res = dl
            .request_style_sheet("http://a/x.css", Some("koi8-r"), None)
            .unwrap();
        t.transport.last().data(b"p{content:\"\xc1\"}");
        t.transport.last().finish(ResponseMeta::default());
        t.cache.pump();
        assert_eq!(res.charset().as_deref(), Some("KOI8-R"));
    }

    #[test]
    fn test_autoload_images_toggle() {
        let t = TestCache::with_settings(|s| s.autoload_images = false);
        let dl = t.doc_loader();
        let res = dl.request_image("http://a/x.png").unwrap();
        assert_eq!(res.status(), Status::Unknown);
        assert_eq!(t.transport.started(), 0);

        dl.set_autoload_images(true);
        assert_eq!(res.status(), Status::Pending);
        assert_eq!(t.transport.started(), 1);
        assert_eq!(t.transport.last().request().priority, 0);
        assert_eq!(dl.num_requests(), 1);

        // Already loading, nothing new is started
        dl.set_autoload_images(false);
        dl.set_autoload_images(true);
        assert_eq!(t.transport.started(), 1);
    }

    #[test]
    fn test_show_animations_propagates() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let image = dl.request_image("http://a/x.gif").unwrap();
        assert_eq!(image.animation(), Some(AnimationPolicy::Enabled));
        dl.set_show_animations(AnimationPolicy::Once);
        assert_eq!(image.animation(), Some(AnimationPolicy::Once));

        let later = dl.request_image("http://a/y.gif").unwrap();
        assert_eq!(later.animation(), Some(AnimationPolicy::Once));
    }

    #[test]
    fn test_verify_reloads_expired_once() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let first = dl.request_script("http://a/x.js", None).unwrap();
        t.transport.last().finish(ResponseMeta {
            expires: Some(chrono::Utc::now() - chrono::Duration::seconds(5)),
            ..Default::default()
        });
        t.cache.pump();
        assert!(first.is_expired());

        let second = dl.request_script("http://a/x.js", None).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.is_free());
        assert_eq!(t.transport.started(), 2);

        t.transport.last().finish(ResponseMeta {
            expires: Some(chrono::Utc::now() - chrono::Duration::seconds(5)),
            ..Default::default()
        });
        t.cache.pump();
        let third = dl.request_script("http://a/x.js", None).unwrap();
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(t.transport.started(), 2);

        // Another document revalidates on its own
        let other = t.doc_loader();
        let fourth = other.request_script("http://a/x.js", None).unwrap();
        assert!(!Arc::ptr_eq(&third, &fourth));
    }

    #[test]
    fn test_reload_policy_fetches_once_per_document() {
        let t = TestCache::new();
        let warm = t.doc_loader();
        let cached = warm.request_script("http://a/x.js", None).unwrap();
        t.transport.last().finish(ResponseMeta::default());
        t.cache.pump();

        let dl = t.doc_loader();
        dl.set_cache_policy(CachePolicy::Reload);
        let fresh = dl.request_script("http://a/x.js", None).unwrap();
        assert!(!Arc::ptr_eq(&cached, &fresh));
        assert_eq!(fresh.cache_policy(), CachePolicy::Reload);
        let again = dl.request_script("http://a/x.js", None).unwrap();
        assert!(Arc::ptr_eq(&fresh, &again));

        let new_url = dl.request_script("http://a/y.js", None).unwrap();
        let new_again = dl.request_script("http://a/y.js", None).unwrap();
        assert!(Arc::ptr_eq(&new_url, &new_again));
        assert_eq!(t.transport.started(), 3);
    }

    #[test]
    fn test_need_reload_at_most_once() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        dl.set_cache_policy(CachePolicy::Refresh);
        let res = dl.request_sound("http://a/x.ogg").unwrap();
        let answers = [
            dl.need_reload("http://a/z.ogg", Some(&res)),
            dl.need_reload("http://a/z.ogg", Some(&res)),
        ];
        assert_eq!(answers, [true, false]);

        dl.set_cache_policy(CachePolicy::Cache);
        assert!(!dl.need_reload("http://a/q.ogg", Some(&res)));
    }

    #[test]
    fn test_unreferenced_preload_removed_on_drop() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let res = dl.request_script("http://a/D.js", None).unwrap();
        dl.register_preload(&res);
        assert!(res.is_preloaded());
        t.transport.last().finish(ResponseMeta::default());
        t.cache.pump();
        assert!(!t.cache.in_ledger(&res));

        drop(dl);
        assert!(!t.cache.contains("http://a/D.js"));
        assert!(!res.is_preloaded());
    }

    #[test]
    fn test_referenced_preload_survives_drop() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let res = dl.request_style_sheet("http://a/x.css", None, None).unwrap();
        dl.register_preload(&res);
        let client = Arc::new(RecordingClient::default());
        res.register_client(client.clone());
        assert_eq!(res.preload_result(), PreloadResult::ReferencedWhileLoading);

        let stats = dl.preload_stats();
        assert_eq!(stats.stylesheets, PreloadCounts { total: 1, hits: 1 });
        assert_eq!(stats.scripts, PreloadCounts::default());

        t.transport.last().finish(ResponseMeta::default());
        t.cache.pump();
        drop(dl);
        assert!(t.cache.contains("http://a/x.css"));

        res.unregister_client(&client);
        assert!(t.cache.in_ledger(&res));
    }

    #[test]
    fn test_loaded_resource_is_not_a_preload() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        let sheet = t.cache.preload_style_sheet("http://a/x.css", "p{}");
        dl.register_preload(&sheet);
        assert!(!sheet.is_preloaded());
        assert_eq!(dl.preload_stats(), PreloadStats::default());
    }

    #[test]
    fn test_cancel_only_own_requests() {
        let t = TestCache::new();
        let doomed = t.doc_loader();
        let survivor = t.doc_loader();
        let a = doomed.request_script("http://a/1.js", None).unwrap();
        let b = doomed.request_image("http://a/2.png").unwrap();
        let c = survivor.request_script("http://a/3.js", None).unwrap();
        let jobs = t.transport.jobs();

        t.loader().cancel_requests(&doomed);
        assert!(jobs[0].killed());
        assert!(jobs[1].killed());
        assert!(!jobs[2].killed());
        assert!(!t.cache.contains(a.url()));
        assert!(!t.cache.contains(b.url()));
        assert!(t.cache.contains(c.url()));
        assert_eq!(doomed.num_requests(), 0);
        assert_eq!(survivor.num_requests(), 1);
        assert!(!doomed.uses(&a));

        // Late events of the killed jobs are dropped
        jobs[0].data(b"late");
        jobs[0].finish(ResponseMeta::default());
        t.cache.pump();
        assert_eq!(a.script(), None);
        assert_eq!(a.request(), None);
    }

    #[test]
    fn test_shared_request_outlives_cancelling_context() {
        let t = TestCache::new();
        let first = t.doc_loader();
        let second = t.doc_loader();
        let res = first.request_script("http://a/x.js", None).unwrap();
        let same = second.request_script("http://a/x.js", None).unwrap();
        assert!(Arc::ptr_eq(&res, &same));
        assert_eq!(t.transport.started(), 1);

        let client = Arc::new(RecordingClient::default());
        same.register_client(client.clone());
        let job = t.transport.last();

        drop(first);
        assert!(!job.killed());
        assert!(t.cache.contains("http://a/x.js"));
        assert_eq!(same.request(), Some(job.id()));
        assert_eq!(second.num_requests(), 1);

        job.data(b"var a;");
        job.finish(ResponseMeta::default());
        t.cache.pump();
        assert_eq!(same.status(), Status::Cached);
        assert_eq!(same.script().as_deref(), Some("var a;"));
        assert_eq!(client.finished_count(), 1);

        // Unshared requests of a dropped context are still killed
        let third = t.doc_loader();
        third.request_script("http://a/y.js", None).unwrap();
        let lone = t.transport.last();
        drop(third);
        assert!(lone.killed());
        assert!(!t.cache.contains("http://a/y.js"));
    }

    #[test]
    fn test_drop_cancels_outstanding() {
        let t = TestCache::new();
        let dl = t.doc_loader();
        dl.request_script("http://a/x.js", None).unwrap();
        drop(dl);
        assert!(t.transport.last().killed());
        assert!(t.cache.is_empty());
        assert_eq!(t.loader().outstanding(), 0);
    }

    #[test]
    fn test_shared_resource_survives_other_context() {
        let t = TestCache::new();
        let first = t.doc_loader();
        let res = first.request_script("http://a/x.js", None).unwrap();
        t.transport.last().finish(ResponseMeta::default());
        t.cache.pump();

        let second = t.doc_loader();
        let same = second.request_script("http://a/x.js", None).unwrap();
        assert!(Arc::ptr_eq(&res, &same));
        drop(first);
        assert!(t.cache.contains("http://a/x.js"));
        assert!(second.uses(&same));
    }
}
