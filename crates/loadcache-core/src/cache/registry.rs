//! Cache registry
//!
//! Owns the URL map, the eviction ledger and the list of detached entries.
//! Lock order is registry state, then loader state, then document loader
//! state, then resource state. Client callbacks never run while any of them
//! is held.

use loadcache_transport::{JobId, Transport};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::ledger::{EvictionLedger, NUM_BUCKETS};
use super::stats::CacheStatistics;
use crate::config::CacheConfig;
use crate::doc_loader::{DocLoader, DocLoaderId, DocLoaderShared};
use crate::loader::{self, FetchOrigin, Loader, LoaderShared};
use crate::resource::{CachedResource, ResourceHandle, ResourceId, ResourceKind, Status};

pub(crate) struct CacheState {
    entries: HashMap<String, ResourceHandle>,
    ledger: EvictionLedger<ResourceId, ResourceHandle>,
    /// Removed from the map while still referenced
    detached: Vec<ResourceHandle>,
    max_size: usize,
}

pub(crate) struct CacheShared {
    pub(crate) state: Mutex<CacheState>,
    pub(crate) loader: LoaderShared,
    doc_loaders: Mutex<Vec<Weak<DocLoaderShared>>>,
    config: CacheConfig,
}

/// Shared in-memory resource cache
///
/// Cloning is cheap and yields another handle to the same cache.
#[derive(Clone)]
pub struct Cache {
    shared: Arc<CacheShared>,
}

impl Cache {
    pub fn new(config: CacheConfig, transport: Arc<dyn Transport>) -> Self {
        info!(
            "Initializing resource cache (max_size: {} bytes, policy: {})",
            config.max_size, config.default_policy
        );

        Self {
            shared: Arc::new(CacheShared {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    ledger: EvictionLedger::new(),
                    detached: Vec::new(),
                    max_size: config.max_size,
                }),
                loader: LoaderShared::new(transport),
                doc_loaders: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<CacheShared> {
        &self.shared
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    pub fn loader(&self) -> Loader {
        Loader::new(self.shared.clone())
    }

    /// Look up or create the resource for `url`
    ///
    /// An entry of another kind, or one the document loader wants reloaded,
    /// is replaced. A new non-image resource starts loading right away.
    pub fn request_object(
        &self,
        doc_loader: &DocLoader,
        url: &str,
        kind: ResourceKind,
        accept: Option<&str>,
    ) -> ResourceHandle {
        let shared = &self.shared;
        let origin = doc_loader.origin();
        let mut state = shared.state.lock();

        let mut existing = state.entries.get(url).cloned();
        if let Some(entry) = existing.take_if(|e| e.kind() != kind) {
            debug!("{} cached as {}, replacing with {}", url, entry.kind(), kind);
            shared.remove_entry_locked(&mut state, &entry);
        }
        if doc_loader.need_reload(url, existing.as_ref())
            && let Some(entry) = existing.take()
        {
            debug!("Reloading {}", url);
            shared.remove_entry_locked(&mut state, &entry);
        }

        let resource = match existing {
            Some(entry) => {
                counter!("loadcache_hits_total").increment(1);
                debug!("Using {} {} ({:?})", kind, url, entry.status());
                entry
            }
            None => {
                counter!("loadcache_misses_total").increment(1);
                let resource = CachedResource::new(
                    url,
                    kind,
                    doc_loader.cache_policy(),
                    kind.accept_header(accept),
                    doc_loader.show_animations(),
                    Arc::downgrade(shared),
                );
                state.entries.insert(url.to_string(), resource.clone());
                if kind.loads_on_request() {
                    shared.begin_fetch_locked(
                        &mut state,
                        Some(&origin),
                        &resource,
                        kind.incremental(),
                        kind.priority(),
                    );
                }
                shared.insert_in_lru_locked(&mut state, &resource);
                resource
            }
        };
        drop(state);

        doc_loader.insert_cached_object(&resource);
        resource
    }

    /// Entry currently registered for `url`
    pub fn get(&self, url: &str) -> Option<ResourceHandle> {
        self.shared.state.lock().entries.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.shared.state.lock().entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().entries.is_empty()
    }

    /// Remove a resource from the registry. A resource still in use is kept
    /// on the detached list until its last client goes away.
    pub fn remove_cache_entry(&self, resource: &ResourceHandle) {
        self.shared.remove_cache_entry(resource);
    }

    /// Evict down to the budget. Without `force` nothing happens until the
    /// ledger exceeds the budget by a quarter.
    pub fn flush(&self, force: bool) {
        self.shared.flush(force);
    }

    /// Change the budget and flush immediately
    pub fn set_size(&self, max_size: usize) {
        let mut state = self.shared.state.lock();
        info!("Cache budget {} -> {} bytes", state.max_size, max_size);
        state.max_size = max_size;
        self.shared.flush_locked(&mut state, true);
    }

    pub fn max_size(&self) -> usize {
        self.shared.state.lock().max_size
    }

    /// Bytes currently accounted in the eviction ledger
    pub fn ledger_size(&self) -> usize {
        self.shared.state.lock().ledger.total_size()
    }

    pub fn in_ledger(&self, resource: &ResourceHandle) -> bool {
        self.shared.state.lock().ledger.contains(&resource.id())
    }

    pub fn bucket_of(&self, resource: &ResourceHandle) -> Option<usize> {
        self.shared.state.lock().ledger.bucket_of(&resource.id())
    }

    pub fn detached_count(&self) -> usize {
        self.shared.state.lock().detached.len()
    }

    /// Install a stylesheet that never needs fetching
    pub fn preload_style_sheet(&self, url: &str, content: &str) -> ResourceHandle {
        self.shared.inject(url, ResourceKind::Stylesheet, content)
    }

    /// Install a script that never needs fetching
    pub fn preload_script(&self, url: &str, content: &str) -> ResourceHandle {
        self.shared.inject(url, ResourceKind::Script, content)
    }

    /// Drop every entry and kill every outstanding job
    ///
    /// Returns the number of entries that were still referenced.
    pub fn clear(&self) -> usize {
        let (entries, detached) = {
            let mut state = self.shared.state.lock();
            state.ledger.clear();
            let entries: Vec<ResourceHandle> = state.entries.drain().map(|(_, r)| r).collect();
            (entries, std::mem::take(&mut state.detached))
        };
        let killed = self.shared.loader.kill_all();
        for resource in entries.iter().chain(detached.iter()) {
            resource.lock().request = None;
        }

        let mut leaked = 0;
        for resource in entries.iter().chain(detached.iter()) {
            if !resource.can_delete() {
                warn!(
                    "{} {} still has {} clients at cache teardown",
                    resource.kind(),
                    resource.url(),
                    resource.count()
                );
                leaked += 1;
            }
        }

        info!(
            "Cleared cache ({} entries, {} detached, {} jobs killed, {} leaked)",
            entries.len(),
            detached.len(),
            killed,
            leaked
        );
        leaked
    }

    pub fn statistics(&self) -> CacheStatistics {
        let state = self.shared.state.lock();
        let mut stats = CacheStatistics {
            max_size: state.max_size,
            ledger_size: state.ledger.total_size(),
            ledger_entries: state.ledger.len(),
            detached: state.detached.len(),
            ..Default::default()
        };
        for resource in state.entries.values() {
            stats.record(resource.kind(), resource.size());
        }
        drop(state);
        stats.outstanding_requests = self.shared.loader.outstanding();
        stats
    }

    /// Apply transport events that are already queued
    pub fn pump(&self) -> usize {
        loader::pump(&self.shared)
    }

    /// Apply transport events until nothing is in flight
    pub async fn run_until_idle(&self) {
        loader::run_until_idle(&self.shared).await
    }
}

impl CacheShared {
    pub(crate) fn register_doc_loader(&self, doc_loader: &Arc<DocLoaderShared>) {
        let mut doc_loaders = self.doc_loaders.lock();
        doc_loaders.retain(|d| d.strong_count() > 0);
        doc_loaders.push(Arc::downgrade(doc_loader));
    }

    pub(crate) fn unregister_doc_loader(&self, doc_loader: &DocLoaderShared) {
        self.doc_loaders
            .lock()
            .retain(|d| d.strong_count() > 0 && !std::ptr::eq(d.as_ptr(), doc_loader));
    }

    fn live_doc_loaders(&self) -> Vec<Arc<DocLoaderShared>> {
        self.doc_loaders.lock().iter().filter_map(Weak::upgrade).collect()
    }

    /// A live document other than `except` that still uses `resource`
    pub(crate) fn other_user(
        &self,
        resource: &ResourceHandle,
        except: DocLoaderId,
    ) -> Option<DocLoaderId> {
        self.live_doc_loaders()
            .into_iter()
            .find(|d| d.id() != except && d.uses(resource))
            .map(|d| d.id())
    }

    pub(crate) fn remove_cache_entry(&self, resource: &ResourceHandle) {
        let mut state = self.state.lock();
        self.remove_entry_locked(&mut state, resource);
    }

    pub(crate) fn remove_entry_locked(&self, state: &mut CacheState, resource: &ResourceHandle) {
        if state
            .entries
            .get(resource.url())
            .is_some_and(|e| Arc::ptr_eq(e, resource))
        {
            state.entries.remove(resource.url());
        }
        state.ledger.remove(&resource.id());

        for doc_loader in self.live_doc_loaders() {
            doc_loader.remove_cached_object(resource);
        }

        let mut inner = resource.lock();
        if !inner.free {
            inner.free = true;
            drop(inner);
            state.detached.push(resource.clone());
        }
    }

    pub(crate) fn flush(&self, force: bool) {
        let mut state = self.state.lock();
        self.flush_locked(&mut state, force);
    }

    pub(crate) fn flush_locked(&self, state: &mut CacheState, force: bool) {
        let max_size = state.max_size;
        let threshold = max_size.saturating_add(max_size / 4);
        if !force && state.ledger.total_size() <= threshold {
            return;
        }

        let before = state.ledger.total_size();
        let mut evicted = 0u64;
        for bucket in (0..NUM_BUCKETS).rev() {
            while state.ledger.total_size() > max_size {
                let Some(id) = state.ledger.tail(bucket) else {
                    break;
                };
                let Some(resource) = state.ledger.get(&id).cloned() else {
                    break;
                };
                debug!(
                    "Evicting {} ({} bytes, bucket {})",
                    resource.url(),
                    resource.size(),
                    bucket
                );
                self.remove_entry_locked(state, &resource);
                evicted += 1;
            }
        }

        state.detached.retain(|r| !r.can_delete());

        counter!("loadcache_evictions_total").increment(evicted);
        gauge!("loadcache_ledger_bytes").set(state.ledger.total_size() as f64);
        if evicted > 0 {
            debug!(
                "Flushed {} entries, ledger {} -> {} bytes (budget {})",
                evicted,
                before,
                state.ledger.total_size(),
                max_size
            );
        }
    }

    pub(crate) fn insert_in_lru(&self, resource: &ResourceHandle) {
        let mut state = self.state.lock();
        self.insert_in_lru_locked(&mut state, resource);
    }

    pub(crate) fn insert_in_lru_locked(&self, state: &mut CacheState, resource: &ResourceHandle) {
        let (allowed, size, access_count) = {
            let inner = resource.lock();
            (inner.allow_in_lru(), inner.size, inner.access_count)
        };
        if allowed {
            state
                .ledger
                .insert(resource.id(), resource.clone(), size, access_count);
        }
    }

    pub(crate) fn remove_from_lru(&self, resource: &ResourceHandle) {
        self.state.lock().ledger.remove(&resource.id());
    }

    /// Change the accounted size of a resource, re-bucketing it if it is
    /// linked in the ledger
    pub(crate) fn resize(&self, resource: &ResourceHandle, size: usize) {
        let mut state = self.state.lock();
        let linked = state.ledger.remove(&resource.id()).is_some();
        resource.lock().size = size;
        if linked {
            self.insert_in_lru_locked(&mut state, resource);
        }
    }

    /// Attach or clear the in-flight job of a resource. Attaching a job
    /// makes the resource pending; either way it leaves or re-enters the
    /// ledger as its deletability changes.
    pub(crate) fn set_request_locked(
        &self,
        state: &mut CacheState,
        resource: &ResourceHandle,
        job: Option<JobId>,
    ) {
        state.ledger.remove(&resource.id());
        {
            let mut inner = resource.lock();
            if job.is_some() && inner.request.is_none() {
                inner.status = Status::Pending;
            }
            inner.request = job;
        }
        self.insert_in_lru_locked(state, resource);
    }

    pub(crate) fn detach_request(&self, resource: &ResourceHandle) {
        let mut state = self.state.lock();
        self.set_request_locked(&mut state, resource, None);
    }

    pub(crate) fn begin_fetch_locked(
        &self,
        state: &mut CacheState,
        origin: Option<&FetchOrigin>,
        resource: &ResourceHandle,
        incremental: bool,
        priority: i32,
    ) {
        if let Some(job) = resource.request() {
            debug!("{} is already being fetched by {}", resource.url(), job);
            return;
        }
        let job = JobId::next();
        self.set_request_locked(state, resource, Some(job));
        self.loader
            .start(job, origin, resource, incremental, priority);
    }

    fn inject(self: &Arc<Self>, url: &str, kind: ResourceKind, content: &str) -> ResourceHandle {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(url).cloned() {
            self.remove_entry_locked(&mut state, &existing);
        }
        let resource = CachedResource::injected(url, kind, content, Arc::downgrade(self));
        state.entries.insert(url.to_string(), resource.clone());
        debug!("Injected {} {} ({} bytes)", kind, url, content.len());
        resource
    }
}
