//! # CompositeLoader - Lazy Part Loading and Visibility
//!
//! Turns part selection requests into a consistent scene composition.
//!
//! ## Table of Contents
//!
//! 1. **CompositeLoaderState** - Cache, in-flight loads and selection
//! 2. **CompositeLoader** - Public operations
//! 3. **InitialSelection / InitReport** - Startup sequence
//! 4. **CompositeSnapshot** - Serializable view of the state
//!
//! ## Loading
//!
//! Each part is fetched at most once per successful load. The fetch runs as
//! its own tokio task and is shared by every caller waiting on it, so a
//! caller that stops waiting (for instance a superseded selection) never
//! cancels it and its result still lands in the cache. A failed or timed-out
//! fetch leaves no trace in the cache and is retried on the next request.
//!
//! ## Visibility
//!
//! Visibility only changes on resident assets, inside one critical section,
//! and only for the latest request of a group or independent part. Requests
//! are ordered by when they were made, not by when their loads finish.

use crate::cache::{AssetHandle, LoadedPartCache};
use crate::catalog::{PartCatalog, PartSpec};
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::events::{LoadEvent, LoadObserver, TracingObserver};
use crate::scene::SceneGraph;
use crate::selection::{ActiveSelection, SelectionToken};
use crate::source::AssetSource;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

type SharedLoad<A> = Shared<BoxFuture<'static, Result<AssetHandle<A>>>>;

// ============================================================================
// State
// ============================================================================

/// Mutable loader state. Only touched through [`CompositeLoader`].
pub struct CompositeLoaderState<A> {
    cache: LoadedPartCache<A>,
    in_flight: HashMap<String, SharedLoad<A>>,
    selection: ActiveSelection,
    ready: bool,
}

impl<A> CompositeLoaderState<A> {
    fn new(catalog: &PartCatalog) -> Self {
        Self {
            cache: LoadedPartCache::new(),
            in_flight: HashMap::new(),
            selection: ActiveSelection::new(catalog),
            ready: false,
        }
    }
}

/// Result of a visibility request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectOutcome {
    /// The requested visibility is now in effect
    Applied,
    /// A newer request for the same group or part took precedence
    Superseded,
}

struct Inner<S: AssetSource, G> {
    catalog: Arc<PartCatalog>,
    source: Arc<S>,
    scene: Arc<G>,
    observer: Arc<dyn LoadObserver>,
    config: LoaderConfig,
    limiter: Option<Arc<Semaphore>>,
    state: Mutex<CompositeLoaderState<S::Asset>>,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CompositeLoader`].
pub struct CompositeLoaderBuilder<S, G> {
    catalog: Arc<PartCatalog>,
    source: Arc<S>,
    scene: Arc<G>,
    observer: Arc<dyn LoadObserver>,
    config: LoaderConfig,
}

impl<S, G> CompositeLoaderBuilder<S, G>
where
    S: AssetSource,
    G: SceneGraph<S::Asset>,
{
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default `tracing` observer
    pub fn observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Result<CompositeLoader<S, G>> {
        self.config.validate()?;

        let limiter = match self.config.max_concurrent_fetches {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        info!(
            "Composite loader ready: {} parts, {} groups, source={}",
            self.catalog.len(),
            self.catalog.groups().count(),
            self.source.name()
        );

        Ok(CompositeLoader {
            inner: Arc::new(Inner {
                state: Mutex::new(CompositeLoaderState::new(&self.catalog)),
                catalog: self.catalog,
                source: self.source,
                scene: self.scene,
                observer: self.observer,
                config: self.config,
                limiter,
            }),
        })
    }
}

// ============================================================================
// CompositeLoader
// ============================================================================

/// Composite scene loader.
///
/// Cloning is cheap and every clone drives the same state. All operations
/// must run inside a tokio runtime since loads are spawned as tasks.
pub struct CompositeLoader<S: AssetSource, G> {
    inner: Arc<Inner<S, G>>,
}

impl<S: AssetSource, G> Clone for CompositeLoader<S, G> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S, G> CompositeLoader<S, G>
where
    S: AssetSource,
    G: SceneGraph<S::Asset>,
{
    pub fn builder(catalog: PartCatalog, source: Arc<S>, scene: Arc<G>) -> CompositeLoaderBuilder<S, G> {
        CompositeLoaderBuilder {
            catalog: Arc::new(catalog),
            source,
            scene,
            observer: Arc::new(TracingObserver),
            config: LoaderConfig::default(),
        }
    }

    /// Loader with default config and the `tracing` observer
    pub fn new(catalog: PartCatalog, source: Arc<S>, scene: Arc<G>) -> Result<Self> {
        Self::builder(catalog, source, scene).build()
    }

    pub fn catalog(&self) -> &PartCatalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Load `part` if it is not cached yet and return its handle.
    ///
    /// Concurrent calls for the same part share one fetch. A newly loaded
    /// asset is attached to the scene hidden.
    pub async fn ensure_loaded(&self, part: &str) -> Result<AssetHandle<S::Asset>> {
        let spec = self.inner.catalog.require_part(part)?;

        let load = {
            let mut state = self.inner.state.lock();
            if let Some(handle) = state.cache.get(part) {
                return Ok(handle.clone());
            }
            match state.in_flight.get(part) {
                Some(load) => {
                    debug!("Joining in-flight load for {}", part);
                    load.clone()
                }
                None => {
                    let load = self.spawn_load(spec.clone());
                    state.in_flight.insert(part.to_string(), load.clone());
                    load
                }
            }
        };

        load.await
    }

    fn spawn_load(&self, spec: PartSpec) -> SharedLoad<S::Asset> {
        let inner = self.inner.clone();
        let part = spec.id.clone();
        let name = spec.display_name.clone();
        let task = tokio::spawn({
            let inner = inner.clone();
            async move { inner.load_part(spec).await }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.state.lock().in_flight.remove(&part);
                    let cause = format!("load task aborted: {}", e);
                    inner.observer.on_event(&LoadEvent::Failed {
                        part: part.clone(),
                        name: name.clone(),
                        cause: cause.clone(),
                    });
                    Err(LoaderError::LoadFailure { part, name, cause })
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Show `part` as the only visible member of exclusive group `group`.
    ///
    /// Waits for the part to load. On load failure the group keeps its
    /// previous member. Returns `Superseded` without touching visibility if
    /// another selection for the group was requested in the meantime.
    pub async fn select_exclusive(&self, group: &str, part: &str) -> Result<SelectOutcome> {
        self.inner.catalog.require_member(group, part)?;

        let mut token = self.inner.state.lock().selection.request(group);

        let loaded = tokio::select! {
            biased;
            loaded = self.ensure_loaded(part) => loaded,
            _ = token.cancelled() => {
                self.inner.superseded(part, group);
                return Ok(SelectOutcome::Superseded);
            }
        };
        let handle = loaded?;

        let mut state = self.inner.state.lock();
        if !state.selection.is_current(&token) {
            drop(state);
            self.inner.superseded(part, group);
            return Ok(SelectOutcome::Superseded);
        }
        self.inner.show_exclusive(&mut state, group, &handle);
        Ok(SelectOutcome::Applied)
    }

    /// Show or hide an independent part.
    ///
    /// Showing loads the part first; hiding never triggers a fetch.
    pub async fn set_independent_visibility(&self, part: &str, visible: bool) -> Result<SelectOutcome> {
        let spec = self.inner.catalog.require_part(part)?;
        if let Some(group) = spec.group() {
            return Err(LoaderError::InvalidGroupState {
                group: group.to_string(),
                reason: format!("{} is an exclusive member; use select_exclusive", part),
            });
        }

        if !visible {
            let mut state = self.inner.state.lock();
            state.selection.request(part);
            self.inner.apply_flag(&mut state, part, false);
            return Ok(SelectOutcome::Applied);
        }

        let mut token = self.inner.state.lock().selection.request(part);

        let loaded = tokio::select! {
            biased;
            loaded = self.ensure_loaded(part) => loaded,
            _ = token.cancelled() => {
                self.inner.superseded(part, part);
                return Ok(SelectOutcome::Superseded);
            }
        };
        loaded?;

        let mut state = self.inner.state.lock();
        if !state.selection.is_current(&token) {
            drop(state);
            self.inner.superseded(part, part);
            return Ok(SelectOutcome::Superseded);
        }
        self.inner.apply_flag(&mut state, part, true);
        Ok(SelectOutcome::Applied)
    }

    /// Load everything the initial configuration needs concurrently, then
    /// apply the resulting selection in one pass.
    ///
    /// Overrides in `initial` replace catalog defaults. Invalid overrides
    /// fail the call before anything is fetched. Parts that fail to load are
    /// listed in the report; everything else is applied.
    pub async fn initialize_composite(&self, initial: InitialSelection) -> Result<InitReport> {
        let catalog = &self.inner.catalog;

        for (group, part) in &initial.exclusive {
            catalog.require_member(group, part)?;
        }
        for part in initial.independent.keys() {
            let spec = catalog.require_part(part)?;
            if let Some(group) = spec.group() {
                return Err(LoaderError::InvalidGroupState {
                    group: group.to_string(),
                    reason: format!("{} is an exclusive member, not an independent part", part),
                });
            }
        }

        let exclusive: Vec<(String, String)> = catalog
            .groups()
            .filter_map(|group| {
                initial
                    .exclusive
                    .get(group)
                    .map(String::as_str)
                    .or_else(|| catalog.default_member(group))
                    .map(|part| (group.to_string(), part.to_string()))
            })
            .collect();
        let independent: Vec<(String, bool)> = catalog
            .independent_parts()
            .map(|spec| {
                let visible = initial.independent.get(&spec.id).copied().unwrap_or(matches!(
                    spec.membership,
                    crate::catalog::Membership::Independent { default_visible: true }
                ));
                (spec.id.clone(), visible)
            })
            .collect();

        let (exclusive_tokens, independent_tokens) = {
            let mut state = self.inner.state.lock();
            let exclusive_tokens: Vec<SelectionToken> = exclusive
                .iter()
                .map(|(group, _)| state.selection.request(group))
                .collect();
            let independent_tokens: Vec<SelectionToken> = independent
                .iter()
                .map(|(part, _)| state.selection.request(part))
                .collect();
            (exclusive_tokens, independent_tokens)
        };

        let required: Vec<&str> = exclusive
            .iter()
            .map(|(_, part)| part.as_str())
            .chain(independent.iter().filter(|(_, v)| *v).map(|(p, _)| p.as_str()))
            .collect();
        info!("Initializing composite: loading {} parts", required.len());

        let results = join_all(required.iter().map(|part| self.ensure_loaded(part))).await;
        let mut loaded = HashMap::new();
        let mut report = InitReport::default();
        for (part, result) in required.iter().zip(results) {
            match result {
                Ok(handle) => {
                    loaded.insert(part.to_string(), handle);
                }
                Err(e) => report.failed.push(e),
            }
        }

        let mut superseded = Vec::new();
        {
            let mut state = self.inner.state.lock();

            for ((group, part), token) in exclusive.iter().zip(&exclusive_tokens) {
                let Some(handle) = loaded.get(part) else { continue };
                if state.selection.is_current(token) {
                    self.inner.show_exclusive(&mut state, group, handle);
                    report.applied.push(part.clone());
                } else {
                    superseded.push((part.clone(), group.clone()));
                }
            }

            for ((part, visible), token) in independent.iter().zip(&independent_tokens) {
                if *visible && !loaded.contains_key(part) {
                    continue;
                }
                if state.selection.is_current(token) {
                    self.inner.apply_flag(&mut state, part, *visible);
                    if *visible {
                        report.applied.push(part.clone());
                    }
                } else {
                    superseded.push((part.clone(), part.clone()));
                }
            }

            state.ready = true;
        }

        for (part, key) in &superseded {
            self.inner.superseded(part, key);
        }
        report.superseded = superseded.into_iter().map(|(part, _)| part).collect();

        info!(
            "Composite initialized: {} applied, {} superseded, {} failed",
            report.applied.len(),
            report.superseded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// True once `initialize_composite` has completed
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().ready
    }

    pub fn is_loaded(&self, part: &str) -> bool {
        self.inner.state.lock().cache.contains(part)
    }

    /// Cached handle for `part`, without loading
    pub fn handle(&self, part: &str) -> Option<AssetHandle<S::Asset>> {
        self.inner.state.lock().cache.get(part).cloned()
    }

    /// Visible member of `group`
    pub fn active_member(&self, group: &str) -> Option<String> {
        self.inner.state.lock().selection.active(group).map(str::to_string)
    }

    /// Whether `part` is currently shown
    pub fn is_visible(&self, part: &str) -> bool {
        let Some(spec) = self.inner.catalog.part(part) else { return false };
        let state = self.inner.state.lock();
        match spec.group() {
            Some(group) => state.selection.active(group) == Some(part),
            None => state.selection.flag(part) && state.cache.contains(part),
        }
    }

    pub fn snapshot(&self) -> CompositeSnapshot {
        let state = self.inner.state.lock();
        let mut loading: Vec<String> = state.in_flight.keys().cloned().collect();
        loading.sort();

        CompositeSnapshot {
            ready: state.ready,
            loaded: state.cache.parts(),
            loading,
            groups: state.selection.exclusive().clone(),
            independent: state.selection.independent().clone(),
        }
    }
}

impl<S, G> Inner<S, G>
where
    S: AssetSource,
    G: SceneGraph<S::Asset>,
{
    async fn load_part(&self, spec: PartSpec) -> Result<AssetHandle<S::Asset>> {
        self.observer.on_event(&LoadEvent::Started {
            part: spec.id.clone(),
            locator: spec.locator.clone(),
        });
        let started = tokio::time::Instant::now();

        let fetched = match &self.limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(_permit) => self.fetch_with_timeout(&spec.locator).await,
                Err(e) => Err(format!("fetch slot unavailable: {}", e)),
            },
            None => self.fetch_with_timeout(&spec.locator).await,
        };

        let mut state = self.state.lock();
        state.in_flight.remove(&spec.id);

        match fetched {
            Ok(asset) => {
                let asset = Arc::new(asset);
                let node = self.scene.attach(&spec, &asset);
                self.scene.set_visible(node, false);
                let handle = state.cache.insert_once(AssetHandle::new(&spec.id, node, asset));
                drop(state);

                self.observer.on_event(&LoadEvent::Loaded {
                    part: spec.id.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
                Ok(handle)
            }
            Err(cause) => {
                drop(state);

                self.observer.on_event(&LoadEvent::Failed {
                    part: spec.id.clone(),
                    name: spec.display_name.clone(),
                    cause: cause.clone(),
                });
                Err(LoaderError::LoadFailure {
                    part: spec.id,
                    name: spec.display_name,
                    cause,
                })
            }
        }
    }

    async fn fetch_with_timeout(&self, locator: &str) -> std::result::Result<S::Asset, String> {
        match tokio::time::timeout(self.config.fetch_timeout(), self.source.fetch(locator)).await {
            Ok(Ok(asset)) => Ok(asset),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", self.config.fetch_timeout_secs)),
        }
    }

    /// Hide the group's previous member and show `handle`.
    fn show_exclusive(
        &self,
        state: &mut CompositeLoaderState<S::Asset>,
        group: &str,
        handle: &AssetHandle<S::Asset>,
    ) {
        let part = handle.part();
        match state.selection.active(group) {
            Some(previous) if previous == part => return,
            Some(previous) => {
                if let Some(previous) = state.cache.get(previous) {
                    self.scene.set_visible(previous.node(), false);
                }
            }
            None => {}
        }
        self.scene.set_visible(handle.node(), true);
        state.selection.set_active(group, part);
        debug!("{} now showing {}", group, part);
    }

    fn apply_flag(&self, state: &mut CompositeLoaderState<S::Asset>, part: &str, visible: bool) {
        let was_visible = state.selection.flag(part);
        state.selection.set_flag(part, visible);
        if was_visible == visible {
            return;
        }
        if let Some(handle) = state.cache.get(part) {
            self.scene.set_visible(handle.node(), visible);
        }
    }

    fn superseded(&self, part: &str, key: &str) {
        self.observer.on_event(&LoadEvent::Superseded {
            part: part.to_string(),
            key: key.to_string(),
        });
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Overrides for `initialize_composite`; anything unset uses catalog defaults.
#[derive(Debug, Clone, Default)]
pub struct InitialSelection {
    exclusive: BTreeMap<String, String>,
    independent: BTreeMap<String, bool>,
}

impl InitialSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `part` selected in `group`
    pub fn select(mut self, group: impl Into<String>, part: impl Into<String>) -> Self {
        self.exclusive.insert(group.into(), part.into());
        self
    }

    pub fn show(self, part: impl Into<String>) -> Self {
        self.visible(part, true)
    }

    pub fn hide(self, part: impl Into<String>) -> Self {
        self.visible(part, false)
    }

    pub fn visible(mut self, part: impl Into<String>, visible: bool) -> Self {
        self.independent.insert(part.into(), visible);
        self
    }
}

/// Outcome of `initialize_composite`.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    /// Parts shown by initialization
    pub applied: Vec<String>,
    /// Parts loaded but left alone because a newer request took precedence
    pub superseded: Vec<String>,
    /// Parts that failed to load
    pub failed: Vec<LoaderError>,
}

impl InitReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Serializable view of the loader state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeSnapshot {
    pub ready: bool,
    /// Cached parts
    pub loaded: Vec<String>,
    /// Parts with a fetch in flight
    pub loading: Vec<String>,
    /// Exclusive group -> visible member
    pub groups: BTreeMap<String, Option<String>>,
    /// Independent part -> visibility flag
    pub independent: BTreeMap<String, bool>,
}
