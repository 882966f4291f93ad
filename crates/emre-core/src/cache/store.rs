//! Normalized result-set cache with tag-driven invalidation.
//!
//! Each [`CacheKey`] owns one slot: the last validated payload, the tags it
//! carries, a staleness bit and at most one in-flight fetch. Fetches run on
//! spawned tasks and are shared between every reader of the key, so dropping
//! a subscription never cancels a request.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{Mutation, Operation, Payload, Query, RequestError};
use crate::auth::SessionData;
use crate::models::{EntityKind, Record};

use super::key::CacheKey;
use super::tags::{invalidated_by, tags_for, Tag, TagId, TagSet};

/// How long an entry with no subscribers is retained.
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(60);

/// Performs the network side of a read.
pub type FetchFn =
    Arc<dyn Fn(Operation) -> BoxFuture<'static, Result<Payload, RequestError>> + Send + Sync>;

type FetchResult = Result<Arc<Value>, RequestError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Missing,
    /// First fetch in flight, nothing cached yet.
    Pending,
    Fresh,
    Stale,
}

/// What a subscriber sees.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub data: Option<Arc<Value>>,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub is_error: bool,
    pub error: Option<RequestError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

struct InFlight {
    id: u64,
    future: SharedFetch,
}

struct Slot {
    id: u64,
    query: Query,
    data: Option<Arc<Value>>,
    error: Option<RequestError>,
    tags: TagSet,
    stale: bool,
    in_flight: Option<InFlight>,
    invalidated_in_flight: bool,
    subscribers: usize,
    unused_since: Option<Instant>,
    fetched_at: Option<DateTime<Utc>>,
    revision: watch::Sender<u64>,
}

impl Slot {
    fn new(id: u64, query: Query) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            id,
            query,
            data: None,
            error: None,
            tags: TagSet::new(),
            stale: false,
            in_flight: None,
            invalidated_in_flight: false,
            subscribers: 0,
            unused_since: Some(Instant::now()),
            fetched_at: None,
            revision,
        }
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn read_state(&self) -> ReadState {
        match (&self.data, &self.in_flight) {
            (None, Some(_)) => ReadState::Pending,
            (None, None) => ReadState::Missing,
            (Some(_), _) if self.stale => ReadState::Stale,
            (Some(_), _) => ReadState::Fresh,
        }
    }

    fn needs_fetch(&self) -> bool {
        self.in_flight.is_none() && (self.data.is_none() || self.stale)
    }

    /// An in-flight fetch has no tags yet; judge it by what it will carry.
    fn hit_in_flight(&self, tags: &TagSet) -> bool {
        let kind = self.query.kind();
        let provisional = tags_for(&self.query, &[], &[]);
        tags.iter().any(|tag| {
            Some(tag.kind) == kind || provisional.contains(tag) || self.tags.contains(tag)
        })
    }

    fn state(&self) -> QueryState {
        QueryState {
            data: self.data.clone(),
            is_loading: self.data.is_none() && self.in_flight.is_some(),
            is_fetching: self.in_flight.is_some(),
            is_stale: self.stale,
            is_error: self.error.is_some(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
        }
    }
}

struct Snapshot {
    value: Arc<Value>,
    stale: bool,
}

#[derive(Default)]
struct State {
    slots: HashMap<CacheKey, Slot>,
    snapshots: HashMap<(EntityKind, i64), Snapshot>,
    next_slot: u64,
    fetches: u64,
}

struct Inner {
    state: Mutex<State>,
    fetch: FetchFn,
    keep_unused_for: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the outcome of fetch `fetch_id`, unless the slot moved on.
    ///
    /// A result whose tags were invalidated while it was in flight lands
    /// stale; if anyone is subscribed, the refetch starts here.
    fn complete(
        self: &Arc<Self>,
        key: &CacheKey,
        fetch_id: u64,
        result: Result<Payload, RequestError>,
    ) -> FetchResult {
        let mut guard = self.lock();
        let State {
            slots,
            snapshots,
            fetches,
            ..
        } = &mut *guard;

        let current = slots
            .get(key)
            .and_then(|slot| slot.in_flight.as_ref())
            .map_or(false, |in_flight| in_flight.id == fetch_id);
        if !current {
            debug!(key = %key, "Discarding superseded fetch result");
            return result.map(|payload| Arc::new(payload.data));
        }

        if let Err(err) = &result {
            if err.is_unauthorized() {
                warn!(key = %key, "Fetch unauthorized, clearing cache");
                slots.clear();
                snapshots.clear();
                return Err(err.clone());
            }
        }

        let orphaned = slots.get(key).map_or(true, |slot| slot.subscribers == 0);
        if orphaned {
            slots.remove(key);
            debug!(key = %key, "No subscribers left, result discarded");
            return result.map(|payload| Arc::new(payload.data));
        }

        let Some(slot) = slots.get_mut(key) else {
            return result.map(|payload| Arc::new(payload.data));
        };
        slot.in_flight = None;
        let landed_stale = std::mem::take(&mut slot.invalidated_in_flight);

        match result {
            Ok(payload) => {
                let data = Arc::new(payload.data);
                slot.tags = tags_for(&slot.query, &payload.ids, &payload.records);
                slot.data = Some(Arc::clone(&data));
                slot.error = None;
                slot.stale = landed_stale;
                slot.fetched_at = Some(Utc::now());
                slot.notify();
                debug!(key = %key, ids = payload.ids.len(), stale = landed_stale, "Fetch complete");

                record_snapshots(snapshots, &payload.records);
                if landed_stale {
                    start_fetch(self, fetches, key, slot);
                }
                Ok(data)
            }
            Err(err) => {
                debug!(key = %key, error = %err, "Fetch failed");
                slot.error = Some(err.clone());
                slot.notify();
                Err(err)
            }
        }
    }
}

/// Store each record's flat form under `(kind, id)`; returns what was
/// written. Detail views contribute their flat entity and every embedded
/// row, never the detail shape itself.
fn record_snapshots(
    snapshots: &mut HashMap<(EntityKind, i64), Snapshot>,
    records: &[Record],
) -> Vec<(EntityKind, i64)> {
    records
        .iter()
        .map(|record| {
            snapshots.insert(
                (record.kind, record.id),
                Snapshot {
                    value: Arc::new(record.value.clone()),
                    stale: false,
                },
            );
            (record.kind, record.id)
        })
        .collect()
}

fn start_fetch(inner: &Arc<Inner>, fetches: &mut u64, key: &CacheKey, slot: &mut Slot) {
    *fetches += 1;
    let fetch_id = *fetches;
    let request = (inner.fetch)(slot.query.operation().clone());

    let task_inner = Arc::clone(inner);
    let task_key = key.clone();
    let handle = tokio::spawn(async move {
        let result = request.await;
        task_inner.complete(&task_key, fetch_id, result)
    });
    let future = async move {
        handle
            .await
            .unwrap_or_else(|e| Err(RequestError::Transport(format!("fetch task failed: {}", e))))
    }
    .boxed()
    .shared();

    slot.in_flight = Some(InFlight {
        id: fetch_id,
        future,
    });
    slot.invalidated_in_flight = false;
    slot.notify();
    debug!(key = %key, fetch = fetch_id, "Fetching");
}

/// Shared handle to the cache; clones see the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    pub fn new(fetch: FetchFn) -> Self {
        Self::with_keep_unused_for(fetch, DEFAULT_KEEP_UNUSED_FOR)
    }

    pub fn with_keep_unused_for(fetch: FetchFn, keep_unused_for: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                fetch,
                keep_unused_for,
            }),
        }
    }

    pub fn keep_unused_for(&self) -> Duration {
        self.inner.keep_unused_for
    }

    pub fn peek(&self, key: &CacheKey) -> ReadState {
        self.inner
            .lock()
            .slots
            .get(key)
            .map_or(ReadState::Missing, Slot::read_state)
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.peek(key) == ReadState::Stale
    }

    /// Cached data if fresh, otherwise the result of one (possibly shared)
    /// fetch. The entry is held while the fetch runs, then left to the
    /// unused-entry timer.
    pub async fn read(&self, query: &Query) -> Result<Arc<Value>, RequestError> {
        let subscription = self.subscribe(query);
        subscription.resolve().await
    }

    /// Register interest in `query`. A missing or stale entry is fetched now.
    pub fn subscribe(&self, query: &Query) -> Subscription {
        let key = query.key();
        let mut guard = self.inner.lock();
        let State {
            slots,
            next_slot,
            fetches,
            ..
        } = &mut *guard;

        let slot = slots.entry(key.clone()).or_insert_with(|| {
            *next_slot += 1;
            Slot::new(*next_slot, query.clone())
        });
        slot.subscribers += 1;
        slot.unused_since = None;
        if slot.needs_fetch() {
            start_fetch(&self.inner, fetches, &key, slot);
        }

        Subscription {
            store: self.clone(),
            slot_id: slot.id,
            revision: slot.revision.subscribe(),
            key,
        }
    }

    /// Install a mutation's outcome: snapshot the returned entity, then mark
    /// every entry carrying an invalidated tag stale. Subscribed entries are
    /// refetched immediately; the rest wait for their next read.
    ///
    /// Returns the number of entries invalidated.
    pub fn apply(&self, mutation: &Mutation, result: Option<&Payload>) -> usize {
        let tags = invalidated_by(mutation);
        let mut guard = self.inner.lock();

        let installed = match result {
            Some(payload) => record_snapshots(&mut guard.snapshots, &payload.records),
            None => Vec::new(),
        };
        if let Some(entity) = mutation.deleted() {
            guard.snapshots.remove(&entity);
        }
        for (entity, snapshot) in guard.snapshots.iter_mut() {
            if !installed.contains(entity) && tags.contains(&Tag::id(entity.0, entity.1)) {
                snapshot.stale = true;
            }
        }

        let invalidated = self.invalidate_locked(&mut guard, &tags);
        info!(mutation = mutation.name(), tags = tags.len(), invalidated, "Applied mutation");
        invalidated
    }

    /// Mark entries carrying any of `tags` stale.
    pub fn invalidate(&self, tags: &TagSet) -> usize {
        let mut guard = self.inner.lock();
        self.invalidate_locked(&mut guard, tags)
    }

    fn invalidate_locked(&self, state: &mut State, tags: &TagSet) -> usize {
        let State { slots, fetches, .. } = state;
        let mut invalidated = 0;

        for (key, slot) in slots.iter_mut() {
            if slot.in_flight.is_some() {
                if slot.hit_in_flight(tags) {
                    slot.invalidated_in_flight = true;
                    invalidated += 1;
                }
                continue;
            }
            if slot.data.is_none() || slot.tags.is_disjoint(tags) {
                continue;
            }

            slot.stale = true;
            invalidated += 1;
            slot.notify();
            debug!(key = %key, subscribers = slot.subscribers, "Invalidated");
            if slot.subscribers > 0 {
                start_fetch(&self.inner, fetches, key, slot);
            }
        }
        invalidated
    }

    /// Drop every entry and snapshot. Subscribers see their channel close.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let entries = state.slots.len();
        state.slots.clear();
        state.snapshots.clear();
        info!(entries, "Cache cleared");
    }

    /// Clear the store whenever the watched credential goes away, whoever
    /// dropped it. The watcher ends with the store or the session.
    pub fn clear_on_sign_out(&self, mut credential: watch::Receiver<Option<SessionData>>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            while credential.changed().await.is_ok() {
                let signed_out = credential.borrow_and_update().is_none();
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if signed_out {
                    debug!("Credential dropped");
                    CacheStore { inner }.clear();
                }
            }
        });
    }

    /// Evict entries that have had no subscribers for `keep_unused_for`,
    /// along with snapshots no remaining entry refers to.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let keep = self.inner.keep_unused_for;
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let before = state.slots.len();
        state.slots.retain(|key, slot| {
            let expired = slot.subscribers == 0
                && slot.in_flight.is_none()
                && slot
                    .unused_since
                    .map_or(false, |since| now.duration_since(since) >= keep);
            if expired {
                debug!(key = %key, "Evicting unused entry");
            }
            !expired
        });
        let evicted = before - state.slots.len();

        if evicted > 0 {
            let referenced: HashSet<(EntityKind, i64)> = state
                .slots
                .values()
                .flat_map(|slot| slot.tags.iter())
                .filter_map(|tag| match tag.id {
                    TagId::Id(id) => Some((tag.kind, id)),
                    TagId::All => None,
                })
                .collect();
            state.snapshots.retain(|entity, _| referenced.contains(entity));
        }
        evicted
    }

    /// The latest non-stale snapshot of one entity.
    pub fn snapshot(&self, kind: EntityKind, id: i64) -> Option<Arc<Value>> {
        self.inner
            .lock()
            .snapshots
            .get(&(kind, id))
            .filter(|snapshot| !snapshot.stale)
            .map(|snapshot| Arc::clone(&snapshot.value))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Network fetches started since creation.
    pub fn fetch_count(&self) -> u64 {
        self.inner.lock().fetches
    }

    fn release(&self, key: &CacheKey, slot_id: u64) {
        let unused = {
            let mut state = self.inner.lock();
            match state.slots.get_mut(key) {
                Some(slot) if slot.id == slot_id => {
                    slot.subscribers = slot.subscribers.saturating_sub(1);
                    if slot.subscribers == 0 {
                        slot.unused_since = Some(Instant::now());
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            }
        };
        if unused {
            self.schedule_collection();
        }
    }

    fn schedule_collection(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = self.inner.keep_unused_for;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                CacheStore { inner }.collect_garbage();
            }
        });
    }
}

/// Interest in one cache entry. Dropping it unsubscribes.
pub struct Subscription {
    store: CacheStore,
    key: CacheKey,
    slot_id: u64,
    revision: watch::Receiver<u64>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> QueryState {
        self.store
            .inner
            .lock()
            .slots
            .get(&self.key)
            .filter(|slot| slot.id == self.slot_id)
            .map(Slot::state)
            .unwrap_or_default()
    }

    pub fn data(&self) -> Option<Arc<Value>> {
        self.state().data
    }

    /// Wait for the entry to change. Returns false once it is gone.
    pub async fn changed(&mut self) -> bool {
        self.revision.changed().await.is_ok()
    }

    /// Start a refetch unless one is already running.
    pub fn refetch(&self) -> bool {
        let mut guard = self.store.inner.lock();
        let State { slots, fetches, .. } = &mut *guard;
        match slots.get_mut(&self.key) {
            Some(slot) if slot.id == self.slot_id && slot.in_flight.is_none() => {
                start_fetch(&self.store.inner, fetches, &self.key, slot);
                true
            }
            _ => false,
        }
    }

    /// Current data if fresh, otherwise the outcome of the running fetch.
    ///
    /// A running fetch that a mutation has already invalidated does not
    /// count: the follow-up fetch it triggers is awaited instead.
    pub async fn resolve(&self) -> Result<Arc<Value>, RequestError> {
        loop {
            let (pending, superseded) = {
                let state = self.store.inner.lock();
                let Some(slot) = state.slots.get(&self.key).filter(|slot| slot.id == self.slot_id)
                else {
                    return Err(RequestError::Unauthorized);
                };
                match (&slot.data, &slot.in_flight) {
                    (Some(data), _) if !slot.stale => return Ok(Arc::clone(data)),
                    (_, Some(in_flight)) => (in_flight.future.clone(), slot.invalidated_in_flight),
                    (Some(data), None) => {
                        return match &slot.error {
                            Some(err) => Err(err.clone()),
                            None => Ok(Arc::clone(data)),
                        }
                    }
                    (None, None) => {
                        return Err(slot.error.clone().unwrap_or(RequestError::Unauthorized))
                    }
                }
            };
            let result = pending.await;
            if !superseded || result.is_err() {
                return result;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.release(&self.key, self.slot_id);
    }
}
