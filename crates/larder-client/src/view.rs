//! Local view state: authoritative snapshots with optimistic overlays.
//!
//! Each collection key holds the last authoritative snapshot and at most one
//! [`OptimisticPatch`]. What the UI renders is the overlay when one exists,
//! otherwise the snapshot.
//!
//! # Overlay lifecycle
//!
//! ```text
//!            apply_patch (supersedes any prior overlay)
//!                 │
//!                 ▼
//!   ┌──────────────────────┐ confirm_patch ┌──────────────────────┐
//!   │  Pending             │ ────────────▶ │  Confirmed           │
//!   └──────────┬───────────┘               └──────────┬───────────┘
//!              │ discard_patch (failure)              │
//!              ▼                                      ▼
//!         (no overlay)  ◀────────── reconcile (any state, unconditionally)
//! ```
//!
//! `confirm_patch` / `discard_patch` only act when the caller's [`PatchId`]
//! still owns the overlay, so a request settling after its patch was
//! superseded or reconciled away can never bring it back.

use dashmap::DashMap;
use larder_types::{CollectionKey, OrderedEntity, PatchId};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Capacity of the view-change broadcast channel.
const VIEW_CHANGE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchState {
    /// Request in flight.
    Pending,
    /// Request succeeded; waiting for the refetch to replace it.
    Confirmed,
}

/// A speculative replacement of a collection's visible contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptimisticPatch {
    pub id: PatchId,
    pub entities: Vec<OrderedEntity>,
    pub state: PatchState,
}

#[derive(Debug, Default)]
struct CollectionView {
    authoritative: Option<Vec<OrderedEntity>>,
    overlay: Option<OptimisticPatch>,
    stale: bool,
    /// Bumped on every visible change.
    version: u64,
}

/// Per-collection local state, shared between the coordinator, the refetch
/// worker, and readers.
pub struct ViewStore {
    views: DashMap<CollectionKey, CollectionView>,
    changes: broadcast::Sender<CollectionKey>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(VIEW_CHANGE_CAPACITY);
        Self { views: DashMap::new(), changes }
    }

    /// Subscribe to "visible state of this key changed" notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionKey> {
        self.changes.subscribe()
    }

    /// What the UI should render right now.
    pub fn visible(&self, key: &CollectionKey) -> Vec<OrderedEntity> {
        self.views
            .get(key)
            .and_then(|view| {
                view.overlay
                    .as_ref()
                    .map(|patch| patch.entities.clone())
                    .or_else(|| view.authoritative.clone())
            })
            .unwrap_or_default()
    }

    /// Last authoritative snapshot, if one has been loaded.
    pub fn authoritative(&self, key: &CollectionKey) -> Option<Vec<OrderedEntity>> {
        self.views.get(key).and_then(|view| view.authoritative.clone())
    }

    pub fn patch(&self, key: &CollectionKey) -> Option<OptimisticPatch> {
        self.views.get(key).and_then(|view| view.overlay.clone())
    }

    pub fn has_overlay(&self, key: &CollectionKey) -> bool {
        self.views.get(key).is_some_and(|view| view.overlay.is_some())
    }

    pub fn is_stale(&self, key: &CollectionKey) -> bool {
        self.views.get(key).is_some_and(|view| view.stale)
    }

    pub fn version(&self, key: &CollectionKey) -> u64 {
        self.views.get(key).map_or(0, |view| view.version)
    }

    /// Install a new overlay, replacing (not merging with) any existing one.
    pub fn apply_patch(&self, key: CollectionKey, entities: Vec<OrderedEntity>) -> PatchId {
        let id = PatchId::new();
        {
            let mut view = self.views.entry(key).or_default();
            if let Some(previous) = &view.overlay {
                debug!(%key, superseded = ?previous.id, patch = ?id, "optimistic patch superseded");
            }
            view.overlay = Some(OptimisticPatch { id, entities, state: PatchState::Pending });
            view.version += 1;
        }
        trace!(%key, patch = ?id, "optimistic patch applied");
        self.notify(key);
        id
    }

    /// Mark `patch` confirmed if it still owns the overlay.
    pub fn confirm_patch(&self, key: &CollectionKey, patch: PatchId) -> bool {
        let Some(mut view) = self.views.get_mut(key) else {
            return false;
        };
        match view.overlay.as_mut() {
            Some(overlay) if overlay.id == patch => {
                overlay.state = PatchState::Confirmed;
                true
            }
            _ => false,
        }
    }

    /// Drop the overlay if `patch` still owns it, reverting to the snapshot.
    pub fn discard_patch(&self, key: &CollectionKey, patch: PatchId) -> bool {
        let discarded = {
            let Some(mut view) = self.views.get_mut(key) else {
                return false;
            };
            if view.overlay.as_ref().is_some_and(|overlay| overlay.id == patch) {
                view.overlay = None;
                view.version += 1;
                true
            } else {
                false
            }
        };
        if discarded {
            trace!(%key, ?patch, "optimistic patch discarded");
            self.notify(*key);
        }
        discarded
    }

    /// Replace the authoritative snapshot and drop any overlay.
    ///
    /// Last reconciliation wins: whatever was predicted locally is replaced
    /// by ground truth.
    pub fn reconcile(&self, key: CollectionKey, entities: Vec<OrderedEntity>) {
        {
            let mut view = self.views.entry(key).or_default();
            if let Some(dropped) = view.overlay.take() {
                debug!(%key, patch = ?dropped.id, state = ?dropped.state, "overlay replaced by authoritative data");
            }
            view.authoritative = Some(entities);
            view.stale = false;
            view.version += 1;
        }
        self.notify(key);
    }

    pub fn mark_stale(&self, key: CollectionKey) {
        self.views.entry(key).or_default().stale = true;
    }

    fn notify(&self, key: CollectionKey) {
        // No subscribers is fine.
        let _ = self.changes.send(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_types::{EntityId, EntityKind};

    fn key() -> CollectionKey {
        CollectionKey::items(EntityId::new(1))
    }

    fn named(names: &[&str]) -> Vec<OrderedEntity> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                OrderedEntity::new(EntityId::new(i as i64 + 1), EntityKind::Item, *name)
                    .with_sort_key(i as i64 * 1000)
            })
            .collect()
    }

    fn names(entities: &[OrderedEntity]) -> Vec<String> {
        entities.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_visible_prefers_overlay() {
        let store = ViewStore::new();
        assert!(store.visible(&key()).is_empty());

        store.reconcile(key(), named(&["a", "b"]));
        assert_eq!(names(&store.visible(&key())), vec!["a", "b"]);

        store.apply_patch(key(), named(&["b", "a"]));
        assert_eq!(names(&store.visible(&key())), vec!["b", "a"]);
        assert_eq!(names(&store.authoritative(&key()).unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_new_patch_supersedes_old() {
        let store = ViewStore::new();
        let first = store.apply_patch(key(), named(&["x"]));
        let second = store.apply_patch(key(), named(&["y"]));

        assert!(!store.confirm_patch(&key(), first));
        assert!(!store.discard_patch(&key(), first));
        assert_eq!(names(&store.visible(&key())), vec!["y"]);
        assert_eq!(store.patch(&key()).unwrap().id, second);
    }

    #[test]
    fn test_confirm_keeps_overlay_until_reconcile() {
        let store = ViewStore::new();
        store.reconcile(key(), named(&["a", "b"]));
        let patch = store.apply_patch(key(), named(&["b", "a"]));

        assert!(store.confirm_patch(&key(), patch));
        assert_eq!(store.patch(&key()).unwrap().state, PatchState::Confirmed);
        assert_eq!(names(&store.visible(&key())), vec!["b", "a"]);

        store.reconcile(key(), named(&["b", "a", "c"]));
        assert!(!store.has_overlay(&key()));
        assert_eq!(names(&store.visible(&key())), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_reconcile_then_late_settle_does_not_resurrect() {
        let store = ViewStore::new();
        store.reconcile(key(), named(&["a", "b"]));
        let patch = store.apply_patch(key(), named(&["b", "a"]));

        store.reconcile(key(), named(&["a", "b", "c"]));
        assert!(!store.confirm_patch(&key(), patch));
        assert!(!store.discard_patch(&key(), patch));
        assert_eq!(names(&store.visible(&key())), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_discard_reverts_to_snapshot() {
        let store = ViewStore::new();
        store.reconcile(key(), named(&["a", "b"]));
        let patch = store.apply_patch(key(), named(&["b"]));
        assert!(store.discard_patch(&key(), patch));
        assert_eq!(names(&store.visible(&key())), vec!["a", "b"]);
    }

    #[test]
    fn test_stale_flag_cleared_by_reconcile() {
        let store = ViewStore::new();
        store.mark_stale(key());
        assert!(store.is_stale(&key()));
        store.reconcile(key(), Vec::new());
        assert!(!store.is_stale(&key()));
    }

    #[test]
    fn test_changes_are_broadcast() {
        let store = ViewStore::new();
        let mut rx = store.subscribe();
        let before = store.version(&key());
        store.apply_patch(key(), named(&["a"]));
        assert_eq!(rx.try_recv().unwrap(), key());
        assert!(store.version(&key()) > before);
    }
}
