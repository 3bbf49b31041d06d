//! Optimistic mutation coordinator.
//!
//! Every user mutation goes through the same five steps:
//!
//! 1. compute the predicted post-mutation collection from what is visible now
//! 2. install it as the collection's overlay (the UI updates immediately)
//! 3. dispatch the persistence request(s), bounded by the mutation timeout
//! 4. on success keep the overlay (marked confirmed); on failure or timeout
//!    drop it, reverting to the last authoritative snapshot
//! 5. either way, invalidate the key exactly once so the refetch reconciles
//!
//! A batch of requests shares one overlay: it appears at once and, if any
//! request fails, disappears at once. Requests that succeeded before a sibling
//! failed are not rolled back server-side; the refetch shows the real state.
//!
//! Overlays are owned by their [`PatchId`]. A mutation settling after a newer
//! mutation (or a refetch) replaced its overlay leaves the view alone.

use std::sync::Arc;

use futures::future::join_all;
use larder_order::{
    MoveIntent, SORT_KEY_GAP, SelectionSet, allocate, allocate_sort_key, group_members,
    group_members_excluding, rebalance,
};
use larder_types::{
    CollectionKey, EntityDraft, EntityId, EntityKind, EntityPatch, OrderedEntity, SortKey,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::QueryCache;
use crate::config::CoordinatorConfig;
use crate::persistence::{PersistError, Persistence};
use crate::view::ViewStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    /// The persistence layer refused or could not complete the request.
    #[error("mutation rejected: {0}")]
    Rejected(PersistError),

    #[error("mutation timed out")]
    TimedOut,

    /// The persistence layer misbehaved (e.g. an unreadable response).
    #[error("unexpected persistence failure: {0}")]
    Unexpected(PersistError),

    /// The mutation names an entity that is not in the collection.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),
}

impl From<PersistError> for MutationError {
    fn from(error: PersistError) -> Self {
        if error.is_rejection() {
            MutationError::Rejected(error)
        } else {
            MutationError::Unexpected(error)
        }
    }
}

/// One persistence request within a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Create(EntityDraft),
    Update(EntityId, EntityPatch),
    Delete(EntityId),
    BulkDelete(Vec<EntityId>),
}

pub struct Coordinator {
    view: Arc<ViewStore>,
    persistence: Arc<dyn Persistence>,
    cache: Arc<dyn QueryCache>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        view: Arc<ViewStore>,
        persistence: Arc<dyn Persistence>,
        cache: Arc<dyn QueryCache>,
        config: CoordinatorConfig,
    ) -> Self {
        Self { view, persistence, cache, config }
    }

    pub fn view(&self) -> &Arc<ViewStore> {
        &self.view
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Reposition an entity as described by a completed drag.
    ///
    /// Only the moved entity's key changes, unless the destination has run
    /// out of room between neighbours and rebalancing is enabled, in which
    /// case the whole destination group is renumbered in one batch.
    pub async fn move_entity(&self, key: CollectionKey, intent: MoveIntent) -> Result<(), MutationError> {
        let current = self.view.visible(&key);
        let active = find(&current, intent.entity)?;

        let siblings: Vec<OrderedEntity> =
            group_members_excluding(&current, intent.new_parent, active.id)
                .into_iter()
                .cloned()
                .collect();
        let allocation = allocate(&siblings, intent.new_index);

        let batch = if allocation.degenerate && self.config.rebalance_on_exhaustion {
            debug!(%key, entity = %active.id, "sort keys exhausted, renumbering destination group");
            plan_rebalanced_move(&current, active, intent)
        } else {
            vec![Mutation::Update(
                active.id,
                EntityPatch::reposition(intent.new_parent, allocation.key),
            )]
        };

        let predicted = predict(&key, &current, &batch);
        self.commit(key, predicted, batch, "move").await
    }

    pub async fn set_checked(&self, key: CollectionKey, id: EntityId, checked: bool) -> Result<(), MutationError> {
        self.edit_entity(key, id, EntityPatch::checked(checked)).await
    }

    /// Apply a field edit. An empty patch is a no-op.
    pub async fn edit_entity(
        &self,
        key: CollectionKey,
        id: EntityId,
        patch: EntityPatch,
    ) -> Result<(), MutationError> {
        let current = self.view.visible(&key);
        find(&current, id)?;
        if patch.is_empty() {
            return Ok(());
        }
        let batch = vec![Mutation::Update(id, patch)];
        let predicted = predict(&key, &current, &batch);
        self.commit(key, predicted, batch, "edit").await
    }

    pub async fn delete_entity(&self, key: CollectionKey, id: EntityId) -> Result<(), MutationError> {
        let current = self.view.visible(&key);
        find(&current, id)?;
        let batch = vec![Mutation::Delete(id)];
        let predicted = predict(&key, &current, &batch);
        let outcome = self.commit(key, predicted, batch, "delete").await;
        self.invalidate_ungrouped(&key);
        outcome
    }

    /// Delete every selected entity still present, in one request.
    ///
    /// The selection is cleared only when the delete succeeds, so a failed
    /// attempt can be retried as-is.
    pub async fn bulk_delete(&self, key: CollectionKey, selection: &mut SelectionSet) -> Result<(), MutationError> {
        let current = self.view.visible(&key);
        let ids = selection.present_in(&current);
        if ids.is_empty() {
            debug!(%key, "bulk delete with nothing selected");
            return Ok(());
        }
        let batch = vec![Mutation::BulkDelete(ids)];
        let predicted = predict(&key, &current, &batch);
        let outcome = self.commit(key, predicted, batch, "bulk delete").await;
        self.invalidate_ungrouped(&key);
        outcome?;
        selection.clear();
        Ok(())
    }

    /// Create several entities, each appended to the end of its group.
    ///
    /// The new entities appear at once under provisional ids; the refetch
    /// replaces them with the persisted ones.
    pub async fn bulk_add(&self, key: CollectionKey, drafts: Vec<EntityDraft>) -> Result<(), MutationError> {
        if drafts.is_empty() {
            return Ok(());
        }
        let mut predicted = self.view.visible(&key);
        let mut batch = Vec::with_capacity(drafts.len());
        for mut draft in drafts {
            if draft.sort_key.is_none() {
                let siblings: Vec<OrderedEntity> = group_members(&predicted, draft.parent_id)
                    .into_iter()
                    .cloned()
                    .collect();
                draft.sort_key = Some(allocate_sort_key(&siblings, siblings.len()));
            }
            let mutation = Mutation::Create(draft);
            predicted = predict(&key, &predicted, std::slice::from_ref(&mutation));
            batch.push(mutation);
        }
        self.commit(key, predicted, batch, "bulk add").await
    }

    /// Deleted categories leave their items ungrouped server-side, so the
    /// list's items are stale whatever the outcome.
    fn invalidate_ungrouped(&self, key: &CollectionKey) {
        if key.kind != EntityKind::Category {
            return;
        }
        if let Some(list) = key.scope {
            self.cache.invalidate(&CollectionKey::items(list));
        }
    }

    /// Authoritative data for `key` arrived: it replaces any overlay.
    pub fn reconcile(&self, key: CollectionKey, entities: Vec<OrderedEntity>) {
        self.view.reconcile(key, entities);
    }

    async fn commit(
        &self,
        key: CollectionKey,
        predicted: Vec<OrderedEntity>,
        batch: Vec<Mutation>,
        label: &'static str,
    ) -> Result<(), MutationError> {
        let size = batch.len();
        let patch = self.view.apply_patch(key, predicted);
        debug!(%key, %patch, op = label, size, "optimistic patch applied, dispatching");

        let dispatch = join_all(batch.into_iter().map(|mutation| self.dispatch(&key, mutation)));
        let outcome = match tokio::time::timeout(self.config.mutation_timeout(), dispatch).await {
            Ok(results) => first_failure(results).map_or(Ok(()), Err),
            Err(_) => Err(MutationError::TimedOut),
        };

        match &outcome {
            Ok(()) => {
                self.view.confirm_patch(&key, patch);
                info!(%key, %patch, op = label, size, "mutation persisted");
            }
            Err(failure) => {
                self.view.discard_patch(&key, patch);
                match failure {
                    MutationError::Unexpected(_) => {
                        error!(%key, %patch, op = label, error = %failure, "mutation failed unexpectedly");
                    }
                    _ => warn!(%key, %patch, op = label, error = %failure, "mutation failed, reverted"),
                }
            }
        }
        self.cache.invalidate(&key);
        outcome
    }

    async fn dispatch(&self, key: &CollectionKey, mutation: Mutation) -> Result<(), PersistError> {
        match mutation {
            Mutation::Create(draft) => self.persistence.create_entity(key, draft).await.map(drop),
            Mutation::Update(id, patch) => self.persistence.update_entity(id, patch).await.map(drop),
            Mutation::Delete(id) => self.persistence.delete_entity(id).await,
            Mutation::BulkDelete(ids) => self.persistence.bulk_delete_entities(key, &ids).await,
        }
    }
}

fn find(entities: &[OrderedEntity], id: EntityId) -> Result<&OrderedEntity, MutationError> {
    entities
        .iter()
        .find(|e| e.id == id)
        .ok_or(MutationError::UnknownEntity(id))
}

/// An unexpected failure outranks rejections; otherwise the first failure wins.
fn first_failure(results: Vec<Result<(), PersistError>>) -> Option<MutationError> {
    let errors: Vec<PersistError> = results.into_iter().filter_map(Result::err).collect();
    errors
        .iter()
        .find(|e| !e.is_rejection())
        .or(errors.first())
        .cloned()
        .map(MutationError::from)
}

/// Renumber the destination group with `active` inserted at the intended index.
fn plan_rebalanced_move(current: &[OrderedEntity], active: &OrderedEntity, intent: MoveIntent) -> Vec<Mutation> {
    let mut ordered = group_members_excluding(current, intent.new_parent, active.id);
    let index = intent.new_index.min(ordered.len());
    ordered.insert(index, active);

    let mut batch = vec![Mutation::Update(
        active.id,
        EntityPatch::reposition(intent.new_parent, index as SortKey * SORT_KEY_GAP),
    )];
    batch.extend(
        rebalance(ordered.iter().copied())
            .into_iter()
            .filter(|(id, _)| *id != active.id)
            .map(|(id, sort_key)| Mutation::Update(id, EntityPatch::sort_key(sort_key))),
    );
    batch
}

fn provisional(key: &CollectionKey, draft: &EntityDraft, sort_key: SortKey) -> OrderedEntity {
    OrderedEntity::new(EntityId::provisional(), key.kind, draft.name.clone())
        .with_parent(draft.parent_id)
        .with_sort_key(sort_key)
}

/// The collection as it will look once `batch` is persisted.
///
/// Creates are appended under provisional ids at the draft's sort key.
fn predict(key: &CollectionKey, current: &[OrderedEntity], batch: &[Mutation]) -> Vec<OrderedEntity> {
    let mut next = current.to_vec();
    for mutation in batch {
        match mutation {
            Mutation::Create(draft) => {
                next.push(provisional(key, draft, draft.sort_key.unwrap_or_default()));
            }
            Mutation::Update(id, patch) => {
                if let Some(entity) = next.iter_mut().find(|e| e.id == *id) {
                    entity.apply(patch);
                }
            }
            Mutation::Delete(id) => next.retain(|e| e.id != *id),
            Mutation::BulkDelete(ids) => next.retain(|e| !ids.contains(&e.id)),
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RecordingCache, spawn_refetch_worker};
    use crate::cache::RefetchHandle;
    use crate::memory::{Call, MemoryStore};

    fn key() -> CollectionKey {
        CollectionKey::items(EntityId::new(7))
    }

    fn item(id: i64, parent: i64, sort_key: SortKey) -> OrderedEntity {
        OrderedEntity::new(EntityId::new(id), EntityKind::Item, format!("item {id}"))
            .with_parent(Some(EntityId::new(parent)))
            .with_sort_key(sort_key)
    }

    fn id(raw: i64) -> EntityId {
        EntityId::new(raw)
    }

    /// Category 100: items 1, 2, 3. Category 200: item 4. Category 300: items
    /// 5, 6, 7 with adjacent keys.
    fn seed() -> Vec<OrderedEntity> {
        vec![
            item(1, 100, 0),
            item(2, 100, 1000),
            item(3, 100, 2000),
            item(4, 200, 0),
            item(5, 300, 5),
            item(6, 300, 6),
            item(7, 300, 7),
        ]
    }

    struct Harness {
        store: Arc<MemoryStore>,
        view: Arc<ViewStore>,
        cache: Arc<RecordingCache>,
        coordinator: Arc<Coordinator>,
    }

    fn harness(config: CoordinatorConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.seed(key(), seed());
        let view = Arc::new(ViewStore::new());
        view.reconcile(key(), seed());
        let cache = Arc::new(RecordingCache::new());
        let coordinator = Arc::new(Coordinator::new(
            view.clone(),
            store.clone(),
            cache.clone(),
            config,
        ));
        Harness { store, view, cache, coordinator }
    }

    /// Wired to a real refetch worker, so invalidations reconcile from the store.
    struct Refetching {
        store: Arc<MemoryStore>,
        view: Arc<ViewStore>,
        refetch: RefetchHandle,
        coordinator: Coordinator,
    }

    fn refetching() -> Refetching {
        let store = Arc::new(MemoryStore::new());
        store.seed(key(), seed());
        let view = Arc::new(ViewStore::new());
        view.reconcile(key(), seed());
        let refetch = spawn_refetch_worker(store.clone(), view.clone());
        let coordinator = Coordinator::new(
            view.clone(),
            store.clone(),
            Arc::new(refetch.clone()),
            CoordinatorConfig::default(),
        );
        Refetching { store, view, refetch, coordinator }
    }

    fn group_ids(entities: &[OrderedEntity], parent: i64) -> Vec<i64> {
        group_members(entities, Some(id(parent)))
            .iter()
            .map(|e| e.id.get())
            .collect()
    }

    async fn wait_for_mutations(store: &MemoryStore, count: usize) {
        while store.mutation_calls().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_move_across_groups_applies_and_persists() {
        let h = harness(CoordinatorConfig::default());
        let intent = MoveIntent { entity: id(1), new_parent: Some(id(200)), new_index: 0 };

        h.coordinator.move_entity(key(), intent).await.unwrap();

        let visible = h.view.visible(&key());
        assert_eq!(group_ids(&visible, 200), vec![1, 4]);
        assert_eq!(group_ids(&visible, 100), vec![2, 3]);
        assert_eq!(
            h.store.mutation_calls(),
            vec![Call::Update(id(1), EntityPatch::reposition(Some(id(200)), -1000))]
        );
        // Stays visible until the refetch lands.
        assert!(h.view.has_overlay(&key()));
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_rejected_move_reverts_and_invalidates_once() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_entity(id(1), PersistError::Validation("nope".into()));
        let intent = MoveIntent { entity: id(1), new_parent: Some(id(100)), new_index: 2 };

        let result = h.coordinator.move_entity(key(), intent).await;

        assert!(matches!(result, Err(MutationError::Rejected(PersistError::Validation(_)))));
        assert!(!h.view.has_overlay(&key()));
        assert_eq!(group_ids(&h.view.visible(&key()), 100), vec![1, 2, 3]);
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_rejected_move_leaves_no_trace_after_refetch() {
        let r = refetching();
        r.store.fail_entity(id(1), PersistError::Validation("nope".into()));
        let intent = MoveIntent { entity: id(1), new_parent: Some(id(200)), new_index: 0 };

        let result = r.coordinator.move_entity(key(), intent).await;
        r.refetch.flush().await;

        assert!(matches!(result, Err(MutationError::Rejected(_))));
        // The server still holds the seed; the refetched view must match it.
        assert_eq!(r.store.snapshot(&key()), seed());
        assert_eq!(r.view.visible(&key()), seed());
        assert!(!r.view.has_overlay(&key()));
        assert!(!r.view.is_stale(&key()));
        assert_eq!(group_ids(&r.view.visible(&key()), 100), vec![1, 2, 3]);
        assert_eq!(group_ids(&r.view.visible(&key()), 200), vec![4]);
    }

    #[tokio::test]
    async fn test_malformed_response_is_unexpected() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_next(PersistError::Malformed("not json".into()));

        let result = h.coordinator.set_checked(key(), id(2), true).await;

        assert!(matches!(result, Err(MutationError::Unexpected(_))));
        assert!(!h.view.visible(&key()).iter().any(|e| e.checked));
    }

    #[tokio::test]
    async fn test_unknown_entity_dispatches_nothing() {
        let h = harness(CoordinatorConfig::default());
        let result = h.coordinator.delete_entity(key(), id(999)).await;
        assert_eq!(result, Err(MutationError::UnknownEntity(id(999))));
        assert!(h.store.mutation_calls().is_empty());
        assert_eq!(h.cache.total(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_keys_renumber_destination_group() {
        let h = harness(CoordinatorConfig::default());
        // Between 5 and 6 there is no integer left.
        let intent = MoveIntent { entity: id(7), new_parent: Some(id(300)), new_index: 1 };

        h.coordinator.move_entity(key(), intent).await.unwrap();

        assert_eq!(group_ids(&h.view.visible(&key()), 300), vec![5, 7, 6]);
        let calls = h.store.mutation_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.contains(&Call::Update(id(7), EntityPatch::reposition(Some(id(300)), 1000))));
        assert!(calls.contains(&Call::Update(id(5), EntityPatch::sort_key(0))));
        assert!(calls.contains(&Call::Update(id(6), EntityPatch::sort_key(2000))));
        assert_eq!(group_ids(&h.store.snapshot(&key()), 300), vec![5, 7, 6]);
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_renumbering_batch_with_rejected_middle_request_reverts_all() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_entity(id(5), PersistError::Validation("stale key".into()));
        let intent = MoveIntent { entity: id(7), new_parent: Some(id(300)), new_index: 1 };

        let result = h.coordinator.move_entity(key(), intent).await;

        assert!(matches!(result, Err(MutationError::Rejected(PersistError::Validation(_)))));
        assert_eq!(
            h.store.mutation_calls(),
            vec![
                Call::Update(id(7), EntityPatch::reposition(Some(id(300)), 1000)),
                Call::Update(id(5), EntityPatch::sort_key(0)),
                Call::Update(id(6), EntityPatch::sort_key(2000)),
            ]
        );
        // Neither the first nor the third prediction survives locally.
        assert!(!h.view.has_overlay(&key()));
        assert_eq!(h.view.visible(&key()), seed());
        assert_eq!(h.cache.count(&key()), 1);
        assert_eq!(h.cache.total(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_keys_without_rebalance_use_fallback() {
        let config = CoordinatorConfig { rebalance_on_exhaustion: false, ..CoordinatorConfig::default() };
        let h = harness(config);
        let intent = MoveIntent { entity: id(7), new_parent: Some(id(300)), new_index: 1 };

        h.coordinator.move_entity(key(), intent).await.unwrap();

        assert_eq!(
            h.store.mutation_calls(),
            vec![Call::Update(id(7), EntityPatch::reposition(Some(id(300)), 6))]
        );
    }

    #[tokio::test]
    async fn test_superseded_failure_does_not_revert_newer_patch() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_entity(id(1), PersistError::Network("reset".into()));
        h.store.hold();

        let first = {
            let coordinator = h.coordinator.clone();
            let intent = MoveIntent { entity: id(1), new_parent: Some(id(100)), new_index: 2 };
            tokio::spawn(async move { coordinator.move_entity(key(), intent).await })
        };
        wait_for_mutations(&h.store, 1).await;

        let second = {
            let coordinator = h.coordinator.clone();
            let intent = MoveIntent { entity: id(2), new_parent: Some(id(200)), new_index: 1 };
            tokio::spawn(async move { coordinator.move_entity(key(), intent).await })
        };
        wait_for_mutations(&h.store, 2).await;

        h.store.release();
        assert!(matches!(first.await.unwrap(), Err(MutationError::Rejected(_))));
        second.await.unwrap().unwrap();

        // The newer prediction (built on top of the older one) is still shown.
        let visible = h.view.visible(&key());
        assert!(h.view.has_overlay(&key()));
        assert_eq!(group_ids(&visible, 200), vec![4, 2]);
        assert_eq!(group_ids(&visible, 100), vec![3, 1]);
        assert_eq!(h.cache.count(&key()), 2);
    }

    #[tokio::test]
    async fn test_late_success_after_reconcile_keeps_authoritative_state() {
        let h = harness(CoordinatorConfig::default());
        h.store.hold();

        let pending = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.set_checked(key(), id(3), true).await })
        };
        wait_for_mutations(&h.store, 1).await;
        assert!(h.view.visible(&key()).iter().any(|e| e.id == id(3) && e.checked));

        let mut truth = seed();
        truth.retain(|e| e.id != id(4));
        h.coordinator.reconcile(key(), truth.clone());

        h.store.release();
        pending.await.unwrap().unwrap();

        assert!(!h.view.has_overlay(&key()));
        assert_eq!(h.view.visible(&key()), truth);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_times_out_and_reverts() {
        let h = harness(CoordinatorConfig::default());
        h.store.hold();

        let result = h.coordinator.delete_entity(key(), id(4)).await;

        assert_eq!(result, Err(MutationError::TimedOut));
        assert!(!h.view.has_overlay(&key()));
        assert!(h.view.visible(&key()).iter().any(|e| e.id == id(4)));
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_bulk_delete_clears_selection_on_success() {
        let h = harness(CoordinatorConfig::default());
        let mut selection: SelectionSet = [id(1), id(2), id(99)].into_iter().collect();

        h.coordinator.bulk_delete(key(), &mut selection).await.unwrap();

        assert!(selection.is_empty());
        assert_eq!(
            h.store.mutation_calls(),
            vec![Call::BulkDelete(key(), vec![id(1), id(2)])]
        );
        assert_eq!(group_ids(&h.view.visible(&key()), 100), vec![3]);
    }

    #[tokio::test]
    async fn test_bulk_delete_keeps_selection_on_failure() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_entity(id(2), PersistError::Unauthorized);
        let mut selection: SelectionSet = [id(1), id(2)].into_iter().collect();

        let result = h.coordinator.bulk_delete(key(), &mut selection).await;

        assert_eq!(result, Err(MutationError::Rejected(PersistError::Unauthorized)));
        assert_eq!(selection.len(), 2);
        assert_eq!(group_ids(&h.view.visible(&key()), 100), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_bulk_add_appends_provisional_entities() {
        let h = harness(CoordinatorConfig::default());
        let drafts = vec![
            EntityDraft::new("flour").in_group(Some(id(200))),
            EntityDraft::new("sugar").in_group(Some(id(200))),
        ];

        h.coordinator.bulk_add(key(), drafts).await.unwrap();

        let visible = h.view.visible(&key());
        let added: Vec<&OrderedEntity> = group_members(&visible, Some(id(200)))
            .into_iter()
            .filter(|e| e.id.is_provisional())
            .collect();
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].name, "flour");
        assert_eq!(added[0].sort_key, 1000);
        assert_eq!(added[1].sort_key, 2000);
        assert_eq!(h.store.snapshot(&key()).len(), seed().len() + 2);
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_partial_batch_failure_reverts_whole_batch() {
        let h = harness(CoordinatorConfig::default());
        h.store.fail_next(PersistError::Validation("duplicate name".into()));
        let drafts = vec![
            EntityDraft::new("a").in_group(Some(id(100))),
            EntityDraft::new("b").in_group(Some(id(100))),
            EntityDraft::new("c").in_group(Some(id(100))),
        ];

        let result = h.coordinator.bulk_add(key(), drafts).await;

        assert!(matches!(result, Err(MutationError::Rejected(_))));
        assert_eq!(h.view.visible(&key()), seed());
        assert_eq!(h.store.mutation_calls().len(), 3);
        assert_eq!(h.cache.count(&key()), 1);
    }

    #[tokio::test]
    async fn test_refetch_reconciles_after_success() {
        let r = refetching();

        r.coordinator
            .edit_entity(key(), id(4), EntityPatch { name: Some("oats".into()), ..EntityPatch::default() })
            .await
            .unwrap();
        r.refetch.flush().await;

        assert!(!r.view.has_overlay(&key()));
        assert_eq!(r.view.visible(&key()), r.store.snapshot(&key()));
        assert!(r.view.visible(&key()).iter().any(|e| e.name == "oats"));
    }

    #[tokio::test]
    async fn test_deleting_category_ungroups_its_items() {
        let r = refetching();
        let categories = CollectionKey::categories(id(7));
        let seeded: Vec<OrderedEntity> = [100, 200, 300]
            .into_iter()
            .map(|raw| OrderedEntity::new(id(raw), EntityKind::Category, format!("category {raw}")))
            .collect();
        r.store.seed(categories, seeded.clone());
        r.view.reconcile(categories, seeded);

        r.coordinator.delete_entity(categories, id(100)).await.unwrap();
        r.refetch.flush().await;

        let remaining: Vec<i64> = r.view.visible(&categories).iter().map(|c| c.id.get()).collect();
        assert_eq!(remaining, vec![200, 300]);
        let items = r.view.visible(&key());
        assert_eq!(items.len(), seed().len());
        assert!(
            items
                .iter()
                .filter(|e| [1, 2, 3].contains(&e.id.get()))
                .all(|e| e.parent_id.is_none())
        );
        assert_eq!(group_ids(&items, 200), vec![4]);
        assert!(!r.view.is_stale(&key()));
    }

    #[tokio::test]
    async fn test_failed_category_delete_still_invalidates_items() {
        let h = harness(CoordinatorConfig::default());
        let categories = CollectionKey::categories(id(7));
        let seeded = vec![OrderedEntity::new(id(100), EntityKind::Category, "Produce")];
        h.store.seed(categories, seeded.clone());
        h.view.reconcile(categories, seeded);
        h.store.fail_entity(id(100), PersistError::Network("reset".into()));

        let result = h.coordinator.delete_entity(categories, id(100)).await;

        assert!(result.is_err());
        assert_eq!(h.cache.count(&categories), 1);
        assert_eq!(h.cache.count(&key()), 1);
    }
}
