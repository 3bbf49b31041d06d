//! In-memory persistence.
//!
//! Backs the `larder demo` command and the client tests. Besides storing
//! collections it records every call and can inject failures or hold
//! mutations until released, which is how tests stage out-of-order
//! completions.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use larder_order::{SORT_KEY_GAP, group_members};
use larder_types::{CollectionKey, EntityDraft, EntityId, EntityKind, EntityPatch, OrderedEntity};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::persistence::{PersistError, Persistence};

/// A recorded persistence call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Fetch(CollectionKey),
    Create(CollectionKey, String),
    Update(EntityId, EntityPatch),
    Delete(EntityId),
    BulkDelete(CollectionKey, Vec<EntityId>),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::Fetch(_))
    }
}

#[derive(Default)]
struct State {
    collections: HashMap<CollectionKey, Vec<OrderedEntity>>,
    next_id: i64,
    calls: Vec<Call>,
    /// Errors returned by the next mutations, in order.
    fail_next: VecDeque<PersistError>,
    /// Mutations touching these entities always fail.
    fail_entities: HashMap<EntityId, PersistError>,
    fail_fetch: Option<PersistError>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    hold: watch::Sender<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(State { next_id: 1, ..State::default() }),
            hold,
        }
    }

    /// Replace a collection's contents. New entity ids are drawn above the
    /// largest seeded id.
    pub fn seed(&self, key: CollectionKey, entities: Vec<OrderedEntity>) {
        let mut state = self.state.lock();
        let max_id = entities.iter().map(|e| e.id.get()).max().unwrap_or(0);
        state.next_id = state.next_id.max(max_id + 1);
        state.collections.insert(key, entities);
    }

    /// Current stored state of a collection (no call recorded).
    pub fn snapshot(&self, key: &CollectionKey) -> Vec<OrderedEntity> {
        self.state.lock().collections.get(key).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Fail the next mutation with `error`.
    pub fn fail_next(&self, error: PersistError) {
        self.state.lock().fail_next.push_back(error);
    }

    /// Fail every mutation that touches `id`.
    pub fn fail_entity(&self, id: EntityId, error: PersistError) {
        self.state.lock().fail_entities.insert(id, error);
    }

    pub fn fail_fetches(&self, error: Option<PersistError>) {
        self.state.lock().fail_fetch = error;
    }

    /// Park all mutations until [`release`](Self::release).
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    async fn wait_released(&self) {
        let mut rx = self.hold.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = rx.wait_for(|held| !*held).await;
    }

    fn check_failure(state: &mut State, touched: &[EntityId]) -> Result<(), PersistError> {
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        for id in touched {
            if let Some(error) = state.fail_entities.get(id) {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    /// Items of a deleted category become ungrouped.
    fn ungroup_items(state: &mut State, categories: &CollectionKey, deleted: &[EntityId]) {
        if categories.kind != EntityKind::Category {
            return;
        }
        let Some(list) = categories.scope else {
            return;
        };
        if let Some(items) = state.collections.get_mut(&CollectionKey::items(list)) {
            for item in items.iter_mut() {
                if item.parent_id.is_some_and(|parent| deleted.contains(&parent)) {
                    item.parent_id = None;
                }
            }
        }
    }

    fn find_mut<'a>(state: &'a mut State, id: EntityId) -> Option<&'a mut OrderedEntity> {
        state
            .collections
            .values_mut()
            .flat_map(|entities| entities.iter_mut())
            .find(|e| e.id == id)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn fetch_collection(&self, key: &CollectionKey) -> Result<Vec<OrderedEntity>, PersistError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Fetch(*key));
        if let Some(error) = state.fail_fetch.clone() {
            return Err(error);
        }
        Ok(state.collections.get(key).cloned().unwrap_or_default())
    }

    async fn create_entity(
        &self,
        key: &CollectionKey,
        draft: EntityDraft,
    ) -> Result<OrderedEntity, PersistError> {
        self.state.lock().calls.push(Call::Create(*key, draft.name.clone()));
        self.wait_released().await;

        let mut state = self.state.lock();
        Self::check_failure(&mut state, &[])?;

        let id = EntityId::new(state.next_id);
        state.next_id += 1;
        let entities = state.collections.entry(*key).or_default();
        let sort_key = draft.sort_key.unwrap_or_else(|| {
            group_members(entities, draft.parent_id)
                .last()
                .map_or(0, |last| last.sort_key + SORT_KEY_GAP)
        });
        let entity = OrderedEntity::new(id, key.kind, draft.name)
            .with_parent(draft.parent_id)
            .with_sort_key(sort_key);
        entities.push(entity.clone());
        trace!(%key, %id, "memory store created entity");
        Ok(entity)
    }

    async fn update_entity(&self, id: EntityId, patch: EntityPatch) -> Result<OrderedEntity, PersistError> {
        self.state.lock().calls.push(Call::Update(id, patch.clone()));
        self.wait_released().await;

        let mut state = self.state.lock();
        Self::check_failure(&mut state, &[id])?;
        let entity = Self::find_mut(&mut state, id).ok_or(PersistError::NotFound(id))?;
        entity.apply(&patch);
        Ok(entity.clone())
    }

    async fn delete_entity(&self, id: EntityId) -> Result<(), PersistError> {
        self.state.lock().calls.push(Call::Delete(id));
        self.wait_released().await;

        let mut state = self.state.lock();
        Self::check_failure(&mut state, &[id])?;
        let mut owner = None;
        for (key, entities) in state.collections.iter_mut() {
            let before = entities.len();
            entities.retain(|e| e.id != id);
            if entities.len() != before {
                owner = Some(*key);
            }
        }
        let owner = owner.ok_or(PersistError::NotFound(id))?;
        Self::ungroup_items(&mut state, &owner, &[id]);
        Ok(())
    }

    async fn bulk_delete_entities(&self, key: &CollectionKey, ids: &[EntityId]) -> Result<(), PersistError> {
        self.state.lock().calls.push(Call::BulkDelete(*key, ids.to_vec()));
        self.wait_released().await;

        let mut state = self.state.lock();
        Self::check_failure(&mut state, ids)?;
        // Unknown ids are ignored, like the REST endpoint's filtered update.
        if let Some(entities) = state.collections.get_mut(key) {
            entities.retain(|e| !ids.contains(&e.id));
        }
        Self::ungroup_items(&mut state, key, ids);
        Ok(())
    }
}
