//! Selection sets for bulk actions.
//!
//! A selection is a plain set of entity ids, independent of whatever
//! entities are currently loaded: ids can be selected before data arrives,
//! and ids that are not in the current list simply never count toward any
//! group. Group queries take the loaded entities as an argument.

use std::collections::BTreeSet;

use larder_types::{EntityId, OrderedEntity};
use serde::{Deserialize, Serialize};

/// Tri-state of a group checkbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupSelection {
    None,
    Partial,
    Full,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<EntityId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`.
    pub fn toggle(&mut self, id: EntityId) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    pub fn select(&mut self, id: EntityId) {
        self.ids.insert(id);
    }

    pub fn deselect(&mut self, id: EntityId) {
        self.ids.remove(&id);
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Select-all or deselect-all for one group.
    ///
    /// If every member of `parent` is already selected, all of them are
    /// removed; otherwise the remaining ones are added. Members are never
    /// inverted individually.
    pub fn toggle_group(&mut self, parent: Option<EntityId>, all: &[OrderedEntity]) {
        let members = group_ids(parent, all);
        if self.is_group_fully_selected(parent, all) {
            for id in members {
                self.ids.remove(&id);
            }
        } else {
            self.ids.extend(members);
        }
    }

    /// True iff the group is non-empty and every member is selected.
    pub fn is_group_fully_selected(&self, parent: Option<EntityId>, all: &[OrderedEntity]) -> bool {
        self.group_state(parent, all) == GroupSelection::Full
    }

    /// True iff some, but not all, members are selected.
    pub fn is_group_partially_selected(&self, parent: Option<EntityId>, all: &[OrderedEntity]) -> bool {
        self.group_state(parent, all) == GroupSelection::Partial
    }

    pub fn group_state(&self, parent: Option<EntityId>, all: &[OrderedEntity]) -> GroupSelection {
        let members = group_ids(parent, all);
        let selected = members.iter().filter(|id| self.ids.contains(id)).count();
        match selected {
            0 => GroupSelection::None,
            n if n == members.len() => GroupSelection::Full,
            _ => GroupSelection::Partial,
        }
    }

    /// Selected ids that are present in `all`, in ascending order.
    pub fn present_in(&self, all: &[OrderedEntity]) -> Vec<EntityId> {
        self.ids
            .iter()
            .copied()
            .filter(|id| all.iter().any(|e| e.id == *id))
            .collect()
    }
}

impl FromIterator<EntityId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        Self { ids: iter.into_iter().collect() }
    }
}

fn group_ids(parent: Option<EntityId>, all: &[OrderedEntity]) -> Vec<EntityId> {
    all.iter()
        .filter(|e| e.parent_id == parent)
        .map(|e| e.id)
        .collect()
}
