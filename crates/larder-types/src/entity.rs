//! Ordered entities and the partial updates applied to them.
//!
//! Every user-orderable thing in a household (lists, categories within a
//! list, items within a category, pantry entries) is an [`OrderedEntity`]:
//! an id, an optional containing group, and a numeric sort key. The
//! effective render order within a group is `(sort_key, id)`, so two
//! entities never compare equal even when their keys tie.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// Numeric position of an entity among its siblings. Compared, never interpreted.
pub type SortKey = i64;

/// Kind of ordered entity.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[strum(serialize = "lists")]
    List,
    #[strum(serialize = "categories")]
    Category,
    #[strum(serialize = "items")]
    Item,
    #[strum(serialize = "pantry")]
    PantryItem,
}

impl EntityKind {
    /// The kind of entity that groups this one, if any.
    ///
    /// Items are grouped by category; everything else is a flat collection
    /// within its scope.
    pub fn group_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Item => Some(EntityKind::Category),
            EntityKind::List | EntityKind::Category | EntityKind::PantryItem => None,
        }
    }
}

/// An entity participating in a user-orderable collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Containing group; `None` means ungrouped.
    pub parent_id: Option<EntityId>,
    pub sort_key: SortKey,
    pub name: String,
    #[serde(default)]
    pub checked: bool,
}

impl OrderedEntity {
    pub fn new(id: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            parent_id: None,
            sort_key: 0,
            name: name.into(),
            checked: false,
        }
    }

    pub fn with_parent(mut self, parent_id: Option<EntityId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Effective render order: sort key, then id as tiebreak.
    pub fn render_cmp(&self, other: &Self) -> Ordering {
        self.sort_key
            .cmp(&other.sort_key)
            .then(self.id.cmp(&other.id))
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &EntityPatch) {
        if let Some(parent_id) = patch.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(sort_key) = patch.sort_key {
            self.sort_key = sort_key;
        }
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(checked) = patch.checked {
            self.checked = checked;
        }
    }
}

/// Partial update to an entity; `None` fields are left untouched.
///
/// `parent_id` is doubly optional: `Some(None)` moves the entity to the
/// ungrouped bucket, `None` leaves its group alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl EntityPatch {
    /// Reposition: new group and key.
    pub fn reposition(parent_id: Option<EntityId>, sort_key: SortKey) -> Self {
        Self {
            parent_id: Some(parent_id),
            sort_key: Some(sort_key),
            ..Self::default()
        }
    }

    /// Key-only update, used for sibling renumbering.
    pub fn sort_key(sort_key: SortKey) -> Self {
        Self {
            sort_key: Some(sort_key),
            ..Self::default()
        }
    }

    pub fn checked(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parent_id.is_none()
            && self.sort_key.is_none()
            && self.name.is_none()
            && self.checked.is_none()
    }
}

/// Create payload for a new entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub name: String,
    pub parent_id: Option<EntityId>,
    /// Requested key; the coordinator fills it in when appending.
    pub sort_key: Option<SortKey>,
}

impl EntityDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            sort_key: None,
        }
    }

    pub fn in_group(mut self, parent_id: Option<EntityId>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, key: SortKey) -> OrderedEntity {
        OrderedEntity::new(EntityId::new(id), EntityKind::Item, format!("item {id}"))
            .with_sort_key(key)
    }

    #[test]
    fn test_render_cmp_breaks_ties_by_id() {
        let a = item(2, 10);
        let b = item(1, 10);
        assert_eq!(a.render_cmp(&b), Ordering::Greater);
        assert_eq!(item(1, 5).render_cmp(&item(9, 6)), Ordering::Less);
    }

    #[test]
    fn test_apply_patch_touches_only_set_fields() {
        let mut entity = item(1, 0).with_parent(Some(EntityId::new(4)));
        entity.apply(&EntityPatch::checked(true));
        assert!(entity.checked);
        assert_eq!(entity.parent_id, Some(EntityId::new(4)));
        assert_eq!(entity.sort_key, 0);

        entity.apply(&EntityPatch::reposition(None, 2000));
        assert_eq!(entity.parent_id, None);
        assert_eq!(entity.sort_key, 2000);
        assert_eq!(entity.name, "item 1");
    }

    #[test]
    fn test_patch_serializes_sparse() {
        let json = serde_json::to_value(EntityPatch::sort_key(500)).unwrap();
        assert_eq!(json, serde_json::json!({ "sort_key": 500 }));
        assert!(EntityPatch::default().is_empty());
    }

    #[test]
    fn test_kind_strings_and_grouping() {
        assert_eq!(EntityKind::Item.to_string(), "items");
        assert_eq!("categories".parse::<EntityKind>().unwrap(), EntityKind::Category);
        assert_eq!(EntityKind::Item.group_kind(), Some(EntityKind::Category));
        assert_eq!(EntityKind::Category.group_kind(), None);
    }
}
