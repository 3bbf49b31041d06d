//! Typed identifiers for entities, users, views, and optimistic patches.
//!
//! Entity and user IDs wrap the persistence layer's integer primary keys.
//! Negative entity IDs are *provisional*: handed out locally for optimistic
//! creates and never sent to the server as a reference.
//!
//! `PatchId` wraps UUIDv7 (time-ordered) and identifies one optimistic patch
//! for ownership checks when its request settles.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// An entity identifier (list, category, item, or pantry item).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

/// A user identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_int_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a raw integer key.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw integer key.
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for i64 {
            fn from(id: $T) -> i64 {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_int_id!(EntityId, "EntityId");
impl_int_id!(UserId, "UserId");

static NEXT_PROVISIONAL: AtomicI64 = AtomicI64::new(-1);

impl EntityId {
    /// Allocate a fresh provisional (negative) ID for an optimistic create.
    pub fn provisional() -> Self {
        Self(NEXT_PROVISIONAL.fetch_sub(1, Ordering::Relaxed))
    }

    /// Whether this ID was allocated locally and not yet confirmed by the server.
    pub fn is_provisional(&self) -> bool {
        self.0 < 0
    }
}

/// An optimistic patch identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(uuid::Uuid);

impl PatchId {
    /// Create a new time-ordered ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for log display only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }
}

impl Default for PatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatchId({})", self.short())
    }
}

/// A named view within the app (e.g. `"list:7"`, `"pantry"`), used to scope preferences.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Collection keys ─────────────────────────────────────────────────────────

/// Scope of a cached set of entities, the unit of invalidation and refetch.
///
/// `scope` is the owning list for categories and items; top-level
/// collections (lists, pantry) have no scope.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub struct CollectionKey {
    pub kind: EntityKind,
    pub scope: Option<EntityId>,
}

impl CollectionKey {
    /// All lists visible to the current user.
    pub const fn lists() -> Self {
        Self { kind: EntityKind::List, scope: None }
    }

    /// Categories of one list.
    pub const fn categories(list: EntityId) -> Self {
        Self { kind: EntityKind::Category, scope: Some(list) }
    }

    /// Items of one list.
    pub const fn items(list: EntityId) -> Self {
        Self { kind: EntityKind::Item, scope: Some(list) }
    }

    /// The household pantry.
    pub const fn pantry() -> Self {
        Self { kind: EntityKind::PantryItem, scope: None }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}:{}", self.kind, scope),
            None => write!(f, "{}", self.kind),
        }
    }
}
