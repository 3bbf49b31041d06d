//! Shared identity and entity types for larder.
//!
//! This crate is the foundation the ordering core and the client build on:
//! typed IDs, ordered entities, and the collection keys that scope cached
//! data. It has **no internal larder dependencies**.
//!
//! # Entity Overview
//!
//! ```text
//! List (EntityId)            ← ordered among the user's lists
//!     └── Category           ← ordered within the list
//!         └── Item           ← ordered within its category (or ungrouped)
//! Pantry
//!     └── PantryItem         ← ordered within the pantry
//! ```
//!
//! # Key Types
//!
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`EntityId`]      | Integer entity key (negative = provisional)  |
//! | [`OrderedEntity`] | Id + group + sort key + editable fields      |
//! | [`EntityPatch`]   | Partial update mirrored to persistence       |
//! | [`CollectionKey`] | Invalidation scope (e.g. `items:7`)          |
//! | [`PatchId`]       | Ownership token for one optimistic patch     |

pub mod entity;
pub mod ids;

pub use entity::{EntityDraft, EntityKind, EntityPatch, OrderedEntity, SortKey};
pub use ids::{CollectionKey, EntityId, PatchId, UserId, ViewId};
