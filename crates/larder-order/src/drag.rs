//! Drag session state machine.
//!
//! Tracks one in-progress reordering gesture (pointer or keyboard) and turns
//! its end into at most one [`MoveIntent`]. Performs no I/O and cannot fail.
//!
//! # State Machine
//!
//! ```text
//! +--------+   start(entity)    +-----------------------------+
//! |  Idle  | -----------------> | Active { active, over }     |
//! +--------+                    +-----------------------------+
//!     ^                            |  hover(target) (repeatable)
//!     |  end() -> Option<intent>   |
//!     +----------------------------+
//!     |  abort()                   |
//!     +----------------------------+
//! ```
//!
//! There is no separate "cancelled" state; every session returns to Idle.
//!
//! # Target resolution
//!
//! | Target                | Destination group        | Destination index                      |
//! |-----------------------|--------------------------|----------------------------------------|
//! | `Entity(t)`           | `t.parent_id`            | `t`'s position among siblings excl. active (+1 when moving down within the same group) |
//! | `DropZone(parent)`    | `parent`                 | end of that group                      |
//! | `GroupHandle(g)`      | `g` if active is grouped | end of `g`                             |
//! |                       | else like `Entity(g)`    |                                        |

use larder_types::{EntityId, OrderedEntity};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::siblings::{group_members, group_members_excluding};

/// Where a dragged entity is currently hovering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DropTarget {
    /// Another entity of the same kind.
    Entity(EntityId),
    /// The drop zone representing a (possibly empty) group; `None` is the
    /// ungrouped bucket.
    DropZone(Option<EntityId>),
    /// A group's handle (e.g. a category header).
    GroupHandle(EntityId),
}

/// The resolved result of a completed drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub entity: EntityId,
    pub new_parent: Option<EntityId>,
    /// Index among the destination group's members, excluding the moved entity.
    pub new_index: usize,
}

/// An in-progress gesture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DragSession {
    pub active: OrderedEntity,
    pub over: Option<DropTarget>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Active(DragSession),
}

/// Owner of the (at most one) current drag session.
#[derive(Clone, Debug, Default)]
pub struct DragMachine {
    state: DragState,
}

impl DragMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DragState::Active(_))
    }

    /// The entity being dragged, if any.
    pub fn active(&self) -> Option<&OrderedEntity> {
        match &self.state {
            DragState::Active(session) => Some(&session.active),
            DragState::Idle => None,
        }
    }

    /// Begin a gesture on `entity`.
    ///
    /// Returns false (and changes nothing) if a session is already active.
    pub fn start(&mut self, entity: OrderedEntity) -> bool {
        if let DragState::Active(session) = &self.state {
            debug!(
                active = %session.active.id,
                ignored = %entity.id,
                "drag start ignored: session already active"
            );
            return false;
        }
        trace!(entity = %entity.id, "drag started");
        self.state = DragState::Active(DragSession { active: entity, over: None });
        true
    }

    /// Pointer or focus moved over `target` (`None` = no valid target).
    pub fn hover(&mut self, target: Option<DropTarget>) {
        if let DragState::Active(session) = &mut self.state {
            session.over = target;
        }
    }

    /// Abandon the gesture (escape key, drop outside any target).
    pub fn abort(&mut self) {
        if let DragState::Active(session) = std::mem::take(&mut self.state) {
            trace!(entity = %session.active.id, "drag aborted");
        }
    }

    /// Finish the gesture.
    ///
    /// `members` is the current view of the active entity's collection (all
    /// entities of the same kind in scope). Returns a move intent only when
    /// the drop changes the entity's group or index.
    pub fn end(&mut self, members: &[OrderedEntity]) -> Option<MoveIntent> {
        let DragState::Active(session) = std::mem::take(&mut self.state) else {
            return None;
        };
        let target = session.over?;

        // Prefer the live copy; the session snapshot may predate a refetch.
        let active = members
            .iter()
            .find(|e| e.id == session.active.id)
            .unwrap_or(&session.active);

        let (new_parent, new_index) = resolve_target(active, target, members)?;

        let current_index = group_members(members, active.parent_id)
            .iter()
            .position(|e| e.id == active.id);
        if new_parent == active.parent_id && Some(new_index) == current_index {
            trace!(entity = %active.id, "drag ended without effective change");
            return None;
        }

        let intent = MoveIntent { entity: active.id, new_parent, new_index };
        debug!(?intent, "drag produced move intent");
        Some(intent)
    }
}

/// Destination `(group, index)` for dropping `active` on `target`.
fn resolve_target(
    active: &OrderedEntity,
    target: DropTarget,
    members: &[OrderedEntity],
) -> Option<(Option<EntityId>, usize)> {
    match target {
        DropTarget::Entity(id) => resolve_entity_target(active, id, members),
        DropTarget::DropZone(parent) => {
            let len = group_members_excluding(members, parent, active.id).len();
            Some((parent, len))
        }
        DropTarget::GroupHandle(group) => {
            if active.kind.group_kind().is_some() {
                let len = group_members_excluding(members, Some(group), active.id).len();
                Some((Some(group), len))
            } else {
                resolve_entity_target(active, group, members)
            }
        }
    }
}

fn resolve_entity_target(
    active: &OrderedEntity,
    target_id: EntityId,
    members: &[OrderedEntity],
) -> Option<(Option<EntityId>, usize)> {
    if target_id == active.id {
        return None;
    }
    let target = members.iter().find(|e| e.id == target_id)?;
    let parent = target.parent_id;
    let siblings = group_members_excluding(members, parent, active.id);
    let target_index = siblings.iter().position(|e| e.id == target_id)?;

    // Within one group, dropping onto a later sibling lands after it.
    let moving_down = parent == active.parent_id
        && group_members(members, parent)
            .iter()
            .position(|e| e.id == active.id)
            .is_some_and(|current| current <= target_index);

    Some((parent, if moving_down { target_index + 1 } else { target_index }))
}
