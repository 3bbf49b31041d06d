//! Ordering core for larder collections.
//!
//! Everything in this crate is synchronous and free of I/O:
//!
//! - [`allocator`]: fractional-style integer sort keys and group rebalancing
//! - [`drag`]: the drag session state machine producing [`MoveIntent`]s
//! - [`selection`]: selection sets with tri-state group queries
//! - [`siblings`]: group membership in render order
//!
//! The async side (optimistic application, persistence, reconciliation)
//! lives in `larder-client`.

pub mod allocator;
pub mod drag;
pub mod selection;
pub mod siblings;

pub use allocator::{Allocation, SORT_KEY_GAP, allocate, allocate_sort_key, rebalance};
pub use drag::{DragMachine, DragSession, DragState, DropTarget, MoveIntent};
pub use selection::{GroupSelection, SelectionSet};
pub use siblings::{group_members, group_members_excluding, index_in_group, render_order};
