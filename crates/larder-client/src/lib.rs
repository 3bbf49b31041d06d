//! Client-side state engine for larder.
//!
//! Sits between the UI and the REST/WebSocket collaborators:
//!
//! ```text
//!   gesture ─▶ DragMachine / SelectionSet (larder-order)
//!                 │ MoveIntent, ids
//!                 ▼
//!            Coordinator ── apply_patch ──▶ ViewStore ◀── reconcile ── RefetchWorker
//!                 │                                                        ▲
//!                 └── Persistence (create/update/delete) ── invalidate ────┤
//!                                                                          │
//!            SyncSupervisor ─ frames ─▶ SyncListener ── invalidate ────────┘
//! ```
//!
//! All cache refreshes go through [`QueryCache::invalidate`]; nothing but the
//! refetch worker writes authoritative data into the [`ViewStore`].

pub mod cache;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod memory;
pub mod persistence;
pub mod preferences;
pub mod supervisor;
pub mod sync;
pub mod view;

pub use cache::{QueryCache, RecordingCache, RefetchHandle, RefetchWorker, spawn_refetch_worker};
pub use config::{ConfigError, CoordinatorConfig, LarderConfig, SyncConfig};
pub use coordinator::{Coordinator, Mutation, MutationError};
pub use memory::{Call, MemoryStore};
pub use persistence::{PersistError, Persistence};
pub use preferences::{SortPreference, UserPreferenceStore, ViewMode, ViewPreferences};
pub use supervisor::{
    ConnectError, ConnectionStatus, ReconnectPolicy, SupervisorError, SyncConnection, SyncConnector,
    SyncSupervisor,
};
pub use sync::{EventKind, FrameOutcome, ListEvent, ListEventType, SyncError, SyncListener, SyncMessage};
pub use view::{OptimisticPatch, PatchState, ViewStore};
