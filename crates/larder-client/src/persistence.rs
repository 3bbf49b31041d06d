//! Persistence collaborator.
//!
//! The REST layer the coordinator writes through and the cache refetches
//! from. Implementations are expected to be safe to "retry by refetch": the
//! coordinator never reissues a failed mutation, it only re-reads.

use async_trait::async_trait;
use larder_types::{CollectionKey, EntityDraft, EntityId, EntityPatch, OrderedEntity};
use thiserror::Error;

/// Failure reported by the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistError {
    /// Transport failure (connection refused, reset, DNS, 5xx).
    #[error("network error: {0}")]
    Network(String),

    /// Session expired or token rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Server refused the change (e.g. duplicate name).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Response could not be interpreted. Not a user-recoverable rejection.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl PersistError {
    /// Whether this is an expected rejection (as opposed to a broken collaborator).
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PersistError::Malformed(_))
    }
}

#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read the authoritative state of a collection.
    async fn fetch_collection(&self, key: &CollectionKey) -> Result<Vec<OrderedEntity>, PersistError>;

    async fn create_entity(
        &self,
        key: &CollectionKey,
        draft: EntityDraft,
    ) -> Result<OrderedEntity, PersistError>;

    async fn update_entity(&self, id: EntityId, patch: EntityPatch) -> Result<OrderedEntity, PersistError>;

    async fn delete_entity(&self, id: EntityId) -> Result<(), PersistError>;

    async fn bulk_delete_entities(&self, key: &CollectionKey, ids: &[EntityId]) -> Result<(), PersistError>;
}
