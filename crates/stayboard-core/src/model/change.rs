// ── Change events ──
//
// Normalized row-change notifications. A source emits them untyped
// (`ChangeEvent<serde_json::Value>`); a live view decodes them into its
// entity type before reconciling.

use serde_json::Value;

use super::entity_id::EntityId;
use super::Entity;
use crate::convert::decode_record;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
    Insert(T),
    Update {
        entity: T,
        /// Set when the primary key itself changed.
        previous_id: Option<EntityId>,
    },
    Delete {
        id: EntityId,
    },
}

impl<T> ChangeEvent<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update { .. } => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }
}

impl ChangeEvent<Value> {
    /// Decode the carried record into `T`.
    pub fn decode<T: Entity>(self) -> Result<ChangeEvent<T>, CoreError> {
        Ok(match self {
            Self::Insert(record) => ChangeEvent::Insert(decode_record(record)?),
            Self::Update {
                entity,
                previous_id,
            } => ChangeEvent::Update {
                entity: decode_record(entity)?,
                previous_id,
            },
            Self::Delete { id } => ChangeEvent::Delete { id },
        })
    }
}
