// ── QR code domain type ──

use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;
use super::{Entity, EntityKind, Ownership};

/// A scannable link shown on or near a listing's display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrCode {
    pub id: EntityId,
    pub listing_id: EntityId,
    pub label: String,
    pub target_url: Option<String>,
    pub scans: u64,
}

impl Entity for QrCode {
    const KIND: EntityKind = EntityKind::QrCode;
    type Row = stayboard_api::models::QrCodeRow;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn ownership(&self) -> Ownership<'_> {
        Ownership::ViaListing(&self.listing_id)
    }

    fn from_row(row: Self::Row) -> Self {
        Self::from(row)
    }
}
