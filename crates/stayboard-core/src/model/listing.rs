// ── Listing domain type ──

use serde::{Deserialize, Serialize};

use super::entity_id::{EntityId, UserId};
use super::{Entity, EntityKind, Ownership};

/// A rental property. The root of ownership for every other table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: EntityId,
    pub user_id: UserId,
    /// Admin who manages this listing on the owner's behalf.
    pub managed_by: Option<UserId>,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    /// IANA zone name, e.g. `America/Denver`.
    pub timezone: Option<String>,
}

impl Entity for Listing {
    const KIND: EntityKind = EntityKind::Listing;
    type Row = stayboard_api::models::ListingRow;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn ownership(&self) -> Ownership<'_> {
        Ownership::Direct(&self.user_id)
    }

    fn from_row(row: Self::Row) -> Self {
        Self::from(row)
    }
}
