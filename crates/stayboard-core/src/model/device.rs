// ── Display device domain type ──

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;
use super::{Entity, EntityKind, Ownership};

/// A display terminal registered to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: EntityId,
    pub listing_id: EntityId,
    pub name: String,
    /// Pairing code issued for this device.
    pub token: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Heartbeats arrive every minute; two missed beats mean offline.
    pub const ONLINE_WINDOW: TimeDelta = TimeDelta::minutes(2);

    pub fn is_online(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.last_seen.is_some_and(|seen| now - seen <= window)
    }
}

impl Entity for Device {
    const KIND: EntityKind = EntityKind::Device;
    type Row = stayboard_api::models::DeviceRow;

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
