// ── Guest domain type ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;
use super::{Entity, EntityKind, Ownership};

/// A reservation at a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: EntityId,
    pub listing_id: EntityId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Guest {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }

    /// Whether `at` falls inside the stay. Open-ended bounds always match.
    pub fn is_staying(&self, at: DateTime<Utc>) -> bool {
        self.check_in.is_none_or(|start| start <= at) && self.check_out.is_none_or(|end| at < end)
    }
}

impl Entity for Guest {
    const KIND: EntityKind = EntityKind::Guest;
    type Row = stayboard_api::models::GuestRow;

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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn guest(check_in: Option<DateTime<Utc>>, check_out: Option<DateTime<Utc>>) -> Guest {
        Guest {
            id: EntityId::from("g1"),
            listing_id: EntityId::from("l1"),
            first_name: "Ada".into(),
            last_name: Some("Lovelace".into()),
            check_in,
            check_out,
            notes: None,
        }
    }

    #[test]
    fn staying_respects_half_open_range() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap();
        let g = guest(Some(start), Some(end));

        assert!(g.is_staying(start));
        assert!(g.is_staying(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()));
        assert!(!g.is_staying(end));
        assert!(!g.is_staying(Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()));
    }

    #[test]
    fn open_ended_stay_always_matches() {
        let g = guest(None, None);
        assert!(g.is_staying(Utc::now()));
    }

    #[test]
    fn full_name_joins_parts() {
        assert_eq!(guest(None, None).full_name(), "Ada Lovelace");
    }
}
