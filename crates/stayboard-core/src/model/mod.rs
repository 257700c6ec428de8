// ── Domain model ──
//
// Canonical representations of the synchronized tables and of the
// configuration a display terminal renders. Wire rows live in
// `stayboard_api::models`; conversions live in `crate::convert`.

pub mod change;
pub mod display;
pub mod entity_id;
pub mod media;

pub mod device;
pub mod guest;
pub mod listing;
pub mod qr_code;

use serde::de::DeserializeOwned;

// ── Re-exports ──────────────────────────────────────────────────────

pub use change::{ChangeEvent, ChangeKind};
pub use display::{ConfigSnapshot, DisplaySettings, Units, Weather, WeatherSource, WeatherTarget};
pub use entity_id::{EntityId, UserId};
pub use media::{MediaItem, MediaKind, MediaOrigin, RotationInterval, UnifiedMediaState};

pub use device::Device;
pub use guest::Guest;
pub use listing::Listing;
pub use qr_code::QrCode;

// ── Entity kinds ────────────────────────────────────────────────────

/// The synchronized tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum EntityKind {
    #[strum(serialize = "listings")]
    Listing,
    #[strum(serialize = "guests")]
    Guest,
    #[strum(to_string = "qr_codes", serialize = "qr-codes")]
    QrCode,
    #[strum(serialize = "devices")]
    Device,
}

impl EntityKind {
    /// Backend table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Listing => "listings",
            Self::Guest => "guests",
            Self::QrCode => "qr_codes",
            Self::Device => "devices",
        }
    }

    /// Column holding the ownership key used for server-side filtering.
    pub fn owner_column(self) -> &'static str {
        match self {
            Self::Listing => "user_id",
            Self::Guest | Self::QrCode | Self::Device => "listing_id",
        }
    }
}

/// How an entity's owning user is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership<'a> {
    /// The row names its owner directly.
    Direct(&'a UserId),
    /// The row belongs to a listing; the listing's owner owns it.
    ViaListing(&'a EntityId),
}

/// A row type that can be kept in a live view.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Wire representation.
    type Row: DeserializeOwned + Send;

    fn id(&self) -> &EntityId;

    fn ownership(&self) -> Ownership<'_>;

    fn from_row(row: Self::Row) -> Self;
}
