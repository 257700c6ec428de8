//! Live synchronization and unattended-display orchestration for stayboard.
//!
//! This crate sits between `stayboard-api` and its consumers (the CLI, or
//! any embedding UI):
//!
//! - **[`LiveView<T>`]** mirrors one backend table into an ordered
//!   [`ReactiveCollection<T>`]. It loads a snapshot, then applies change
//!   events from a [`ChangeSource`], filtering every entity through the
//!   [`Viewer`]'s role-based visibility rules. Lost subscriptions are
//!   re-opened; repeated failures leave the view stale but populated.
//!
//! - **[`DisplayTerminal`]** is the pairing state machine of a signage
//!   display. It persists its device token through [`LocalStorage`],
//!   fetches a [`ConfigSnapshot`] via [`ConfigDeliveryClient`], and runs
//!   heartbeat and refresh timers while displaying.
//!
//! - **[`PlaybackScheduler`]** decides which image or video a surface
//!   shows. [`SurfaceRegistry`] hands out one scheduler per surface.
//!
//! - **[`WeatherCache`]** is a bounded, single-flight TTL cache that never
//!   fails; provider errors produce a fallback value.

pub mod access;
pub mod config;
pub mod convert;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod model;
pub mod playback;
pub mod storage;
pub mod store;
pub mod stream;
pub mod terminal;
pub mod weather;

// ── Primary re-exports ──────────────────────────────────────────────
pub use access::{AccessScope, ListingDirectory, Role, Viewer};
pub use config::{
    BackendConfig, RealtimeTuning, ResubscribePolicy, RetryBackoff, TerminalConfig,
    WeatherCacheConfig,
};
pub use delivery::{ConfigDeliveryClient, DeviceBackend, DeviceConfig};
pub use error::CoreError;
pub use feed::{
    BackendChangeSource, ChangeSource, FeedMessage, FeedStatus, LiveView, Subscription, Topic,
};
pub use playback::{PlaybackScheduler, PlaybackState, PlaybackView, SurfaceRegistry};
pub use storage::{DEVICE_TOKEN_KEY, LocalStorage, MemoryStorage};
pub use store::ReactiveCollection;
pub use stream::EntityStream;
pub use terminal::{DisplayTerminal, FailureReason, PairingCode, Screen, TerminalState};
pub use weather::{WeatherCache, WeatherLookup};

pub use model::{
    ChangeEvent, ChangeKind, ConfigSnapshot, Device, DisplaySettings, Entity, EntityId,
    EntityKind, Guest, Listing, MediaItem, MediaKind, MediaOrigin, QrCode, RotationInterval,
    UnifiedMediaState, Units, UserId, Weather, WeatherSource, WeatherTarget,
};
