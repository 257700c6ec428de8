// stayboard-api: async client for the hosted backend (rows, RPC, realtime) and weather lookups

pub mod backend;
pub mod error;
pub mod models;
pub mod realtime;
pub mod transport;
pub mod weather;

pub use backend::{BackendClient, RowFilter};
pub use error::Error;
pub use realtime::{ChannelSpec, ChannelStatus, RealtimeChannel, RealtimeConfig, RealtimeMessage, RealtimeSubscription};
pub use transport::TransportConfig;
pub use weather::WeatherClient;
