//! `stayboard watch` handler.
//!
//! Opens a live view for the requested table and reprints it on every
//! change. Child tables (guests, QR codes, devices) are owned through a
//! listing, so the listings view is always opened first to populate the
//! shared ownership directory.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use stayboard_core::{
    BackendChangeSource, ChangeSource, Device, Entity, FeedStatus, Guest, Listing,
    ListingDirectory, LiveView, QrCode, ResubscribePolicy, UserId, Viewer,
};

use crate::cli::{GlobalOpts, TableArg, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, Tone};

// ── Row types ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct ListingRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "City")]
    city: String,
    #[tabled(rename = "Owner")]
    owner: String,
}

impl From<&Listing> for ListingRow {
    fn from(l: &Listing) -> Self {
        Self {
            id: l.id.to_string(),
            name: l.name.clone(),
            city: output::or_dash(l.city.as_deref()),
            owner: l.user_id.to_string(),
        }
    }
}

#[derive(Tabled)]
struct GuestRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Listing")]
    listing: String,
    #[tabled(rename = "Check-in")]
    check_in: String,
    #[tabled(rename = "Check-out")]
    check_out: String,
}

impl From<&Guest> for GuestRow {
    fn from(g: &Guest) -> Self {
        let day = |t: Option<chrono::DateTime<Utc>>| {
            t.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
        };
        Self {
            id: g.id.to_string(),
            name: g.full_name(),
            listing: g.listing_id.to_string(),
            check_in: day(g.check_in),
            check_out: day(g.check_out),
        }
    }
}

#[derive(Tabled)]
struct QrCodeRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Listing")]
    listing: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Scans")]
    scans: u64,
}

impl From<&QrCode> for QrCodeRow {
    fn from(q: &QrCode) -> Self {
        Self {
            id: q.id.to_string(),
            label: q.label.clone(),
            listing: q.listing_id.to_string(),
            target: output::or_dash(q.target_url.as_deref()),
            scans: q.scans,
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Listing")]
    listing: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        let now = Utc::now();
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            listing: d.listing_id.to_string(),
            status: if d.is_online(now, Device::ONLINE_WINDOW) {
                "online".into()
            } else {
                "offline".into()
            },
            last_seen: d.last_seen.map_or_else(
                || "never".into(),
                |t| {
                    let ago = (now - t).to_std().unwrap_or_default();
                    let rounded = std::time::Duration::from_secs(ago.as_secs());
                    format!("{} ago", humantime::format_duration(rounded))
                },
            ),
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────────

struct WatchContext {
    source: Arc<dyn ChangeSource>,
    viewer: Arc<Viewer>,
    policy: ResubscribePolicy,
}

impl WatchContext {
    async fn open<T: Entity>(&self) -> Result<LiveView<T>, CliError> {
        Ok(LiveView::open(
            Arc::clone(&self.source),
            Arc::clone(&self.viewer),
            self.policy.clone(),
        )
        .await?)
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let backend = config::backend_config(&cfg, global)?;
    let client = config::backend_client(&backend)?;
    let source = Arc::new(BackendChangeSource::new(client, backend.realtime.clone()));

    let user = args.user.trim();
    if user.is_empty() {
        return Err(CliError::Validation {
            field: "user".into(),
            reason: "must not be empty".into(),
        });
    }
    let viewer = Viewer::new(UserId::from(user), args.role.into())
        .with_managed(args.manages.iter().map(|m| UserId::from(m.as_str())))
        .with_directory(Arc::new(ListingDirectory::new()));
    let ctx = WatchContext {
        source: source.clone(),
        viewer: Arc::new(viewer),
        policy: cfg.resubscribe_policy(),
    };

    let listings = ctx.open::<Listing>().await?;
    info!(count = listings.collection().len(), "listings loaded");

    let result = match args.table {
        TableArg::Listings => run(&listings, global, |e| ListingRow::from(e)).await,
        TableArg::Guests => {
            let view = ctx.open::<Guest>().await?;
            let result = run(&view, global, |e| GuestRow::from(e)).await;
            view.close().await;
            result
        }
        TableArg::QrCodes => {
            let view = ctx.open::<QrCode>().await?;
            let result = run(&view, global, |e| QrCodeRow::from(e)).await;
            view.close().await;
            result
        }
        TableArg::Devices => {
            let view = ctx.open::<Device>().await?;
            let result = run(&view, global, |e| DeviceRow::from(e)).await;
            view.close().await;
            result
        }
    };

    listings.close().await;
    source.shutdown();
    result
}

/// Print `view` now and after every change until Ctrl-C or the feed
/// goes stale for good.
async fn run<T, R>(
    view: &LiveView<T>,
    global: &GlobalOpts,
    to_row: impl Fn(&T) -> R,
) -> Result<(), CliError>
where
    T: Entity + Serialize,
    R: Tabled,
{
    let color = output::should_color(global.color);
    let mut entities = view.subscribe();
    let mut status = view.status();

    print_collection(entities.current(), global, &to_row)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = entities.changed() => {
                let Some(snapshot) = changed else { break };
                print_collection(&snapshot, global, &to_row)?;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if let Some(line) = describe_status(current, color) {
                    eprintln!("{line}");
                }
            }
        }
    }
    Ok(())
}

fn print_collection<T, R>(
    items: &Arc<Vec<Arc<T>>>,
    global: &GlobalOpts,
    to_row: &impl Fn(&T) -> R,
) -> Result<(), CliError>
where
    T: Entity + Serialize,
    R: Tabled,
{
    let owned: Vec<&T> = items.iter().map(AsRef::as_ref).collect();
    let out = output::render_list(
        global.output,
        &owned,
        |t| to_row(t),
        |t| t.id().to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn describe_status(status: FeedStatus, color: bool) -> Option<String> {
    let (tone, text) = match status {
        FeedStatus::Connecting => return None,
        FeedStatus::Subscribed => (Tone::Ok, "live"),
        FeedStatus::Resubscribing => (Tone::Warn, "connection lost, resubscribing"),
        FeedStatus::Stale => (Tone::Error, "live updates unavailable, showing last known data"),
        FeedStatus::Closed => (Tone::Info, "closed"),
    };
    Some(output::status_line(tone, text, color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stayboard_core::EntityId;

    #[test]
    fn device_without_heartbeat_is_offline() {
        let row = DeviceRow::from(&Device {
            id: EntityId::from("d1"),
            listing_id: EntityId::from("l1"),
            name: "Lobby TV".into(),
            token: Some("123456".into()),
            last_seen: None,
        });
        assert_eq!(row.status, "offline");
        assert_eq!(row.last_seen, "never");
    }

    #[test]
    fn stale_status_is_reported() {
        let line = describe_status(FeedStatus::Stale, false).unwrap_or_default();
        assert!(line.contains("last known data"));
        assert_eq!(describe_status(FeedStatus::Connecting, false), None);
    }
}
