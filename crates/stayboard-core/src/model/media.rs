// ── Media playlist types ──

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Which playlist a display is currently rotating through.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Where a media item came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaOrigin {
    /// Stock media bundled with the service.
    #[default]
    Predefined,
    /// Uploaded by the listing owner.
    Uploaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    pub origin: MediaOrigin,
}

// ── RotationInterval ────────────────────────────────────────────────

/// Seconds each image stays on screen, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RotationInterval(u16);

impl RotationInterval {
    pub const MIN: u16 = 3;
    pub const MAX: u16 = 300;
    pub const DEFAULT: Self = Self(10);

    /// Force a stored value into range. Used for data coming off the
    /// wire, which may predate the bounds.
    pub fn clamped(seconds: i64) -> Self {
        let bounded = seconds.clamp(i64::from(Self::MIN), i64::from(Self::MAX));
        Self(u16::try_from(bounded).unwrap_or(Self::MAX))
    }

    pub fn seconds(self) -> u16 {
        self.0
    }

    pub fn as_duration(self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.0))
    }
}

impl Default for RotationInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for RotationInterval {
    type Error = CoreError;

    /// Operator input: out-of-range values are rejected, not clamped.
    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        if (u32::from(Self::MIN)..=u32::from(Self::MAX)).contains(&seconds) {
            Ok(Self(u16::try_from(seconds).unwrap_or(Self::MAX)))
        } else {
            Err(CoreError::validation(format!(
                "rotation interval must be between {} and {} seconds, got {seconds}",
                Self::MIN,
                Self::MAX
            )))
        }
    }
}

impl From<RotationInterval> for u32 {
    fn from(value: RotationInterval) -> Self {
        u32::from(value.0)
    }
}

// ── UnifiedMediaState ───────────────────────────────────────────────

/// Both playlists plus the selection of which one is live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedMediaState {
    pub active_type: MediaKind,
    pub images: Vec<MediaItem>,
    pub videos: Vec<MediaItem>,
    pub rotation_interval: RotationInterval,
}

impl UnifiedMediaState {
    /// The live playlist.
    pub fn items(&self) -> &[MediaItem] {
        match self.active_type {
            MediaKind::Image => &self.images,
            MediaKind::Video => &self.videos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_clamped() {
        assert_eq!(RotationInterval::clamped(1).seconds(), 3);
        assert_eq!(RotationInterval::clamped(45).seconds(), 45);
        assert_eq!(RotationInterval::clamped(10_000).seconds(), 300);
        assert_eq!(RotationInterval::clamped(-4).seconds(), 3);
    }

    #[test]
    fn operator_values_out_of_range_are_rejected() {
        assert!(RotationInterval::try_from(2).is_err());
        assert!(RotationInterval::try_from(301).is_err());
        assert!(RotationInterval::try_from(3).is_ok());
        assert!(RotationInterval::try_from(300).is_ok());
    }

    #[test]
    fn items_follow_active_type() {
        let image = MediaItem {
            id: "i1".into(),
            url: "https://cdn.example/beach.jpg".into(),
            origin: MediaOrigin::Predefined,
        };
        let video = MediaItem {
            id: "v1".into(),
            url: "https://cdn.example/tour.mp4".into(),
            origin: MediaOrigin::Uploaded,
        };
        let mut state = UnifiedMediaState {
            images: vec![image.clone()],
            videos: vec![video.clone()],
            ..UnifiedMediaState::default()
        };
        assert_eq!(state.items(), std::slice::from_ref(&image));

        state.active_type = MediaKind::Video;
        assert_eq!(state.items(), std::slice::from_ref(&video));
    }

    #[test]
    fn media_kind_parses_case_insensitively() {
        assert_eq!("VIDEO".parse::<MediaKind>().ok(), Some(MediaKind::Video));
    }
}
