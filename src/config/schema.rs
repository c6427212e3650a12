//! Duel configuration schema.
//!
//! Protocol windows are counted in integer units of `time_unit`, so the whole
//! protocol can be scaled at once. Restriction lengths are absolute
//! durations because they are handed to the chat platform as-is.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default acceptance window, in units.
pub const DEFAULT_ACCEPT_WINDOW: u64 = 30;

/// Default grace period bounds, in units (inclusive).
pub const DEFAULT_GRACE_MIN: u64 = 5;
/// Default upper grace period bound, in units (inclusive).
pub const DEFAULT_GRACE_MAX: u64 = 60;

/// Default shot window, in units.
pub const DEFAULT_SHOT_WINDOW: u64 = 10;

/// Top-level duel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DuelConfig {
    /// Display name used when announcing the rules.
    pub nickname: String,

    /// Length of one protocol unit.
    #[serde(with = "duration_str")]
    pub time_unit: Duration,

    /// Units the challenged participant has to accept.
    pub accept_window: u64,

    /// Bounds of the random grace period.
    pub grace: GraceRange,

    /// Units after "go" during which the first shot wins.
    pub shot_window: u64,

    /// Restriction lengths per resolution branch.
    pub penalties: Penalties,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            nickname: "quickdraw".to_string(),
            time_unit: Duration::from_secs(1),
            accept_window: DEFAULT_ACCEPT_WINDOW,
            grace: GraceRange::default(),
            shot_window: DEFAULT_SHOT_WINDOW,
            penalties: Penalties::default(),
        }
    }
}

impl DuelConfig {
    /// Converts a number of protocol units into wall time.
    #[must_use]
    pub fn units(&self, n: u64) -> Duration {
        u32::try_from(n)
            .ok()
            .and_then(|n| self.time_unit.checked_mul(n))
            .unwrap_or(Duration::MAX)
    }

    /// The acceptance window as wall time.
    #[must_use]
    pub fn accept_duration(&self) -> Duration {
        self.units(self.accept_window)
    }

    /// The shot window as wall time.
    #[must_use]
    pub fn shot_duration(&self) -> Duration {
        self.units(self.shot_window)
    }
}

/// Inclusive grace period bounds, in units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraceRange {
    /// Shortest grace period.
    pub min: u64,
    /// Longest grace period.
    pub max: u64,
}

impl Default for GraceRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_GRACE_MIN,
            max: DEFAULT_GRACE_MAX,
        }
    }
}

/// Restriction lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Penalties {
    /// Applied to a participant who fires before "go".
    #[serde(with = "duration_str")]
    pub foul: Duration,

    /// Applied to the other participant after a foul.
    #[serde(with = "duration_str")]
    pub foul_bystander: Duration,

    /// Applied to the participant who did not fire first.
    #[serde(with = "duration_str")]
    pub loser: Duration,

    /// Applied to both participants when the challenge is not accepted.
    #[serde(with = "duration_str")]
    pub no_response: Duration,

    /// Applied to both participants when nobody fires after "go".
    /// An explicit `null` ends the duel without restricting anyone.
    #[serde(with = "option_duration_str")]
    pub stalemate: Option<Duration>,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            foul: Duration::from_secs(10 * 60),
            foul_bystander: Duration::from_secs(60),
            loser: Duration::from_secs(3 * 60),
            no_response: Duration::from_secs(5 * 60),
            stalemate: Some(Duration::from_secs(5 * 60)),
        }
    }
}

/// Serde adapter for humantime strings like `"90s"` or `"5m"`.
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

mod option_duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.collect_str(&humantime::format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
