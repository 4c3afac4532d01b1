//! Alert rules: two observations in, zero or more alerts out.
//!
//! Everything here is pure. The scheduler evaluates against the record as it
//! was before the current observation and then stores the result of [`apply`].

use profile_parser::CharacterSnapshot;
use serde::{Deserialize, Serialize};

use crate::domain::MonitorRecord;

/// Default size of a level milestone bucket.
pub const DEFAULT_LEVEL_THRESHOLD: u32 = 10;

/// A transition worth telling a subscriber about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// Level crossed at least one milestone boundary.
    LevelUp {
        nickname: String,
        new_level: u32,
        profile_url: String,
    },
    /// A death that differs from the last one seen.
    Death {
        nickname: String,
        description: String,
        profile_url: String,
    },
}

impl AlertEvent {
    pub fn nickname(&self) -> &str {
        match self {
            AlertEvent::LevelUp { nickname, .. } | AlertEvent::Death { nickname, .. } => nickname,
        }
    }

    pub fn profile_url(&self) -> &str {
        match self {
            AlertEvent::LevelUp { profile_url, .. } | AlertEvent::Death { profile_url, .. } => {
                profile_url
            }
        }
    }

    /// Short headline for the message.
    pub fn title(&self) -> String {
        match self {
            AlertEvent::LevelUp { nickname, .. } => format!("Awans: {nickname}"),
            AlertEvent::Death { nickname, .. } => format!("Zgon: {nickname}"),
        }
    }

    /// Message body.
    pub fn description(&self) -> String {
        match self {
            AlertEvent::LevelUp {
                nickname,
                new_level,
                ..
            } => format!("**{nickname}** osiągnął poziom **{new_level}**!"),
            AlertEvent::Death {
                nickname,
                description,
                ..
            } => format!("**{nickname}** zginął: {description}"),
        }
    }
}

/// Milestone bucket of `level`. A zero threshold is treated as 1.
pub fn bucket(level: u32, threshold: u32) -> u32 {
    level / threshold.max(1)
}

/// Alerts produced by moving from `record` to `snapshot`, LevelUp first.
pub fn evaluate(
    record: &MonitorRecord,
    snapshot: &CharacterSnapshot,
    threshold: u32,
) -> Vec<AlertEvent> {
    let mut events = Vec::new();

    if bucket(snapshot.level, threshold) > bucket(record.last_level, threshold) {
        events.push(AlertEvent::LevelUp {
            nickname: snapshot.nickname.clone(),
            new_level: snapshot.level,
            profile_url: snapshot.profile_url.clone(),
        });
    }

    if snapshot.has_death() && snapshot.last_death != record.last_death {
        events.push(AlertEvent::Death {
            nickname: snapshot.nickname.clone(),
            description: snapshot.last_death.clone(),
            profile_url: snapshot.profile_url.clone(),
        });
    }

    events
}

/// Record after observing `snapshot`. Lower levels are adopted as-is.
pub fn apply(record: &MonitorRecord, snapshot: &CharacterSnapshot) -> MonitorRecord {
    MonitorRecord {
        last_level: snapshot.level,
        last_death: snapshot.last_death.clone(),
        destination_channel: record.destination_channel.clone(),
    }
}
