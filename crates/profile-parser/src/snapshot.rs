use serde::{Deserialize, Serialize};

/// Sentinel for "no recorded death". Never the empty string.
pub const NO_DEATH: &str = "NONE";

/// Sentinel for presentation fields that could not be located.
pub const MISSING: &str = "Brak";

/// Upper bound (in characters) of the rendered last-death entry.
pub const MAX_DEATH_LEN: usize = 90;

/// Point-in-time view of a character's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    /// Name as shown on the page, which may differ from the queried nickname.
    pub nickname: String,
    /// `0` when the level could not be parsed.
    pub level: u32,
    pub online: bool,
    /// Most recent death, or [`NO_DEATH`].
    pub last_death: String,
    pub profile_url: String,
    /// Display-only fields; never consulted by alert rules.
    pub details: CharacterDetails,
}

impl CharacterSnapshot {
    /// Whether the page listed at least one death.
    pub fn has_death(&self) -> bool {
        self.last_death != NO_DEATH
    }
}

/// Presentation fields shown by the query command and in alert embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterDetails {
    pub health: String,
    pub mana: String,
    pub guild: String,
    pub residence: String,
    pub last_login: String,
    pub vocation: String,
    pub equipment: Vec<String>,
}

impl Default for CharacterDetails {
    fn default() -> Self {
        Self {
            health: MISSING.to_string(),
            mana: MISSING.to_string(),
            guild: MISSING.to_string(),
            residence: MISSING.to_string(),
            last_login: MISSING.to_string(),
            vocation: MISSING.to_string(),
            equipment: Vec::new(),
        }
    }
}

/// Outcome of parsing one profile document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(CharacterSnapshot),
    /// The document carries no character identity.
    NotFound,
}

impl Extraction {
    pub fn found(self) -> Option<CharacterSnapshot> {
        match self {
            Extraction::Found(snapshot) => Some(snapshot),
            Extraction::NotFound => None,
        }
    }
}
