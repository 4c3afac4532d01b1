use tracing::debug;

use crate::html::truncate_chars;
use crate::locators::{self, Page};
use crate::snapshot::{
    CharacterDetails, CharacterSnapshot, Extraction, MAX_DEATH_LEN, MISSING, NO_DEATH,
};

/// Turns a raw profile document into a [`CharacterSnapshot`].
///
/// Only a missing identity element yields [`Extraction::NotFound`]; every
/// other field falls back to its sentinel when it cannot be located.
#[derive(Debug, Clone)]
pub struct ProfileExtractor {
    max_death_len: usize,
}

impl Default for ProfileExtractor {
    fn default() -> Self {
        Self {
            max_death_len: MAX_DEATH_LEN,
        }
    }
}

impl ProfileExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the rendered last-death entry to `max` characters (minimum 8).
    pub fn with_max_death_len(max: usize) -> Self {
        Self {
            max_death_len: max.max(8),
        }
    }

    pub fn extract(&self, document: &str, profile_url: &str) -> Extraction {
        let page = Page::parse(document);
        let Some(identity) = locators::locate_identity(&page) else {
            if locators::has_missing_banner(document) {
                debug!(url = %profile_url, "profile page reports a missing character");
            } else {
                debug!(url = %profile_url, "no identity element on profile page");
            }
            return Extraction::NotFound;
        };

        let level = locators::locate_level(&page, &identity).unwrap_or(0);
        let online = locators::locate_online(&page, &identity).unwrap_or(false);
        let last_death = locators::locate_last_death(&page)
            .map(|death| truncate_chars(&death, self.max_death_len))
            .unwrap_or_else(|| NO_DEATH.to_string());

        let text_or_missing =
            |labels: &[&str]| page.row_text(labels).unwrap_or_else(|| MISSING.to_string());

        let details = CharacterDetails {
            health: text_or_missing(locators::HEALTH_LABELS),
            mana: text_or_missing(locators::MANA_LABELS),
            guild: text_or_missing(locators::GUILD_LABELS),
            residence: text_or_missing(locators::RESIDENCE_LABELS),
            last_login: text_or_missing(locators::LAST_LOGIN_LABELS),
            vocation: text_or_missing(locators::VOCATION_LABELS),
            equipment: locators::locate_equipment(&page),
        };

        Extraction::Found(CharacterSnapshot {
            nickname: identity.name,
            level,
            online,
            last_death,
            profile_url: profile_url.to_string(),
            details,
        })
    }
}

/// Extract with the default settings.
pub fn extract(document: &str, profile_url: &str) -> Extraction {
    ProfileExtractor::default().extract(document, profile_url)
}
