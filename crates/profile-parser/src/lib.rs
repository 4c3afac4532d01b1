//! Character profile extraction for the Cyleria web game.
//!
//! The profile pages are loosely structured and change without notice, so
//! extraction is best-effort: a page that names a character always yields a
//! [`CharacterSnapshot`], with unparseable fields resolved to sentinels.

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod html;
mod locators;
pub mod snapshot;

pub use error::FetchError;
pub use extractor::{ProfileExtractor, extract};
pub use fetcher::{HttpProfileFetcher, ProfileFetcher, lookup, profile_url};
pub use snapshot::{CharacterDetails, CharacterSnapshot, Extraction, MISSING, NO_DEATH};
