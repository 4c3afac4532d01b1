//! Command-line surface.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use profile_parser::CharacterSnapshot;

use crate::domain::MonitorRecord;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CYLERIA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll all subscriptions until interrupted
    Run,
    /// Show a character's profile
    Char {
        /// Character nickname
        #[arg(required = true, num_args = 1..)]
        nickname: Vec<String>,
    },
    /// Start monitoring a character
    Subscribe {
        scope: String,
        nickname: String,
        /// Channel id or webhook URL for alerts
        #[arg(long)]
        channel: Option<String>,
    },
    /// Stop monitoring a character
    Unsubscribe { scope: String, nickname: String },
    /// List subscriptions, of one scope or of all
    List { scope: Option<String> },
    /// Show the static watch-list
    Watchlist,
}

/// Profile card printed by the `char` command.
pub fn render_character(snapshot: &CharacterSnapshot) -> String {
    let details = &snapshot.details;
    let status = if snapshot.online { "Online" } else { "Offline" };
    let death = if snapshot.has_death() {
        snapshot.last_death.as_str()
    } else {
        "Brak"
    };
    let equipment = if details.equipment.is_empty() {
        "Brak".to_string()
    } else {
        details.equipment.join(", ")
    };

    let mut out = String::new();
    let _ = writeln!(out, "**{}** ({})", snapshot.nickname, status);
    let _ = writeln!(out, "Poziom: {}", snapshot.level);
    let _ = writeln!(out, "Profesja: {}", details.vocation);
    let _ = writeln!(out, "Zdrowie: {}", details.health);
    let _ = writeln!(out, "Mana: {}", details.mana);
    let _ = writeln!(out, "Gildia: {}", details.guild);
    let _ = writeln!(out, "Miasto: {}", details.residence);
    let _ = writeln!(out, "Ostatnie logowanie: {}", details.last_login);
    let _ = writeln!(out, "Ekwipunek: {equipment}");
    let _ = writeln!(out, "Ostatni zgon: {death}");
    let _ = write!(out, "{}", snapshot.profile_url);
    out
}

/// One line of the `list` command.
pub fn render_record(nickname: &str, record: &MonitorRecord) -> String {
    let destination = record.destination_channel.as_deref().unwrap_or("-");
    format!(
        "{nickname:<24} poziom {:<5} kanał {destination:<20} zgon: {}",
        record.last_level, record.last_death
    )
}
