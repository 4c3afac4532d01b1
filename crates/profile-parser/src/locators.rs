//! Ordered field-locator strategies.
//!
//! Every field of a snapshot has a list of strategies that are tried in order.
//! The first strategy that yields a usable value wins; when all of them fail
//! the caller falls back to the field's sentinel.

use std::sync::LazyLock;

use regex::Regex;

use crate::html::{normalize_ws, text_of};

static IDENTITY_CONTAINER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<div(?P<attrs>[^>]*class="[^"]*align-items-baseline[^"]*justify-content-center[^"]*"[^>]*)>(?P<inner>.*?)</div>"#,
    )
    .unwrap()
});
static NAME_CLASS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:h[1-6]|div|span|strong|b)(?P<attrs>[^>]*class="[^"]*(?:character|char)-name[^"]*"[^>]*)>(?P<inner>.*?)</(?:h[1-6]|div|span|strong|b)>"#,
    )
    .unwrap()
});
static SPAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<span[^>]*>(.*?)</span>").unwrap());
static FIRST_TAG_ATTRS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*<[a-z0-9]+([^>]*)>").unwrap());
static CLASS_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)class\s*=\s*"([^"]*)""#).unwrap());
static LABELED_ROW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<t[dh][^>]*>\s*(?P<label>[^<]{1,40}?)\s*:?\s*</t[dh]>\s*<td(?P<attrs>[^>]*)>(?P<value>.*?)</td>",
    )
    .unwrap()
});
static LEVEL_TEXT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:level|poziom)\s*:?\s*(\d{1,5})\b").unwrap());
static MISSING_BANNER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:character\s+does\s+not\s+exist|could\s+not\s+find\s+character|postać\s+nie\s+istnieje|nie\s+znaleziono\s+postaci)",
    )
    .unwrap()
});
static DEATH_LIST_BY_ATTR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:table|ul|ol)[^>]*(?:id|class)\s*=\s*"[^"]*death[^"]*"[^>]*>(?P<body>.*?)</(?:table|ul|ol)>"#,
    )
    .unwrap()
});
static DEATH_LIST_BY_HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)>\s*(?:character\s+deaths|deaths|ostatnie\s+zgony|zgony)\s*:?\s*<.*?<(?:table|ul|ol)[^>]*>(?P<body>.*?)</(?:table|ul|ol)>",
    )
    .unwrap()
});
static ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap());
static CELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").unwrap());
static LIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").unwrap());
static EQUIPMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(?:div|ul|table)[^>]*(?:id|class)\s*=\s*"[^"]*equipment[^"]*"[^>]*>(?P<body>.*?)</(?:div|ul|table)>"#,
    )
    .unwrap()
});
static ITEM_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<img[^>]*(?:title|alt)\s*=\s*"([^"]+)""#).unwrap());

/// Maximum number of equipment entries kept for display.
const MAX_EQUIPMENT_ITEMS: usize = 10;

pub(crate) const NAME_LABELS: &[&str] = &["name", "nick", "imię", "nazwa"];
pub(crate) const LEVEL_LABELS: &[&str] = &["level", "poziom", "lvl"];
pub(crate) const STATUS_LABELS: &[&str] = &["status"];
pub(crate) const HEALTH_LABELS: &[&str] = &["health", "hp", "zdrowie", "życie"];
pub(crate) const MANA_LABELS: &[&str] = &["mana", "mp"];
pub(crate) const GUILD_LABELS: &[&str] = &["guild", "guild membership", "gildia"];
pub(crate) const RESIDENCE_LABELS: &[&str] = &["residence", "rezydencja", "miasto"];
pub(crate) const LAST_LOGIN_LABELS: &[&str] = &["last login", "ostatnie logowanie"];
pub(crate) const VOCATION_LABELS: &[&str] = &["vocation", "profesja", "klasa"];

/// A parsed view of the document shared by all strategies.
pub(crate) struct Page<'a> {
    pub raw: &'a str,
    rows: Vec<LabeledRow<'a>>,
}

struct LabeledRow<'a> {
    label: String,
    attrs: &'a str,
    value: &'a str,
}

impl<'a> Page<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let rows = LABELED_ROW_REGEX
            .captures_iter(raw)
            .filter_map(|caps| {
                let label = normalize_ws(caps.name("label")?.as_str())
                    .trim_end_matches(':')
                    .trim()
                    .to_lowercase();
                Some(LabeledRow {
                    label,
                    attrs: caps.name("attrs").map_or("", |m| m.as_str()),
                    value: caps.name("value")?.as_str(),
                })
            })
            .collect();
        Self { raw, rows }
    }

    fn row(&self, labels: &[&str]) -> Option<&LabeledRow<'a>> {
        self.rows
            .iter()
            .find(|row| labels.iter().any(|label| row.label == *label))
    }

    /// Display text of the first row whose label matches, if non-empty.
    pub fn row_text(&self, labels: &[&str]) -> Option<String> {
        let text = text_of(self.row(labels)?.value);
        (!text.is_empty()).then_some(text)
    }
}

/// The located character identity element.
pub(crate) struct Identity {
    pub name: String,
    /// Raw markup carrying the identity's class attributes.
    pub markup: String,
    /// Inner HTML of the surrounding identity container, when there is one.
    pub container: Option<String>,
}

type IdentityLocator = fn(&Page<'_>) -> Option<Identity>;
type LevelLocator = fn(&Page<'_>, &Identity) -> Option<u32>;
type OnlineLocator = fn(&Page<'_>, &Identity) -> Option<bool>;
type DeathLocator = fn(&Page<'_>) -> Option<String>;

const IDENTITY_LOCATORS: &[(&str, IdentityLocator)] = &[
    ("identity-container", identity_from_container),
    ("name-class", identity_from_name_class),
    ("name-row", identity_from_row),
];

const LEVEL_LOCATORS: &[(&str, LevelLocator)] = &[
    ("adjacent-span", level_from_adjacent_span),
    ("level-row", level_from_row),
    ("level-text", level_from_text),
];

const ONLINE_LOCATORS: &[(&str, OnlineLocator)] = &[
    ("identity-class", online_from_identity_class),
    ("status-row", online_from_status_row),
];

const DEATH_LOCATORS: &[(&str, DeathLocator)] = &[
    ("death-list-attr", death_from_attr_list),
    ("death-list-heading", death_from_heading_list),
];

/// Whether the page explicitly says the character does not exist.
pub(crate) fn has_missing_banner(raw: &str) -> bool {
    MISSING_BANNER_REGEX.is_match(raw)
}

pub(crate) fn locate_identity(page: &Page<'_>) -> Option<Identity> {
    first_match(IDENTITY_LOCATORS, "identity", |locate| locate(page))
}

pub(crate) fn locate_level(page: &Page<'_>, identity: &Identity) -> Option<u32> {
    first_match(LEVEL_LOCATORS, "level", |locate| locate(page, identity))
}

pub(crate) fn locate_online(page: &Page<'_>, identity: &Identity) -> Option<bool> {
    first_match(ONLINE_LOCATORS, "online", |locate| locate(page, identity))
}

pub(crate) fn locate_last_death(page: &Page<'_>) -> Option<String> {
    first_match(DEATH_LOCATORS, "last_death", |locate| locate(page))
}

pub(crate) fn locate_equipment(page: &Page<'_>) -> Vec<String> {
    let Some(body) = EQUIPMENT_REGEX
        .captures(page.raw)
        .and_then(|caps| caps.name("body"))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };

    let mut items: Vec<String> = ITEM_TITLE_REGEX
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| text_of(m.as_str()))
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        items = LIST_ITEM_REGEX
            .captures_iter(body)
            .filter_map(|caps| caps.get(1))
            .map(|m| text_of(m.as_str()))
            .filter(|item| !item.is_empty())
            .collect();
    }

    items.truncate(MAX_EQUIPMENT_ITEMS);
    items
}

fn first_match<L: Copy, T>(
    locators: &[(&str, L)],
    field: &str,
    mut apply: impl FnMut(L) -> Option<T>,
) -> Option<T> {
    for (name, locator) in locators {
        if let Some(value) = apply(*locator) {
            tracing::trace!(field, strategy = name, "field located");
            return Some(value);
        }
    }
    tracing::trace!(field, "no strategy matched");
    None
}

fn identity_from_container(page: &Page<'_>) -> Option<Identity> {
    let caps = IDENTITY_CONTAINER_REGEX.captures(page.raw)?;
    let attrs = caps.name("attrs").map_or("", |m| m.as_str());
    let inner = caps.name("inner")?.as_str();

    let without_spans = SPAN_REGEX.replace_all(inner, " ");
    let name = text_of(&without_spans);
    if name.is_empty() {
        return None;
    }

    let first_attrs = FIRST_TAG_ATTRS_REGEX
        .captures(inner)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str());

    Some(Identity {
        name,
        markup: format!("{attrs} {first_attrs}"),
        container: Some(inner.to_string()),
    })
}

fn identity_from_name_class(page: &Page<'_>) -> Option<Identity> {
    let caps = NAME_CLASS_REGEX.captures(page.raw)?;
    let name = text_of(caps.name("inner")?.as_str());
    if name.is_empty() {
        return None;
    }
    Some(Identity {
        name,
        markup: caps.name("attrs").map_or("", |m| m.as_str()).to_string(),
        container: None,
    })
}

fn identity_from_row(page: &Page<'_>) -> Option<Identity> {
    let row = page.row(NAME_LABELS)?;
    let name = text_of(row.value);
    if name.is_empty() {
        return None;
    }
    Some(Identity {
        name,
        markup: format!("{} {}", row.attrs, row.value),
        container: None,
    })
}

fn level_from_adjacent_span(_page: &Page<'_>, identity: &Identity) -> Option<u32> {
    let container = identity.container.as_deref()?;
    let span = SPAN_REGEX.captures(container)?.get(1)?;
    parse_level(span.as_str())
}

fn level_from_row(page: &Page<'_>, _identity: &Identity) -> Option<u32> {
    parse_level(page.row(LEVEL_LABELS)?.value)
}

fn level_from_text(page: &Page<'_>, _identity: &Identity) -> Option<u32> {
    let caps = LEVEL_TEXT_REGEX.captures(page.raw)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Parse a decorated level such as `(101)`, `Lvl 42` or `250 lvl`.
pub(crate) fn parse_level(raw: &str) -> Option<u32> {
    let text = text_of(raw);
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn online_from_identity_class(_page: &Page<'_>, identity: &Identity) -> Option<bool> {
    CLASS_ATTR_REGEX
        .captures_iter(&identity.markup)
        .filter_map(|caps| caps.get(1))
        .flat_map(|m| m.as_str().split_whitespace())
        .find_map(|class| online_marker(&class.to_lowercase()))
}

fn online_marker(class: &str) -> Option<bool> {
    if class.contains("offline") || class == "text-danger" {
        Some(false)
    } else if class.contains("online") || class == "text-success" {
        Some(true)
    } else {
        None
    }
}

fn online_from_status_row(page: &Page<'_>, _identity: &Identity) -> Option<bool> {
    let status = page.row_text(STATUS_LABELS)?.to_lowercase();
    if status.contains("offline") {
        Some(false)
    } else if status.contains("online") {
        Some(true)
    } else {
        None
    }
}

fn death_from_attr_list(page: &Page<'_>) -> Option<String> {
    let body = DEATH_LIST_BY_ATTR_REGEX.captures(page.raw)?.name("body")?;
    first_death_entry(body.as_str())
}

fn death_from_heading_list(page: &Page<'_>) -> Option<String> {
    let body = DEATH_LIST_BY_HEADING_REGEX
        .captures(page.raw)?
        .name("body")?;
    first_death_entry(body.as_str())
}

/// Render the newest entry of a reverse-chronological death list as
/// `date - description`.
fn first_death_entry(body: &str) -> Option<String> {
    for row in ROW_REGEX.captures_iter(body).filter_map(|c| c.get(1)) {
        let cells: Vec<String> = CELL_REGEX
            .captures_iter(row.as_str())
            .filter_map(|c| c.get(1))
            .map(|m| text_of(m.as_str()))
            .filter(|cell| !cell.is_empty())
            .collect();
        match cells.as_slice() {
            [] => continue,
            [only] => return Some(only.clone()),
            [date, rest @ ..] => return Some(format!("{} - {}", date, rest.join(" "))),
        }
    }

    LIST_ITEM_REGEX
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| text_of(m.as_str()))
        .find(|item| !item.is_empty())
}
