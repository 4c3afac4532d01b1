//! Subscription data model.

use std::collections::BTreeMap;

use profile_parser::{CharacterSnapshot, NO_DEATH};
use serde::{Deserialize, Serialize};

/// Last alerted-on state of one monitored character within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRecord {
    pub last_level: u32,
    pub last_death: String,
    /// Where alerts for this pair go. `None` means alerts are computed and dropped.
    #[serde(default)]
    pub destination_channel: Option<String>,
}

impl MonitorRecord {
    pub fn new(last_level: u32, last_death: impl Into<String>, destination: Option<String>) -> Self {
        Self {
            last_level,
            last_death: last_death.into(),
            destination_channel: destination,
        }
    }

    /// Baseline taken from a snapshot, or level `0` / no death when none is available.
    pub fn baseline(snapshot: Option<&CharacterSnapshot>, destination: Option<String>) -> Self {
        match snapshot {
            Some(snapshot) => Self::new(snapshot.level, snapshot.last_death.clone(), destination),
            None => Self::new(0, NO_DEATH, destination),
        }
    }
}

/// Scope id -> nickname -> record.
///
/// Ordered maps give every poll cycle a stable iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionSet {
    scopes: BTreeMap<String, BTreeMap<String, MonitorRecord>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: &str, nickname: &str) -> Option<&MonitorRecord> {
        self.scopes.get(scope)?.get(nickname)
    }

    /// Insert or replace a record, returning the previous one.
    pub fn insert(
        &mut self,
        scope: impl Into<String>,
        nickname: impl Into<String>,
        record: MonitorRecord,
    ) -> Option<MonitorRecord> {
        self.scopes
            .entry(scope.into())
            .or_default()
            .insert(nickname.into(), record)
    }

    /// Remove a record. Scopes left empty are dropped.
    pub fn remove(&mut self, scope: &str, nickname: &str) -> Option<MonitorRecord> {
        let records = self.scopes.get_mut(scope)?;
        let removed = records.remove(nickname);
        if records.is_empty() {
            self.scopes.remove(scope);
        }
        removed
    }

    pub fn scope(&self, scope: &str) -> impl Iterator<Item = (&str, &MonitorRecord)> {
        self.scopes
            .get(scope)
            .into_iter()
            .flat_map(|records| records.iter().map(|(nick, rec)| (nick.as_str(), rec)))
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Every (scope, nickname, record) triple in stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &MonitorRecord)> {
        self.scopes.iter().flat_map(|(scope, records)| {
            records
                .iter()
                .map(move |(nick, rec)| (scope.as_str(), nick.as_str(), rec))
        })
    }

    pub fn len(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Case policy applied to nicknames before they are used as keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NicknameCase {
    Preserve,
    #[default]
    Lowercase,
}

/// Trim, collapse inner whitespace and apply the case policy.
pub fn normalize_nickname(raw: &str, case: NicknameCase) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    match case {
        NicknameCase::Preserve => collapsed,
        NicknameCase::Lowercase => collapsed.to_lowercase(),
    }
}
