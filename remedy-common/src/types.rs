//! Common types used across Remedy components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A remediable unit of infrastructure.
///
/// Identity is the fully-qualified `name`; `site` is only a grouping key
/// used by site-scoped exclusions and metric labels. Two entities with the
/// same name compare equal even if their sites differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique machine identifier.
    pub name: String,
    /// Site the machine belongs to (may be empty when unknown).
    #[serde(default)]
    pub site: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site: site.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> &str {
        &self.site
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Observed result of the most recent remediation of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Power-cycle was just issued; its effect has not been observed yet.
    Unresolved,
    /// The entity was no longer a candidate on the following cycle.
    ConfirmedRecovered,
    /// The entity was still a candidate on the following cycle.
    ConfirmedStillDown,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [
        Outcome::Unresolved,
        Outcome::ConfirmedRecovered,
        Outcome::ConfirmedStillDown,
    ];

    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::ConfirmedRecovered => "confirmed_recovered",
            Self::ConfirmedStillDown => "confirmed_still_down",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of the last remediation of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub entity: Entity,
    pub last_action: DateTime<Utc>,
    pub outcome: Outcome,
}

impl RemediationRecord {
    /// A fresh record for an entity acted upon at `at`.
    pub fn unresolved(entity: Entity, at: DateTime<Utc>) -> Self {
        Self {
            entity,
            last_action: at,
            outcome: Outcome::Unresolved,
        }
    }
}

/// The durable store's in-memory form, keyed by entity name.
pub type RecordMap = BTreeMap<String, RemediationRecord>;

/// Per-cycle set of entities eligible for remediation.
///
/// Backed by a map keyed by entity name so that set semantics follow
/// entity identity and iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet(BTreeMap<String, Entity>);

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity. Returns false if an entity with that name was
    /// already present (the first observation wins).
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.0.contains_key(&entity.name) {
            return false;
        }
        self.0.insert(entity.name.clone(), entity);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.0.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only the entities matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&Entity) -> bool) {
        self.0.retain(|_, entity| keep(entity));
    }
}

impl FromIterator<Entity> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut set = Self::new();
        for entity in iter {
            set.insert(entity);
        }
        set
    }
}

impl IntoIterator for CandidateSet {
    type Item = Entity;
    type IntoIter = std::collections::btree_map::IntoValues<String, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Entity;
    type IntoIter = std::collections::btree_map::Values<'a, String, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_entity_equality_is_by_name() {
        let a = Entity::new("mlab1-abc01.example.org", "abc01");
        let b = Entity::new("mlab1-abc01.example.org", "");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::ConfirmedStillDown).unwrap();
        assert_eq!(json, "\"confirmed_still_down\"");
        let parsed: Outcome = serde_json::from_str("\"confirmed_recovered\"").unwrap();
        assert_eq!(parsed, Outcome::ConfirmedRecovered);
    }

    #[test]
    fn test_outcome_resolution() {
        assert!(!Outcome::Unresolved.is_resolved());
        assert!(Outcome::ConfirmedRecovered.is_resolved());
        assert!(Outcome::ConfirmedStillDown.is_resolved());
    }

    #[test]
    fn test_candidate_set_first_observation_wins() {
        let mut set = CandidateSet::new();
        assert!(set.insert(Entity::new("a", "site-1")));
        assert!(!set.insert(Entity::new("a", "site-2")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().site, "site-1");
    }

    #[test]
    fn test_candidate_set_iterates_in_name_order() {
        let set: CandidateSet = ["c", "a", "b"]
            .into_iter()
            .map(|n| Entity::new(n, "s"))
            .collect();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_candidate_set_retain_and_insert() {
        let mut set: CandidateSet = ["a", "b"].into_iter().map(|n| Entity::new(n, "s1")).collect();
        set.retain(|e| e.name != "a");
        assert!(!set.contains("a"));

        assert!(!set.insert(Entity::new("b", "s2")));
        assert!(set.insert(Entity::new("c", "s2")));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("b").unwrap().site, "s1");
    }

    #[test]
    fn test_record_roundtrip_json_shape() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = RemediationRecord::unresolved(Entity::new("n1", "s1"), at);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["entity"]["name"], "n1");
        assert_eq!(value["entity"]["site"], "s1");
        assert_eq!(value["outcome"], "unresolved");
        assert_eq!(value["last_action"], "2026-03-01T12:00:00Z");
    }
}
