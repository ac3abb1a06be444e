use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix identifying a deferred entity reference, e.g. `generated:safehouse`.
pub const MARKER_PREFIX: &str = "generated:";

/// A reference to a world entity as written in content: either a literal id
/// or a `generated:<name>` marker that is only resolved when a scene spawns.
///
/// Serialized as the plain string content authors write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityRef {
    /// A concrete, pre-existing entity id.
    Id(String),
    /// A marker name (without the `generated:` prefix).
    Marker(String),
}

impl EntityRef {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(MARKER_PREFIX) {
            Some(name) => Self::Marker(name.to_string()),
            None => Self::Id(raw.to_string()),
        }
    }

    pub fn marker(name: &str) -> Self {
        Self::Marker(name.to_string())
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Marker(_))
    }

    /// The full marker key (`generated:<name>`), if this is a marker.
    pub fn marker_key(&self) -> Option<String> {
        match self {
            Self::Marker(name) => Some(marker_key(name)),
            Self::Id(_) => None,
        }
    }

    /// The concrete id, if this reference has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Marker(_) => None,
        }
    }

    /// Substitute a marker with its concrete id. Literal ids and markers
    /// missing from the map are returned unchanged.
    pub fn resolve(&self, markers: &MarkerResolutionMap) -> EntityRef {
        match self {
            Self::Id(_) => self.clone(),
            Self::Marker(name) => match markers.get(&marker_key(name)) {
                Some(id) => Self::Id(id.to_string()),
                None => self.clone(),
            },
        }
    }
}

/// Build the full key for a marker name.
pub fn marker_key(name: &str) -> String {
    format!("{}{}", MARKER_PREFIX, name)
}

impl From<String> for EntityRef {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<EntityRef> for String {
    fn from(value: EntityRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Marker(name) => write!(f, "{}{}", MARKER_PREFIX, name),
        }
    }
}

/// Records how every `generated:` marker in a scene's subtree was resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerResolutionMap {
    entries: BTreeMap<String, String>,
}

impl MarkerResolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `marker_key -> concrete_id`. The key must carry the prefix.
    pub fn insert(&mut self, marker_key: String, concrete_id: String) {
        self.entries.insert(marker_key, concrete_id);
    }

    pub fn get(&self, marker_key: &str) -> Option<&str> {
        self.entries.get(marker_key).map(String::as_str)
    }

    pub fn contains(&self, marker_key: &str) -> bool {
        self.entries.contains_key(marker_key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_id() {
        assert_eq!(
            EntityRef::parse("common_room"),
            EntityRef::Id("common_room".to_string())
        );
    }

    #[test]
    fn parse_marker() {
        let r = EntityRef::parse("generated:safehouse");
        assert_eq!(r, EntityRef::Marker("safehouse".to_string()));
        assert_eq!(r.marker_key().as_deref(), Some("generated:safehouse"));
        assert!(r.id().is_none());
    }

    #[test]
    fn display_restores_prefix() {
        assert_eq!(EntityRef::marker("vault").to_string(), "generated:vault");
    }

    #[test]
    fn resolve_uses_map() {
        let mut map = MarkerResolutionMap::new();
        map.insert("generated:safehouse".to_string(), "loc_17".to_string());

        let resolved = EntityRef::marker("safehouse").resolve(&map);
        assert_eq!(resolved, EntityRef::Id("loc_17".to_string()));

        let missing = EntityRef::marker("cellar").resolve(&map);
        assert!(missing.is_marker());
    }

    #[test]
    fn ron_uses_plain_strings() {
        let r: EntityRef = ron::from_str("\"generated:evidence\"").unwrap();
        assert_eq!(r, EntityRef::marker("evidence"));
        assert_eq!(ron::to_string(&r).unwrap(), "\"generated:evidence\"");
    }
}
