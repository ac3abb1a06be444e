use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::placement::{LocationRole, Personality, Profession, Terrain};
use super::scene::SceneId;

/// Where a world entity came from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntityOrigin {
    /// Hand-authored content loaded with the world.
    #[default]
    Authored,
    /// Minted by a scene spawn (placement generation or dependent resource).
    Generated { scene_id: SceneId },
}

impl EntityOrigin {
    pub fn generated_by(&self, scene_id: &SceneId) -> bool {
        matches!(self, Self::Generated { scene_id: owner } if owner == scene_id)
    }
}

/// A place the player can be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: LocationRole,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub origin: EntityOrigin,
}

/// A non-player character. NPCs live at a location, which is how scenes
/// placed on them surface in location queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub profession: Profession,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub origin: EntityOrigin,
}

/// A travel connection between two locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub origin_location_id: String,
    pub destination_location_id: String,
    #[serde(default)]
    pub terrain: Terrain,
    #[serde(default)]
    pub difficulty: u32,
    #[serde(default)]
    pub tags: FxHashSet<String>,
}

/// An item that can be granted to the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub origin: EntityOrigin,
}

/// Tag queries shared by every taggable world entity.
pub trait Tagged {
    fn tags(&self) -> &FxHashSet<String>;

    /// Returns true if this entity has the given tag.
    fn has_tag(&self, tag: &str) -> bool {
        self.tags().contains(tag)
    }

    /// Returns true if this entity has ALL of the given tags.
    fn has_all_tags<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().all(|tag| self.tags().contains(tag.as_ref()))
    }
}

impl Tagged for Location {
    fn tags(&self) -> &FxHashSet<String> {
        &self.tags
    }
}

impl Tagged for Npc {
    fn tags(&self) -> &FxHashSet<String> {
        &self.tags
    }
}

impl Tagged for Route {
    fn tags(&self) -> &FxHashSet<String> {
        &self.tags
    }
}

impl Tagged for Item {
    fn tags(&self) -> &FxHashSet<String> {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_location(tags: &[&str]) -> Location {
        Location {
            id: "common_room".to_string(),
            name: "Common Room".to_string(),
            role: LocationRole::Hub,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            origin: EntityOrigin::Authored,
        }
    }

    #[test]
    fn has_tag_positive() {
        let loc = make_location(&["indoor", "public"]);
        assert!(loc.has_tag("indoor"));
        assert!(loc.has_tag("public"));
    }

    #[test]
    fn has_tag_negative() {
        let loc = make_location(&["indoor"]);
        assert!(!loc.has_tag("outdoor"));
        assert!(!loc.has_tag(""));
    }

    #[test]
    fn has_all_tags_empty_is_true() {
        let loc = make_location(&[]);
        let none: [&str; 0] = [];
        assert!(loc.has_all_tags(&none));
    }

    #[test]
    fn has_all_tags_partial_is_false() {
        let loc = make_location(&["indoor", "public"]);
        assert!(loc.has_all_tags(&["indoor", "public"]));
        assert!(!loc.has_all_tags(&["indoor", "private"]));
    }

    #[test]
    fn origin_tracks_owner() {
        let owner = SceneId("scene_1".to_string());
        let origin = EntityOrigin::Generated {
            scene_id: owner.clone(),
        };
        assert!(origin.generated_by(&owner));
        assert!(!origin.generated_by(&SceneId("scene_2".to_string())));
        assert!(!EntityOrigin::Authored.generated_by(&owner));
    }
}
