use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::{Location, Npc, Route, Tagged};

/// The kind of world entity a scene is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementType {
    Location,
    Npc,
    Route,
}

impl fmt::Display for PlacementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Location => "Location",
            Self::Npc => "NPC",
            Self::Route => "Route",
        };
        f.write_str(label)
    }
}

/// A concrete scene placement: the entity kind together with its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    Location(String),
    Npc(String),
    Route(String),
}

impl Placement {
    pub fn placement_type(&self) -> PlacementType {
        match self {
            Self::Location(_) => PlacementType::Location,
            Self::Npc(_) => PlacementType::Npc,
            Self::Route(_) => PlacementType::Route,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Location(id) | Self::Npc(id) | Self::Route(id) => id,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.placement_type(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LocationRole {
    #[default]
    Generic,
    Hub,
    Connective,
    Rest,
    Boss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Profession {
    #[default]
    Commoner,
    Merchant,
    Guard,
    Scholar,
    Noble,
    Thief,
    Soldier,
    Innkeeper,
    TavernKeeper,
    Courtier,
    Ranger,
    Warrior,
    Scribe,
    Priest,
    Mystic,
    Laborer,
    Healer,
    Ferryman,
    Diplomat,
    Craftsman,
    Courier,
    Artisan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Personality {
    #[default]
    Neutral,
    Devoted,
    Mercantile,
    Proud,
    Cunning,
    Steadfast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Road,
    Plains,
    Forest,
    Mountains,
    Swamp,
    Water,
    Impassable,
}

/// How to choose between several matching entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionStrategy {
    /// Lowest id wins; fully deterministic regardless of seed.
    #[default]
    First,
    /// Seeded random pick among all matches.
    Random,
}

/// Spatial constraint relative to the spawn context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Proximity {
    #[default]
    Anywhere,
    /// Location: the context location itself. NPC: an NPC standing there.
    /// Route: a route departing from it.
    SameLocation,
}

/// Categorical description of the entity a scene should attach to.
///
/// Empty lists mean "any". Matching is conjunctive across categories and
/// disjunctive within one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementFilter {
    pub placement_type: PlacementType,
    /// Fail the spawn instead of generating an entity when nothing matches.
    #[serde(default)]
    pub must_pre_exist: bool,
    #[serde(default)]
    pub selection: SelectionStrategy,
    #[serde(default)]
    pub proximity: Proximity,
    #[serde(default)]
    pub location_roles: Vec<LocationRole>,
    #[serde(default)]
    pub location_tags: Vec<String>,
    #[serde(default)]
    pub professions: Vec<Profession>,
    #[serde(default)]
    pub personalities: Vec<Personality>,
    #[serde(default)]
    pub npc_tags: Vec<String>,
    #[serde(default)]
    pub terrains: Vec<Terrain>,
    #[serde(default)]
    pub min_difficulty: Option<u32>,
    #[serde(default)]
    pub max_difficulty: Option<u32>,
    /// Marker name recorded when an entity has to be generated for this filter.
    #[serde(default)]
    pub marker: Option<String>,
}

impl PlacementFilter {
    pub fn new(placement_type: PlacementType) -> Self {
        Self {
            placement_type,
            must_pre_exist: false,
            selection: SelectionStrategy::First,
            proximity: Proximity::Anywhere,
            location_roles: Vec::new(),
            location_tags: Vec::new(),
            professions: Vec::new(),
            personalities: Vec::new(),
            npc_tags: Vec::new(),
            terrains: Vec::new(),
            min_difficulty: None,
            max_difficulty: None,
            marker: None,
        }
    }

    pub fn matches_location(&self, location: &Location) -> bool {
        (self.location_roles.is_empty() || self.location_roles.contains(&location.role))
            && location.has_all_tags(&self.location_tags)
    }

    pub fn matches_npc(&self, npc: &Npc) -> bool {
        (self.professions.is_empty() || self.professions.contains(&npc.profession))
            && (self.personalities.is_empty() || self.personalities.contains(&npc.personality))
            && npc.has_all_tags(&self.npc_tags)
    }

    pub fn matches_route(&self, route: &Route) -> bool {
        (self.terrains.is_empty() || self.terrains.contains(&route.terrain))
            && self.min_difficulty.map_or(true, |min| route.difficulty >= min)
            && self.max_difficulty.map_or(true, |max| route.difficulty <= max)
    }

    /// Name used for the `generated:` marker minted when this filter
    /// has to create its entity.
    pub fn marker_name(&self) -> String {
        match &self.marker {
            Some(name) => name.clone(),
            None => match self.placement_type {
                PlacementType::Location => "placement_location".to_string(),
                PlacementType::Npc => "placement_npc".to_string(),
                PlacementType::Route => "placement_route".to_string(),
            },
        }
    }
}

impl fmt::Display for PlacementFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} filter [", self.placement_type)?;
        let mut parts: Vec<String> = Vec::new();
        if !self.location_roles.is_empty() {
            parts.push(format!("roles: {:?}", self.location_roles));
        }
        if !self.location_tags.is_empty() {
            parts.push(format!("location tags: {:?}", self.location_tags));
        }
        if !self.professions.is_empty() {
            parts.push(format!("professions: {:?}", self.professions));
        }
        if !self.personalities.is_empty() {
            parts.push(format!("personalities: {:?}", self.personalities));
        }
        if !self.npc_tags.is_empty() {
            parts.push(format!("npc tags: {:?}", self.npc_tags));
        }
        if !self.terrains.is_empty() {
            parts.push(format!("terrains: {:?}", self.terrains));
        }
        if self.min_difficulty.is_some() || self.max_difficulty.is_some() {
            parts.push(format!(
                "difficulty: {}..={}",
                self.min_difficulty.map_or("*".to_string(), |d| d.to_string()),
                self.max_difficulty.map_or("*".to_string(), |d| d.to_string())
            ));
        }
        if self.proximity == Proximity::SameLocation {
            parts.push("same location".to_string());
        }
        if self.must_pre_exist {
            parts.push("must pre-exist".to_string());
        }
        write!(f, "{}]", parts.join("; "))
    }
}
