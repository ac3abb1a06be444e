/// Player-facing actions materialized from choice templates.
use serde::{Deserialize, Serialize};
use std::fmt;

use super::placement::{Placement, PlacementType};
use super::requirement::Player;
use super::scene::{SceneId, SituationId};
use super::template::{ActionType, ChoiceOutcome, ChoiceTemplate};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The placement an action is offered at. The UI renders each flavor
/// differently: location actions, NPC dialogue actions, route path cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionContext {
    Location { location_id: String },
    Npc { npc_id: String },
    Route { route_id: String },
}

impl ActionContext {
    pub fn placement_type(&self) -> PlacementType {
        match self {
            Self::Location { .. } => PlacementType::Location,
            Self::Npc { .. } => PlacementType::Npc,
            Self::Route { .. } => PlacementType::Route,
        }
    }
}

impl From<&Placement> for ActionContext {
    fn from(placement: &Placement) -> Self {
        match placement {
            Placement::Location(id) => Self::Location {
                location_id: id.clone(),
            },
            Placement::Npc(id) => Self::Npc { npc_id: id.clone() },
            Placement::Route(id) => Self::Route {
                route_id: id.clone(),
            },
        }
    }
}

/// What taking an action would spawn, shown before the player commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePreview {
    pub scene_id: SceneId,
    pub template_id: String,
    pub display_name: String,
    pub placement_type: PlacementType,
    pub situation_count: usize,
    /// Which resolution of the choice spawns this scene.
    pub outcome: ChoiceOutcome,
}

/// A concrete, selectable action bound to one situation of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAction {
    pub id: ActionId,
    /// Rendered display text.
    pub name: String,
    pub scene_id: SceneId,
    pub situation_id: SituationId,
    pub choice: ChoiceTemplate,
    pub context: ActionContext,
    #[serde(default)]
    pub previews: Vec<ScenePreview>,
}

impl SceneAction {
    pub fn action_type(&self) -> ActionType {
        self.choice.action_type
    }

    /// Whether the player currently meets the choice's requirement formula.
    pub fn is_available(&self, player: &Player) -> bool {
        self.choice
            .requirement
            .as_ref()
            .map_or(true, |f| f.is_satisfied(player))
    }

    /// Provisional child scenes spawned by the given outcome.
    pub fn previews_for(&self, outcome: ChoiceOutcome) -> impl Iterator<Item = &ScenePreview> {
        self.previews.iter().filter(move |p| p.outcome == outcome)
    }
}
