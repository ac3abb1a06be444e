/// Runtime scene and situation instances.
use serde::{Deserialize, Serialize};
use std::fmt;

use super::action::ActionId;
use super::marker::{EntityRef, MarkerResolutionMap};
use super::placement::Placement;
use super::template::{PresentationMode, StoryCategory};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SituationId(pub String);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SituationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneState {
    /// Preview created for a choice that has not been taken yet.
    Provisional,
    Active,
    Complete,
}

/// Two-phase lifecycle of a situation's player-facing choices.
///
/// The materialized action ids live inside the `Instantiated` variant, so a
/// situation cannot claim to be instantiated without its action set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstantiationState {
    #[default]
    Deferred,
    Instantiated { action_ids: Vec<ActionId> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SituationError {
    #[error("situation '{0}' is already instantiated")]
    AlreadyInstantiated(SituationId),
    #[error("situation '{0}' does not belong to this scene")]
    NotFound(SituationId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub id: SituationId,
    /// Id of the `SituationTemplate` within the owning scene's template.
    pub template_id: String,
    #[serde(default)]
    pub instantiation: InstantiationState,
    /// Resolved against the scene's markers; an unresolved marker is kept
    /// as-is so playability validation can report it.
    #[serde(default)]
    pub required_location_id: Option<EntityRef>,
    #[serde(default)]
    pub required_npc_id: Option<EntityRef>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Situation {
    pub fn new(id: SituationId, template_id: &str) -> Self {
        Self {
            id,
            template_id: template_id.to_string(),
            instantiation: InstantiationState::Deferred,
            required_location_id: None,
            required_npc_id: None,
            description: None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.instantiation, InstantiationState::Deferred)
    }

    /// Action ids materialized for this situation (empty while deferred).
    pub fn action_ids(&self) -> &[ActionId] {
        match &self.instantiation {
            InstantiationState::Deferred => &[],
            InstantiationState::Instantiated { action_ids } => action_ids,
        }
    }

    /// Deferred → Instantiated. Consumes the situation; if it was already
    /// instantiated it is handed back unchanged in `Err`. There is no way
    /// back to `Deferred`.
    pub fn instantiate(self, action_ids: Vec<ActionId>) -> Result<Situation, Situation> {
        match self.instantiation {
            InstantiationState::Deferred => Ok(Situation {
                instantiation: InstantiationState::Instantiated { action_ids },
                ..self
            }),
            InstantiationState::Instantiated { .. } => Err(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub template_id: String,
    pub display_name: String,
    pub placement: Placement,
    pub state: SceneState,
    pub presentation_mode: PresentationMode,
    pub category: StoryCategory,
    #[serde(default)]
    pub main_story_sequence: Option<u32>,
    pub situations: Vec<Situation>,
    pub current_situation_id: Option<SituationId>,
    #[serde(default)]
    pub markers: MarkerResolutionMap,
    #[serde(default)]
    pub created_location_ids: Vec<String>,
    #[serde(default)]
    pub created_item_ids: Vec<String>,
    /// Situation whose choice previewed this scene, for provisional cleanup.
    #[serde(default)]
    pub source_situation_id: Option<SituationId>,
    #[serde(default)]
    pub expires_on_day: Option<u32>,
}

impl Scene {
    pub fn situation(&self, id: &SituationId) -> Option<&Situation> {
        self.situations.iter().find(|s| &s.id == id)
    }

    pub fn situation_mut(&mut self, id: &SituationId) -> Option<&mut Situation> {
        self.situations.iter_mut().find(|s| &s.id == id)
    }

    pub fn situation_by_template(&self, template_id: &str) -> Option<&Situation> {
        self.situations.iter().find(|s| s.template_id == template_id)
    }

    pub fn current_situation(&self) -> Option<&Situation> {
        self.current_situation_id
            .as_ref()
            .and_then(|id| self.situation(id))
    }

    pub fn is_active(&self) -> bool {
        self.state == SceneState::Active
    }

    pub fn is_complete(&self) -> bool {
        self.state == SceneState::Complete || self.current_situation().is_none()
    }

    pub fn is_expired(&self, day: u32) -> bool {
        self.expires_on_day.map_or(false, |d| day >= d)
    }

    /// Flip one of this scene's situations to `Instantiated`.
    pub fn instantiate_situation(
        &mut self,
        id: &SituationId,
        action_ids: Vec<ActionId>,
    ) -> Result<(), SituationError> {
        let index = self
            .situations
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| SituationError::NotFound(id.clone()))?;
        let situation = self.situations.remove(index);
        let (next, result) = match situation.instantiate(action_ids) {
            Ok(next) => (next, Ok(())),
            Err(unchanged) => (unchanged, Err(SituationError::AlreadyInstantiated(id.clone()))),
        };
        self.situations.insert(index, next);
        result
    }

    /// Move to the given situation template, or complete the scene when
    /// there is none.
    pub fn advance_to(&mut self, next_template_id: Option<&str>) {
        let next = next_template_id
            .and_then(|t| self.situation_by_template(t))
            .map(|s| s.id.clone());
        match next {
            Some(id) => self.current_situation_id = Some(id),
            None => {
                self.current_situation_id = None;
                self.state = SceneState::Complete;
            }
        }
    }

    /// Every entity id this scene created itself.
    pub fn created_entity_count(&self) -> usize {
        self.created_location_ids.len() + self.created_item_ids.len()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            scene_id: self.id.clone(),
            template_id: self.template_id.clone(),
            category: self.category,
            main_story_sequence: self.main_story_sequence,
            placement: self.placement.clone(),
            state: self.state,
            current_situation_id: self.current_situation_id.clone(),
            situation_count: self.situations.len(),
        }
    }
}

/// Diagnostic summary of a scene, attached to validation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub scene_id: SceneId,
    pub template_id: String,
    pub category: StoryCategory,
    pub main_story_sequence: Option<u32>,
    pub placement: Placement,
    pub state: SceneState,
    pub current_situation_id: Option<SituationId>,
    pub situation_count: usize,
}

impl fmt::Display for SceneSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scene '{}' (template '{}', category {:?}, sequence {}, placement {} '{}', state {:?}, current situation {}, {} situations)",
            self.scene_id,
            self.template_id,
            self.category,
            self.main_story_sequence
                .map_or("none".to_string(), |s| format!("A{}", s)),
            self.placement.placement_type(),
            self.placement.id(),
            self.state,
            self.current_situation_id
                .as_ref()
                .map_or("none".to_string(), |s| format!("'{}'", s)),
            self.situation_count
        )
    }
}
