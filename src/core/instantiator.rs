/// Scene instantiation: template + spawn context → a placed scene with
/// deferred situations.
use rand::rngs::StdRng;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::placement::{resolve_placement, PlacementError};
use crate::core::playability::PlayabilityError;
use crate::core::store::TemplateStore;
use crate::core::text::TextBindings;
use crate::core::world::{WorldError, WorldStore};
use crate::schema::entity::{EntityOrigin, Item, Location};
use crate::schema::marker::{marker_key, MarkerResolutionMap};
use crate::schema::placement::{Placement, PlacementType};
use crate::schema::requirement::Player;
use crate::schema::scene::{Scene, SceneId, SceneState, Situation, SituationId};
use crate::schema::template::{SceneSpawnReward, SceneTemplate};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("unknown scene template '{0}'")]
    UnknownTemplate(String),
    #[error("cannot place scene template '{template_id}': {source}")]
    Placement {
        template_id: String,
        #[source]
        source: PlacementError,
    },
    #[error("scene template '{0}' has no initial situation")]
    NoInitialSituation(String),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Playability(#[from] PlayabilityError),
}

/// What triggered a spawn: the player plus whichever entity or situation
/// they were engaged with.
#[derive(Debug, Clone, Copy)]
pub struct SceneSpawnContext<'a> {
    pub player: &'a Player,
    pub current_location_id: Option<&'a str>,
    pub current_npc_id: Option<&'a str>,
    pub current_route_id: Option<&'a str>,
    pub current_situation_id: Option<&'a SituationId>,
    pub current_day: u32,
}

impl<'a> SceneSpawnContext<'a> {
    pub fn new(player: &'a Player) -> Self {
        Self {
            player,
            current_location_id: None,
            current_npc_id: None,
            current_route_id: None,
            current_situation_id: None,
            current_day: 0,
        }
    }

    pub fn at_location(mut self, location_id: &'a str) -> Self {
        self.current_location_id = Some(location_id);
        self
    }

    pub fn with_npc(mut self, npc_id: &'a str) -> Self {
        self.current_npc_id = Some(npc_id);
        self
    }

    pub fn on_route(mut self, route_id: &'a str) -> Self {
        self.current_route_id = Some(route_id);
        self
    }

    pub fn from_situation(mut self, situation_id: &'a SituationId) -> Self {
        self.current_situation_id = Some(situation_id);
        self
    }

    pub fn on_day(mut self, day: u32) -> Self {
        self.current_day = day;
        self
    }
}

impl fmt::Display for SceneSpawnContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player '{}'", self.player.name)?;
        if let Some(id) = self.current_location_id {
            write!(f, ", location '{}'", id)?;
        }
        if let Some(id) = self.current_npc_id {
            write!(f, ", NPC '{}'", id)?;
        }
        if let Some(id) = self.current_route_id {
            write!(f, ", route '{}'", id)?;
        }
        if let Some(id) = self.current_situation_id {
            write!(f, ", situation '{}'", id)?;
        }
        write!(f, ", day {}", self.current_day)
    }
}

/// Whether a new scene is a preview or live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    Provisional,
    Active,
}

impl From<SpawnMode> for SceneState {
    fn from(mode: SpawnMode) -> Self {
        match mode {
            SpawnMode::Provisional => SceneState::Provisional,
            SpawnMode::Active => SceneState::Active,
        }
    }
}

/// Borrowed view over the engine parts a spawn needs.
pub struct SceneInstantiator<'e> {
    pub templates: &'e TemplateStore,
    pub rng: &'e mut StdRng,
}

impl SceneInstantiator<'_> {
    /// Create a scene from `template_id` and register it, along with any
    /// entities minted for it, in `world`.
    ///
    /// Does not validate playability; callers run the validator inside the
    /// same world transaction so a rejected scene leaves no trace.
    /// Descriptions are written later, when a situation is materialized.
    pub fn instantiate(
        &mut self,
        world: &mut WorldStore,
        template_id: &str,
        ctx: &SceneSpawnContext<'_>,
        reward: Option<&SceneSpawnReward>,
        mode: SpawnMode,
    ) -> Result<SceneId, SpawnError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| SpawnError::UnknownTemplate(template_id.to_string()))?;
        let initial = template
            .initial_situation_id()
            .ok_or_else(|| SpawnError::NoInitialSituation(template_id.to_string()))?;

        let scene_id = SceneId(world.next_id(&format!("scene_{}", template.id)));
        let filter = reward
            .and_then(|r| r.placement.as_ref())
            .or(template.placement_filter.as_ref());

        let resolved = resolve_placement(world, filter, ctx, &scene_id, self.rng).map_err(|source| {
            SpawnError::Placement {
                template_id: template.id.clone(),
                source,
            }
        })?;

        let mut markers = MarkerResolutionMap::new();
        let mut created_location_ids = Vec::new();
        let mut created_item_ids = Vec::new();

        if let Some(generated) = &resolved.generated {
            markers.insert(generated.marker_key.clone(), generated.id.clone());
            if generated.kind == PlacementType::Location {
                created_location_ids.push(generated.id.clone());
            }
        }

        create_dependents(
            world,
            template,
            &scene_id,
            &mut markers,
            &mut created_location_ids,
            &mut created_item_ids,
        )?;

        let situations: Vec<Situation> = template
            .situations
            .iter()
            .map(|st| {
                let mut situation =
                    Situation::new(SituationId(format!("{}::{}", scene_id, st.id)), &st.id);
                situation.required_location_id =
                    st.required_location_id.as_ref().map(|r| r.resolve(&markers));
                situation.required_npc_id =
                    st.required_npc_id.as_ref().map(|r| r.resolve(&markers));
                situation
            })
            .collect();

        let current_situation_id = situations
            .iter()
            .find(|s| s.template_id == initial)
            .map(|s| s.id.clone());

        let scene = Scene {
            id: scene_id.clone(),
            template_id: template.id.clone(),
            display_name: template.display_name.clone(),
            placement: resolved.placement,
            state: mode.into(),
            presentation_mode: template.presentation_mode,
            category: template.category,
            main_story_sequence: template.main_story_sequence,
            situations,
            current_situation_id,
            markers,
            created_location_ids,
            created_item_ids,
            source_situation_id: ctx.current_situation_id.cloned(),
            expires_on_day: template.expiration_days.map(|d| ctx.current_day + d),
        };

        info!(
            scene = %scene.id,
            template = %scene.template_id,
            placement = %scene.placement,
            state = ?scene.state,
            markers = scene.markers.len(),
            "scene instantiated"
        );
        world.insert_scene(scene);
        Ok(scene_id)
    }
}

fn create_dependents(
    world: &mut WorldStore,
    template: &SceneTemplate,
    scene_id: &SceneId,
    markers: &mut MarkerResolutionMap,
    created_location_ids: &mut Vec<String>,
    created_item_ids: &mut Vec<String>,
) -> Result<(), WorldError> {
    for spec in &template.dependent_locations {
        let id = world.next_id(&format!("loc_{}", spec.marker));
        world.insert_location(Location {
            id: id.clone(),
            name: spec.name.clone(),
            role: spec.role,
            tags: spec.tags.iter().cloned().collect(),
            origin: EntityOrigin::Generated {
                scene_id: scene_id.clone(),
            },
        })?;
        debug!(scene = %scene_id, marker = %spec.marker, id = %id, "dependent location created");
        markers.insert(marker_key(&spec.marker), id.clone());
        created_location_ids.push(id);
    }
    for spec in &template.dependent_items {
        let id = world.next_id(&format!("item_{}", spec.marker));
        world.insert_item(Item {
            id: id.clone(),
            name: spec.name.clone(),
            tags: spec.tags.iter().cloned().collect(),
            origin: EntityOrigin::Generated {
                scene_id: scene_id.clone(),
            },
        })?;
        debug!(scene = %scene_id, marker = %spec.marker, id = %id, "dependent item created");
        markers.insert(marker_key(&spec.marker), id.clone());
        created_item_ids.push(id);
    }
    Ok(())
}

/// Placeholder values for a scene placed at `placement`.
pub fn text_bindings(world: &WorldStore, placement: &Placement, player: &Player) -> TextBindings {
    let location = world
        .placement_location_id(placement)
        .and_then(|id| world.location(id))
        .map(|l| l.name.clone());
    let npc = match placement {
        Placement::Npc(id) => world.npc(id).map(|n| n.name.clone()),
        _ => None,
    };
    let route = match placement {
        Placement::Route(id) => world.route(id).map(|r| r.name.clone()),
        _ => None,
    };
    TextBindings {
        location,
        npc,
        route,
        player: (!player.name.is_empty()).then(|| player.name.clone()),
    }
}
