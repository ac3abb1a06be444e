/// Query-time materialization: situations become concrete actions the
/// first time the player looks at their placement, and never again.
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::instantiator::{text_bindings, SceneInstantiator, SceneSpawnContext, SpawnError, SpawnMode};
use crate::core::narrative::{NarrativeContext, Narrator};
use crate::core::playability::{validate_playability, PlayabilityError};
use crate::core::rewards::RewardApplier;
use crate::core::store::TemplateStore;
use crate::core::text::render_text;
use crate::core::world::WorldStore;
use crate::schema::action::{ActionContext, ActionId, SceneAction, ScenePreview};
use crate::schema::placement::Placement;
use crate::schema::requirement::Player;
use crate::schema::scene::{SceneId, SituationError, SituationId};
use crate::schema::template::{ChoiceOutcome, ChoiceTemplate, SceneTemplate, SituationTemplate};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("scene '{0}' not found")]
    UnknownScene(SceneId),
    #[error("scene template '{template_id}' has no situation '{situation_template_id}'")]
    MissingTemplate {
        template_id: String,
        situation_template_id: String,
    },
    #[error(transparent)]
    Situation(#[from] SituationError),
    #[error(transparent)]
    Playability(#[from] PlayabilityError),
    #[error("cannot preview '{template_id}' for situation '{situation_id}': {source}")]
    ChildSpawn {
        template_id: String,
        situation_id: SituationId,
        #[source]
        source: SpawnError,
    },
}

fn surfaces(world: &WorldStore, scene_filter: impl Fn(&Placement) -> bool) -> Vec<SceneId> {
    world
        .scenes()
        .iter()
        .filter(|s| s.is_active() && !s.is_complete() && scene_filter(&s.placement))
        .map(|s| s.id.clone())
        .collect()
}

/// Active scenes visible at a location: placed on it, on an NPC standing
/// there, or on a route leaving from it.
pub fn scenes_at_location(world: &WorldStore, location_id: &str) -> Vec<SceneId> {
    surfaces(world, |placement| match placement {
        Placement::Location(id) => id == location_id,
        Placement::Npc(id) => world
            .npc(id)
            .map_or(false, |n| n.location_id.as_deref() == Some(location_id)),
        Placement::Route(id) => world
            .route(id)
            .map_or(false, |r| r.origin_location_id == location_id),
    })
}

pub fn scenes_for_npc(world: &WorldStore, npc_id: &str) -> Vec<SceneId> {
    surfaces(world, |placement| matches!(placement, Placement::Npc(id) if id == npc_id))
}

pub fn scenes_for_route(world: &WorldStore, route_id: &str) -> Vec<SceneId> {
    surfaces(world, |placement| matches!(placement, Placement::Route(id) if id == route_id))
}

/// Borrowed view over the engine parts a query needs.
pub struct Materializer<'e> {
    pub templates: &'e TemplateStore,
    pub narrator: &'e Narrator,
    pub rng: &'e mut StdRng,
    pub rewards: &'e mut dyn RewardApplier,
    pub player: &'e Player,
    pub day: u32,
}

impl Materializer<'_> {
    /// Actions of every listed scene, in order.
    pub fn actions_for(
        &mut self,
        world: &mut WorldStore,
        scene_ids: &[SceneId],
    ) -> Result<Vec<SceneAction>, QueryError> {
        let mut actions = Vec::new();
        for id in scene_ids {
            actions.extend(self.scene_actions(world, id)?);
        }
        Ok(actions)
    }

    /// Actions for a scene's current situation, materializing them first
    /// if the situation is still deferred.
    pub fn scene_actions(
        &mut self,
        world: &mut WorldStore,
        scene_id: &SceneId,
    ) -> Result<Vec<SceneAction>, QueryError> {
        let scene = world
            .scene(scene_id)
            .ok_or_else(|| QueryError::UnknownScene(scene_id.clone()))?;
        let Some(situation) = scene.current_situation() else {
            return Ok(Vec::new());
        };

        if !situation.is_deferred() {
            return Ok(situation
                .action_ids()
                .iter()
                .filter_map(|id| world.action(id).cloned())
                .collect());
        }

        let situation = situation.clone();
        let placement = scene.placement.clone();
        let templates = self.templates;
        let template = templates.get(&scene.template_id).ok_or_else(|| {
            QueryError::MissingTemplate {
                template_id: scene.template_id.clone(),
                situation_template_id: situation.template_id.clone(),
            }
        })?;
        let st = template.situation(&situation.template_id).ok_or_else(|| {
            QueryError::MissingTemplate {
                template_id: template.id.clone(),
                situation_template_id: situation.template_id.clone(),
            }
        })?;

        if let (true, Some(auto_rewards)) = (st.is_auto_advance(), &st.auto_progress_rewards) {
            let next = template.next_situation(&st.id, None, ChoiceOutcome::Success);
            let description = self.describe(world, &placement, template, st);
            let mut tx = world.transaction();
            tx.update_scene(scene_id, |s| -> Result<(), SituationError> {
                s.instantiate_situation(&situation.id, Vec::new())?;
                if let Some(current) = s.situation_mut(&situation.id) {
                    current.description = Some(description);
                }
                s.advance_to(next);
                Ok(())
            })
            .ok_or_else(|| QueryError::UnknownScene(scene_id.clone()))??;
            if next.is_some() {
                if let Some(scene) = tx.scene(scene_id) {
                    validate_playability(scene, self.templates, &tx)?;
                }
            }
            tx.commit();

            self.rewards.apply_reward(auto_rewards, &situation);
            info!(
                scene = %scene_id,
                situation = %situation.id,
                next = next.unwrap_or("<complete>"),
                "auto-advanced situation"
            );
            return Ok(Vec::new());
        }

        let description = self.describe(world, &placement, template, st);
        let mut tx = world.transaction();
        let bindings = text_bindings(&tx, &placement, self.player);
        let context = ActionContext::from(&placement);

        let mut actions = Vec::with_capacity(st.choices.len());
        for choice in &st.choices {
            let id = self.fresh_action_id(&tx, &situation.id);
            let previews = self.spawn_previews(&mut tx, choice, &placement, &situation.id)?;
            let action = SceneAction {
                id,
                name: render_text(&choice.action_text, &bindings),
                scene_id: scene_id.clone(),
                situation_id: situation.id.clone(),
                choice: choice.clone(),
                context: context.clone(),
                previews,
            };
            tx.insert_action(action.clone());
            actions.push(action);
        }

        let action_ids = actions.iter().map(|a| a.id.clone()).collect();
        tx.update_scene(scene_id, |s| -> Result<(), SituationError> {
            s.instantiate_situation(&situation.id, action_ids)?;
            if let Some(current) = s.situation_mut(&situation.id) {
                current.description = Some(description);
            }
            Ok(())
        })
        .ok_or_else(|| QueryError::UnknownScene(scene_id.clone()))??;
        tx.commit();

        debug!(
            scene = %scene_id,
            situation = %situation.id,
            actions = actions.len(),
            "situation instantiated"
        );
        Ok(actions)
    }

    /// Give already-materialized actions a fresh set of provisional
    /// previews. A situation that transitions back to itself keeps its
    /// actions, but the previews of its last resolution are gone.
    pub fn refresh_previews(
        &mut self,
        world: &mut WorldStore,
        action_ids: &[ActionId],
    ) -> Result<(), QueryError> {
        for id in action_ids {
            let Some(action) = world.action(id).cloned() else {
                continue;
            };
            let placement = world
                .scene(&action.scene_id)
                .map(|s| s.placement.clone())
                .ok_or_else(|| QueryError::UnknownScene(action.scene_id.clone()))?;
            let previews = self.spawn_previews(world, &action.choice, &placement, &action.situation_id)?;
            debug!(action = %id, previews = previews.len(), "previews refreshed");
            world.update_action(id, |a| a.previews = previews);
        }
        Ok(())
    }

    fn describe(
        &self,
        world: &WorldStore,
        placement: &Placement,
        template: &SceneTemplate,
        st: &SituationTemplate,
    ) -> String {
        self.narrator.describe(&NarrativeContext {
            scene_name: template.display_name.clone(),
            situation_name: st.name.clone(),
            narrative_template: st.narrative_template.clone(),
            bindings: text_bindings(world, placement, self.player),
        })
    }

    fn fresh_action_id(&mut self, world: &WorldStore, situation_id: &SituationId) -> ActionId {
        loop {
            let suffix: u32 = self.rng.gen();
            let id = ActionId(format!("{}_action_{:08x}", situation_id, suffix));
            if !world.contains_action(&id) {
                return id;
            }
        }
    }

    /// Create the provisional child scenes a choice would spawn.
    fn spawn_previews(
        &mut self,
        world: &mut WorldStore,
        choice: &ChoiceTemplate,
        placement: &Placement,
        situation_id: &SituationId,
    ) -> Result<Vec<ScenePreview>, QueryError> {
        let location_id = world.placement_location_id(placement).map(str::to_string);
        let mut ctx = SceneSpawnContext::new(self.player)
            .from_situation(situation_id)
            .on_day(self.day);
        ctx.current_location_id = location_id.as_deref();
        match placement {
            Placement::Npc(id) => ctx.current_npc_id = Some(id),
            Placement::Route(id) => ctx.current_route_id = Some(id),
            Placement::Location(_) => {}
        }

        let mut previews = Vec::new();
        for (outcome, spawn) in choice.spawn_rewards() {
            let child_error = |source: SpawnError| QueryError::ChildSpawn {
                template_id: spawn.scene_template_id.clone(),
                situation_id: situation_id.clone(),
                source,
            };
            let mut instantiator = SceneInstantiator {
                templates: self.templates,
                rng: &mut *self.rng,
            };
            let child_id = instantiator
                .instantiate(world, &spawn.scene_template_id, &ctx, Some(spawn), SpawnMode::Provisional)
                .map_err(child_error)?;
            let child = world
                .scene(&child_id)
                .ok_or_else(|| QueryError::UnknownScene(child_id.clone()))?;
            validate_playability(child, self.templates, world)
                .map_err(|e| child_error(SpawnError::Playability(e)))?;

            previews.push(ScenePreview {
                scene_id: child.id.clone(),
                template_id: child.template_id.clone(),
                display_name: child.display_name.clone(),
                placement_type: child.placement.placement_type(),
                situation_count: child.situations.len(),
                outcome,
            });
        }
        Ok(previews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::marker::MarkerResolutionMap;
    use crate::schema::scene::{Scene, SceneState, Situation};
    use crate::schema::template::{PresentationMode, StoryCategory};

    const WORLD: &str = r#"(
        locations: [(id: "square", name: "Square"), (id: "mill", name: "Mill")],
        npcs: [(id: "miller", name: "Miller", location_id: Some("mill"))],
        routes: [(id: "mill_lane", name: "Mill Lane", origin_location_id: "square", destination_location_id: "mill")],
    )"#;

    fn scene(id: &str, placement: Placement, state: SceneState) -> Scene {
        Scene {
            id: SceneId(id.to_string()),
            template_id: "t".to_string(),
            display_name: String::new(),
            placement,
            state,
            presentation_mode: PresentationMode::Inline,
            category: StoryCategory::SideStory,
            main_story_sequence: None,
            situations: Vec::new(),
            current_situation_id: None,
            markers: MarkerResolutionMap::new(),
            created_location_ids: Vec::new(),
            created_item_ids: Vec::new(),
            source_situation_id: None,
            expires_on_day: None,
        }
    }

    fn with_current(mut scene: Scene) -> Scene {
        let id = SituationId(format!("{}::start", scene.id));
        scene.situations.push(Situation::new(id.clone(), "start"));
        scene.current_situation_id = Some(id);
        scene
    }

    fn ids(ids: &[&str]) -> Vec<SceneId> {
        ids.iter().map(|s| SceneId(s.to_string())).collect()
    }

    #[test]
    fn surfaces_follow_placement() {
        let mut world = WorldStore::parse_ron(WORLD).unwrap();
        world.insert_scene(with_current(scene("at_square", Placement::Location("square".into()), SceneState::Active)));
        world.insert_scene(with_current(scene("on_miller", Placement::Npc("miller".into()), SceneState::Active)));
        world.insert_scene(with_current(scene("on_lane", Placement::Route("mill_lane".into()), SceneState::Active)));
        world.insert_scene(with_current(scene("preview", Placement::Location("square".into()), SceneState::Provisional)));
        world.insert_scene(scene("finished", Placement::Location("square".into()), SceneState::Active));

        assert_eq!(scenes_at_location(&world, "square"), ids(&["at_square", "on_lane"]));
        assert_eq!(scenes_at_location(&world, "mill"), ids(&["on_miller"]));
        assert_eq!(scenes_for_npc(&world, "miller"), ids(&["on_miller"]));
        assert_eq!(scenes_for_route(&world, "mill_lane"), ids(&["on_lane"]));
        assert!(scenes_for_route(&world, "square").is_empty());
    }
}
