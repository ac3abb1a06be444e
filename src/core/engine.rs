/// The scene engine: spawn → validate → query → execute orchestration.
///
/// All scene-graph mutation goes through `&mut SceneEngine`, and every
/// multi-step write runs inside a world transaction.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::instantiator::{SceneInstantiator, SceneSpawnContext, SpawnError, SpawnMode};
use crate::core::narrative::{NarrativeProvider, Narrator, DEFAULT_BUDGET};
use crate::core::playability::{check_playability, validate_playability, PlayabilityError, PlayabilityIssue};
use crate::core::query::{scenes_at_location, scenes_for_npc, scenes_for_route, Materializer, QueryError};
use crate::core::rewards::{RewardApplier, RewardLedger};
use crate::core::store::{StoreError, TemplateStore};
use crate::core::world::{WorldError, WorldStore};
use crate::schema::action::{ActionId, SceneAction};
use crate::schema::requirement::Player;
use crate::schema::scene::{SceneId, SceneState, SituationId};
use crate::schema::template::{ActionType, ChoiceOutcome};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unknown action '{0}'")]
    UnknownAction(ActionId),
    #[error("action '{action_id}' is stale: {reason}")]
    StaleAction { action_id: ActionId, reason: String },
    #[error("requirements for action '{action_id}' (choice '{choice_id}') are not met")]
    RequirementsNotMet { action_id: ActionId, choice_id: String },
    #[error("action '{action_id}' is {action_type:?} and cannot resolve as {outcome:?}")]
    InvalidOutcome {
        action_id: ActionId,
        action_type: ActionType,
        outcome: ChoiceOutcome,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template store error: {0}")]
    Store(#[from] StoreError),
    #[error("world error: {0}")]
    World(#[from] WorldError),
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Playability(#[from] PlayabilityError),
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("scene '{0}' not found")]
    UnknownScene(SceneId),
}

/// What happened when an action was executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSummary {
    pub scene_id: SceneId,
    pub situation_id: SituationId,
    pub choice_id: String,
    pub outcome: ChoiceOutcome,
    /// Provisional children promoted to active.
    pub promoted: Vec<SceneId>,
    /// Provisional siblings (and their subtrees) discarded.
    pub discarded: Vec<SceneId>,
    pub next_situation_id: Option<SituationId>,
    pub scene_completed: bool,
}

/// The top-level scene engine. Built via `SceneEngine::builder()`.
pub struct SceneEngine {
    templates: TemplateStore,
    world: WorldStore,
    narrator: Narrator,
    rewards: Box<dyn RewardApplier>,
    rng: StdRng,
    day: u32,
}

/// Builder for constructing a `SceneEngine`.
pub struct SceneEngineBuilder {
    seed: u64,
    day: u32,
    templates_dir: Option<PathBuf>,
    world_file: Option<PathBuf>,
    /// Directly provided templates (for testing without files).
    templates: Option<TemplateStore>,
    /// Directly provided world (for testing without files).
    world: Option<WorldStore>,
    rewards: Option<Box<dyn RewardApplier>>,
    narrative_provider: Option<Box<dyn NarrativeProvider>>,
    narrative_budget: Duration,
}

impl SceneEngine {
    pub fn builder() -> SceneEngineBuilder {
        SceneEngineBuilder {
            seed: 0,
            day: 0,
            templates_dir: None,
            world_file: None,
            templates: None,
            world: None,
            rewards: None,
            narrative_provider: None,
            narrative_budget: DEFAULT_BUDGET,
        }
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    /// Direct world access for content edits outside the scene graph
    /// (moving NPCs, adding authored entities).
    pub fn world_mut(&mut self) -> &mut WorldStore {
        &mut self.world
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Spawn an active scene directly (not as a reward preview). The
    /// engine's current day overrides the context's.
    ///
    /// Atomic: on any failure, including playability, nothing the spawn
    /// created stays in the world.
    #[instrument(skip(self, ctx), fields(context = %ctx))]
    pub fn spawn_scene(
        &mut self,
        template_id: &str,
        ctx: &SceneSpawnContext<'_>,
    ) -> Result<SceneId, EngineError> {
        let ctx = ctx.on_day(self.day);
        let mut tx = self.world.transaction();
        let mut instantiator = SceneInstantiator {
            templates: &self.templates,
            rng: &mut self.rng,
        };
        let scene_id = instantiator.instantiate(&mut tx, template_id, &ctx, None, SpawnMode::Active)?;
        let scene = tx
            .scene(&scene_id)
            .ok_or_else(|| EngineError::UnknownScene(scene_id.clone()))?;
        validate_playability(scene, &self.templates, &tx).map_err(SpawnError::Playability)?;
        tx.commit();
        info!(scene = %scene_id, "scene spawned");
        Ok(scene_id)
    }

    pub fn get_actions_at_location(
        &mut self,
        location_id: &str,
        player: &Player,
    ) -> Result<Vec<SceneAction>, EngineError> {
        let scene_ids = scenes_at_location(&self.world, location_id);
        self.materialize(&scene_ids, player)
    }

    pub fn get_actions_for_npc(
        &mut self,
        npc_id: &str,
        player: &Player,
    ) -> Result<Vec<SceneAction>, EngineError> {
        let scene_ids = scenes_for_npc(&self.world, npc_id);
        self.materialize(&scene_ids, player)
    }

    pub fn get_path_cards_for_route(
        &mut self,
        route_id: &str,
        player: &Player,
    ) -> Result<Vec<SceneAction>, EngineError> {
        let scene_ids = scenes_for_route(&self.world, route_id);
        self.materialize(&scene_ids, player)
    }

    fn materialize(
        &mut self,
        scene_ids: &[SceneId],
        player: &Player,
    ) -> Result<Vec<SceneAction>, EngineError> {
        let mut materializer = Materializer {
            templates: &self.templates,
            narrator: &self.narrator,
            rng: &mut self.rng,
            rewards: self.rewards.as_mut(),
            player,
            day: self.day,
        };
        let actions = materializer.actions_for(&mut self.world, scene_ids)?;
        debug!(scenes = scene_ids.len(), actions = actions.len(), "actions queried");
        Ok(actions)
    }

    /// Resolve an action: promote the chosen outcome's previews, discard the
    /// rest, advance the scene and apply the reward.
    ///
    /// Everything that can fail is checked inside a world transaction before
    /// the reward is handed to the applier.
    #[instrument(skip(self, player))]
    pub fn execute_action(
        &mut self,
        action_id: &ActionId,
        outcome: ChoiceOutcome,
        player: &Player,
    ) -> Result<ExecutionSummary, EngineError> {
        let action = self
            .world
            .action(action_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownAction(action_id.clone()))?;
        let stale = |reason: &str| ExecutionError::StaleAction {
            action_id: action_id.clone(),
            reason: reason.to_string(),
        };

        let scene = self
            .world
            .scene(&action.scene_id)
            .ok_or_else(|| stale("scene no longer exists"))?;
        if scene.state != SceneState::Active {
            return Err(stale("scene is not active").into());
        }
        if scene.current_situation_id.as_ref() != Some(&action.situation_id) {
            return Err(stale("situation is no longer current").into());
        }
        let situation = scene
            .situation(&action.situation_id)
            .cloned()
            .ok_or_else(|| stale("situation no longer exists"))?;
        let template_id = scene.template_id.clone();

        if !action.is_available(player) {
            return Err(ExecutionError::RequirementsNotMet {
                action_id: action_id.clone(),
                choice_id: action.choice.id.clone(),
            }
            .into());
        }
        if outcome == ChoiceOutcome::Failure && action.action_type() != ActionType::StartChallenge {
            return Err(ExecutionError::InvalidOutcome {
                action_id: action_id.clone(),
                action_type: action.action_type(),
                outcome,
            }
            .into());
        }

        let next = self
            .templates
            .get(&template_id)
            .and_then(|t| t.next_situation(&situation.template_id, Some(&action.choice.id), outcome));

        let mut tx = self.world.transaction();

        let promoted: Vec<SceneId> = action.previews_for(outcome).map(|p| p.scene_id.clone()).collect();
        for child in &promoted {
            tx.update_scene(child, |s| s.state = SceneState::Active)
                .ok_or_else(|| EngineError::UnknownScene(child.clone()))?;
        }

        let mut discarded = Vec::new();
        for child in tx.provisional_children(&action.situation_id) {
            discarded.extend(tx.discard_scene(&child));
        }

        let next_situation_id = tx
            .update_scene(&action.scene_id, |s| {
                s.advance_to(next);
                s.current_situation_id.clone()
            })
            .ok_or_else(|| EngineError::UnknownScene(action.scene_id.clone()))?;
        let scene_completed = next_situation_id.is_none();

        // A self-transition keeps the situation's actions, since it cannot
        // be materialized a second time; their previews were just promoted
        // or discarded, so they get new ones.
        if next_situation_id.as_ref() == Some(&action.situation_id) {
            let mut materializer = Materializer {
                templates: &self.templates,
                narrator: &self.narrator,
                rng: &mut self.rng,
                rewards: self.rewards.as_mut(),
                player,
                day: self.day,
            };
            materializer.refresh_previews(&mut tx, situation.action_ids())?;
        } else {
            for id in situation.action_ids() {
                tx.remove_action(id);
            }
        }
        if !scene_completed {
            if let Some(scene) = tx.scene(&action.scene_id) {
                validate_playability(scene, &self.templates, &tx)?;
            }
        }
        for child in &promoted {
            if let Some(scene) = tx.scene(child) {
                validate_playability(scene, &self.templates, &tx)?;
            }
        }
        tx.commit();

        if let Some(reward) = action.choice.reward_for(outcome) {
            self.rewards.apply_reward(reward, &situation);
        }

        info!(
            scene = %action.scene_id,
            choice = %action.choice.id,
            promoted = promoted.len(),
            discarded = discarded.len(),
            completed = scene_completed,
            "action executed"
        );
        Ok(ExecutionSummary {
            scene_id: action.scene_id,
            situation_id: action.situation_id,
            choice_id: action.choice.id,
            outcome,
            promoted,
            discarded,
            next_situation_id,
            scene_completed,
        })
    }

    /// Non-throwing playability check of one scene.
    pub fn check_scene(&self, scene_id: &SceneId) -> Result<Vec<PlayabilityIssue>, EngineError> {
        let scene = self
            .world
            .scene(scene_id)
            .ok_or_else(|| EngineError::UnknownScene(scene_id.clone()))?;
        Ok(check_playability(scene, &self.templates, &self.world))
    }

    pub fn validate_scene(&self, scene_id: &SceneId) -> Result<(), EngineError> {
        let scene = self
            .world
            .scene(scene_id)
            .ok_or_else(|| EngineError::UnknownScene(scene_id.clone()))?;
        validate_playability(scene, &self.templates, &self.world)?;
        Ok(())
    }

    /// Issues for every active scene that has any.
    pub fn check_all_scenes(&self) -> Vec<(SceneId, Vec<PlayabilityIssue>)> {
        self.world
            .scenes()
            .iter()
            .filter(|s| s.is_active())
            .map(|s| (s.id.clone(), check_playability(s, &self.templates, &self.world)))
            .filter(|(_, issues)| !issues.is_empty())
            .collect()
    }

    /// Set the current day and drop scenes that have expired by it.
    pub fn expire_scenes(&mut self, day: u32) -> Vec<SceneId> {
        self.day = day;
        self.world.expire_scenes(day)
    }
}

impl SceneEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn day(mut self, day: u32) -> Self {
        self.day = day;
        self
    }

    pub fn templates_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.templates_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn world_file(mut self, path: impl AsRef<Path>) -> Self {
        self.world_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Provide templates directly (for testing without files).
    pub fn with_templates(mut self, templates: TemplateStore) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Provide the world directly (for testing without files).
    pub fn with_world(mut self, world: WorldStore) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_reward_applier(mut self, rewards: impl RewardApplier + 'static) -> Self {
        self.rewards = Some(Box::new(rewards));
        self
    }

    pub fn with_narrative_provider(mut self, provider: impl NarrativeProvider + 'static) -> Self {
        self.narrative_provider = Some(Box::new(provider));
        self
    }

    pub fn narrative_budget(mut self, budget: Duration) -> Self {
        self.narrative_budget = budget;
        self
    }

    pub fn build(self) -> Result<SceneEngine, EngineError> {
        let mut templates = self.templates.unwrap_or_default();
        if let Some(dir) = &self.templates_dir {
            templates.merge(TemplateStore::load_dir(dir)?);
        }

        let world = match (self.world, &self.world_file) {
            (Some(world), _) => world,
            (None, Some(path)) => WorldStore::load_from_ron(path)?,
            (None, None) => WorldStore::new(),
        };

        info!(
            templates = templates.len(),
            seed = self.seed,
            "scene engine ready"
        );
        Ok(SceneEngine {
            templates,
            world,
            narrator: Narrator::new(self.narrative_provider, self.narrative_budget),
            rewards: self
                .rewards
                .unwrap_or_else(|| Box::new(RewardLedger::new())),
            rng: StdRng::seed_from_u64(self.seed),
            day: self.day,
        })
    }
}
