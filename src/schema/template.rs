/// Immutable scene blueprints: scene, situation and choice templates.
use serde::{Deserialize, Serialize};

use super::marker::EntityRef;
use super::placement::{LocationRole, PlacementFilter};
use super::requirement::RequirementFormula;

/// Maximum number of choices a situation can present (UI slot limit).
pub const MAX_CHOICES_PER_SITUATION: usize = 4;

/// Story thread a scene belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StoryCategory {
    /// A-story progression; must never soft-lock.
    MainStory,
    #[default]
    SideStory,
    Encounter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PresentationMode {
    /// Takes over the screen when the player enters the placement.
    Modal,
    /// Listed alongside the placement's other actions.
    #[default]
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Instant,
    Navigate,
    StartChallenge,
}

/// Effects this engine passes through to reward application untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RewardEffect {
    Coins(i32),
    Resolve(i32),
    Bond { npc_id: String, delta: i32 },
    State(String),
}

/// A child scene spawned when a choice resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSpawnReward {
    pub scene_template_id: String,
    /// Overrides the child template's own placement filter.
    #[serde(default)]
    pub placement: Option<PlacementFilter>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardTemplate {
    #[serde(default)]
    pub effects: Vec<RewardEffect>,
    #[serde(default)]
    pub scenes_to_spawn: Vec<SceneSpawnReward>,
    #[serde(default)]
    pub locations_to_unlock: Vec<EntityRef>,
    #[serde(default)]
    pub item_ids: Vec<EntityRef>,
}

impl RewardTemplate {
    pub fn spawns_scene(&self) -> bool {
        !self.scenes_to_spawn.is_empty()
    }

    /// Every entity reference in the unlock and grant lists.
    pub fn entity_refs(&self) -> impl Iterator<Item = &EntityRef> {
        self.locations_to_unlock.iter().chain(self.item_ids.iter())
    }
}

/// Which resolution of a choice is being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChoiceOutcome {
    #[default]
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceTemplate {
    pub id: String,
    /// Display text; may contain `{location}`, `{npc}`, `{route}`, `{player}`.
    pub action_text: String,
    pub action_type: ActionType,
    #[serde(default)]
    pub requirement: Option<RequirementFormula>,
    #[serde(default)]
    pub reward: RewardTemplate,
    /// Only meaningful for `StartChallenge`.
    #[serde(default)]
    pub on_failure: Option<RewardTemplate>,
}

impl ChoiceTemplate {
    pub fn has_requirements(&self) -> bool {
        self.requirement.as_ref().map_or(false, |f| !f.is_empty())
    }

    pub fn reward_for(&self, outcome: ChoiceOutcome) -> Option<&RewardTemplate> {
        match outcome {
            ChoiceOutcome::Success => Some(&self.reward),
            ChoiceOutcome::Failure => self.on_failure.as_ref(),
        }
    }

    /// A choice the player can always take and that always moves the story on:
    /// an ungated Instant/Navigate choice, or an ungated challenge whose success
    /// and failure rewards both spawn a follow-up scene.
    pub fn is_guaranteed_accessible(&self) -> bool {
        if self.has_requirements() {
            return false;
        }
        match self.action_type {
            ActionType::Instant | ActionType::Navigate => true,
            ActionType::StartChallenge => {
                self.reward.spawns_scene()
                    && self.on_failure.as_ref().map_or(false, |r| r.spawns_scene())
            }
        }
    }

    /// Spawn rewards of both outcomes, tagged with the outcome they belong to.
    pub fn spawn_rewards(&self) -> impl Iterator<Item = (ChoiceOutcome, &SceneSpawnReward)> {
        let success = self
            .reward
            .scenes_to_spawn
            .iter()
            .map(|s| (ChoiceOutcome::Success, s));
        let failure = self
            .on_failure
            .iter()
            .flat_map(|r| r.scenes_to_spawn.iter())
            .map(|s| (ChoiceOutcome::Failure, s));
        success.chain(failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Fallback description; same placeholders as choice text.
    #[serde(default)]
    pub narrative_template: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceTemplate>,
    #[serde(default)]
    pub required_location_id: Option<EntityRef>,
    #[serde(default)]
    pub required_npc_id: Option<EntityRef>,
    /// Present only on situations that resolve without player input.
    #[serde(default)]
    pub auto_progress_rewards: Option<RewardTemplate>,
}

impl SituationTemplate {
    pub fn is_auto_advance(&self) -> bool {
        self.auto_progress_rewards.is_some() && self.choices.is_empty()
    }

    pub fn choice(&self, id: &str) -> Option<&ChoiceTemplate> {
        self.choices.iter().find(|c| c.id == id)
    }

    /// Every `generated:` marker key reachable from this situation: its
    /// required-entity fields plus the unlock/grant lists of every reward.
    pub fn marker_keys(&self) -> Vec<String> {
        let required = self
            .required_location_id
            .iter()
            .chain(self.required_npc_id.iter());
        let rewards = self.choices.iter().flat_map(|c| {
            c.reward
                .entity_refs()
                .chain(c.on_failure.iter().flat_map(|r| r.entity_refs()))
        });
        let auto = self.auto_progress_rewards.iter().flat_map(|r| r.entity_refs());

        let mut keys: Vec<String> = required
            .chain(rewards)
            .chain(auto)
            .filter_map(EntityRef::marker_key)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// When a transition fires, relative to the resolved choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionCondition {
    #[default]
    Always,
    OnSuccess,
    OnFailure,
}

impl TransitionCondition {
    pub fn accepts(&self, outcome: ChoiceOutcome) -> bool {
        match self {
            Self::Always => true,
            Self::OnSuccess => outcome == ChoiceOutcome::Success,
            Self::OnFailure => outcome == ChoiceOutcome::Failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationTransition {
    pub source_situation_id: String,
    pub destination_situation_id: String,
    #[serde(default)]
    pub condition: TransitionCondition,
    /// Restrict the transition to one choice of the source situation.
    #[serde(default)]
    pub specific_choice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnRules {
    #[serde(default)]
    pub initial_situation_id: Option<String>,
    #[serde(default)]
    pub transitions: Vec<SituationTransition>,
}

/// A location created fresh for every spawn of the owning template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentLocationSpec {
    /// Marker name, referenced in content as `generated:<marker>`.
    pub marker: String,
    pub name: String,
    #[serde(default)]
    pub role: LocationRole,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An item created fresh for every spawn of the owning template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentItemSpec {
    pub marker: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTemplate {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub category: StoryCategory,
    #[serde(default)]
    pub main_story_sequence: Option<u32>,
    #[serde(default)]
    pub presentation_mode: PresentationMode,
    #[serde(default)]
    pub placement_filter: Option<PlacementFilter>,
    pub situations: Vec<SituationTemplate>,
    #[serde(default)]
    pub spawn_rules: SpawnRules,
    #[serde(default)]
    pub dependent_locations: Vec<DependentLocationSpec>,
    #[serde(default)]
    pub dependent_items: Vec<DependentItemSpec>,
    #[serde(default)]
    pub expiration_days: Option<u32>,
}

impl SceneTemplate {
    pub fn situation(&self, id: &str) -> Option<&SituationTemplate> {
        self.situations.iter().find(|s| s.id == id)
    }

    /// The declared initial situation, falling back to the first one.
    pub fn initial_situation_id(&self) -> Option<&str> {
        self.spawn_rules
            .initial_situation_id
            .as_deref()
            .or_else(|| self.situations.first().map(|s| s.id.as_str()))
    }

    /// A situation with no outgoing transition ends the scene.
    pub fn is_final_situation(&self, situation_id: &str) -> bool {
        !self
            .spawn_rules
            .transitions
            .iter()
            .any(|t| t.source_situation_id == situation_id)
    }

    /// The transition taken after `choice_id` resolves in `situation_id`.
    ///
    /// Choice-specific transitions win over generic ones; within each group
    /// the first declared match is used.
    pub fn next_situation(
        &self,
        situation_id: &str,
        choice_id: Option<&str>,
        outcome: ChoiceOutcome,
    ) -> Option<&str> {
        let candidates = || {
            self.spawn_rules
                .transitions
                .iter()
                .filter(move |t| t.source_situation_id == situation_id && t.condition.accepts(outcome))
        };
        candidates()
            .find(|t| t.specific_choice_id.is_some() && t.specific_choice_id.as_deref() == choice_id)
            .or_else(|| candidates().find(|t| t.specific_choice_id.is_none()))
            .map(|t| t.destination_situation_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::requirement::{OrPath, Requirement};

    fn choice(action_type: ActionType) -> ChoiceTemplate {
        ChoiceTemplate {
            id: "c1".to_string(),
            action_text: "Do it".to_string(),
            action_type,
            requirement: None,
            reward: RewardTemplate::default(),
            on_failure: None,
        }
    }

    fn spawning_reward(template: &str) -> RewardTemplate {
        RewardTemplate {
            scenes_to_spawn: vec![SceneSpawnReward {
                scene_template_id: template.to_string(),
                placement: None,
            }],
            ..RewardTemplate::default()
        }
    }

    #[test]
    fn ungated_instant_is_guaranteed() {
        assert!(choice(ActionType::Instant).is_guaranteed_accessible());
        assert!(choice(ActionType::Navigate).is_guaranteed_accessible());
    }

    #[test]
    fn gated_choice_is_not_guaranteed() {
        let mut c = choice(ActionType::Instant);
        c.requirement = Some(RequirementFormula {
            or_paths: vec![OrPath {
                label: "Rich".to_string(),
                requirements: vec![Requirement::Coins(100)],
            }],
        });
        assert!(!c.is_guaranteed_accessible());
    }

    #[test]
    fn empty_formula_does_not_gate() {
        let mut c = choice(ActionType::Instant);
        c.requirement = Some(RequirementFormula::default());
        assert!(c.is_guaranteed_accessible());
    }

    #[test]
    fn challenge_needs_both_outcomes_to_spawn() {
        let mut c = choice(ActionType::StartChallenge);
        assert!(!c.is_guaranteed_accessible());

        c.reward = spawning_reward("a2");
        assert!(!c.is_guaranteed_accessible());

        c.on_failure = Some(spawning_reward("a2_setback"));
        assert!(c.is_guaranteed_accessible());
    }

    #[test]
    fn spawn_rewards_tag_outcomes() {
        let mut c = choice(ActionType::StartChallenge);
        c.reward = spawning_reward("win");
        c.on_failure = Some(spawning_reward("lose"));
        let tagged: Vec<_> = c
            .spawn_rewards()
            .map(|(o, s)| (o, s.scene_template_id.as_str()))
            .collect();
        assert_eq!(
            tagged,
            vec![
                (ChoiceOutcome::Success, "win"),
                (ChoiceOutcome::Failure, "lose")
            ]
        );
    }

    #[test]
    fn marker_keys_cover_requirements_and_rewards() {
        let mut c = choice(ActionType::StartChallenge);
        c.reward.locations_to_unlock = vec![EntityRef::marker("meeting_chamber")];
        c.on_failure = Some(RewardTemplate {
            item_ids: vec![EntityRef::marker("evidence"), EntityRef::Id("rope".to_string())],
            ..RewardTemplate::default()
        });
        let situation = SituationTemplate {
            id: "s1".to_string(),
            name: String::new(),
            narrative_template: None,
            choices: vec![c],
            required_location_id: Some(EntityRef::marker("safehouse")),
            required_npc_id: Some(EntityRef::Id("elena".to_string())),
            auto_progress_rewards: None,
        };
        assert_eq!(
            situation.marker_keys(),
            vec![
                "generated:evidence".to_string(),
                "generated:meeting_chamber".to_string(),
                "generated:safehouse".to_string(),
            ]
        );
    }

    #[test]
    fn transitions_prefer_specific_choice() {
        let template = SceneTemplate {
            id: "t".to_string(),
            display_name: String::new(),
            category: StoryCategory::SideStory,
            main_story_sequence: None,
            presentation_mode: PresentationMode::Inline,
            placement_filter: None,
            situations: Vec::new(),
            spawn_rules: SpawnRules {
                initial_situation_id: None,
                transitions: vec![
                    SituationTransition {
                        source_situation_id: "intro".to_string(),
                        destination_situation_id: "generic".to_string(),
                        condition: TransitionCondition::Always,
                        specific_choice_id: None,
                    },
                    SituationTransition {
                        source_situation_id: "intro".to_string(),
                        destination_situation_id: "haggle".to_string(),
                        condition: TransitionCondition::OnSuccess,
                        specific_choice_id: Some("bargain".to_string()),
                    },
                ],
            },
            dependent_locations: Vec::new(),
            dependent_items: Vec::new(),
            expiration_days: None,
        };
        assert_eq!(
            template.next_situation("intro", Some("bargain"), ChoiceOutcome::Success),
            Some("haggle")
        );
        assert_eq!(
            template.next_situation("intro", Some("bargain"), ChoiceOutcome::Failure),
            Some("generic")
        );
        assert_eq!(
            template.next_situation("intro", Some("leave"), ChoiceOutcome::Success),
            Some("generic")
        );
        assert_eq!(template.next_situation("generic", None, ChoiceOutcome::Success), None);
        assert!(template.is_final_situation("haggle"));
        assert!(!template.is_final_situation("intro"));
    }
}
