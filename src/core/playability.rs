/// Runtime playability checks for spawned scenes.
///
/// `check_playability` collects every issue; `validate_playability` turns a
/// non-empty issue list into an error carrying a scene snapshot.
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::core::store::TemplateStore;
use crate::core::world::WorldStore;
use crate::schema::marker::EntityRef;
use crate::schema::placement::Placement;
use crate::schema::scene::{Scene, SceneId, SceneSnapshot, SituationId};
use crate::schema::template::StoryCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayabilityIssue {
    MissingCurrentSituation {
        situation_id: Option<SituationId>,
    },
    MissingSituationTemplate {
        template_id: String,
        situation_template_id: String,
    },
    NoChoices {
        situation_id: SituationId,
    },
    SoftLockRisk {
        scene_id: SceneId,
        situation_id: SituationId,
        main_story_sequence: Option<u32>,
    },
    MissingRequiredLocation {
        situation_id: SituationId,
        location_id: String,
    },
    MissingRequiredNpc {
        situation_id: SituationId,
        npc_id: String,
    },
    MissingPlacement {
        placement: Placement,
    },
    UnplacedNpc {
        npc_id: String,
    },
    UnresolvedMarker {
        situation_id: SituationId,
        marker_key: String,
    },
    OrphanedGeneration {
        scene_id: SceneId,
        created: usize,
    },
}

impl PlayabilityIssue {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCurrentSituation { .. } => "PLAY_001",
            Self::MissingSituationTemplate { .. } => "PLAY_002",
            Self::NoChoices { .. } => "PLAY_003",
            Self::SoftLockRisk { .. } => "PLAY_004",
            Self::MissingRequiredLocation { .. } => "PLAY_005",
            Self::MissingRequiredNpc { .. } => "PLAY_006",
            Self::MissingPlacement { .. } => "PLAY_007",
            Self::UnresolvedMarker { .. } => "PLAY_008",
            Self::OrphanedGeneration { .. } => "PLAY_009",
            Self::UnplacedNpc { .. } => "PLAY_010",
        }
    }
}

impl fmt::Display for PlayabilityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCurrentSituation { situation_id } => match situation_id {
                Some(id) => write!(f, "current situation '{}' is not part of the scene", id),
                None => write!(f, "scene has no current situation"),
            },
            Self::MissingSituationTemplate {
                template_id,
                situation_template_id,
            } => write!(
                f,
                "situation template '{}' not found in scene template '{}'",
                situation_template_id, template_id
            ),
            Self::NoChoices { situation_id } => {
                write!(f, "situation '{}' has no choices and does not auto-advance", situation_id)
            }
            Self::SoftLockRisk {
                scene_id,
                situation_id,
                main_story_sequence,
            } => write!(
                f,
                "SOFT LOCK RISK: main story scene '{}' (A{}) situation '{}' has no guaranteed-accessible choice",
                scene_id,
                main_story_sequence.map_or("?".to_string(), |s| s.to_string()),
                situation_id
            ),
            Self::MissingRequiredLocation {
                situation_id,
                location_id,
            } => write!(
                f,
                "situation '{}' requires unknown location '{}'",
                situation_id, location_id
            ),
            Self::MissingRequiredNpc {
                situation_id,
                npc_id,
            } => write!(f, "situation '{}' requires unknown NPC '{}'", situation_id, npc_id),
            Self::MissingPlacement { placement } => {
                write!(f, "placement {} does not exist", placement)
            }
            Self::UnplacedNpc { npc_id } => write!(
                f,
                "scene is placed on NPC '{}', who is not at any location",
                npc_id
            ),
            Self::UnresolvedMarker {
                situation_id,
                marker_key,
            } => write!(
                f,
                "situation '{}' references unresolved marker '{}'",
                situation_id, marker_key
            ),
            Self::OrphanedGeneration { scene_id, created } => write!(
                f,
                "scene '{}' created {} entities but recorded no marker resolutions",
                scene_id, created
            ),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("scene is not playable: {}: {}", .snapshot, format_issues(.issues))]
pub struct PlayabilityError {
    pub snapshot: SceneSnapshot,
    pub issues: Vec<PlayabilityIssue>,
}

impl PlayabilityError {
    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code() == code)
    }
}

fn format_issues(issues: &[PlayabilityIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("[{}] {}", i.code(), i))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run every check against `scene` and return all issues found.
pub fn check_playability(
    scene: &Scene,
    templates: &TemplateStore,
    world: &WorldStore,
) -> Vec<PlayabilityIssue> {
    let mut issues = Vec::new();

    let situation = scene.current_situation();
    if situation.is_none() {
        issues.push(PlayabilityIssue::MissingCurrentSituation {
            situation_id: scene.current_situation_id.clone(),
        });
    }

    let situation_template = situation.and_then(|s| {
        let found = templates.situation(&scene.template_id, &s.template_id);
        if found.is_none() {
            issues.push(PlayabilityIssue::MissingSituationTemplate {
                template_id: scene.template_id.clone(),
                situation_template_id: s.template_id.clone(),
            });
        }
        found
    });

    if let (Some(situation), Some(st)) = (situation, situation_template) {
        if st.choices.is_empty() && !st.is_auto_advance() {
            issues.push(PlayabilityIssue::NoChoices {
                situation_id: situation.id.clone(),
            });
        }

        if scene.category == StoryCategory::MainStory
            && !st.is_auto_advance()
            && !st.choices.iter().any(|c| c.is_guaranteed_accessible())
        {
            issues.push(PlayabilityIssue::SoftLockRisk {
                scene_id: scene.id.clone(),
                situation_id: situation.id.clone(),
                main_story_sequence: scene.main_story_sequence,
            });
        }
    }

    if let Some(situation) = situation {
        if let Some(EntityRef::Id(id)) = &situation.required_location_id {
            if world.location(id).is_none() {
                issues.push(PlayabilityIssue::MissingRequiredLocation {
                    situation_id: situation.id.clone(),
                    location_id: id.clone(),
                });
            }
        }
        if let Some(EntityRef::Id(id)) = &situation.required_npc_id {
            if world.npc(id).is_none() {
                issues.push(PlayabilityIssue::MissingRequiredNpc {
                    situation_id: situation.id.clone(),
                    npc_id: id.clone(),
                });
            }
        }
    }

    if !world.has_placement(&scene.placement) {
        issues.push(PlayabilityIssue::MissingPlacement {
            placement: scene.placement.clone(),
        });
    } else if let Placement::Npc(id) = &scene.placement {
        if world.npc(id).map_or(false, |n| n.location_id.is_none()) {
            issues.push(PlayabilityIssue::UnplacedNpc { npc_id: id.clone() });
        }
    }

    if let (Some(situation), Some(st)) = (situation, situation_template) {
        for key in st.marker_keys() {
            if !scene.markers.contains(&key) {
                issues.push(PlayabilityIssue::UnresolvedMarker {
                    situation_id: situation.id.clone(),
                    marker_key: key,
                });
            }
        }
    }
    if scene.created_entity_count() > 0 && scene.markers.is_empty() {
        issues.push(PlayabilityIssue::OrphanedGeneration {
            scene_id: scene.id.clone(),
            created: scene.created_entity_count(),
        });
    }

    issues
}

/// Fail-fast form of `check_playability`.
pub fn validate_playability(
    scene: &Scene,
    templates: &TemplateStore,
    world: &WorldStore,
) -> Result<(), PlayabilityError> {
    let issues = check_playability(scene, templates, world);
    if issues.is_empty() {
        return Ok(());
    }
    let err = PlayabilityError {
        snapshot: scene.snapshot(),
        issues,
    };
    warn!(scene = %scene.id, error = %err, "scene failed playability validation");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::marker::MarkerResolutionMap;
    use crate::schema::scene::{SceneState, Situation};
    use crate::schema::template::PresentationMode;

    const TEMPLATES: &str = r#"[
        (
            id: "a1_arrival",
            category: MainStory,
            main_story_sequence: Some(1),
            situations: [
                (
                    id: "gate",
                    choices: [(id: "enter", action_text: "Enter", action_type: Instant)],
                ),
                (
                    id: "hideout",
                    required_location_id: Some("generated:safehouse"),
                    choices: [(id: "wait", action_text: "Wait", action_type: Instant)],
                ),
            ],
        ),
        (
            id: "side_tavern",
            situations: [(id: "empty")],
        ),
    ]"#;

    const WORLD: &str = r#"(
        locations: [(id: "gatehouse", name: "Gatehouse")],
        npcs: [
            (id: "warden", name: "Warden", location_id: Some("gatehouse")),
            (id: "hermit", name: "Hermit"),
        ],
    )"#;

    fn scene(template_id: &str, situation_template: &str, category: StoryCategory) -> Scene {
        let situation_id = SituationId(format!("s1::{}", situation_template));
        Scene {
            id: SceneId("s1".to_string()),
            template_id: template_id.to_string(),
            display_name: String::new(),
            placement: Placement::Location("gatehouse".to_string()),
            state: SceneState::Active,
            presentation_mode: PresentationMode::Inline,
            category,
            main_story_sequence: Some(1),
            situations: vec![Situation::new(situation_id.clone(), situation_template)],
            current_situation_id: Some(situation_id),
            markers: MarkerResolutionMap::new(),
            created_location_ids: Vec::new(),
            created_item_ids: Vec::new(),
            source_situation_id: None,
            expires_on_day: None,
        }
    }

    fn fixtures() -> (TemplateStore, WorldStore) {
        (
            TemplateStore::parse_ron(TEMPLATES).unwrap(),
            WorldStore::parse_ron(WORLD).unwrap(),
        )
    }

    #[test]
    fn healthy_scene_passes() {
        let (templates, world) = fixtures();
        let sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        assert!(validate_playability(&sc, &templates, &world).is_ok());
    }

    #[test]
    fn missing_current_situation() {
        let (templates, world) = fixtures();
        let mut sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        sc.current_situation_id = None;
        let issues = check_playability(&sc, &templates, &world);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "PLAY_001");
    }

    #[test]
    fn missing_situation_template() {
        let (templates, world) = fixtures();
        let sc = scene("a1_arrival", "vanished", StoryCategory::MainStory);
        let issues = check_playability(&sc, &templates, &world);
        assert_eq!(issues[0].code(), "PLAY_002");
    }

    #[test]
    fn situation_without_choices() {
        let (templates, world) = fixtures();
        let sc = scene("side_tavern", "empty", StoryCategory::SideStory);
        let codes: Vec<_> = check_playability(&sc, &templates, &world)
            .iter()
            .map(|i| i.code())
            .collect();
        assert_eq!(codes, vec!["PLAY_003"]);
    }

    #[test]
    fn soft_lock_risk_message() {
        let (templates, world) = fixtures();
        // Same empty situation, now on the main story.
        let sc = scene("side_tavern", "empty", StoryCategory::MainStory);
        let err = validate_playability(&sc, &templates, &world).unwrap_err();
        assert!(err.has_code("PLAY_004"));
        let text = err.to_string();
        assert!(text.contains("SOFT LOCK RISK"), "{}", text);
        assert!(text.contains("s1::empty"), "{}", text);
        assert!(text.contains("(A1)"), "{}", text);
    }

    #[test]
    fn required_entities_must_exist() {
        let (templates, world) = fixtures();
        let mut sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        sc.situations[0].required_location_id = Some(EntityRef::Id("nowhere".to_string()));
        sc.situations[0].required_npc_id = Some(EntityRef::Id("warden".to_string()));
        let codes: Vec<_> = check_playability(&sc, &templates, &world)
            .iter()
            .map(|i| i.code())
            .collect();
        assert_eq!(codes, vec!["PLAY_005"]);
    }

    #[test]
    fn placement_must_exist() {
        let (templates, world) = fixtures();
        let mut sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        sc.placement = Placement::Npc("gatehouse".to_string());
        let err = validate_playability(&sc, &templates, &world).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.has_code("PLAY_007"));
        assert_eq!(err.snapshot.template_id, "a1_arrival");
    }

    #[test]
    fn npc_placement_needs_a_location() {
        let (templates, world) = fixtures();
        let mut sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        sc.placement = Placement::Npc("warden".to_string());
        assert!(check_playability(&sc, &templates, &world).is_empty());

        sc.placement = Placement::Npc("hermit".to_string());
        let err = validate_playability(&sc, &templates, &world).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert!(err.has_code("PLAY_010"));
        assert!(err.to_string().contains("hermit"));
    }

    #[test]
    fn unresolved_marker() {
        let (templates, world) = fixtures();
        let sc = scene("a1_arrival", "hideout", StoryCategory::MainStory);
        let err = validate_playability(&sc, &templates, &world).unwrap_err();
        assert!(err.to_string().contains("generated:safehouse"));
    }

    #[test]
    fn orphaned_generation() {
        let (templates, world) = fixtures();
        let mut sc = scene("a1_arrival", "gate", StoryCategory::MainStory);
        sc.created_item_ids.push("item_key_1".to_string());
        let issues = check_playability(&sc, &templates, &world);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code(), "PLAY_009");
    }
}
