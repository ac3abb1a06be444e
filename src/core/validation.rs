/// Static checks over scene templates, run before content enters the store.
///
/// Every check accumulates into a `ValidationResult`; nothing here fails
/// fast or touches the world.
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::text::TextTemplate;
use crate::schema::template::{SceneTemplate, StoryCategory, MAX_CHOICES_PER_SITUATION};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            return write!(f, "valid");
        }
        let lines: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

/// Validate one template. Never panics and has no side effects.
pub fn validate(template: &SceneTemplate) -> ValidationResult {
    let mut errors = Vec::new();
    check_structure(template, &mut errors);
    check_dependencies(template, &mut errors);
    check_text(template, &mut errors);
    check_main_story(template, &mut errors);
    ValidationResult::from_errors(errors)
}

fn check_structure(template: &SceneTemplate, errors: &mut Vec<ValidationError>) {
    if template.id.trim().is_empty() {
        errors.push(ValidationError::new("STRUCT_001", "Template id is required"));
    }

    if template.situations.is_empty() {
        errors.push(ValidationError::new(
            "STRUCT_002",
            "Template must have at least one situation",
        ));
    }

    let mut seen = FxHashSet::default();
    for situation in &template.situations {
        if situation.id.trim().is_empty() {
            errors.push(ValidationError::new("STRUCT_003", "Situation id is required"));
        } else if !seen.insert(situation.id.as_str()) {
            errors.push(ValidationError::new(
                "STRUCT_006",
                format!("Duplicate situation id '{}'", situation.id),
            ));
        }

        if situation.choices.len() > MAX_CHOICES_PER_SITUATION {
            errors.push(ValidationError::new(
                "STRUCT_004",
                format!(
                    "Situation {} has {} choices (max {})",
                    situation.id,
                    situation.choices.len(),
                    MAX_CHOICES_PER_SITUATION
                ),
            ));
        }

        if situation.auto_progress_rewards.is_some() && !situation.choices.is_empty() {
            errors.push(ValidationError::new(
                "STRUCT_005",
                format!(
                    "Situation {} has auto-progress rewards but also {} choices",
                    situation.id,
                    situation.choices.len()
                ),
            ));
        }
    }
}

fn check_dependencies(template: &SceneTemplate, errors: &mut Vec<ValidationError>) {
    let ids: FxHashSet<&str> = template.situations.iter().map(|s| s.id.as_str()).collect();

    for transition in &template.spawn_rules.transitions {
        if !ids.contains(transition.source_situation_id.as_str()) {
            errors.push(ValidationError::new(
                "DEP_001",
                format!(
                    "Transition references unknown source: {}",
                    transition.source_situation_id
                ),
            ));
        }
        if !ids.contains(transition.destination_situation_id.as_str()) {
            errors.push(ValidationError::new(
                "DEP_002",
                format!(
                    "Transition references unknown destination: {}",
                    transition.destination_situation_id
                ),
            ));
        }
    }

    if let Some(initial) = &template.spawn_rules.initial_situation_id {
        if !ids.contains(initial.as_str()) {
            errors.push(ValidationError::new(
                "DEP_003",
                format!("Initial situation '{}' not found in situation list", initial),
            ));
        }
    }
}

fn check_text(template: &SceneTemplate, errors: &mut Vec<ValidationError>) {
    for situation in &template.situations {
        let texts = situation
            .narrative_template
            .iter()
            .map(|t| ("narrative", situation.id.as_str(), t.as_str()))
            .chain(
                situation
                    .choices
                    .iter()
                    .map(|c| ("choice", c.id.as_str(), c.action_text.as_str())),
            );
        for (kind, owner, text) in texts {
            if let Err(e) = TextTemplate::parse(text) {
                errors.push(ValidationError::new(
                    "TEXT_001",
                    format!(
                        "Bad {} text for '{}' in situation '{}': {}",
                        kind, owner, situation.id, e
                    ),
                ));
            }
        }
    }
}

fn check_main_story(template: &SceneTemplate, errors: &mut Vec<ValidationError>) {
    if template.category != StoryCategory::MainStory {
        return;
    }

    let Some(sequence) = template.main_story_sequence else {
        errors.push(ValidationError::new(
            "ASTORY_001",
            format!(
                "Template '{}' has category MainStory but no main story sequence",
                template.id
            ),
        ));
        return;
    };

    if template.situations.is_empty() {
        errors.push(ValidationError::new(
            "ASTORY_002",
            format!(
                "A-story template '{}' (A{}) has no situations",
                template.id, sequence
            ),
        ));
        return;
    }

    for situation in &template.situations {
        if situation.choices.is_empty() {
            if !situation.is_auto_advance() {
                errors.push(ValidationError::new(
                    "ASTORY_003",
                    format!(
                        "A-story situation '{}' in '{}' has no choices",
                        situation.id, template.id
                    ),
                ));
            }
            continue;
        }

        if !situation.choices.iter().any(|c| c.is_guaranteed_accessible()) {
            errors.push(ValidationError::new(
                "ASTORY_004",
                format!(
                    "A-story situation '{}' in '{}' (A{}) lacks a guaranteed success path: \
                     needs a choice with no requirements, or a challenge that spawns scenes on both success and failure",
                    situation.id, template.id, sequence
                ),
            ));
        }
    }

    for situation in &template.situations {
        if !template.is_final_situation(&situation.id) || situation.choices.is_empty() {
            continue;
        }
        let spawned: FxHashSet<&str> = situation
            .choices
            .iter()
            .flat_map(|c| c.reward.scenes_to_spawn.iter())
            .map(|s| s.scene_template_id.as_str())
            .collect();
        if spawned.len() > 1 {
            errors.push(ValidationError::new(
                "ASTORY_008",
                format!(
                    "Final A-story situation '{}' in '{}' spawns different scenes across choices; \
                     every choice must spawn the same next A-scene",
                    situation.id, template.id
                ),
            ));
        }
    }
}

/// Check that the authored main-story templates form one unbroken chain
/// A1, A2, ... with no gaps or duplicates.
pub fn validate_main_story_chain<'a, I>(templates: I) -> ValidationResult
where
    I: IntoIterator<Item = &'a SceneTemplate>,
{
    let mut by_sequence: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for template in templates {
        if template.category != StoryCategory::MainStory {
            continue;
        }
        if let Some(seq) = template.main_story_sequence {
            by_sequence.entry(seq).or_default().push(template.id.as_str());
        }
    }

    let mut errors = Vec::new();
    let (Some(&min), Some(&max)) = (by_sequence.keys().next(), by_sequence.keys().next_back())
    else {
        return ValidationResult::from_errors(errors);
    };

    if min != 1 {
        errors.push(ValidationError::new(
            "ACHAIN_003",
            format!("Authored A-story must start at sequence 1, but starts at A{}", min),
        ));
    }

    for expected in min..=max {
        if !by_sequence.contains_key(&expected) {
            errors.push(ValidationError::new(
                "ACHAIN_001",
                format!(
                    "Missing A-story sequence A{} (found A{}-A{})",
                    expected, min, max
                ),
            ));
        }
    }

    for (seq, ids) in &by_sequence {
        if ids.len() > 1 {
            let mut ids = ids.clone();
            ids.sort_unstable();
            errors.push(ValidationError::new(
                "ACHAIN_002",
                format!("Duplicate A-story sequence A{} in templates: {}", seq, ids.join(", ")),
            ));
        }
    }

    ValidationResult::from_errors(errors)
}
