/// Template store: validated, immutable scene templates keyed by id.
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::validation::{validate, validate_main_story_chain, ValidationResult};
use crate::schema::template::{SceneTemplate, SituationTemplate};

/// A template that failed static validation, with every reason.
#[derive(Debug, Clone)]
pub struct RejectedTemplate {
    pub template_id: String,
    pub result: ValidationResult,
}

impl fmt::Display for RejectedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.template_id, self.result)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("{} template(s) rejected: {}", .0.len(), format_rejected(.0))]
    Rejected(Vec<RejectedTemplate>),
    #[error("duplicate template id '{0}'")]
    Duplicate(String),
    #[error("in {path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<StoreError>,
    },
}

fn format_rejected(rejected: &[RejectedTemplate]) -> String {
    rejected
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: FxHashMap<String, SceneTemplate>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate every template in a RON file.
    pub fn load_from_ron(path: &Path) -> Result<TemplateStore, StoreError> {
        let templates = read_templates_ron(path)?;
        let mut store = TemplateStore::new();
        store
            .insert_validated(templates)
            .map_err(|e| in_file(path, e))?;
        debug!(path = %path.display(), count = store.len(), "loaded scene templates");
        Ok(store)
    }

    /// Parse and validate a RON list of templates.
    pub fn parse_ron(input: &str) -> Result<TemplateStore, StoreError> {
        let templates: Vec<SceneTemplate> = ron::from_str(input)?;
        let mut store = TemplateStore::new();
        store.insert_validated(templates)?;
        Ok(store)
    }

    /// Load every `.ron` file in a directory, in file-name order. Later
    /// files override earlier ones by template id.
    pub fn load_dir(dir: &Path) -> Result<TemplateStore, StoreError> {
        let mut store = TemplateStore::new();
        for path in ron_files_in(dir)? {
            store.merge(Self::load_from_ron(&path)?);
        }
        let chain = store.validate_chain();
        if !chain.is_valid {
            warn!(dir = %dir.display(), issues = %chain, "main story chain is incomplete");
        }
        Ok(store)
    }

    /// Validate a batch and insert it only if every template passes.
    ///
    /// Returns the number of templates inserted. Ids repeated within the
    /// batch are an error; ids already in the store are replaced.
    pub fn insert_validated(&mut self, templates: Vec<SceneTemplate>) -> Result<usize, StoreError> {
        let mut rejected = Vec::new();
        let mut batch: FxHashMap<String, SceneTemplate> = FxHashMap::default();

        for template in templates {
            let result = validate(&template);
            if !result.is_valid {
                rejected.push(RejectedTemplate {
                    template_id: template.id.clone(),
                    result,
                });
                continue;
            }
            if batch.contains_key(&template.id) {
                return Err(StoreError::Duplicate(template.id));
            }
            batch.insert(template.id.clone(), template);
        }

        if !rejected.is_empty() {
            return Err(StoreError::Rejected(rejected));
        }

        let count = batch.len();
        self.templates.extend(batch);
        Ok(count)
    }

    /// Merge another store into this one. Templates from `other` override
    /// templates in `self` with the same id.
    pub fn merge(&mut self, other: TemplateStore) {
        for (id, template) in other.templates {
            if self.templates.contains_key(&id) {
                debug!(template = %id, "template overridden");
            }
            self.templates.insert(id, template);
        }
    }

    pub fn get(&self, id: &str) -> Option<&SceneTemplate> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn situation(&self, template_id: &str, situation_id: &str) -> Option<&SituationTemplate> {
        self.get(template_id).and_then(|t| t.situation(situation_id))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// All template ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneTemplate> {
        self.templates.values()
    }

    pub fn validate_chain(&self) -> ValidationResult {
        validate_main_story_chain(self.templates.values())
    }
}

/// Read a RON template list without validating it.
pub fn read_templates_ron(path: &Path) -> Result<Vec<SceneTemplate>, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    ron::from_str(&contents).map_err(|e| in_file(path, StoreError::Ron(e)))
}

/// Every `.ron` file directly inside `dir`, sorted by path.
pub fn ron_files_in(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn in_file(path: &Path, err: StoreError) -> StoreError {
    match err {
        StoreError::InFile { .. } => err,
        other => StoreError::InFile {
            path: path.to_path_buf(),
            source: Box::new(other),
        },
    }
}
