/// Situation descriptions: an optional pluggable provider with a bounded
/// budget, backed by a deterministic templated fallback.
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use crate::core::text::{render_text, TextBindings};

pub const DEFAULT_DESCRIPTION: &str = "A situation unfolds before you.";

/// Default time a provider gets per description.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("narrative provider unavailable: {0}")]
    Unavailable(String),
    #[error("narrative generation exceeded its {0:?} budget")]
    Timeout(Duration),
}

/// Everything a provider may draw on to describe one situation.
#[derive(Debug, Clone, Default)]
pub struct NarrativeContext {
    pub scene_name: String,
    pub situation_name: String,
    pub narrative_template: Option<String>,
    pub bindings: TextBindings,
}

pub trait NarrativeProvider {
    fn describe_situation(
        &self,
        ctx: &NarrativeContext,
        budget: Duration,
    ) -> Result<String, NarrativeError>;
}

/// Renders the situation's own narrative template, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatedNarrative;

impl NarrativeProvider for TemplatedNarrative {
    fn describe_situation(
        &self,
        ctx: &NarrativeContext,
        _budget: Duration,
    ) -> Result<String, NarrativeError> {
        Ok(match &ctx.narrative_template {
            Some(text) => render_text(text, &ctx.bindings),
            None => DEFAULT_DESCRIPTION.to_string(),
        })
    }
}

/// Runs the configured provider and degrades to `TemplatedNarrative` on
/// error, empty output or a blown budget.
pub struct Narrator {
    provider: Option<Box<dyn NarrativeProvider>>,
    budget: Duration,
}

impl Default for Narrator {
    fn default() -> Self {
        Self {
            provider: None,
            budget: DEFAULT_BUDGET,
        }
    }
}

impl Narrator {
    pub fn new(provider: Option<Box<dyn NarrativeProvider>>, budget: Duration) -> Self {
        Self { provider, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn describe(&self, ctx: &NarrativeContext) -> String {
        if let Some(provider) = &self.provider {
            let started = Instant::now();
            match provider.describe_situation(ctx, self.budget) {
                Ok(text) if started.elapsed() > self.budget => {
                    warn!(
                        situation = %ctx.situation_name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        chars = text.len(),
                        "narrative provider over budget, using fallback"
                    );
                }
                Ok(text) if text.trim().is_empty() => {
                    warn!(situation = %ctx.situation_name, "narrative provider returned empty text");
                }
                Ok(text) => return text,
                Err(e) => {
                    warn!(situation = %ctx.situation_name, error = %e, "narrative provider failed");
                }
            }
        }
        fallback(ctx)
    }
}

fn fallback(ctx: &NarrativeContext) -> String {
    match TemplatedNarrative.describe_situation(ctx, Duration::ZERO) {
        Ok(text) => text,
        Err(_) => DEFAULT_DESCRIPTION.to_string(),
    }
}
