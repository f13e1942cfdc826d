//! Content generation boundary.
//!
//! The coordinator treats question generation as a black box behind
//! [`ContentGenerator`]. [`FactPoolGenerator`] is the in-process
//! implementation: it builds one question per fact and picks a distractor
//! whose distance from the correct answer shrinks as the boundary level
//! rises.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SchedulerError;
use crate::model::{BoundaryLevel, Stitch};

/// Default number of times one fact may appear in a single session.
pub const DEFAULT_MAX_REPEATS_PER_FACT: usize = 3;

/// Errors from a [`ContentGenerator`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Insufficient facts: {available} available, {requested} requested")]
    InsufficientFacts { available: usize, requested: usize },

    #[error("No distractor available for fact {fact_id}")]
    DistractorGeneration { fact_id: String },

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

impl From<GenerationError> for SchedulerError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InsufficientFacts {
                available,
                requested,
            } => SchedulerError::InsufficientFacts {
                available,
                requested,
            },
            other => SchedulerError::PreparationFailed(other.to_string()),
        }
    }
}

/// A single fact the generator can ask about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub prompt: String,
    pub answer: String,
}

impl Fact {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }
}

/// One two-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub fact_id: String,
    pub prompt: String,
    pub correct_answer: String,
    pub distractor: String,
    pub boundary_level: BoundaryLevel,
}

/// Input to a generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub stitch: Arc<Stitch>,
    pub boundary_level: BoundaryLevel,
    pub question_count: usize,
}

/// Builds questions for a stitch.
///
/// Implementations must be shareable across tasks. Generation may be slow;
/// the coordinator bounds it with a timeout and may drop the future to
/// cancel it.
pub trait ContentGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<Vec<Question>, GenerationError>>;
}

/// Generator backed by an in-memory fact pool.
#[derive(Debug, Clone)]
pub struct FactPoolGenerator {
    facts: HashMap<String, Fact>,
    max_repeats_per_fact: usize,
}

impl FactPoolGenerator {
    pub fn new(facts: impl IntoIterator<Item = Fact>) -> Self {
        Self {
            facts: facts.into_iter().map(|f| (f.id.clone(), f)).collect(),
            max_repeats_per_fact: DEFAULT_MAX_REPEATS_PER_FACT,
        }
    }

    pub fn with_max_repeats_per_fact(mut self, repeats: usize) -> Self {
        self.max_repeats_per_fact = repeats.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Build questions synchronously.
    pub fn build(&self, request: &GenerationRequest) -> Result<Vec<Question>, GenerationError> {
        let facts: Vec<&Fact> = request
            .stitch
            .fact_ids
            .iter()
            .filter_map(|id| self.facts.get(id))
            .collect();

        let capacity = facts.len() * self.max_repeats_per_fact;
        if facts.is_empty() || capacity < request.question_count {
            return Err(GenerationError::InsufficientFacts {
                available: facts.len(),
                requested: request.question_count,
            });
        }

        (0..request.question_count)
            .map(|i| {
                let fact = facts[i % facts.len()];
                let distractor = self.pick_distractor(fact, request.boundary_level)?;
                Ok(Question {
                    id: format!("{}#{}", request.stitch.id, i),
                    fact_id: fact.id.clone(),
                    prompt: fact.prompt.clone(),
                    correct_answer: fact.answer.clone(),
                    distractor,
                    boundary_level: request.boundary_level,
                })
            })
            .collect()
    }

    /// Level 1 gets the most distant wrong answer in the pool, level 5 the
    /// closest.
    fn pick_distractor(&self, fact: &Fact, level: BoundaryLevel) -> Result<String, GenerationError> {
        let mut candidates: Vec<(f64, &str)> = self
            .facts
            .values()
            .map(|f| f.answer.as_str())
            .filter(|answer| *answer != fact.answer)
            .map(|answer| (answer_distance(&fact.answer, answer), answer))
            .collect();

        if candidates.is_empty() {
            return Err(GenerationError::DistractorGeneration {
                fact_id: fact.id.clone(),
            });
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        candidates.dedup_by(|a, b| a.1 == b.1);

        let steps = (BoundaryLevel::MAX.get() - BoundaryLevel::MIN.get()) as usize;
        let rank = (level.get() - BoundaryLevel::MIN.get()) as usize;
        let index = rank * (candidates.len() - 1) / steps;
        Ok(candidates[index].1.to_string())
    }
}

impl ContentGenerator for FactPoolGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<Vec<Question>, GenerationError>> {
        Box::pin(async move { self.build(request) })
    }
}

/// Numeric distance for numeric answers, length difference otherwise.
fn answer_distance(a: &str, b: &str) -> f64 {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => (x - y).abs(),
        _ => (a.chars().count() as f64 - b.chars().count() as f64).abs(),
    }
}
