//! Model recommendation from the answers of a form.
//!
//! Every candidate starts at a coefficient of 1.0 that is multiplied by the
//! weight of every chosen option along the path. An undefined weight poisons
//! the product; such candidates end at exactly [`INELIGIBLE`].

use serde::Serialize;
use tracing::debug;

use crate::form::AnswerEvent;

/// Coefficient of a candidate ruled out by an undefined weight.
pub const INELIGIBLE: f64 = -1.0;

/// How top-k selection treats equal coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Each of the k largest values is mapped to the first candidate holding
    /// it, so equal coefficients can select the same candidate twice.
    #[default]
    FirstMatch,
    /// Candidates are sorted by coefficient, ties in catalogue order; each is
    /// selected at most once.
    Distinct,
}

impl std::str::FromStr for TiePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first_match" => Ok(TiePolicy::FirstMatch),
            "distinct" => Ok(TiePolicy::Distinct),
            _ => Err(format!("Invalid tie policy: {}", s)),
        }
    }
}

/// A candidate model with its coefficient for one scoring run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCandidate {
    /// Position in the catalogue.
    pub index: usize,
    /// Model name.
    pub name: String,
    /// Aggregate coefficient.
    pub coefficient: f64,
}

impl ModelCandidate {
    /// Whether the candidate may be recommended.
    pub fn is_eligible(&self) -> bool {
        self.coefficient > 0.0
    }
}

/// Multiplicative scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AiScorer {
    tie_policy: TiePolicy,
}

impl AiScorer {
    /// Create a scorer.
    pub fn new(tie_policy: TiePolicy) -> Self {
        Self { tie_policy }
    }

    /// The tie policy in use.
    pub fn tie_policy(&self) -> TiePolicy {
        self.tie_policy
    }

    /// Aggregate coefficients for `candidates` models.
    pub fn coefficients(candidates: usize, events: &[AnswerEvent]) -> Vec<f64> {
        let mut coefficients = vec![1.0_f64; candidates];

        for option in events.iter().flat_map(|e| &e.chosen) {
            for (index, coefficient) in coefficients.iter_mut().enumerate() {
                *coefficient *= option.weight_for(index);
            }
        }

        for coefficient in coefficients.iter_mut().filter(|c| c.is_nan()) {
            *coefficient = INELIGIBLE;
        }
        coefficients
    }

    /// Score every model of the catalogue.
    pub fn score(&self, catalogue: &[String], events: &[AnswerEvent]) -> Vec<ModelCandidate> {
        Self::coefficients(catalogue.len(), events)
            .into_iter()
            .zip(catalogue)
            .enumerate()
            .map(|(index, (coefficient, name))| ModelCandidate {
                index,
                name: name.clone(),
                coefficient,
            })
            .collect()
    }

    /// The `k` best eligible candidates, by decreasing coefficient.
    pub fn select(&self, candidates: &[ModelCandidate], k: usize) -> Vec<ModelCandidate> {
        match self.tie_policy {
            TiePolicy::FirstMatch => {
                let mut values: Vec<f64> = candidates.iter().map(|c| c.coefficient).collect();
                values.sort_by(|a, b| b.total_cmp(a));
                values
                    .into_iter()
                    .take(k)
                    .filter(|v| *v > 0.0)
                    .filter_map(|v| candidates.iter().find(|c| c.coefficient == v).cloned())
                    .collect()
            }
            TiePolicy::Distinct => {
                let mut ranked: Vec<&ModelCandidate> = candidates.iter().collect();
                ranked.sort_by(|a, b| b.coefficient.total_cmp(&a.coefficient));
                ranked
                    .into_iter()
                    .take(k)
                    .filter(|c| c.is_eligible())
                    .cloned()
                    .collect()
            }
        }
    }

    /// Names of the `k` best models for a resolved form.
    pub fn best_models(&self, catalogue: &[String], events: &[AnswerEvent], k: usize) -> Vec<String> {
        let candidates = self.score(catalogue, events);
        let selected = self.select(&candidates, k);
        debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            tie_policy = ?self.tie_policy,
            "Models scored"
        );
        selected.into_iter().map(|c| c.name).collect()
    }
}
