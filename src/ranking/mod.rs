//! Pareto ranking of trained models over two metrics.
//!
//! Both metrics are min-max normalized across the compared models, higher is
//! better on both axes. Points are flagged Pareto-optimal and scored by their
//! distance to the origin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a point's distance score is computed from its normalized metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFormula {
    /// `sqrt(a² + b) / sqrt(2)`, as historically reported.
    #[default]
    Literal,
    /// `sqrt(a² + b²) / sqrt(2)`.
    Euclidean,
}

impl DistanceFormula {
    /// Distance score for normalized metrics `a` and `b`.
    pub fn score(&self, a: f64, b: f64) -> f64 {
        match self {
            DistanceFormula::Literal => (a * a + b).sqrt() / std::f64::consts::SQRT_2,
            DistanceFormula::Euclidean => (a * a + b * b).sqrt() / std::f64::consts::SQRT_2,
        }
    }
}

impl std::str::FromStr for DistanceFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "literal" => Ok(DistanceFormula::Literal),
            "euclidean" => Ok(DistanceFormula::Euclidean),
            _ => Err(format!("Invalid distance formula: {}", s)),
        }
    }
}

/// A trained model with its logged metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Raw metric values.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Hyperparameters used for training.
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, String>,
    /// Metrics normalized across the last compared set.
    #[serde(default)]
    pub normalized_metrics: BTreeMap<String, f64>,
}

impl Model {
    /// Create a model without metrics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a raw metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Add a hyperparameter.
    pub fn with_hyperparameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.hyperparameters.insert(name.into(), value.into());
        self
    }

    /// Finite raw value of a metric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }

    /// `name: raw (normalized)` for each of `metrics`, one per line.
    pub fn metrics_explainer(&self, metrics: &[&str]) -> String {
        metrics
            .iter()
            .filter_map(|name| {
                let raw = self.metrics.get(*name)?;
                Some(match self.normalized_metrics.get(*name) {
                    Some(normalized) => format!("{}: {} ({:.2})", name, raw, normalized),
                    None => format!("{}: {}", name, raw),
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `name: value` for each hyperparameter, one per line.
    pub fn hyperparameters_explainer(&self) -> String {
        self.hyperparameters
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A ranked model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoPoint {
    /// The ranked model, normalized metrics filled in.
    pub model: Model,
    /// Normalized value of the first metric.
    pub normalized_a: f64,
    /// Normalized value of the second metric.
    pub normalized_b: f64,
    /// Whether no other point dominates this one.
    pub is_optimal: bool,
    /// Distance score.
    pub score: f64,
    /// Raw and normalized values of the two ranked metrics, one per line.
    pub metrics_text: String,
    /// The model's hyperparameters, one per line.
    pub hyperparameters_text: String,
}

/// Min-max normalize each of `metrics` across `models` into `normalized_metrics`.
///
/// A metric with the same value on every model normalizes to 1.0. Models
/// without a finite value for a metric are left without a normalized value.
pub fn normalize_metrics(models: &mut [Model], metrics: &[&str]) {
    for metric in metrics {
        let values: Vec<f64> = models.iter().filter_map(|m| m.metric(metric)).collect();
        let Some(min) = values.iter().copied().reduce(f64::min) else {
            continue;
        };
        let max = values.iter().copied().fold(min, f64::max);
        let range = max - min;

        for model in models.iter_mut() {
            if let Some(value) = model.metric(metric) {
                let normalized = if range > 0.0 { (value - min) / range } else { 1.0 };
                model.normalized_metrics.insert(metric.to_string(), normalized);
            }
        }
    }
}

/// Pareto-optimality of each point, higher is better on both axes.
pub fn pareto_flags(points: &[(f64, f64)]) -> Vec<bool> {
    points
        .iter()
        .map(|&(a, b)| {
            !points
                .iter()
                .any(|&(oa, ob)| oa >= a && ob >= b && (oa > a || ob > b))
        })
        .collect()
}

/// Ranks models on two metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParetoRanker {
    distance: DistanceFormula,
}

impl ParetoRanker {
    /// Create a ranker.
    pub fn new(distance: DistanceFormula) -> Self {
        Self { distance }
    }

    /// The distance formula in use.
    pub fn distance(&self) -> DistanceFormula {
        self.distance
    }

    /// Rank models carrying both metrics, best score first.
    pub fn rank(&self, models: Vec<Model>, metric_a: &str, metric_b: &str) -> Vec<ParetoPoint> {
        let total = models.len();
        let mut models: Vec<Model> = models
            .into_iter()
            .filter(|m| m.metric(metric_a).is_some() && m.metric(metric_b).is_some())
            .collect();
        if models.len() < total {
            debug!(
                skipped = total - models.len(),
                metric_a = %metric_a,
                metric_b = %metric_b,
                "Models without both metrics left out of ranking"
            );
        }

        normalize_metrics(&mut models, &[metric_a, metric_b]);

        let coordinates: Vec<(f64, f64)> = models
            .iter()
            .map(|m| {
                (
                    m.normalized_metrics.get(metric_a).copied().unwrap_or_default(),
                    m.normalized_metrics.get(metric_b).copied().unwrap_or_default(),
                )
            })
            .collect();
        let flags = pareto_flags(&coordinates);

        let mut points: Vec<ParetoPoint> = models
            .into_iter()
            .zip(coordinates)
            .zip(flags)
            .map(|((model, (a, b)), is_optimal)| ParetoPoint {
                metrics_text: model.metrics_explainer(&[metric_a, metric_b]),
                hyperparameters_text: model.hyperparameters_explainer(),
                model,
                normalized_a: a,
                normalized_b: b,
                is_optimal,
                score: self.distance.score(a, b),
            })
            .collect();
        points.sort_by(|x, y| y.score.total_cmp(&x.score));
        points
    }
}

/// Keep only Pareto-optimal points.
pub fn optimal_only(points: Vec<ParetoPoint>) -> Vec<ParetoPoint> {
    points.into_iter().filter(|p| p.is_optimal).collect()
}
