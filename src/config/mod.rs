use std::env;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};
use crate::ranking::DistanceFormula;
use crate::scoring::TiePolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub form: FormConfig,
    pub ranking: RankingConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Questionnaire traversal and scoring configuration
#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Id of the question every traversal starts from.
    pub first_question_id: String,
    /// Gate answer that hides restricted options for the rest of a run.
    pub gate_affirmative_label: String,
    /// Number of models recommended when a form is submitted.
    pub best_models_count: usize,
    pub tie_policy: TiePolicy,
}

/// Pareto ranking configuration
#[derive(Debug, Clone, Default)]
pub struct RankingConfig {
    pub distance: DistanceFormula,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/forms.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let tie_policy = match env::var("SCORING_TIE_POLICY") {
            Ok(value) => value
                .parse::<TiePolicy>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => TiePolicy::default(),
        };

        let form = FormConfig {
            first_question_id: env::var("FORM_FIRST_QUESTION_ID")
                .unwrap_or_else(|_| "1".to_string()),
            gate_affirmative_label: env::var("FORM_GATE_AFFIRMATIVE")
                .unwrap_or_else(|_| "Yes".to_string()),
            best_models_count: env::var("BEST_MODELS_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            tie_policy,
        };

        let distance = match env::var("PARETO_DISTANCE") {
            Ok(value) => value
                .parse::<DistanceFormula>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => DistanceFormula::default(),
        };

        Ok(Config {
            database,
            logging,
            form,
            ranking: RankingConfig { distance },
        })
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/forms.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            first_question_id: "1".to_string(),
            gate_affirmative_label: "Yes".to_string(),
            best_models_count: 5,
            tie_policy: TiePolicy::default(),
        }
    }
}
