//! Static quiz configuration
//!
//! Loaded once at startup; nothing here is mutable at runtime.

use crate::state_machine::UserId;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MIN_POINTS: u32 = 1;
const DEFAULT_MAX_POINTS: u32 = 10;
const DEFAULT_DECAY_INTERVAL_SECS: u64 = 5;
const DEFAULT_DECAY_AMOUNT: u32 = 1;
const DEFAULT_QUESTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MISS_THRESHOLD: u32 = 3;
const DEFAULT_PORT: u16 = 8000;

/// Configuration validation failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("minimum bonus ({min}) exceeds maximum bonus ({max})")]
    BonusRange { min: u32, max: u32 },
    #[error("maximum bonus must be at least 1")]
    ZeroMaxBonus,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("miss threshold must be at least 1")]
    ZeroMissThreshold,
}

/// Scoring and timing parameters shared by every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizConfig {
    pub min_points: u32,
    pub max_points: u32,
    pub decay_interval: Duration,
    pub decay_amount: u32,
    pub question_timeout: Duration,
    /// Consecutive misses on one question before the answer is revealed
    pub miss_threshold: u32,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            min_points: DEFAULT_MIN_POINTS,
            max_points: DEFAULT_MAX_POINTS,
            decay_interval: Duration::from_secs(DEFAULT_DECAY_INTERVAL_SECS),
            decay_amount: DEFAULT_DECAY_AMOUNT,
            question_timeout: Duration::from_secs(DEFAULT_QUESTION_TIMEOUT_SECS),
            miss_threshold: DEFAULT_MISS_THRESHOLD,
        }
    }
}

impl QuizConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_points == 0 {
            return Err(ConfigError::ZeroMaxBonus);
        }
        if self.min_points > self.max_points {
            return Err(ConfigError::BonusRange {
                min: self.min_points,
                max: self.max_points,
            });
        }
        if self.decay_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("decay interval"));
        }
        if self.question_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("question timeout"));
        }
        if self.miss_threshold == 0 {
            return Err(ConfigError::ZeroMissThreshold);
        }
        Ok(())
    }

    /// Draw a correct-answer bonus uniformly from `[min_points, max_points]`
    pub fn draw_bonus<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min_points..=self.max_points)
    }
}

/// Everything the binary reads from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub quiz: QuizConfig,
    pub admins: HashSet<UserId>,
    pub questions_path: Option<PathBuf>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map instead of the process env)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let quiz = QuizConfig {
            min_points: parse_or(&lookup, "QUIZ_MIN_POINTS", DEFAULT_MIN_POINTS),
            max_points: parse_or(&lookup, "QUIZ_MAX_POINTS", DEFAULT_MAX_POINTS),
            decay_interval: Duration::from_secs(parse_or(
                &lookup,
                "QUIZ_DECAY_INTERVAL_SECS",
                DEFAULT_DECAY_INTERVAL_SECS,
            )),
            decay_amount: parse_or(&lookup, "QUIZ_DECAY_AMOUNT", DEFAULT_DECAY_AMOUNT),
            question_timeout: Duration::from_secs(parse_or(
                &lookup,
                "QUIZ_QUESTION_TIMEOUT_SECS",
                DEFAULT_QUESTION_TIMEOUT_SECS,
            )),
            miss_threshold: parse_or(&lookup, "QUIZ_MISS_THRESHOLD", DEFAULT_MISS_THRESHOLD),
        };
        quiz.validate()?;

        Ok(Self {
            quiz,
            admins: parse_admins(lookup("QUIZ_ADMINS").as_deref().unwrap_or_default()),
            questions_path: lookup("QUIZ_QUESTIONS_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            port: parse_or(&lookup, "QUIZ_PORT", DEFAULT_PORT),
        })
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting, using default");
            default
        }),
    }
}

/// Comma separated user ids; anything non-numeric is skipped
pub fn parse_admins(raw: &str) -> HashSet<UserId> {
    raw.split(',')
        .filter_map(|id| id.trim().parse::<i64>().ok())
        .map(UserId)
        .collect()
}
