//! Static question bank
//!
//! The pool is loaded once and never mutated. Every new session gets its own
//! freshly shuffled ordering of shared question records.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// A single trivia question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(rename = "question")]
    pub prompt: String,
    pub answer: String,
    pub clue: String,
}

impl QuestionRecord {
    pub fn new(
        prompt: impl Into<String>,
        answer: impl Into<String>,
        clue: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            answer: answer.into(),
            clue: clue.into(),
        }
    }

    /// Case- and whitespace-insensitive comparison against the expected answer
    pub fn accepts(&self, reply: &str) -> bool {
        normalize_answer(reply) == normalize_answer(&self.answer)
    }
}

/// Lowercase and collapse whitespace runs so `"  new   YORK "` matches `"New York"`
pub fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question bank is empty")]
    Empty,
}

/// Immutable, non-empty pool of questions
#[derive(Debug)]
pub struct QuestionBank {
    pool: Vec<Arc<QuestionRecord>>,
}

impl QuestionBank {
    pub fn new(questions: Vec<QuestionRecord>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }
        Ok(Self {
            pool: questions.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load a JSON array of `{question, answer, clue}` objects
    pub fn from_json_file(path: &Path) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path)?;
        Self::new(serde_json::from_str(&raw)?)
    }

    /// Small built-in pool used when no bank file is configured
    pub fn sample() -> Self {
        Self {
            pool: vec![
                Arc::new(QuestionRecord::new(
                    "What is the capital of France?",
                    "Paris",
                    "It's also known as the City of Lights.",
                )),
                Arc::new(QuestionRecord::new(
                    "What is 2 + 2?",
                    "4",
                    "It's the sum of two even numbers.",
                )),
                Arc::new(QuestionRecord::new(
                    "What is the color of the sky on a clear day?",
                    "Blue",
                    "It's the color of the ocean on a sunny day.",
                )),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    #[allow(dead_code)] // Pairs with len(); a bank is never empty once constructed
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// A full, independently shuffled copy of the pool for a new session
    pub fn questions_for_session(&self) -> Vec<Arc<QuestionRecord>> {
        let mut order = self.pool.clone();
        order.shuffle(&mut rand::thread_rng());
        order
    }
}
