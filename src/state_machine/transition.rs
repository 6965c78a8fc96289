//! Pure state transition function
//!
//! Given the same session, context and event this always yields the same new
//! session and effect list. Timers, transport calls and leaderboard writes are
//! all expressed as effects for the executor to carry out.

use super::{Effect, Event, Session, SessionContext, SessionPhase, StopReason, TimerStamp};
use crate::state_machine::MessageRef;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Session) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    /// No state change, no effects (stale timers land here)
    pub fn unchanged(state: &Session) -> Self {
        Self::new(state.clone())
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Session has already been stopped")]
    SessionStopped,
}

pub fn transition(
    session: &Session,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (session.phase, event) {
        // ============================================================
        // Stopped: user events are rejected, late feedback is dropped
        // ============================================================
        (
            SessionPhase::Stopped,
            Event::Present | Event::Answer { .. } | Event::Stop { .. },
        ) => Err(TransitionError::SessionStopped),

        (SessionPhase::Stopped, _) => Ok(TransitionResult::unchanged(session)),

        // ============================================================
        // Presentation
        // ============================================================
        (SessionPhase::Active, Event::Present) => Ok(present(session.clone(), context, vec![])),

        (SessionPhase::Completed, Event::Present) => Ok(TransitionResult::unchanged(session)
            .with_effect(Effect::reply(final_score_text(session.score)))),

        (_, Event::QuestionShown { stamp, message }) => Ok(question_shown(session, stamp, message)),

        // ============================================================
        // Answers
        // ============================================================
        (SessionPhase::Active, Event::Answer { text, bonus }) => {
            Ok(answer(session, context, &text, bonus))
        }

        (SessionPhase::Completed, Event::Answer { .. }) => Ok(TransitionResult::unchanged(session)
            .with_effect(Effect::reply("The quiz is already finished."))),

        // ============================================================
        // Timers
        // ============================================================
        (_, Event::QuestionTimeout { stamp }) if session.is_current(stamp) => {
            let question = session.current_question().map(|q| q.answer.clone());
            let mut effects = Vec::new();
            if let Some(answer) = question {
                effects.push(Effect::reply(format!(
                    "Time's up! The correct answer was \"{answer}\"."
                )));
            }
            Ok(advance(session.clone(), context, effects))
        }

        (_, Event::DecayTick { stamp }) if session.is_current(stamp) => {
            let mut next = session.clone();
            next.score = next.score.saturating_sub(context.config.decay_amount);
            Ok(TransitionResult::new(next).with_effects([
                Effect::ArmDecay {
                    stamp,
                    after: context.config.decay_interval,
                },
                Effect::PublishSnapshot,
            ]))
        }

        // Superseded or post-completion firings
        (_, Event::QuestionTimeout { .. } | Event::DecayTick { .. }) => {
            Ok(TransitionResult::unchanged(session))
        }

        // ============================================================
        // Stop
        // ============================================================
        (_, Event::Stop { reason }) => Ok(stop(session, reason)),
    }
}

fn final_score_text(score: u32) -> String {
    format!("Quiz completed! Your final score is {score}.")
}

/// Show the current question, bumping the generation and re-arming both timers
fn present(mut next: Session, context: &SessionContext, mut effects: Vec<Effect>) -> TransitionResult {
    let Some(prompt) = next.current_question().map(|q| q.prompt.clone()) else {
        return complete(next, effects);
    };

    if let Some(old) = next.question_message.take() {
        effects.push(Effect::DeleteMessage { message: old });
    }

    next.generation += 1;
    let stamp = next.stamp();
    effects.extend([
        Effect::ShowQuestion { stamp, text: prompt },
        Effect::ArmTimeout {
            stamp,
            after: context.config.question_timeout,
        },
        Effect::ArmDecay {
            stamp,
            after: context.config.decay_interval,
        },
        Effect::PublishSnapshot,
    ]);

    TransitionResult::new(next).with_effects(effects)
}

/// Move past the current question: clear it, then present the next one or finish
fn advance(mut next: Session, context: &SessionContext, mut effects: Vec<Effect>) -> TransitionResult {
    effects.push(Effect::CancelTimeout);
    if let Some(old) = next.question_message.take() {
        effects.push(Effect::DeleteMessage { message: old });
    }

    next.current_index += 1;
    next.incorrect_streak = 0;

    if next.current_index >= next.total() {
        complete(next, effects)
    } else {
        present(next, context, effects)
    }
}

fn complete(mut next: Session, mut effects: Vec<Effect>) -> TransitionResult {
    next.phase = SessionPhase::Completed;
    next.current_index = next.total();
    effects.extend([
        Effect::CancelTimeout,
        Effect::CancelDecay,
        Effect::reply(final_score_text(next.score)),
        Effect::PublishSnapshot,
    ]);
    TransitionResult::new(next).with_effects(effects)
}

fn answer(session: &Session, context: &SessionContext, text: &str, bonus: u32) -> TransitionResult {
    let config = &context.config;
    let Some(question) = session.current_question().cloned() else {
        return complete(session.clone(), vec![]);
    };
    let mut next = session.clone();

    if question.accepts(text) {
        // Ceiling wins if the range is inverted
        let bonus = bonus.max(config.min_points).min(config.max_points);
        next.score = next.score.saturating_add(bonus);
        let effects = vec![
            Effect::reply(format!("Correct! You have {} points.", next.score)),
            Effect::OfferTopScore { score: next.score },
        ];
        return advance(next, context, effects);
    }

    if next.incorrect_streak + 1 >= config.miss_threshold {
        let effects = vec![Effect::reply(format!(
            "Incorrect. The correct answer is \"{}\".",
            question.answer
        ))];
        return advance(next, context, effects);
    }

    next.incorrect_streak += 1;
    TransitionResult::new(next).with_effects([
        Effect::reply(format!(
            "Incorrect. Here's a clue: {}. Try again!",
            question.clue
        )),
        Effect::PublishSnapshot,
    ])
}

fn question_shown(session: &Session, stamp: TimerStamp, message: Option<MessageRef>) -> TransitionResult {
    if session.is_current(stamp) {
        let mut next = session.clone();
        next.question_message = message;
        return TransitionResult::new(next).with_effect(Effect::PublishSnapshot);
    }

    // The question moved on before delivery was confirmed; don't leave it on screen
    match message {
        Some(message) => {
            TransitionResult::unchanged(session).with_effect(Effect::DeleteMessage { message })
        }
        None => TransitionResult::unchanged(session),
    }
}

fn stop(session: &Session, reason: StopReason) -> TransitionResult {
    let mut next = session.clone();
    next.phase = SessionPhase::Stopped;

    let mut effects = vec![Effect::CancelTimeout, Effect::CancelDecay];
    if let Some(message) = next.question_message.take() {
        effects.push(Effect::DeleteMessage { message });
    }
    if reason == StopReason::User {
        effects.push(Effect::reply(
            "The quiz has been stopped. Type /start to begin a new quiz session.",
        ));
    }
    effects.extend([Effect::PublishSnapshot, Effect::Shutdown]);

    TransitionResult::new(next).with_effects(effects)
}
