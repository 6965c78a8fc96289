//! Quiz session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{Event, StopReason};
#[allow(unused_imports)] // Public API re-exports
pub use state::{
    ChatId, MessageRef, Session, SessionContext, SessionKey, SessionPhase, SessionSnapshot,
    TimerStamp, UserId,
};
#[allow(unused_imports)] // Public API re-exports
pub use transition::{transition, TransitionError, TransitionResult};
