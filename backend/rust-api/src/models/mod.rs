pub mod answer;
pub mod events;
pub mod participant;
pub mod requests;
pub mod session;
pub mod timer;

pub use answer::{AnswerKey, AnswerRecord, AnswerValue, ScoreResult};
pub use events::SessionEvent;
pub use participant::{
    GuestIdentity, Participant, ParticipantIndex, ParticipationKind, QuestionStart,
};
pub use session::{Session, SessionStatus};
pub use timer::{TimerAction, TimerCommand, TimerSnapshot, TimerState, TimerStatus, Transition};
