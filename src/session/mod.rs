//! Per-user sessions: data model and persistence.

pub mod model;
pub mod store;

pub use model::{
    ConversationState, ExternalField, FlowData, Interaction, Location, OnboardingPhase, Session,
};
pub use store::{LibSqlStore, MemoryStore, SessionLocks, SessionStore};
