//! agri-assist — menu-driven conversational farming assistant over
//! WhatsApp.
//!
//! Inbound messages run through a per-user session state machine
//! ([`dialog`]): new users complete onboarding, onboarded users are
//! dispatched into the main-menu flow. Slow branches enqueue background
//! tasks ([`tasks`]) that gather enrichment context ([`enrichment`]) and
//! deliver their result asynchronously over the outbound channel
//! ([`channels`]).

pub mod channels;
pub mod config;
pub mod dialog;
pub mod enrichment;
pub mod error;
pub mod languages;
pub mod providers;
pub mod session;
pub mod tasks;
pub mod webhook;

pub use config::AppConfig;
pub use dialog::{Dialog, DialogDeps, InboundMessage};
pub use error::{Error, Result};
