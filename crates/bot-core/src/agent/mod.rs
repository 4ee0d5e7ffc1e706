//! One controlled agent: the `!name(args)` command grammar, query and action handlers, the
//! per-agent session, background behaviors and the resolution loop that ties them to the
//! language model.

pub mod actions;
pub mod behaviors;
pub mod conversation;
pub mod executor;
pub mod game_api;
pub mod harness;
pub mod r#loop;
pub mod observation;
pub mod prompt;
pub mod queries;
pub mod session;
#[cfg(test)]
pub(crate) mod testkit;
pub mod tools;
pub mod wire;

pub use game_api::{GameApi, WorldEvent};
pub use harness::LlmClient;
pub use r#loop::{AgentLoop, Recipient, RunEnd};
pub use session::{Session, SessionRegistry};
