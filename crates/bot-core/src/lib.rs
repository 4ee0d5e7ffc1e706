//! Shared core for LLM-driven world agents: command grammar, action dispatch, the
//! conversation/resolution loop and background behaviors.
//!
//! The world connection, the game data tables and the chat-completion endpoint are
//! collaborators behind traits (`agent::game_api::GameApi`, `world::data::WorldData`,
//! `agent::harness::LlmClient`) so binaries can plug in a live bridge and tests can plug in fakes.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod world;
