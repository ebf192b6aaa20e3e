pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod display;
pub mod message;
pub mod orchestrator;
pub mod providers;
pub mod tools;
pub mod turn;
pub mod turn_guard;
