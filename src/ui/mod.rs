//! Terminal UI layer for interactive chat sessions.
//!
//! Key submodules include:
//! - [`chat_loop`]: the event loop that reads keys, dispatches slash
//!   commands through [`crate::commands`], and runs turns on background tasks.
//! - [`display`]: the channel-backed [`crate::core::display::Display`]
//!   implementation turns write through.
//! - [`transcript`] and [`renderer`]: the output buffer and frame layout.
//!
//! Ownership boundary: this layer presents and captures interaction state, while
//! [`crate::core`] owns conversation state and turn orchestration.

pub mod chat_loop;
pub mod display;
pub mod renderer;
pub mod transcript;
