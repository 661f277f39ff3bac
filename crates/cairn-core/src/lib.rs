//! # cairn-core
//!
//! Foundation helpers shared by every Cairn crate:
//!
//! - **IDs**: [`ids::new_session_id`], [`ids::new_message_id`] (prefixed UUID v7)
//! - **Time**: [`time::now_ms`] millisecond epoch clock and display formatting
//! - **Text**: [`text::truncate_chars`] for title truncation that never splits a character
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stderr subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other cairn crates.

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod text;
pub mod time;
