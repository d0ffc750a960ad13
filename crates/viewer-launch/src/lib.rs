//! # viewer-launch
//!
//! Platform bootstrap for the viewer: cleans the process environment,
//! installs crash handling, and either hands a deep link to an already
//! running instance or becomes the instance others hand off to.

pub mod bootstrap;
pub mod env;
pub mod plugin;

pub use bootstrap::{run_headless, Bootstrap, Launch, Startup};
