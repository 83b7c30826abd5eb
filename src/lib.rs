//! jasoos library crate.
//!
//! A voice assistant that can look through the webcam: camera discovery and
//! frame serving, the tool-using agent, the voice loop and the browser UI.

pub mod agent;
pub mod camera;
pub mod config;
pub mod cooldown;
pub mod llm;
pub mod session;
pub mod ui;
pub mod vision;
pub mod voice;
