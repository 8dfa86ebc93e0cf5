// UI module - terminal front end
//
// This module contains:
// - ConsoleController: wires run and bootstrap events into the StateManager and the renderer
// - ProgressRenderer: indicatif bars plus log lines
// - ConsolePrompt: the FFmpeg install question

pub mod controller;
pub mod prompt;
pub mod render;

pub use controller::ConsoleController;
pub use prompt::{ConsolePrompt, PromptMode};
pub use render::ProgressRenderer;
