//! Resumable pipeline that turns a topic into a narrated short-form video.

pub mod audio;
pub mod config;
pub mod error;
pub mod frame;
pub mod image_gen;
pub mod llm;
pub mod pipeline;
pub mod project;
pub mod prompts;
pub mod research;
pub mod retry;
pub mod scene;
pub mod state;
pub mod subtitle;
pub mod tts;
pub mod utils;
pub mod video;
