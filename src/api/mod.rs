//! High-level API: engine facade and answer assembly

pub mod answer;
pub mod engine;

pub use answer::{Answer, AnswerGenerator, AnswerMetadata};
pub use engine::VideoRagEngine;
