//! Language-model backends.
//!
//! Every backend implements [`LanguageModel`](docchat_core::LanguageModel).
//! Non-streaming backends get streaming for free through the trait's default
//! `stream`, so the pipeline never branches on backend capability.

pub mod openai;

pub use openai::{DEFAULT_MODEL, GROQ_API_KEY_ENV, GROQ_BASE_URL, OpenAiCompatModel};
