//! Conversational retrieval for docchat.
//!
//! Given a [`Retriever`](docchat_core::Retriever) over an index and a
//! [`LanguageModel`](docchat_core::LanguageModel), the
//! [`ConversationalPipeline`] answers questions per session, streaming each
//! answer as text fragments and remembering completed turns in a
//! [`HistoryStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_chat::{ConversationalPipeline, HistoryStore, OpenAiCompatModel};
//! use futures::StreamExt;
//!
//! let model = Arc::new(OpenAiCompatModel::groq()?);
//! let pipeline = ConversationalPipeline::new(retriever, model, Arc::new(HistoryStore::new()));
//!
//! let mut answer = pipeline.converse("session-1", "When is the final exam?");
//! while let Some(fragment) = answer.next().await {
//!     print!("{fragment}");
//! }
//! ```

pub mod history;
pub mod llm;
pub mod pipeline;
pub mod prompt;

pub use history::{HistoryStore, SessionHistory};
pub use llm::OpenAiCompatModel;
pub use pipeline::{ConversationalPipeline, FragmentStream};
pub use prompt::{SYSTEM_PROMPT, build_request, format_context};
