//! Conversational retrieval pipeline.
//!
//! A turn runs lazily as the caller polls its [`FragmentStream`]:
//!
//! ```text
//! Idle -> retrieve context -> ContextReady -> open model stream -> Generating -> Finished
//!              |                                    |                  |
//!              +-- "Error retrieving context: .."   +------------------+-- "Error generating response: .."
//! ```
//!
//! History is written once, when the model stream ends cleanly. Failed or
//! abandoned turns leave it untouched.

use docchat_core::{Chunk, GenerationError, LanguageModel, Message, Retriever, TokenStream};
use futures::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::history::{HistoryStore, SessionHistory};
use crate::prompt::build_request;

/// Answer fragments for one turn. Finite; errors arrive as a final fragment.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Everything a turn needs, captured when `converse` is called.
struct Turn {
    retriever: Arc<dyn Retriever>,
    store: Arc<HistoryStore>,
    model: Arc<dyn LanguageModel>,
    session_id: String,
    question: String,
}

/// Progress of one turn.
enum TurnState {
    Idle(Turn),
    ContextReady {
        turn: Turn,
        history: SessionHistory,
        context: Vec<Chunk>,
    },
    Generating {
        turn: Turn,
        history: SessionHistory,
        tokens: TokenStream,
        answer: String,
    },
    Finished,
}

fn retrieval_failed(error: impl std::fmt::Display) -> (String, TurnState) {
    (format!("Error retrieving context: {error}"), TurnState::Finished)
}

fn generation_failed(error: impl std::fmt::Display) -> (String, TurnState) {
    (format!("Error generating response: {error}"), TurnState::Finished)
}

/// Advance a turn to its next fragment.
async fn next_fragment(mut state: TurnState) -> Option<(String, TurnState)> {
    loop {
        state = match state {
            TurnState::Idle(turn) => {
                let history = turn.store.get_or_create(&turn.session_id).await;
                match turn.retriever.invoke(&turn.question).await {
                    Ok(context) => {
                        debug!(
                            "Retrieved {} chunks for session {}",
                            context.len(),
                            turn.session_id
                        );
                        TurnState::ContextReady {
                            turn,
                            history,
                            context,
                        }
                    }
                    Err(e) => {
                        warn!("Retrieval failed for session {}: {}", turn.session_id, e);
                        return Some(retrieval_failed(e));
                    }
                }
            }
            TurnState::ContextReady {
                turn,
                history,
                context,
            } => {
                let prior = history.messages().await;
                let request = build_request(&prior, &context, &turn.question);
                drop(context);

                match turn.model.stream(&request).await {
                    Ok(tokens) => TurnState::Generating {
                        turn,
                        history,
                        tokens,
                        answer: String::new(),
                    },
                    Err(e) => {
                        warn!("{} failed for session {}: {}", turn.model.model_name(), turn.session_id, e);
                        return Some(generation_failed(e));
                    }
                }
            }
            TurnState::Generating {
                turn,
                history,
                mut tokens,
                mut answer,
            } => match tokens.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => TurnState::Generating {
                    turn,
                    history,
                    tokens,
                    answer,
                },
                Some(Ok(fragment)) => {
                    answer.push_str(&fragment);
                    return Some((
                        fragment,
                        TurnState::Generating {
                            turn,
                            history,
                            tokens,
                            answer,
                        },
                    ));
                }
                Some(Err(e)) => {
                    warn!("Generation stream failed for session {}: {}", turn.session_id, e);
                    return Some(generation_failed(e));
                }
                None if answer.is_empty() => {
                    warn!("{} returned no text for session {}", turn.model.model_name(), turn.session_id);
                    return Some(generation_failed(GenerationError::Empty));
                }
                None => {
                    debug!(
                        "Turn complete for session {} ({} chars)",
                        turn.session_id,
                        answer.len()
                    );
                    history.append_turn(turn.question, answer).await;
                    return None;
                }
            },
            TurnState::Finished => return None,
        };
    }
}

/// Retrieval-augmented chat over an index, with per-session memory.
pub struct ConversationalPipeline {
    retriever: Arc<dyn Retriever>,
    history: Arc<HistoryStore>,
    model: RwLock<Arc<dyn LanguageModel>>,
}

impl ConversationalPipeline {
    /// Create a pipeline.
    pub fn new(
        retriever: Arc<dyn Retriever>,
        model: Arc<dyn LanguageModel>,
        history: Arc<HistoryStore>,
    ) -> Self {
        Self {
            retriever,
            history,
            model: RwLock::new(model),
        }
    }

    /// Answer `question` in `session_id`, streaming the reply.
    ///
    /// Nothing happens until the stream is polled. The model in use at the
    /// time of this call answers the whole turn, even if
    /// [`set_model`](Self::set_model) runs meanwhile.
    pub fn converse(
        &self,
        session_id: impl Into<String>,
        question: impl Into<String>,
    ) -> FragmentStream {
        let turn = Turn {
            retriever: Arc::clone(&self.retriever),
            store: Arc::clone(&self.history),
            model: self.model(),
            session_id: session_id.into(),
            question: question.into(),
        };
        Box::pin(stream::unfold(TurnState::Idle(turn), next_fragment))
    }

    /// Replace the language model. History is untouched.
    pub fn set_model(&self, model: Arc<dyn LanguageModel>) {
        let mut current = self.model.write().unwrap_or_else(PoisonError::into_inner);
        debug!("Switching model {} -> {}", current.model_name(), model.model_name());
        *current = model;
    }

    /// Current language model.
    pub fn model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.model.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Name of the current language model.
    pub fn model_name(&self) -> String {
        self.model().model_name().to_string()
    }

    /// Messages recorded for `session_id`.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.history.messages(session_id).await
    }

    /// Forget `session_id`.
    pub async fn clear_history(&self, session_id: &str) {
        self.history.clear(session_id).await;
    }

    /// The shared history store.
    pub fn history_store(&self) -> &Arc<HistoryStore> {
        &self.history
    }
}
