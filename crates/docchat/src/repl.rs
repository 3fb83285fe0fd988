//! Interactive chat loop.

use anyhow::{Context, Result};
use docchat_chat::{ConversationalPipeline, OpenAiCompatModel};
use docchat_core::Message;
use docchat_index::{IndexBuilder, IngestInput};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::truncate;

const HELP: &str = "\
Commands:
  /session <id>   switch conversation
  /model <name>   switch language model (history is kept)
  /history        show this session's messages
  /clear          forget this session's messages
  /ingest <pdf>   add a document to the index
  /help           show this help
  /quit           exit";

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Ask(String),
    Session(String),
    Model(String),
    History,
    Clear,
    Ingest(PathBuf),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub(crate) fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg.is_empty()) {
            ("session", false) => Self::Session(arg.to_string()),
            ("model", false) => Self::Model(arg.to_string()),
            ("ingest", false) => Self::Ingest(PathBuf::from(arg)),
            ("history", _) => Self::History,
            ("clear", _) => Self::Clear,
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// REPL state.
pub(crate) struct Repl {
    pipeline: ConversationalPipeline,
    builder: IndexBuilder,
    base_model: OpenAiCompatModel,
    session: String,
}

impl Repl {
    pub(crate) fn new(
        pipeline: ConversationalPipeline,
        builder: IndexBuilder,
        base_model: OpenAiCompatModel,
        session: String,
    ) -> Self {
        Self {
            pipeline,
            builder,
            base_model,
            session,
        }
    }

    /// Handle one command. Returns false when the loop should stop.
    async fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Ask(question) => {
                let mut fragments = self.pipeline.converse(self.session.clone(), question);
                let mut stdout = std::io::stdout();
                while let Some(fragment) = fragments.next().await {
                    print!("{fragment}");
                    stdout.flush()?;
                }
                println!("\n");
            }
            Command::Session(id) => {
                println!("Switched to session '{id}'");
                self.session = id;
            }
            Command::Model(name) => {
                self.pipeline
                    .set_model(Arc::new(self.base_model.with_model(name)));
                println!("Now using {}", self.pipeline.model_name());
            }
            Command::History => {
                let messages = self.pipeline.history(&self.session).await;
                if messages.is_empty() {
                    println!("(no messages in session '{}')", self.session);
                }
                for message in &messages {
                    let label = match message {
                        Message::Human(_) => "you",
                        Message::Assistant(_) => "bot",
                    };
                    println!("{label:>4}: {}", truncate(message.text(), 120));
                }
            }
            Command::Clear => {
                self.pipeline.clear_history(&self.session).await;
                println!("Cleared session '{}'", self.session);
            }
            Command::Ingest(path) => {
                match self.builder.ingest(IngestInput::Path(path.clone())).await {
                    Ok(0) => println!("No text found in {}", path.display()),
                    Ok(n) => println!("Indexed {} ({n} chunks)", path.display()),
                    Err(e) => println!("Failed to ingest {}: {e}", path.display()),
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(false),
            Command::Empty => {}
            Command::Unknown(line) => println!("Unknown command: {line} (try /help)"),
        }
        Ok(true)
    }
}

/// Read questions from stdin until `/quit` or end of input.
pub(crate) async fn run(mut repl: Repl) -> Result<()> {
    println!(
        "docchat ({}), session '{}'. Type /help for commands.",
        repl.pipeline.model_name(),
        repl.session
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        if !repl.handle(Command::parse(&line)).await? {
            break;
        }
    }
    Ok(())
}
