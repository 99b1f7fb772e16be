//! Interactive chat shell.
//!
//! Reads questions line by line, answers each through the [`QueryEngine`],
//! reveals the answer one word at a time, then lists the retrieved chunks
//! under "Source References". `exit`, `quit`, or end of input ends the
//! session.
//!
//! Input and output are generic so the shell can be driven by tests.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Result;

use crate::config::ShellConfig;
use crate::engine::QueryEngine;
use crate::models::{Answer, Role, Turn};

/// The session transcript. Turns are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Start a conversation with the assistant's greeting.
    pub fn new(greeting: &str) -> Self {
        let mut conversation = Self::default();
        conversation.push_assistant(greeting);
        conversation
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.to_string(),
        });
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.to_string(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// First `max_chars` chars of `text`, followed by "...".
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_ascii_lowercase().as_str(), "exit" | "quit")
}

/// Run the chat loop until `exit`/`quit` or end of input.
pub async fn run_chat<R: BufRead, W: Write>(
    engine: &QueryEngine,
    config: &ShellConfig,
    mut input: R,
    out: &mut W,
) -> Result<Conversation> {
    let mut conversation = Conversation::new(&config.greeting);
    writeln!(out, "{}", config.greeting)?;
    writeln!(out, "(type 'exit' or 'quit' to leave)")?;

    let delay = Duration::from_millis(config.stream_delay_ms);
    let mut line = String::new();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit(question) {
            break;
        }

        conversation.push_user(question);
        let answer = engine.query(question).await;
        stream_words(out, &answer.answer, delay).await?;
        write_sources(out, &answer, config.source_preview_chars)?;
        conversation.push_assistant(&answer.answer);
    }

    tracing::debug!(turns = conversation.turns().len(), "chat session ended");
    Ok(conversation)
}

/// Reveal `text` one word at a time with `delay` between words.
async fn stream_words<W: Write>(out: &mut W, text: &str, delay: Duration) -> Result<()> {
    for (i, word) in text.split_whitespace().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "{}", word)?;
        out.flush()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Print the "Source References" block. Nothing for an answer without sources.
pub fn write_sources<W: Write>(out: &mut W, answer: &Answer, preview_chars: usize) -> Result<()> {
    if answer.sources.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nSource References")?;
    for (i, source) in answer.sources.iter().enumerate() {
        match source.page {
            Some(page) => writeln!(
                out,
                "Source {} (page {}, score {:.3}):",
                i + 1,
                page,
                source.score
            )?,
            None => writeln!(out, "Source {} (score {:.3}):", i + 1, source.score)?,
        }
        writeln!(out, "{}", preview(&source.text, preview_chars))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::engine::{QueryOptions, Resources};
    use crate::generation::ExtractiveGenerator;
    use crate::index::tests::{entry, manifest};
    use crate::index::VectorIndex;
    use std::sync::Arc;

    fn engine() -> QueryEngine {
        let e = HashEmbedder::new(64);
        let texts = [
            "Returns are accepted within thirty days of delivery.",
            "Sellers ship orders within two business days.",
        ];
        let entries = texts
            .iter()
            .enumerate()
            .map(|(i, t)| entry(i, t, e.embed_sync(t)))
            .collect();
        QueryEngine::new(
            Arc::new(VectorIndex::new(manifest(64, texts.len()), entries)),
            Resources {
                embedder: Arc::new(e),
                generator: Arc::new(ExtractiveGenerator),
            },
            QueryOptions::default(),
        )
        .unwrap()
    }

    fn config() -> ShellConfig {
        ShellConfig {
            greeting: "Ask me about the policy!".into(),
            stream_delay_ms: 0,
            source_preview_chars: 10,
        }
    }

    #[tokio::test]
    async fn answers_then_exits() {
        let input = b"How many days for returns?\n\nexit\nnever asked\n";
        let mut out = Vec::new();
        let conversation = run_chat(&engine(), &config(), &input[..], &mut out)
            .await
            .unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("Ask me about the policy!"));
        assert!(out.contains("Returns are accepted within thirty days of delivery."));
        assert!(out.contains("Source References"));
        assert!(out.contains("Source 1 (page 1, score"));
        assert!(out.contains("Returns ar..."));
        assert!(!out.contains("never asked"));

        let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(conversation.turns()[1].content, "How many days for returns?");
    }

    #[tokio::test]
    async fn end_of_input_ends_session() {
        let mut out = Vec::new();
        let conversation = run_chat(&engine(), &config(), &b""[..], &mut out)
            .await
            .unwrap();
        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(conversation.turns()[0].content, "Ask me about the policy!");
    }

    #[tokio::test]
    async fn quit_is_case_insensitive() {
        let mut out = Vec::new();
        let conversation = run_chat(&engine(), &config(), &b"QUIT\n"[..], &mut out)
            .await
            .unwrap();
        assert_eq!(conversation.turns().len(), 1);
    }

    #[test]
    fn preview_truncates_by_chars() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 500), "short...");
    }
}
