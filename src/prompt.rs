//! The question-answering prompt.
//!
//! The template has exactly two slots, `{context}` and `{question}`. Context
//! is the retrieved chunk texts joined by a blank line, in rank order.

use anyhow::{bail, Result};

use crate::models::Source;

pub const DEFAULT_TEMPLATE: &str = "You are an assistant answering questions based only on the context below.
If the answer is not in the context, say \"I don't know\".

Context:
{context}

Question: {question}

Answer concisely:";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Reject templates that are missing a slot.
pub fn check_template(template: &str) -> Result<()> {
    for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
        if !template.contains(slot) {
            bail!("generation.template must contain {}", slot);
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self> {
        check_template(template)?;
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Join source texts the way they are stuffed into `{context}`.
    pub fn join_context(sources: &[Source]) -> String {
        sources
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    /// Fill both slots in a single pass, so a `{question}` inside the
    /// context (or vice versa) is left as literal text.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        loop {
            let next_context = rest.find(CONTEXT_SLOT);
            let next_question = rest.find(QUESTION_SLOT);
            let (pos, slot, value) = match (next_context, next_question) {
                (Some(c), Some(q)) if c < q => (c, CONTEXT_SLOT, context),
                (Some(c), None) => (c, CONTEXT_SLOT, context),
                (_, Some(q)) => (q, QUESTION_SLOT, question),
                (None, None) => break,
            };
            out.push_str(&rest[..pos]);
            out.push_str(value);
            rest = &rest[pos + slot.len()..];
        }
        out.push_str(rest);
        out
    }

    pub fn render_sources(&self, sources: &[Source], question: &str) -> String {
        self.render(&Self::join_context(sources), question)
    }
}
