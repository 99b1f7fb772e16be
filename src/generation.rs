//! Answer generation backends.
//!
//! A [`Generator`] turns a rendered prompt into answer text. The remote
//! backends (Ollama, OpenAI) receive the full prompt and their completion is
//! returned as-is. The extractive backend needs no model: it answers with the
//! context sentence that best overlaps the question, or "I don't know" when
//! nothing does. It never reads the prompt, so the template (and its
//! instructions) has no effect on it; [`Generator::uses_prompt`] reports this.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::embedding::content_terms;
use crate::error::GenerationError;
use crate::http::{HttpError, JsonClient};
use crate::models::{Source, UNKNOWN_ANSWER};

/// Inputs to one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// The fully rendered prompt.
    pub prompt: &'a str,
    pub question: &'a str,
    /// Retrieved chunks, best first.
    pub context: &'a [Source],
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// False for backends that answer without reading `request.prompt`.
    fn uses_prompt(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError>;
}

impl From<HttpError> for GenerationError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Connection { .. } => GenerationError::Unavailable(err.to_string()),
            HttpError::Status { .. } => GenerationError::Backend(err.to_string()),
            HttpError::Decode { .. } => GenerationError::MalformedResponse(err.to_string()),
        }
    }
}

// ============ Ollama ============

/// Calls `POST {url}/api/generate` on a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: f32,
    max_new_tokens: u32,
    client: JsonClient,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model,
            url,
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }

    fn body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_new_tokens,
            }
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        let json = self
            .client
            .post(
                &format!("{}/api/generate", self.url.trim_end_matches('/')),
                None,
                &self.body(request.prompt),
            )
            .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| {
            GenerationError::MalformedResponse("Ollama response is missing 'response'".to_string())
        })?;
    Ok(text.to_string())
}

// ============ OpenAI ============

/// Calls the OpenAI chat completions API. Requires `OPENAI_API_KEY`.
///
/// `generation.url` may point at any OpenAI-compatible base URL.
pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_new_tokens: u32,
    client: JsonClient,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            model,
            base_url,
            api_key,
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_new_tokens,
        });
        let json = self
            .client
            .post(
                &format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
                Some(&self.api_key),
                &body,
            )
            .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerationError::MalformedResponse(
                "OpenAI response is missing choices[0].message.content".to_string(),
            )
        })?;
    Ok(text.to_string())
}

// ============ Extractive ============

/// Answers with the single context sentence sharing the most content words
/// with the question. Earlier chunks win ties. Zero overlap means the
/// context cannot answer, so it says "I don't know".
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub fn answer(question: &str, context: &[Source]) -> String {
        let wanted = content_terms(question);
        if wanted.is_empty() {
            return UNKNOWN_ANSWER.to_string();
        }

        let mut best: Option<(usize, &str)> = None;
        for source in context {
            for sentence in sentences(&source.text) {
                let terms = content_terms(sentence);
                let score = wanted.iter().filter(|w| terms.contains(w)).count();
                if score > 0 && best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, sentence));
                }
            }
        }

        match best {
            Some((_, sentence)) => sentence.to_string(),
            None => UNKNOWN_ANSWER.to_string(),
        }
    }
}

/// Split on sentence-ending punctuation followed by whitespace, and on newlines.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => match chars.peek() {
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                None => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            let s = text[start..end].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    fn uses_prompt(&self) -> bool {
        false
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        Ok(Self::answer(request.question, request.context))
    }
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable(
            "generation provider is disabled".to_string(),
        ))
    }
}

/// Create the [`Generator`] named by `config.provider`.
///
/// | Config Value | Generator |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaGenerator`] |
/// | `"openai"` | [`OpenAIGenerator`] |
/// | `"extractive"` | [`ExtractiveGenerator`] |
/// | `"disabled"` | [`DisabledGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "extractive" => Ok(Arc::new(ExtractiveGenerator)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(i: usize, text: &str) -> Source {
        Source {
            chunk_index: i,
            text: text.to_string(),
            score: 0.5,
            page: None,
        }
    }

    #[test]
    fn extractive_picks_best_sentence() {
        let context = [
            source(0, "Sellers ship within two days. Tracking is required."),
            source(1, "Returns are accepted within thirty days of delivery. Refunds take five days."),
        ];
        let answer = ExtractiveGenerator::answer("How many days do buyers have for returns?", &context);
        assert_eq!(answer, "Returns are accepted within thirty days of delivery.");
    }

    #[test]
    fn extractive_unknown_without_overlap() {
        let context = [source(0, "Sellers ship within two days.")];
        assert_eq!(
            ExtractiveGenerator::answer("Who founded the company?", &context),
            UNKNOWN_ANSWER
        );
        assert_eq!(ExtractiveGenerator::answer("what is the", &context), UNKNOWN_ANSWER);
        assert_eq!(ExtractiveGenerator::answer("Who ships?", &[]), UNKNOWN_ANSWER);
    }

    #[test]
    fn sentence_split_keeps_decimals() {
        assert_eq!(
            sentences("Fees are 2.5 percent. Really?\nYes"),
            vec!["Fees are 2.5 percent.", "Really?", "Yes"]
        );
    }

    #[test]
    fn ollama_body_and_parse() {
        let config = GenerationConfig {
            provider: "ollama".into(),
            model: Some("llama3.2".into()),
            ..Default::default()
        };
        let generator = OllamaGenerator::new(&config).unwrap();
        let body = generator.body("hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 512);

        let ok = serde_json::json!({"response": "  Thirty days. "});
        assert_eq!(parse_ollama_response(&ok).unwrap(), "  Thirty days. ");
        assert_eq!(
            parse_ollama_response(&serde_json::json!({"response": ""})).unwrap(),
            ""
        );
        assert!(matches!(
            parse_ollama_response(&serde_json::json!({})),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn openai_parse() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "Yes."}}]});
        assert_eq!(parse_openai_response(&ok).unwrap(), "Yes.");
        let raw = serde_json::json!({"choices": [{"message": {"content": "\nYes.\n"}}]});
        assert_eq!(parse_openai_response(&raw).unwrap(), "\nYes.\n");
        assert!(matches!(
            parse_openai_response(&serde_json::json!({"choices": []})),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_ollama_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = GenerationConfig {
            provider: "ollama".into(),
            model: Some("llama3.2".into()),
            url: Some(format!("http://{}", addr)),
            max_retries: 0,
            ..Default::default()
        };
        let generator = create_generator(&config).unwrap();
        let err = generator
            .generate(GenerationRequest {
                prompt: "p",
                question: "q",
                context: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }

    #[test]
    fn only_extractive_ignores_prompt() {
        assert!(!ExtractiveGenerator.uses_prompt());
        assert!(DisabledGenerator.uses_prompt());
        let config = GenerationConfig {
            provider: "ollama".into(),
            model: Some("llama3.2".into()),
            ..Default::default()
        };
        assert!(create_generator(&config).unwrap().uses_prompt());
    }

    #[tokio::test]
    async fn disabled_generator_fails() {
        let err = DisabledGenerator
            .generate(GenerationRequest {
                prompt: "p",
                question: "q",
                context: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }
}
