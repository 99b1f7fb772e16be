//! Question answering over a loaded index.
//!
//! The [`QueryEngine`] owns the index, the embedder (which must match the
//! one the index was built with), the generator, and the prompt template.
//! All of these are loaded once and reused for every question.
//!
//! [`QueryEngine::try_query`] reports failures as [`QueryError`];
//! [`QueryEngine::query`] never fails and turns any error into the degraded
//! answer with no sources, logging the cause.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{LoadError, QueryError};
use crate::generation::{create_generator, GenerationRequest, Generator};
use crate::index::{format_identity, VectorIndex};
use crate::models::{Answer, Source};
use crate::prompt::PromptTemplate;

/// The heavy shared handles, built once at startup.
#[derive(Clone)]
pub struct Resources {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
}

impl Resources {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            embedder: create_embedder(&config.embedding)?,
            generator: create_generator(&config.generation)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub template: PromptTemplate,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            template: PromptTemplate::default(),
        }
    }
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            top_k: config.retrieval.top_k,
            template: PromptTemplate::new(config.generation.template())?,
        })
    }
}

pub struct QueryEngine {
    index: Arc<VectorIndex>,
    resources: Resources,
    options: QueryOptions,
}

impl QueryEngine {
    /// Pair a loaded index with query resources.
    ///
    /// Fails with [`LoadError::EmbeddingMismatch`] when the embedder's
    /// provider, model, or dimensionality differs from the index manifest.
    pub fn new(
        index: Arc<VectorIndex>,
        resources: Resources,
        options: QueryOptions,
    ) -> Result<Self, LoadError> {
        let manifest = index.manifest();
        let embedder = &resources.embedder;
        if manifest.embedding_provider != embedder.provider()
            || manifest.embedding_model != embedder.model_name()
            || manifest.embedding_dims != embedder.dims()
        {
            return Err(LoadError::EmbeddingMismatch {
                built: manifest.embedding_identity(),
                configured: format_identity(
                    embedder.provider(),
                    embedder.model_name(),
                    embedder.dims(),
                ),
            });
        }

        Ok(Self {
            index,
            resources,
            options,
        })
    }

    /// Load the configured index and build all query resources.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let index = VectorIndex::load(&config.index.dir).await?;
        let resources = Resources::from_config(config)?;
        let options = QueryOptions::from_config(config)?;
        let engine = Self::new(Arc::new(index), resources, options)?;
        tracing::info!(
            chunks = engine.index.len(),
            generator = engine.resources.generator.model_name(),
            top_k = engine.options.top_k,
            "query engine ready"
        );
        if !engine.uses_prompt() {
            tracing::info!(
                generator = engine.generator_name(),
                "generator answers from the retrieved chunks and ignores the prompt template"
            );
        }
        Ok(engine)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn generator_name(&self) -> &str {
        self.resources.generator.model_name()
    }

    /// Whether the configured generator is driven by the rendered prompt.
    pub fn uses_prompt(&self) -> bool {
        self.resources.generator.uses_prompt()
    }

    /// Embed `question` and return the top-k chunks, best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Source>, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        if self.index.is_empty() {
            return Err(QueryError::NoContext);
        }

        let vector = self
            .resources
            .embedder
            .embed(question)
            .await
            .map_err(QueryError::Embedding)?;

        let hits = self.index.search(&vector, self.options.top_k)?;
        Ok(hits
            .into_iter()
            .map(|hit| Source {
                chunk_index: hit.chunk.index,
                text: hit.chunk.text.clone(),
                score: hit.score,
                page: hit.chunk.page,
            })
            .collect())
    }

    /// The prompt that would be sent for `question` over `sources`. The
    /// question is substituted as given.
    pub fn render_prompt(&self, sources: &[Source], question: &str) -> String {
        self.options.template.render_sources(sources, question)
    }

    /// Answer `question`, reporting any failure.
    pub async fn try_query(&self, question: &str) -> Result<Answer, QueryError> {
        let sources = self.retrieve(question).await?;
        let prompt = self.render_prompt(&sources, question);
        tracing::debug!(sources = sources.len(), prompt_chars = prompt.len(), "generating");

        let answer = self
            .resources
            .generator
            .generate(GenerationRequest {
                prompt: &prompt,
                question,
                context: &sources,
            })
            .await?;

        Ok(Answer {
            answer,
            sources,
            failure: None,
        })
    }

    /// Answer `question`. Never fails: errors become the degraded answer.
    pub async fn query(&self, question: &str) -> Answer {
        match self.try_query(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, kind = ?e.kind(), "query failed");
                Answer::degraded(e.kind())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::error::GenerationError;
    use crate::generation::ExtractiveGenerator;
    use crate::index::tests::{entry, manifest};
    use crate::indexer::{build, BuildOptions};
    use crate::models::{FailureKind, DEGRADED_ANSWER, UNKNOWN_ANSWER};
    use crate::progress::NoProgress;
    use async_trait::async_trait;

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _r: GenerationRequest<'_>) -> Result<String, GenerationError> {
            Err(GenerationError::Backend("out of memory".into()))
        }
    }

    /// Echoes the prompt it was given, untouched.
    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, r: GenerationRequest<'_>) -> Result<String, GenerationError> {
            Ok(r.prompt.to_string())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn provider(&self) -> &str {
            "hash"
        }
        fn model_name(&self) -> &str {
            "feature-hash-64"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service down")
        }
    }

    fn resources(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Resources {
        Resources {
            embedder,
            generator,
        }
    }

    fn small_index(dims: usize) -> Arc<VectorIndex> {
        let e = HashEmbedder::new(dims);
        let texts = [
            "Returns are accepted within thirty days of delivery.",
            "Sellers ship orders within two business days.",
            "Refunds go back to the original payment method.",
        ];
        let entries = texts
            .iter()
            .enumerate()
            .map(|(i, t)| entry(i, t, e.embed_sync(t)))
            .collect();
        Arc::new(VectorIndex::new(manifest(dims, texts.len()), entries))
    }

    fn engine_with(generator: Arc<dyn Generator>) -> QueryEngine {
        QueryEngine::new(
            small_index(64),
            resources(Arc::new(HashEmbedder::new(64)), generator),
            QueryOptions::default(),
        )
        .unwrap()
    }

    const PARAGRAPH_1: &str = "Our marketplace connects independent sellers with buyers \
        around the world. Every listing must describe the item accurately, include clear \
        photos, and state the condition honestly. Prohibited items include weapons, \
        counterfeit goods, and live animals.";
    const PARAGRAPH_2: &str = "Buyers may return most items within thirty days of \
        delivery for a full refund. The seller pays return shipping when the item \
        arrives damaged or does not match the listing. Refunds are issued to the \
        original payment method within five business days.";
    const PARAGRAPH_3: &str = "Sellers receive payouts weekly once an order is marked \
        as delivered. New seller accounts may have payouts held for up to twenty one \
        days while the account builds a sales history.";

    #[tokio::test]
    async fn answers_from_three_paragraph_document() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc = tmp.path().join("policy.txt");
        std::fs::write(
            &doc,
            format!("{}\n\n{}\n\n{}", PARAGRAPH_1, PARAGRAPH_2, PARAGRAPH_3),
        )
        .unwrap();

        let options = BuildOptions {
            document: doc,
            chunk_size: 300,
            chunk_overlap: 50,
            index_dir: tmp.path().join("index"),
            chunks_path: tmp.path().join("chunks.txt"),
            batch_size: 64,
        };
        let embedder = Arc::new(HashEmbedder::new(256));
        build(&options, embedder.as_ref(), &NoProgress).await.unwrap();

        let index = VectorIndex::load(&options.index_dir).await.unwrap();
        let engine = QueryEngine::new(
            Arc::new(index),
            resources(embedder, Arc::new(ExtractiveGenerator)),
            QueryOptions::default(),
        )
        .unwrap();

        let answer = engine
            .try_query("Within how many days can buyers return items for a refund?")
            .await
            .unwrap();
        assert!(answer.sources.len() <= 3);
        assert!(answer
            .sources
            .iter()
            .any(|s| s.text.contains("return most items within thirty days")));
        assert!(!answer.answer.is_empty());
        assert_ne!(answer.answer, UNKNOWN_ANSWER);
        assert!(answer.answer.contains("thirty days"));
    }

    #[tokio::test]
    async fn retrieval_is_repeatable() {
        let engine = engine_with(Arc::new(ExtractiveGenerator));
        let a = engine.retrieve("When do sellers ship orders?").await.unwrap();
        let b = engine.retrieve("When do sellers ship orders?").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].chunk_index, 1);
    }

    #[tokio::test]
    async fn prompt_for_unrelated_question_keeps_fallback_instruction() {
        let engine = engine_with(Arc::new(ExtractiveGenerator));
        let question = "Who is the chief executive?";
        let sources = engine.retrieve(question).await.unwrap();
        let prompt = engine.render_prompt(&sources, question);
        assert!(prompt.contains("I don't know"));
        assert!(prompt.contains("Question: Who is the chief executive?"));

        let answer = engine.query(question).await;
        assert_eq!(answer.answer, UNKNOWN_ANSWER);
        assert_eq!(answer.sources.len(), 3);
    }

    #[tokio::test]
    async fn generation_failure_degrades() {
        let engine = engine_with(Arc::new(FailingGenerator));
        let answer = engine.query("How long do returns take?").await;
        assert_eq!(answer.answer, DEGRADED_ANSWER);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.failure, Some(FailureKind::Generation));

        let err = engine.try_query("How long do returns take?").await.unwrap_err();
        assert!(matches!(err, QueryError::Generation(_)));
    }

    #[tokio::test]
    async fn embedding_failure_degrades() {
        let engine = QueryEngine::new(
            small_index(64),
            resources(Arc::new(FailingEmbedder), Arc::new(ExtractiveGenerator)),
            QueryOptions::default(),
        )
        .unwrap();
        let answer = engine.query("anything").await;
        assert_eq!(answer.answer, DEGRADED_ANSWER);
        assert_eq!(answer.failure, Some(FailureKind::Embedding));
    }

    #[tokio::test]
    async fn empty_question_and_empty_index() {
        let engine = engine_with(Arc::new(ExtractiveGenerator));
        assert_eq!(
            engine.query("   ").await.failure,
            Some(FailureKind::EmptyQuestion)
        );

        let empty = QueryEngine::new(
            Arc::new(VectorIndex::new(manifest(8, 0), Vec::new())),
            resources(Arc::new(HashEmbedder::new(8)), Arc::new(ExtractiveGenerator)),
            QueryOptions::default(),
        )
        .unwrap();
        assert_eq!(
            empty.query("Where is my order?").await.failure,
            Some(FailureKind::NoContext)
        );
    }

    #[test]
    fn embedder_mismatch_is_rejected() {
        let result = QueryEngine::new(
            small_index(64),
            resources(Arc::new(HashEmbedder::new(16)), Arc::new(ExtractiveGenerator)),
            QueryOptions::default(),
        );
        match result {
            Err(LoadError::EmbeddingMismatch { built, configured }) => {
                assert!(built.contains("64 dims"));
                assert!(configured.contains("16 dims"));
            }
            _ => panic!("expected an embedding mismatch"),
        }
    }

    #[tokio::test]
    async fn custom_template_reaches_generator_verbatim() {
        let engine = QueryEngine::new(
            small_index(64),
            resources(Arc::new(HashEmbedder::new(64)), Arc::new(EchoGenerator)),
            QueryOptions {
                top_k: 1,
                template: PromptTemplate::new("Reply BANANA. {context} | {question}").unwrap(),
            },
        )
        .unwrap();
        assert!(engine.uses_prompt());

        let answer = engine.query("  When do sellers ship orders?\n").await;
        assert_eq!(
            answer.answer,
            "Reply BANANA. Sellers ship orders within two business days. |   When do sellers ship orders?\n"
        );
    }

    #[test]
    fn extractive_generator_does_not_use_prompt() {
        assert!(!engine_with(Arc::new(ExtractiveGenerator)).uses_prompt());
    }
}
