//! Embedding, reranking, and answer-generation providers (C7), and the
//! provider-preference-list selection rule: the first available provider
//! wins for LLM and rerank calls with automatic fallback to the next one in
//! the list on failure; exactly one provider is chosen for embeddings, with
//! no fallback, since a Collection's `vector_size` is fixed at creation and
//! switching dense-embedding providers mid-flight would silently corrupt it.

use crate::store::SparseEmbedding;
use anyhow::{bail, Context, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client as OpenAiClient;
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, SparseInitOptions,
    SparseTextEmbedding, TextEmbedding, TextRerank,
};
use std::sync::Mutex;
use tracing::{instrument, warn};

#[async_trait]
pub trait DenseEmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn vector_size(&self) -> u64;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait SparseEmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseEmbedding>>;
}

#[async_trait]
pub trait RerankProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>>;
}

pub struct RerankedDocument {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate_answer(&self, query: &str, context: &str) -> Result<String>;
}

/// `fastembed`'s dense models run on a blocking thread internally; wrapped in
/// a `Mutex` since `TextEmbedding` takes `&mut self` for inference.
pub struct FastEmbedDense {
    model: Mutex<TextEmbedding>,
    model_name: String,
    vector_size: u64,
}

impl FastEmbedDense {
    pub fn new(model: EmbeddingModel, vector_size: u64) -> Result<Self> {
        let model_name = format!("{model:?}");
        let text_embedding =
            TextEmbedding::try_new(InitOptions::new(model)).context("init dense embedding model")?;
        Ok(Self {
            model: Mutex::new(text_embedding),
            model_name,
            vector_size,
        })
    }
}

#[async_trait]
impl DenseEmbeddingProvider for FastEmbedDense {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn vector_size(&self) -> u64 {
        self.vector_size
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock().expect("fastembed dense model lock poisoned");
        model
            .embed(texts.to_vec(), None)
            .context("dense embedding inference")
    }
}

pub struct FastEmbedSparse {
    model: Mutex<SparseTextEmbedding>,
}

impl FastEmbedSparse {
    pub fn new() -> Result<Self> {
        let model = SparseTextEmbedding::try_new(SparseInitOptions::default())
            .context("init sparse embedding model")?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[async_trait]
impl SparseEmbeddingProvider for FastEmbedSparse {
    fn name(&self) -> &str {
        "fastembed-bm25"
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseEmbedding>> {
        let mut model = self.model.lock().expect("fastembed sparse model lock poisoned");
        let embeddings = model
            .embed(texts.to_vec(), None)
            .context("sparse embedding inference")?;
        Ok(embeddings
            .into_iter()
            .map(|e| SparseEmbedding {
                indices: e.indices,
                values: e.values,
            })
            .collect())
    }
}

pub struct FastEmbedReranker {
    model: Mutex<TextRerank>,
}

impl FastEmbedReranker {
    pub fn new() -> Result<Self> {
        let model = TextRerank::try_new(RerankInitOptions::new(RerankerModel::BGERerankerBase))
            .context("init rerank model")?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[async_trait]
impl RerankProvider for FastEmbedReranker {
    fn name(&self) -> &str {
        "fastembed-bge-reranker-base"
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>> {
        let mut model = self.model.lock().expect("fastembed rerank model lock poisoned");
        let doc_refs: Vec<&str> = documents.iter().map(String::as_str).collect();
        let results = model
            .rerank(query, doc_refs, false, None)
            .context("rerank inference")?;
        Ok(results
            .into_iter()
            .map(|r| RerankedDocument {
                index: r.index,
                score: r.score,
            })
            .collect())
    }
}

pub struct OpenAiAnswerProvider {
    client: OpenAiClient<OpenAIConfig>,
    model: String,
}

impl OpenAiAnswerProvider {
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: OpenAiClient::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl AnswerProvider for OpenAiAnswerProvider {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, context))]
    async fn generate_answer(&self, query: &str, context: &str) -> Result<String> {
        let prompt = format!(
            "Answer the question using only the provided context. \
             If the context doesn't contain the answer, say so.\n\n\
             Context:\n{context}\n\nQuestion: {query}"
        );
        let message: ChatCompletionRequestMessage = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?
            .into();
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message])
            .build()?;
        let response = self.client.chat().create(request).await.context("chat completion")?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("empty completion response")
    }
}

/// First-available-wins selection over an ordered preference list, with
/// automatic fallback on failure. Embedding selection doesn't use this: the
/// chosen dense provider is fixed at Collection creation and never falls
/// back, since every point in a collection must share one vector space.
pub struct PreferenceList<T: ?Sized> {
    providers: Vec<Box<T>>,
}

impl<T: ?Sized> PreferenceList<T> {
    pub fn new(providers: Vec<Box<T>>) -> Self {
        Self { providers }
    }
}

impl PreferenceList<dyn AnswerProvider> {
    pub async fn generate_answer(&self, query: &str, context: &str) -> Result<String> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.generate_answer(query, context).await {
                Ok(answer) => return Ok(answer),
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "answer provider failed, trying next");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err).context("all answer providers exhausted"),
            None => bail!("no answer providers configured"),
        }
    }
}

impl PreferenceList<dyn RerankProvider> {
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.rerank(query, documents).await {
                Ok(ranked) => return Ok(ranked),
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "rerank provider failed, trying next");
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) => Err(err).context("all rerank providers exhausted"),
            None => bail!("no rerank providers configured"),
        }
    }
}

/// Resolves the single dense embedding provider to use against an existing
/// Collection: the provider whose `vector_size` matches the one the
/// Collection was created with, in preference order, erroring rather than
/// silently picking a mismatched one.
pub fn resolve_dense_provider<'a>(
    preferences: &'a [Box<dyn DenseEmbeddingProvider>],
    collection_vector_size: u64,
) -> Result<&'a dyn DenseEmbeddingProvider> {
    preferences
        .iter()
        .find(|p| p.vector_size() == collection_vector_size)
        .map(|p| p.as_ref())
        .with_context(|| {
            format!("no configured embedding provider produces vector_size={collection_vector_size}")
        })
}
