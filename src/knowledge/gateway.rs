//! Knowledge Gateway (C2): filtered semantic search over the corpus.

use crate::error::{KnowledgeError, Result};
use crate::knowledge::types::{KnowledgeRecord, SearchFilter, SearchResult};
use crate::llm::LlmClient;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Read-only semantic search gateway, shared across sessions (§4.2).
pub struct KnowledgeGateway {
    records: Arc<RwLock<Vec<KnowledgeRecord>>>,
    llm: Arc<dyn LlmClient>,
}

impl KnowledgeGateway {
    pub fn new(records: Vec<KnowledgeRecord>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            llm,
        }
    }

    /// Index embeddings for every record that doesn't have one yet. Called
    /// once at startup after [`crate::knowledge::csv_loader::load_corpus_file`].
    pub async fn reindex(&self) -> Result<()> {
        let mut records = self.records.write().await;
        for record in records.iter_mut() {
            if record.embedding.is_empty() {
                let response = self.llm.embed(&record.conteudo).await?;
                record.embedding = response.embedding;
            }
        }
        Ok(())
    }

    /// Filter-then-rank search (§4.2): metadata filters narrow the shard
    /// first, then cosine similarity against the query embedding ranks
    /// within it. Ties are broken by `updated_at` (fresher wins), then by
    /// content for a fully stable order (tests depend on this).
    pub async fn search(&self, query: &str, filter: &SearchFilter, top_k: usize) -> Result<Vec<SearchResult>> {
        let records = self.records.read().await;
        if records.is_empty() {
            return Err(KnowledgeError::Unavailable.into());
        }

        let query_embedding = self.llm.embed(query).await?.embedding;

        let mut scored: Vec<SearchResult> = records
            .iter()
            .filter(|r| r.matches(filter))
            .map(|r| SearchResult {
                content: r.conteudo.clone(),
                business_unit: r.area,
                product_type: r.tipo_produto.clone(),
                updated_at: r.atualizado_em,
                score: cosine_similarity(&query_embedding, &r.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.content.cmp(&b.content))
        });
        scored.truncate(top_k);

        debug!(results = scored.len(), "knowledge search complete");
        Ok(scored)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::BusinessUnit;
    use crate::llm::{EmbeddingResponse, GenerationResponse, Message};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
            unimplemented!()
        }

        async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
            // Deterministic stub: embedding is the byte length bucket, so
            // identical-length strings tie and different lengths don't.
            Ok(EmbeddingResponse {
                embedding: vec![text.len() as f32, 1.0],
                model: "stub".into(),
            })
        }
    }

    fn record(content: &str, date: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            conteudo: content.into(),
            area: BusinessUnit::Investimentos,
            tipo_produto: "cdb".into(),
            tipo_informacao: crate::knowledge::types::InfoType::Beneficios,
            nivel_complexidade: crate::knowledge::types::Complexity::Basico,
            publico_alvo: "pessoa_fisica".into(),
            palavras_chave: vec!["cdb".into()],
            atualizado_em: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            embedding: vec![content.len() as f32, 1.0],
        }
    }

    #[tokio::test]
    async fn ties_broken_by_freshness() {
        let gateway = KnowledgeGateway::new(
            vec![record("abcabc", "2024-01-01"), record("defdef", "2025-06-01")],
            Arc::new(StubLlm),
        );

        let results = gateway.search("abcabc", &SearchFilter::default(), 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].updated_at, NaiveDate::parse_from_str("2025-06-01", "%Y-%m-%d").unwrap());
    }

    #[tokio::test]
    async fn respects_top_k() {
        let gateway = KnowledgeGateway::new(
            vec![record("a", "2024-01-01"), record("bb", "2024-01-01"), record("ccc", "2024-01-01")],
            Arc::new(StubLlm),
        );
        let results = gateway.search("a", &SearchFilter::default(), 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn empty_corpus_is_unavailable() {
        let gateway = KnowledgeGateway::new(vec![], Arc::new(StubLlm));
        assert!(gateway.search("x", &SearchFilter::default(), 1).await.is_err());
    }
}
