//! Loads the knowledge corpus CSV (§6) into [`KnowledgeRecord`]s.

use crate::error::{KnowledgeError, Result};
use crate::knowledge::types::{BusinessUnit, Complexity, InfoType, KnowledgeRecord};
use chrono::NaiveDate;
use std::path::Path;

#[derive(Debug, serde::Deserialize)]
struct RawRow {
    conteudo: String,
    area: String,
    tipo_produto: String,
    tipo_informacao: String,
    nivel_complexidade: String,
    publico_alvo: String,
    palavras_chave: String,
    atualizado_em: String,
}

/// Parse the corpus from a CSV string. Embeddings are left empty; callers
/// fill them in via [`crate::llm::LlmClient::embed`] before indexing, since
/// this runtime never hard-codes a vector backend (§1 non-goals).
pub fn parse_corpus(csv_source: &str) -> Result<Vec<KnowledgeRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_source.as_bytes());

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<RawRow>().enumerate() {
        let row = row.map_err(|e| KnowledgeError::CorpusLoad(format!("row {}: {}", line + 2, e)))?;

        let area = BusinessUnit::parse(&row.area)
            .ok_or_else(|| KnowledgeError::UnknownBusinessUnit(row.area.clone()))?;
        let tipo_informacao = InfoType::parse(&row.tipo_informacao)
            .ok_or_else(|| KnowledgeError::CorpusLoad(format!("unknown tipo_informacao '{}'", row.tipo_informacao)))?;
        let nivel_complexidade = Complexity::parse(&row.nivel_complexidade)
            .ok_or_else(|| KnowledgeError::CorpusLoad(format!("unknown nivel_complexidade '{}'", row.nivel_complexidade)))?;
        let atualizado_em = parse_month(&row.atualizado_em)
            .ok_or_else(|| KnowledgeError::CorpusLoad(format!("unparseable atualizado_em '{}'", row.atualizado_em)))?;

        records.push(KnowledgeRecord {
            conteudo: row.conteudo,
            area,
            tipo_produto: row.tipo_produto,
            tipo_informacao,
            nivel_complexidade,
            publico_alvo: row.publico_alvo,
            palavras_chave: row
                .palavras_chave
                .split(';')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            atualizado_em,
            embedding: Vec::new(),
        });
    }

    Ok(records)
}

pub async fn load_corpus_file(path: impl AsRef<Path>) -> Result<Vec<KnowledgeRecord>> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_corpus(&contents)
}

/// `atualizado_em` is `YYYY-MM`; stored as the first day of that month.
fn parse_month(raw: &str) -> Option<NaiveDate> {
    let (year, month) = raw.trim().split_once('-')?;
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}
