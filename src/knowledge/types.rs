//! Type definitions for the Knowledge Gateway (C2) and the typification
//! hierarchy table it builds from the same corpus (§4.8, §6).

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row of the knowledge corpus CSV (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub conteudo: String,
    pub area: BusinessUnit,
    pub tipo_produto: String,
    pub tipo_informacao: InfoType,
    pub nivel_complexidade: Complexity,
    pub publico_alvo: String,
    pub palavras_chave: Vec<String>,
    pub atualizado_em: NaiveDate,
    pub embedding: Vec<f32>,
}

/// `area` column (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessUnit {
    Cartoes,
    ContaDigital,
    Investimentos,
    Credito,
    Seguros,
}

impl BusinessUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "cartoes" | "cartões" => Some(BusinessUnit::Cartoes),
            "conta_digital" => Some(BusinessUnit::ContaDigital),
            "investimentos" => Some(BusinessUnit::Investimentos),
            "credito" | "crédito" => Some(BusinessUnit::Credito),
            "seguros" => Some(BusinessUnit::Seguros),
            _ => None,
        }
    }
}

/// `tipo_informacao` column (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoType {
    ComoSolicitar,
    Taxas,
    Beneficios,
    Requisitos,
    Prazos,
    Limites,
    ProblemasComuns,
}

impl InfoType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "como_solicitar" => Some(InfoType::ComoSolicitar),
            "taxas" => Some(InfoType::Taxas),
            "beneficios" | "benefícios" => Some(InfoType::Beneficios),
            "requisitos" => Some(InfoType::Requisitos),
            "prazos" => Some(InfoType::Prazos),
            "limites" => Some(InfoType::Limites),
            "problemas_comuns" => Some(InfoType::ProblemasComuns),
            _ => None,
        }
    }
}

/// `nivel_complexidade` column (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Basico,
    Intermediario,
    Avancado,
}

impl Complexity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "basico" | "básico" => Some(Complexity::Basico),
            "intermediario" | "intermediário" => Some(Complexity::Intermediario),
            "avancado" | "avançado" => Some(Complexity::Avancado),
            _ => None,
        }
    }
}

/// A narrowing filter applied before vector similarity ranking (§4.2).
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub business_unit: Option<BusinessUnit>,
    pub product_type: Option<String>,
    pub audience: Vec<String>,
    pub complexity: Vec<Complexity>,
}

/// One ranked result from [`crate::knowledge::KnowledgeGateway::search`].
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub content: String,
    pub business_unit: BusinessUnit,
    pub product_type: String,
    pub updated_at: NaiveDate,
    pub score: f32,
}

impl KnowledgeRecord {
    pub fn matches(&self, filter: &SearchFilter) -> bool {
        if let Some(unit) = filter.business_unit {
            if self.area != unit {
                return false;
            }
        }
        if let Some(product) = &filter.product_type {
            if !self.tipo_produto.eq_ignore_ascii_case(product) {
                return false;
            }
        }
        if !filter.audience.is_empty()
            && !filter
                .audience
                .iter()
                .any(|a| self.publico_alvo.eq_ignore_ascii_case(a))
        {
            return false;
        }
        if !filter.complexity.is_empty() && !filter.complexity.contains(&self.nivel_complexidade) {
            return false;
        }
        true
    }

    /// A conservative "freshness" tiebreaker used when two records score
    /// equally in cosine similarity (§4.2: "higher updated_at wins").
    pub fn freshness_rank(&self) -> i64 {
        self.atualizado_em
            .signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .num_days()
    }
}

/// placeholder "now" used only by tests that need a stable reference date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
