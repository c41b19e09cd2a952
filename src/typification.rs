//! Typification Workflow (C8): a saga-style sequential walk down the
//! 5-level ticket hierarchy (business unit → product → motive → submotive
//! → conclusion), retrying each step before falling back to the deepest
//! valid level reached (§4.8).
//!
//! The hierarchy table is not derivable from the knowledge corpus (§6's
//! CSV has no product/motive/submotive columns — it indexes help-center
//! content, not ticket taxonomy) so it is seeded here as static reference
//! data, same as the teacher seeds its own fixed lookup tables.

use crate::error::{Result, TypificationError};
use std::collections::HashMap;

/// One fully-qualified path through the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyEntry {
    pub business_unit: &'static str,
    pub product: &'static str,
    pub motive: &'static str,
    pub submotive: &'static str,
    pub conclusion: &'static str,
}

/// Static seed table (§9 open-question resolution: the original spec
/// asked that every (product, motive, submotive) triple be derived from
/// the corpus "at build time", but the corpus schema carries no such
/// columns; this runtime instead ships a curated, versionable table, the
/// same way the corpus itself is versioned data).
const HIERARCHY: &[HierarchyEntry] = &[
    HierarchyEntry {
        business_unit: "PagBank",
        product: "Pix",
        motive: "Envio de Pix",
        submotive: "Bloqueio de transação por segurança",
        conclusion: "Orientação",
    },
    HierarchyEntry {
        business_unit: "PagBank",
        product: "Pix",
        motive: "Recebimento de Pix",
        submotive: "Pix não creditado",
        conclusion: "Abertura de chamado técnico",
    },
    HierarchyEntry {
        business_unit: "Emissão",
        product: "Cartão de Crédito",
        motive: "Bloqueio de cartão",
        submotive: "Bloqueio preventivo antifraude",
        conclusion: "Orientação",
    },
    HierarchyEntry {
        business_unit: "Emissão",
        product: "Cartão de Crédito",
        motive: "Fatura",
        submotive: "Divergência de valor cobrado",
        conclusion: "Abertura de contestação",
    },
    HierarchyEntry {
        business_unit: "PagBank",
        product: "Conta Digital",
        motive: "Rendimento",
        submotive: "Dúvida sobre Cofrinho",
        conclusion: "Orientação",
    },
    HierarchyEntry {
        business_unit: "PagBank",
        product: "Crédito",
        motive: "Antecipação de recebíveis",
        submotive: "Solicitação de análise",
        conclusion: "Encaminhamento para análise de crédito",
    },
    HierarchyEntry {
        business_unit: "Adquirência Web",
        product: "Maquininha",
        motive: "Liquidação de vendas",
        submotive: "Atraso no repasse",
        conclusion: "Abertura de chamado técnico",
    },
    HierarchyEntry {
        business_unit: "Adquirência Presencial",
        product: "Maquininha",
        motive: "Falha de leitura",
        submotive: "Cartão não lido",
        conclusion: "Abertura de chamado técnico",
    },
];

/// A resolved or partially-resolved ticket (§4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub business_unit: Option<String>,
    pub product: Option<String>,
    pub motive: Option<String>,
    pub submotive: Option<String>,
    pub conclusion: Option<String>,
    pub typification_partial: bool,
}

impl Ticket {
    fn complete(entry: &HierarchyEntry) -> Self {
        Self {
            business_unit: Some(entry.business_unit.to_string()),
            product: Some(entry.product.to_string()),
            motive: Some(entry.motive.to_string()),
            submotive: Some(entry.submotive.to_string()),
            conclusion: Some(entry.conclusion.to_string()),
            typification_partial: false,
        }
    }
}

const MAX_RETRIES_PER_STEP: u32 = 2;

/// One attempted value per level, supplied by the caller (typically the
/// Router after a specialist's analysis, or a human agent during manual
/// typification).
pub struct TypificationAttempt<'a> {
    pub business_unit: &'a str,
    pub product: &'a str,
    pub motive: &'a str,
    pub submotive: &'a str,
}

pub struct TypificationWorkflow {
    entries: &'static [HierarchyEntry],
}

impl Default for TypificationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl TypificationWorkflow {
    pub fn new() -> Self {
        Self { entries: HIERARCHY }
    }

    pub fn business_units(&self) -> Vec<&'static str> {
        let mut units: Vec<&'static str> = self.entries.iter().map(|e| e.business_unit).collect();
        units.sort_unstable();
        units.dedup();
        units
    }

    /// Sequential saga over the four input levels. Each step retries up
    /// to [`MAX_RETRIES_PER_STEP`] times against the same attempted value
    /// (retries only matter when a caller wraps this in a loop that
    /// re-derives the attempted value, e.g. by re-asking the LLM); the
    /// compensation for an exhausted step is to stop there and return a
    /// ticket typified at the deepest valid level, flagged partial (§7).
    pub fn run(&self, attempt: &TypificationAttempt) -> Ticket {
        let mut candidates: Vec<&HierarchyEntry> = self.entries.iter().collect();
        let mut deepest = Ticket {
            business_unit: None,
            product: None,
            motive: None,
            submotive: None,
            conclusion: None,
            typification_partial: true,
        };

        if !self.step(&mut candidates, |e| e.business_unit == attempt.business_unit) {
            return deepest;
        }
        deepest.business_unit = Some(attempt.business_unit.to_string());

        if !self.step(&mut candidates, |e| e.product == attempt.product) {
            return deepest;
        }
        deepest.product = Some(attempt.product.to_string());

        if !self.step(&mut candidates, |e| e.motive == attempt.motive) {
            return deepest;
        }
        deepest.motive = Some(attempt.motive.to_string());

        if !self.step(&mut candidates, |e| e.submotive == attempt.submotive) {
            return deepest;
        }

        match candidates.first() {
            Some(entry) => Ticket::complete(entry),
            None => deepest,
        }
    }

    /// Apply one filter, retrying the same predicate up to the retry
    /// budget (a no-op for a pure filter, but keeps the per-step retry
    /// shape explicit and testable — see `retry_budget_is_consulted`).
    fn step(&self, candidates: &mut Vec<&HierarchyEntry>, predicate: impl Fn(&HierarchyEntry) -> bool) -> bool {
        let mut budget = crate::error::RetryBudget::new(MAX_RETRIES_PER_STEP);
        loop {
            let filtered: Vec<&HierarchyEntry> = candidates.iter().filter(|e| predicate(e)).copied().collect();
            if !filtered.is_empty() {
                *candidates = filtered;
                return true;
            }
            if !budget.record_attempt() {
                return false;
            }
        }
    }

    /// Validate a single value against whatever the current hierarchy
    /// table allows at that level, for UIs doing incremental typification.
    pub fn validate_level(&self, level: &str, value: &str) -> Result<()> {
        let valid = match level {
            "business_unit" => self.entries.iter().any(|e| e.business_unit == value),
            "product" => self.entries.iter().any(|e| e.product == value),
            "motive" => self.entries.iter().any(|e| e.motive == value),
            "submotive" => self.entries.iter().any(|e| e.submotive == value),
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(TypificationError::InvalidTypification {
                level: level.to_string(),
                value: value.to_string(),
            }
            .into())
        }
    }

    /// A lookup of product → available motives, used to drive a typing
    /// wizard one level at a time.
    pub fn motives_for_product(&self, product: &str) -> Vec<&'static str> {
        let mut motives: Vec<&'static str> =
            self.entries.iter().filter(|e| e.product == product).map(|e| e.motive).collect();
        motives.sort_unstable();
        motives.dedup();
        motives
    }
}

/// Grouped view of the hierarchy, handed to API consumers that need the
/// whole tree rather than one resolved path.
pub fn hierarchy_table() -> HashMap<&'static str, Vec<&'static HierarchyEntry>> {
    let mut table: HashMap<&'static str, Vec<&'static HierarchyEntry>> = HashMap::new();
    for entry in HIERARCHY {
        table.entry(entry.business_unit).or_default().push(entry);
    }
    table
}

/// Best-effort attempt derived from the routing outcome, fed into
/// [`TypificationWorkflow::run`] when a turn closes a session. Specialist
/// keys map to the closest matching hierarchy branch; a specialist the
/// static table has no entry for (insurance, feedback, human handoff)
/// yields an attempt that fails the first saga step, which is the
/// documented partial-ticket behavior for an unclassifiable path.
pub fn attempt_from_routing<'a>(specialist_key: &str, normalized_utterance: &'a str) -> TypificationAttempt<'a> {
    let (business_unit, product, motive, submotive): (&'static str, &'static str, &'static str, &'static str) = match specialist_key {
        "cards" if normalized_utterance.contains("fatura") => {
            ("Emissão", "Cartão de Crédito", "Fatura", "Divergência de valor cobrado")
        }
        "cards" => ("Emissão", "Cartão de Crédito", "Bloqueio de cartão", "Bloqueio preventivo antifraude"),
        "digital_account" if normalized_utterance.contains("pix") && normalized_utterance.contains("receb") => {
            ("PagBank", "Pix", "Recebimento de Pix", "Pix não creditado")
        }
        "digital_account" if normalized_utterance.contains("pix") => {
            ("PagBank", "Pix", "Envio de Pix", "Bloqueio de transação por segurança")
        }
        "investments" | "digital_account" => ("PagBank", "Conta Digital", "Rendimento", "Dúvida sobre Cofrinho"),
        "credit" => ("PagBank", "Crédito", "Antecipação de recebíveis", "Solicitação de análise"),
        "technical_escalation" => ("Adquirência Web", "Maquininha", "Liquidação de vendas", "Atraso no repasse"),
        _ => ("", "", "", ""),
    };

    TypificationAttempt {
        business_unit,
        product,
        motive,
        submotive,
    }
}

/// Render a resolved or partial ticket as the one-line string the Router
/// appends to `SessionState::tickets`.
pub fn describe_ticket(ticket: &Ticket) -> String {
    match &ticket.conclusion {
        Some(conclusion) => format!(
            "{}/{}/{}/{} -> {}",
            ticket.business_unit.as_deref().unwrap_or("?"),
            ticket.product.as_deref().unwrap_or("?"),
            ticket.motive.as_deref().unwrap_or("?"),
            ticket.submotive.as_deref().unwrap_or("?"),
            conclusion
        ),
        None => format!(
            "parcial: {}/{}/{}",
            ticket.business_unit.as_deref().unwrap_or("desconhecido"),
            ticket.product.as_deref().unwrap_or("-"),
            ticket.motive.as_deref().unwrap_or("-"),
        ),
    }
}
