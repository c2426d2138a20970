//! Case-study catalog port.
//!
//! Completion output references case studies by id; the catalog resolves
//! those references to full entries. Unknown ids are dropped rather than
//! failing the turn, so a hallucinated reference never costs the user their
//! response.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A published case study the assistant can recommend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStudy {
    pub id: String,
    pub title: String,
    pub summary: String,
}

/// Read-only lookup over the case-study content source.
#[async_trait]
pub trait CaseStudyCatalog: Send + Sync {
    /// Resolves `ids` to catalog entries, preserving input order.
    ///
    /// Ids with no catalog entry are silently dropped.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CaseStudy>>;

    /// Lists every catalog entry.
    async fn list_all(&self) -> Result<Vec<CaseStudy>>;
}

/// In-memory catalog backed by a fixed set of entries.
pub struct InMemoryCaseStudyCatalog {
    entries: HashMap<String, CaseStudy>,
    order: Vec<String>,
}

impl InMemoryCaseStudyCatalog {
    /// Builds a catalog from the given entries.
    pub fn new(entries: impl IntoIterator<Item = CaseStudy>) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for entry in entries {
            order.push(entry.id.clone());
            map.insert(entry.id.clone(), entry);
        }
        Self {
            entries: map,
            order,
        }
    }
}

#[async_trait]
impl CaseStudyCatalog for InMemoryCaseStudyCatalog {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CaseStudy>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<CaseStudy>> {
        Ok(self
            .order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect())
    }
}
