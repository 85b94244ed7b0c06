use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-mostly classification referenced by tenders. Not owned by the
/// lifecycle engine; rows are seeded or managed elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub active: bool,
}

/// Free-text label to category id mapping, provided by an external
/// collaborator (synonym handling, fuzzy matching and the like live there).
pub trait CategoryResolver: Send + Sync {
    fn resolve_category_id(&self, label: &str) -> Option<CategoryId>;
}

/// Table-driven resolver used in tests and seeds.
#[derive(Clone, Debug, Default)]
pub struct StaticCategoryResolver {
    by_label: HashMap<String, CategoryId>,
}

impl StaticCategoryResolver {
    pub fn with_entry(mut self, label: impl Into<String>, id: CategoryId) -> Self {
        self.by_label.insert(label.into().to_ascii_lowercase(), id);
        self
    }
}

impl CategoryResolver for StaticCategoryResolver {
    fn resolve_category_id(&self, label: &str) -> Option<CategoryId> {
        self.by_label.get(&label.trim().to_ascii_lowercase()).copied()
    }
}
