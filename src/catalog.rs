//! Tool catalog: names, categories and icons for the available tools.
//!
//! The list is embedded at compile time from `data/tools.json`. Every lookup
//! hands out owned copies, so callers cannot alter the catalog.

use crate::error::FileKitError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static BUILTIN: Lazy<Result<Vec<ToolDescriptor>, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../data/tools.json")).map_err(|e| e.to_string())
});

/// Display metadata for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: u32,
    /// Tool id understood by [`crate::tool::ToolRequest::from_parts`].
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    #[serde(default)]
    pub popular: bool,
}

#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// The embedded catalog.
    pub fn builtin() -> Result<Self, FileKitError> {
        match &*BUILTIN {
            Ok(tools) => Ok(Self {
                tools: tools.clone(),
            }),
            Err(e) => Err(FileKitError::Internal(format!("embedded tool list: {e}"))),
        }
    }

    /// A catalog over a JSON array of tool records.
    pub fn from_json(json: &str) -> Result<Self, FileKitError> {
        let tools = serde_json::from_str(json)
            .map_err(|e| FileKitError::Validation(format!("tool list: {e}")))?;
        Ok(Self { tools })
    }

    pub async fn get_all(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }

    pub async fn get_by_id(&self, id: u32) -> Result<ToolDescriptor, FileKitError> {
        self.tools
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| FileKitError::NotFound { id: id.to_string() })
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<ToolDescriptor, FileKitError> {
        self.tools
            .iter()
            .find(|t| t.slug == slug)
            .cloned()
            .ok_or_else(|| FileKitError::NotFound {
                id: slug.to_string(),
            })
    }

    pub async fn get_by_category(&self, category: &str) -> Vec<ToolDescriptor> {
        self.filtered(|t| t.category == category)
    }

    pub async fn get_popular(&self) -> Vec<ToolDescriptor> {
        self.filtered(|t| t.popular)
    }

    /// Case-insensitive substring search over name, description and
    /// category. A blank query returns everything.
    pub async fn search(&self, query: &str) -> Vec<ToolDescriptor> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.tools.clone();
        }
        self.filtered(|t| {
            t.name.to_lowercase().contains(&query)
                || t.description.to_lowercase().contains(&query)
                || t.category.to_lowercase().contains(&query)
        })
    }

    fn filtered(&self, keep: impl Fn(&ToolDescriptor) -> bool) -> Vec<ToolDescriptor> {
        self.tools.iter().filter(|t| keep(t)).cloned().collect()
    }
}
