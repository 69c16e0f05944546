//! Endpoint categorization and the category catalog.
//!
//! Category resolution is a three-tier strategy, short-circuiting on the
//! first success: operation tags (enriched by spec-level `tags[]` and
//! `x-tagGroups[]` definitions), then path extraction, then the
//! `Uncategorized` fallback.

use crate::domain::{CategoryCatalogEntry, CategoryInfo, HttpMethod};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

/// Path segments that never make useful category names
const STOP_SEGMENTS: &[&str] = &["users", "resource", "id"];

static VERSION_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v\d+$").expect("version pattern"));

/// Resolves categories for endpoints using spec-level tag metadata
#[derive(Debug, Default)]
pub struct CategorizationEngine {
    /// tag name → (description, x-displayName)
    tag_definitions: Vec<TagDefinition>,
    /// group name → member tag names
    tag_groups: Vec<TagGroup>,
}

#[derive(Debug, Clone)]
struct TagDefinition {
    name: String,
    description: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Clone)]
struct TagGroup {
    name: String,
    tags: Vec<String>,
}

impl CategorizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from a parsed document's `tags` and `x-tagGroups`
    pub fn from_document(document: &Value) -> Self {
        let mut engine = Self::new();
        if let Some(tags) = document.get("tags").and_then(|t| t.as_array()) {
            engine.set_tag_definitions(tags);
        }
        if let Some(groups) = document.get("x-tagGroups").and_then(|g| g.as_array()) {
            engine.set_tag_groups(groups);
        }
        engine
    }

    pub fn set_tag_definitions(&mut self, tags: &[Value]) {
        self.tag_definitions = tags
            .iter()
            .filter_map(|tag| {
                let name = tag.get("name")?.as_str()?.to_string();
                Some(TagDefinition {
                    name,
                    description: tag.get("description").and_then(|d| d.as_str()).map(String::from),
                    display_name: tag
                        .get("x-displayName")
                        .and_then(|d| d.as_str())
                        .map(String::from),
                })
            })
            .collect();
    }

    pub fn set_tag_groups(&mut self, groups: &[Value]) {
        self.tag_groups = groups
            .iter()
            .filter_map(|group| {
                let name = group.get("name")?.as_str()?.to_string();
                let tags = group
                    .get("tags")
                    .and_then(|t| t.as_array())
                    .map(|tags| {
                        tags.iter().filter_map(|t| t.as_str().map(String::from)).collect()
                    })
                    .unwrap_or_default();
                Some(TagGroup { name, tags })
            })
            .collect();
    }

    /// Tier 1: derive the category from the operation's first tag
    pub fn extract_category_from_tags(&self, tags: &[String]) -> Option<CategoryInfo> {
        let first = tags.first()?;
        let definition = self.tag_definitions.iter().find(|d| &d.name == first);
        let group = self
            .tag_groups
            .iter()
            .find(|g| g.tags.iter().any(|t| t == first))
            .map(|g| g.name.clone());

        Some(CategoryInfo {
            category: normalize_category_name(first),
            display_name: Some(
                definition
                    .and_then(|d| d.display_name.clone())
                    .unwrap_or_else(|| first.clone()),
            ),
            description: definition.and_then(|d| d.description.clone()),
            category_group: group,
        })
    }

    /// Tier 2: derive a category name from the path template
    pub fn extract_category_from_path(&self, path: &str) -> Option<String> {
        path.split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .filter(|segment| *segment != "api")
            .filter(|segment| !VERSION_SEGMENT.is_match(segment))
            .filter(|segment| !segment.starts_with('{'))
            .find(|segment| !STOP_SEGMENTS.contains(&segment.to_ascii_lowercase().as_str()))
            .map(normalize_category_name)
    }

    /// Resolve category and group for an operation at `path`
    pub fn categorize_endpoint(&self, tags: &[String], path: &str) -> CategoryInfo {
        if let Some(info) = self.extract_category_from_tags(tags) {
            if !info.category.is_empty() && info.category != "uncategorized" {
                return info;
            }
        }

        if let Some(category) = self.extract_category_from_path(path) {
            if category != "uncategorized" {
                let display = title_case(&category);
                return CategoryInfo {
                    category,
                    display_name: Some(display),
                    description: None,
                    category_group: None,
                };
            }
        }

        CategoryInfo {
            category: "uncategorized".to_string(),
            display_name: Some("Uncategorized".to_string()),
            description: None,
            category_group: None,
        }
    }
}

/// Normalize a category name: lowercase, spaces/hyphens to underscores,
/// unicode letters preserved, everything else stripped.
pub fn normalize_category_name(name: impl AsRef<str>) -> String {
    let normalized: String = name
        .as_ref()
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c == ' ' || c == '-' {
                Some('_')
            } else if c.is_alphanumeric() || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    if normalized.is_empty() {
        "uncategorized".to_string()
    } else {
        normalized
    }
}

/// Normalized name back to its tag/display form: `search_promo` → `Search-Promo`
pub fn category_to_tag_form(normalized: &str) -> String {
    normalized
        .split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn title_case(name: &str) -> String {
    name.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Thread-safe aggregation of categories across one ingestion.
///
/// Additions from concurrent normalization tasks are safe; the catalog is
/// flushed into the store inside the same transaction as the endpoints.
#[derive(Debug, Default)]
pub struct CategoryCatalog {
    entries: DashMap<String, CategoryCatalogEntry>,
}

/// Sort order for catalog queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CatalogSort {
    Name,
    EndpointCount,
    Group,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one endpoint under its resolved category
    pub fn add(&self, info: &CategoryInfo, method: HttpMethod) {
        let mut entry = self.entries.entry(info.category.clone()).or_insert_with(|| {
            CategoryCatalogEntry {
                category_name: info.category.clone(),
                display_name: info
                    .display_name
                    .clone()
                    .unwrap_or_else(|| title_case(&info.category)),
                description: info.description.clone(),
                category_group: info.category_group.clone(),
                endpoint_count: 0,
                http_methods: BTreeSet::new(),
            }
        });
        entry.endpoint_count += 1;
        entry.http_methods.insert(method.as_str().to_string());
        // A later, richer resolution of the same category fills gaps
        if entry.description.is_none() {
            entry.description = info.description.clone();
        }
        if entry.category_group.is_none() {
            entry.category_group = info.category_group.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot the catalog with optional group filter and ordering
    pub fn get_categories(
        &self,
        group: Option<&str>,
        include_empty: bool,
        sort_by: CatalogSort,
    ) -> Vec<CategoryCatalogEntry> {
        let mut rows: Vec<CategoryCatalogEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|entry| match group {
                Some(g) => entry.category_group.as_deref() == Some(g),
                None => true,
            })
            .filter(|entry| include_empty || entry.endpoint_count > 0)
            .collect();

        match sort_by {
            CatalogSort::Name => rows.sort_by(|a, b| a.category_name.cmp(&b.category_name)),
            CatalogSort::EndpointCount => rows.sort_by(|a, b| {
                b.endpoint_count
                    .cmp(&a.endpoint_count)
                    .then_with(|| a.category_name.cmp(&b.category_name))
            }),
            CatalogSort::Group => rows.sort_by(|a, b| {
                a.category_group
                    .cmp(&b.category_group)
                    .then_with(|| a.category_name.cmp(&b.category_name))
            }),
        }
        rows
    }

    pub fn into_entries(self) -> Vec<CategoryCatalogEntry> {
        self.entries.into_iter().map(|(_, entry)| entry).collect()
    }
}
