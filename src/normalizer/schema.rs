//! Schema component normalization.
//!
//! Builds one [`SchemaComponent`] per entry of `components.schemas` (or
//! `definitions` on Swagger 2.0), classifies each definition into the tagged
//! [`SchemaNode`] shape, records direct `$ref` dependencies, and marks
//! reference cycles. Cyclic edges are annotated, never removed.

use crate::domain::{CompositionMode, SchemaComponent, SchemaNode, SchemaType};
use crate::normalizer::extensions;
use crate::normalizer::refs::{collect_schema_refs, normalize_schema_ref, RefTarget};
use crate::parser::SpecVersion;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Result of normalizing the schema section
#[derive(Debug, Default)]
pub struct NormalizedSchemas {
    pub schemas: Vec<SchemaComponent>,
    /// Cycles found in the dependency graph, each a closed name path
    pub cycles: Vec<Vec<String>>,
    pub warnings: Vec<String>,
}

/// Normalize every schema component in the document
pub fn normalize_schemas(document: &Value, version: SpecVersion) -> NormalizedSchemas {
    let section = if version == SpecVersion::V2 {
        document.get("definitions")
    } else {
        document.get("components").and_then(|c| c.get("schemas"))
    };

    let Some(map) = section.and_then(|s| s.as_object()) else {
        return NormalizedSchemas::default();
    };

    let mut result = NormalizedSchemas::default();
    let mut dependency_graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (name, raw) in map {
        let mut dependencies = BTreeSet::new();
        let mut unresolved = Vec::new();
        collect_schema_refs(raw, &mut dependencies, &mut unresolved);
        // A self-description is legal but not a dependency edge worth warning on
        for reference in unresolved {
            result
                .warnings
                .push(format!("schema '{name}': unresolvable reference '{reference}' preserved"));
        }

        dependency_graph.insert(name.clone(), dependencies.clone());

        let node = classify_node(raw);
        let schema_type = raw
            .get("type")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse::<SchemaType>().ok());

        let component = SchemaComponent {
            id: None,
            api_id: 0,
            name: name.clone(),
            title: raw.get("title").and_then(|t| t.as_str()).map(String::from),
            schema_type,
            format: raw.get("format").and_then(|f| f.as_str()).map(String::from),
            description: raw.get("description").and_then(|d| d.as_str()).map(String::from),
            searchable_text: build_searchable_text(name, raw),
            node,
            raw: raw.clone(),
            example: raw.get("example").cloned(),
            deprecated: raw.get("deprecated").and_then(|d| d.as_bool()).unwrap_or(false),
            extensions: extensions::extract_extensions(raw),
            schema_dependencies: dependencies,
            circular: false,
            reference_count: 0,
        };
        result.schemas.push(component);
    }

    result.cycles = find_cycles(&dependency_graph);
    let circular_names: BTreeSet<&String> = result.cycles.iter().flatten().collect();
    for schema in &mut result.schemas {
        if circular_names.contains(&schema.name) {
            schema.circular = true;
        }
    }

    result
}

/// Classify a raw schema fragment into the tagged node shape
pub fn classify_node(raw: &Value) -> SchemaNode {
    let Some(map) = raw.as_object() else {
        return SchemaNode::Opaque;
    };

    if let Some(reference) = map.get("$ref").and_then(|r| r.as_str()) {
        return match normalize_schema_ref(reference) {
            RefTarget::Schema(target) => SchemaNode::Reference { target, resolved: true },
            RefTarget::Unresolved(target) => SchemaNode::Reference { target, resolved: false },
        };
    }

    for mode in [CompositionMode::AllOf, CompositionMode::OneOf, CompositionMode::AnyOf] {
        if let Some(parts) = map.get(mode.key()).and_then(|p| p.as_array()) {
            return SchemaNode::Composite {
                mode,
                parts: parts.iter().map(classify_node).collect(),
                discriminator: map
                    .get("discriminator")
                    .and_then(|d| d.get("propertyName"))
                    .and_then(|p| p.as_str())
                    .map(String::from),
            };
        }
    }

    let declared_type = map.get("type").and_then(|t| t.as_str());
    match declared_type {
        Some("object") => SchemaNode::Object {
            properties: classify_properties(map),
            required: required_names(map),
        },
        Some("array") => SchemaNode::Array {
            items: Box::new(map.get("items").map(classify_node).unwrap_or(SchemaNode::Opaque)),
        },
        Some(primitive) => match primitive.parse::<SchemaType>() {
            Ok(schema_type) => SchemaNode::Primitive {
                schema_type,
                format: map.get("format").and_then(|f| f.as_str()).map(String::from),
            },
            Err(_) => SchemaNode::Opaque,
        },
        // Untyped object-shaped definitions are common in the wild
        None if map.contains_key("properties") => SchemaNode::Object {
            properties: classify_properties(map),
            required: required_names(map),
        },
        None => SchemaNode::Opaque,
    }
}

fn classify_properties(map: &serde_json::Map<String, Value>) -> indexmap::IndexMap<String, SchemaNode> {
    map.get("properties")
        .and_then(|p| p.as_object())
        .map(|props| props.iter().map(|(k, v)| (k.clone(), classify_node(v))).collect())
        .unwrap_or_default()
}

fn required_names(map: &serde_json::Map<String, Value>) -> Vec<String> {
    map.get("required")
        .and_then(|r| r.as_array())
        .map(|names| names.iter().filter_map(|n| n.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn build_searchable_text(name: &str, raw: &Value) -> String {
    let mut parts = vec![name.to_string()];
    for field in ["title", "description"] {
        if let Some(text) = raw.get(field).and_then(|v| v.as_str()) {
            parts.push(text.to_string());
        }
    }
    if let Some(properties) = raw.get("properties").and_then(|p| p.as_object()) {
        parts.extend(properties.keys().cloned());
    }
    parts.join(" ")
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Find reference cycles with a grey/black DFS coloring.
///
/// Each returned cycle is the closed path of names, starting and ending at
/// the node where the back edge landed.
pub fn find_cycles(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let mut colors: HashMap<&String, Color> =
        graph.keys().map(|name| (name, Color::White)).collect();
    let mut cycles = Vec::new();

    for start in graph.keys() {
        if colors[start] == Color::White {
            let mut stack = Vec::new();
            visit(start, graph, &mut colors, &mut stack, &mut cycles);
        }
    }
    cycles
}

fn visit<'a>(
    node: &'a String,
    graph: &'a BTreeMap<String, BTreeSet<String>>,
    colors: &mut HashMap<&'a String, Color>,
    stack: &mut Vec<&'a String>,
    cycles: &mut Vec<Vec<String>>,
) {
    colors.insert(node, Color::Grey);
    stack.push(node);

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            match colors.get(dep).copied() {
                // Edges into undeclared schemas are broken references,
                // handled elsewhere; they cannot form a cycle
                None => continue,
                Some(Color::White) => visit(dep, graph, colors, stack, cycles),
                Some(Color::Grey) => {
                    let from = stack.iter().position(|n| *n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|n| (*n).clone()).collect();
                    cycle.push(dep.clone());
                    cycles.push(cycle);
                }
                Some(Color::Black) => {}
            }
        }
    }

    stack.pop();
    colors.insert(node, Color::Black);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_with_schemas(schemas: Value) -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "T", "version": "1"},
            "paths": {},
            "components": {"schemas": schemas}
        })
    }

    #[test]
    fn test_normalizes_object_schema() {
        let doc = doc_with_schemas(json!({
            "User": {
                "type": "object",
                "title": "A user",
                "description": "System user record",
                "properties": {
                    "id": {"type": "integer", "format": "int64"},
                    "name": {"type": "string"}
                },
                "required": ["id"]
            }
        }));

        let result = normalize_schemas(&doc, SpecVersion::V30);
        assert_eq!(result.schemas.len(), 1);
        let user = &result.schemas[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.schema_type, Some(SchemaType::Object));
        assert!(user.searchable_text.contains("System user record"));
        match &user.node {
            SchemaNode::Object { properties, required } => {
                assert_eq!(properties.len(), 2);
                assert_eq!(required, &["id".to_string()]);
            }
            other => panic!("expected object node, got {other:?}"),
        }
    }

    #[test]
    fn test_swagger2_definitions_section() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "T", "version": "1"},
            "paths": {},
            "definitions": {"Pet": {"type": "object"}}
        });
        let result = normalize_schemas(&doc, SpecVersion::V2);
        assert_eq!(result.schemas.len(), 1);
        assert_eq!(result.schemas[0].name, "Pet");
    }

    #[test]
    fn test_dependencies_collected() {
        let doc = doc_with_schemas(json!({
            "Post": {
                "type": "object",
                "properties": {
                    "author": {"$ref": "#/components/schemas/User"},
                    "comments": {"type": "array", "items": {"$ref": "#/components/schemas/Comment"}}
                }
            },
            "User": {"type": "object"},
            "Comment": {"type": "object"}
        }));

        let result = normalize_schemas(&doc, SpecVersion::V30);
        let post = result.schemas.iter().find(|s| s.name == "Post").unwrap();
        assert!(post.schema_dependencies.contains("User"));
        assert!(post.schema_dependencies.contains("Comment"));
    }

    #[test]
    fn test_cycle_marked_not_removed() {
        let doc = doc_with_schemas(json!({
            "User": {
                "type": "object",
                "properties": {"posts": {"type": "array", "items": {"$ref": "#/components/schemas/Post"}}}
            },
            "Post": {
                "type": "object",
                "properties": {"author": {"$ref": "#/components/schemas/User"}}
            },
            "Tag": {"type": "string"}
        }));

        let result = normalize_schemas(&doc, SpecVersion::V30);
        assert_eq!(result.cycles.len(), 1);
        let cycle = &result.cycles[0];
        assert!(cycle.contains(&"User".to_string()));
        assert!(cycle.contains(&"Post".to_string()));

        let user = result.schemas.iter().find(|s| s.name == "User").unwrap();
        let tag = result.schemas.iter().find(|s| s.name == "Tag").unwrap();
        assert!(user.circular);
        assert!(!tag.circular);
        // The cyclic edge is still present in the dependency set
        assert!(user.schema_dependencies.contains("Post"));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let doc = doc_with_schemas(json!({
            "Node": {
                "type": "object",
                "properties": {"children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}}
            }
        }));
        let result = normalize_schemas(&doc, SpecVersion::V30);
        assert_eq!(result.cycles, vec![vec!["Node".to_string(), "Node".to_string()]]);
        assert!(result.schemas[0].circular);
    }

    #[test]
    fn test_composition_classified() {
        let doc = doc_with_schemas(json!({
            "Animal": {
                "oneOf": [
                    {"$ref": "#/components/schemas/Cat"},
                    {"$ref": "#/components/schemas/Dog"}
                ],
                "discriminator": {"propertyName": "kind"}
            },
            "Cat": {"type": "object"},
            "Dog": {"type": "object"}
        }));

        let result = normalize_schemas(&doc, SpecVersion::V30);
        let animal = result.schemas.iter().find(|s| s.name == "Animal").unwrap();
        match &animal.node {
            SchemaNode::Composite { mode, parts, discriminator } => {
                assert_eq!(*mode, CompositionMode::OneOf);
                assert_eq!(parts.len(), 2);
                assert_eq!(discriminator.as_deref(), Some("kind"));
            }
            other => panic!("expected composite, got {other:?}"),
        }
    }

    #[test]
    fn test_external_reference_warns_and_preserves() {
        let doc = doc_with_schemas(json!({
            "Error": {"$ref": "common.json#/definitions/Error"}
        }));
        let result = normalize_schemas(&doc, SpecVersion::V30);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("common.json#/definitions/Error"));
        match &result.schemas[0].node {
            SchemaNode::Reference { target, resolved } => {
                assert_eq!(target, "common.json#/definitions/Error");
                assert!(!resolved);
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }
}
