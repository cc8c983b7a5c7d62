//! Typed view over the crate's JSON-LD metadata.
//!
//! RO-Crate metadata is flattened, compacted JSON-LD: a top-level object
//! with `@context` and an `@graph` array of entities, each carrying `@id`
//! and usually `@type`. No context expansion is attempted; property names
//! and type names are compared exactly as written in the document.

use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// The metadata descriptor's well-known entity identifier.
pub const DESCRIPTOR_ID: &str = "ro-crate-metadata.json";

/// One entity of the `@graph`.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub types: Vec<String>,
    pub properties: Map<String, Json>,
}

impl Node {
    pub fn has_type(&self, t: &str) -> bool {
        self.types.iter().any(|x| x == t)
    }

    /// Values of a property, flattening arrays. Missing ⇒ empty.
    pub fn values(&self, property: &str) -> Vec<&Json> {
        match self.properties.get(property) {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
            Some(v) => vec![v],
        }
    }

    /// Identifiers referenced by a property (`{"@id": ...}` values).
    pub fn references(&self, property: &str) -> Vec<&str> {
        self.values(property)
            .into_iter()
            .filter_map(reference_id)
            .collect()
    }
}

/// `{"@id": "x"}` ⇒ `Some("x")`.
pub fn reference_id(value: &Json) -> Option<&str> {
    value.as_object()?.get("@id")?.as_str()
}

#[derive(Debug, Clone)]
/// Entities of the metadata document, indexed by `@id` in document order.
pub struct MetadataGraph {
    nodes: Vec<Node>,
    index: BTreeMap<String, usize>,
}

impl MetadataGraph {
    /// Build the graph from a parsed metadata document.
    ///
    /// Fails when the document is not an object with an `@graph` array of
    /// objects carrying a string `@id`.
    pub fn from_json(doc: &Json) -> Result<MetadataGraph, String> {
        let obj = doc
            .as_object()
            .ok_or_else(|| "metadata document is not a JSON object".to_string())?;
        let graph = obj
            .get("@graph")
            .and_then(Json::as_array)
            .ok_or_else(|| "metadata document has no `@graph` array".to_string())?;
        Self::from_entities(graph)
    }

    pub fn from_entities(entities: &[Json]) -> Result<MetadataGraph, String> {
        let mut nodes = Vec::with_capacity(entities.len());
        let mut index = BTreeMap::new();
        for (pos, entity) in entities.iter().enumerate() {
            let map = entity
                .as_object()
                .ok_or_else(|| format!("`@graph` entry #{} is not an object", pos))?;
            let id = map
                .get("@id")
                .and_then(Json::as_str)
                .ok_or_else(|| format!("`@graph` entry #{} has no string `@id`", pos))?
                .to_string();
            let types = match map.get("@type") {
                Some(Json::String(s)) => vec![s.clone()],
                Some(Json::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            let properties = map
                .iter()
                .filter(|(k, _)| k.as_str() != "@id" && k.as_str() != "@type")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            // Later duplicates shadow earlier ones for lookups; both stay in `nodes`.
            index.insert(id.clone(), nodes.len());
            nodes.push(Node {
                id,
                types,
                properties,
            });
        }
        Ok(MetadataGraph { nodes, index })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes_of_type<'a>(&'a self, t: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.has_type(t))
    }

    /// The metadata file descriptor entity.
    pub fn descriptor(&self) -> Option<&Node> {
        self.node(DESCRIPTOR_ID)
            .or_else(|| self.node(&format!("./{}", DESCRIPTOR_ID)))
    }

    /// The root data entity, i.e. the target of the descriptor's `about`.
    pub fn root_data_entity(&self) -> Option<&Node> {
        let about = self.descriptor()?.references("about");
        about.first().and_then(|id| self.node(id))
    }

    /// Transitive `rdfs:subClassOf` closure of a class within this graph.
    ///
    /// Used when the graph is an ontology.
    pub fn subclasses_of(&self, class: &str) -> Vec<String> {
        let mut out = vec![class.to_string()];
        let mut i = 0;
        while i < out.len() {
            let current = out[i].clone();
            for n in &self.nodes {
                let parents = n.references("rdfs:subClassOf");
                if parents.iter().any(|p| *p == current) && !out.contains(&n.id) {
                    out.push(n.id.clone());
                }
            }
            i += 1;
        }
        out
    }
}
