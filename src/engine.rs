//! Conformance engine boundary and the built-in shape engine.
//!
//! Graph-constraint checks hand a shape fragment and the crate's metadata
//! graph to a [`ConformanceEngine`] and translate the returned violations
//! into issues. The engine owns constraint semantics; the validator only
//! consumes [`ConformanceReport`].
//!
//! [`BuiltinShapeEngine`] evaluates a small SHACL-like constraint set
//! (cardinality, datatype, pattern, class, hasValue, in) directly over
//! [`MetadataGraph`].

use crate::error::EngineError;
use crate::graph::{reference_id, MetadataGraph, Node};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq)]
/// How a shape selects its focus nodes.
pub enum ShapeTarget {
    /// A fixed entity identifier.
    Node(String),
    /// Every entity carrying the type.
    Class(String),
    /// The root data entity (target of the descriptor's `about`).
    RootDataEntity,
    /// The metadata file descriptor entity.
    Descriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
    Number,
    Boolean,
    Iri,
    Date,
}

impl Datatype {
    pub fn parse(s: &str) -> Option<Datatype> {
        let local = s.rsplit([':', '#']).next().unwrap_or(s);
        match local.to_ascii_lowercase().as_str() {
            "string" | "text" => Some(Datatype::String),
            "integer" | "int" => Some(Datatype::Integer),
            "number" | "decimal" | "double" | "float" => Some(Datatype::Number),
            "boolean" | "bool" => Some(Datatype::Boolean),
            "iri" | "anyuri" | "id" => Some(Datatype::Iri),
            "date" | "datetime" => Some(Datatype::Date),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Datatype::String => "string",
            Datatype::Integer => "integer",
            Datatype::Number => "number",
            Datatype::Boolean => "boolean",
            Datatype::Iri => "IRI reference",
            Datatype::Date => "ISO 8601 date",
        }
    }

    fn accepts(self, value: &Json) -> bool {
        static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^\d{4}(-\d{2}(-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?)?)?$")
                .expect("static regex")
        });
        match self {
            Datatype::String => value.is_string(),
            Datatype::Integer => value.is_i64() || value.is_u64(),
            Datatype::Number => value.is_number(),
            Datatype::Boolean => value.is_boolean(),
            Datatype::Iri => reference_id(value).is_some(),
            Datatype::Date => value.as_str().is_some_and(|s| ISO_DATE.is_match(s)),
        }
    }
}

#[derive(Debug, Clone)]
/// One property constraint of a shape.
pub struct PropertyConstraint {
    /// Identifier reported back as the violation's source constraint.
    pub id: String,
    pub path: String,
    pub min_count: Option<usize>,
    pub max_count: Option<usize>,
    pub datatype: Option<Datatype>,
    pub pattern: Option<Regex>,
    pub class: Option<String>,
    pub has_value: Option<Json>,
    pub in_values: Vec<Json>,
    pub message: Option<String>,
    /// Engine-vocabulary severity (`sh:Violation`, `sh:Warning`, `sh:Info`);
    /// `None` leaves the choice to the caller.
    pub severity: Option<String>,
}

impl PropertyConstraint {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        PropertyConstraint {
            id: id.into(),
            path: path.into(),
            min_count: None,
            max_count: None,
            datatype: None,
            pattern: None,
            class: None,
            has_value: None,
            in_values: Vec::new(),
            message: None,
            severity: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub name: String,
    pub target: ShapeTarget,
    pub properties: Vec<PropertyConstraint>,
}

impl Shape {
    /// A copy of this shape restricted to a single property constraint.
    pub fn fragment(&self, constraint: &PropertyConstraint) -> Shape {
        Shape {
            name: self.name.clone(),
            target: self.target.clone(),
            properties: vec![constraint.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferenceMode {
    #[default]
    None,
    /// Expand class targets and `class` constraints via `rdfs:subClassOf`.
    Rdfs,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions<'a> {
    pub ontology: Option<&'a MetadataGraph>,
    pub inference: InferenceMode,
    pub abort_on_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub focus_node: String,
    pub result_path: Option<String>,
    pub value: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub source_constraint: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConformanceReport {
    pub conforms: bool,
    pub violations: Vec<Violation>,
}

/// External graph-constraint conformance engine.
pub trait ConformanceEngine: Send + Sync {
    fn validate(
        &self,
        shapes: &[Shape],
        data: &MetadataGraph,
        options: &EngineOptions<'_>,
    ) -> Result<ConformanceReport, EngineError>;
}

/// Engine evaluating [`Shape`]s directly over the metadata graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinShapeEngine;

impl ConformanceEngine for BuiltinShapeEngine {
    fn validate(
        &self,
        shapes: &[Shape],
        data: &MetadataGraph,
        options: &EngineOptions<'_>,
    ) -> Result<ConformanceReport, EngineError> {
        let mut violations: Vec<Violation> = Vec::new();
        for shape in shapes {
            for prop in &shape.properties {
                if prop.path.trim().is_empty() {
                    return Err(EngineError::InvalidShape {
                        shape: shape.name.clone(),
                        reason: format!("constraint `{}` has an empty path", prop.id),
                    });
                }
            }
            for focus in focus_nodes(shape, data, options) {
                let node = data.node(&focus);
                for prop in &shape.properties {
                    evaluate_property(&focus, node, prop, data, options, &mut violations);
                    if options.abort_on_first && !violations.is_empty() {
                        violations.truncate(1);
                        return Ok(ConformanceReport {
                            conforms: false,
                            violations,
                        });
                    }
                }
            }
        }
        Ok(ConformanceReport {
            conforms: violations.is_empty(),
            violations,
        })
    }
}

fn expand_class(class: &str, options: &EngineOptions<'_>) -> Vec<String> {
    match (options.inference, options.ontology) {
        (InferenceMode::Rdfs, Some(onto)) => onto.subclasses_of(class),
        _ => vec![class.to_string()],
    }
}

fn has_class(node: &Node, class: &str, options: &EngineOptions<'_>) -> bool {
    expand_class(class, options).iter().any(|c| node.has_type(c))
}

fn focus_nodes(shape: &Shape, data: &MetadataGraph, options: &EngineOptions<'_>) -> Vec<String> {
    match &shape.target {
        ShapeTarget::Node(id) => vec![id.clone()],
        ShapeTarget::Class(c) => data
            .nodes()
            .iter()
            .filter(|n| has_class(n, c, options))
            .map(|n| n.id.clone())
            .collect(),
        ShapeTarget::RootDataEntity => data
            .root_data_entity()
            .map(|n| vec![n.id.clone()])
            .unwrap_or_default(),
        ShapeTarget::Descriptor => data
            .descriptor()
            .map(|n| vec![n.id.clone()])
            .unwrap_or_default(),
    }
}

fn render_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => reference_id(other)
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn value_matches(actual: &Json, expected: &Json) -> bool {
    if actual == expected {
        return true;
    }
    match (reference_id(actual), expected.as_str()) {
        (Some(id), Some(s)) => id == s,
        _ => false,
    }
}

fn evaluate_property(
    focus: &str,
    node: Option<&Node>,
    prop: &PropertyConstraint,
    data: &MetadataGraph,
    options: &EngineOptions<'_>,
    out: &mut Vec<Violation>,
) {
    let values: Vec<&Json> = node.map(|n| n.values(&prop.path)).unwrap_or_default();
    let mut emit = |value: Option<String>, default_msg: String| {
        out.push(Violation {
            focus_node: focus.to_string(),
            result_path: Some(prop.path.clone()),
            value,
            message: prop.message.clone().unwrap_or(default_msg),
            severity: prop.severity.clone(),
            source_constraint: prop.id.clone(),
        });
    };

    if let Some(min) = prop.min_count {
        if values.len() < min {
            emit(
                None,
                format!(
                    "`{}` must have at least {} value(s) for `{}`, found {}",
                    focus,
                    min,
                    prop.path,
                    values.len()
                ),
            );
        }
    }
    if let Some(max) = prop.max_count {
        if values.len() > max {
            emit(
                None,
                format!(
                    "`{}` must have at most {} value(s) for `{}`, found {}",
                    focus,
                    max,
                    prop.path,
                    values.len()
                ),
            );
        }
    }
    for v in &values {
        if let Some(dt) = prop.datatype {
            if !dt.accepts(v) {
                emit(
                    Some(render_value(v)),
                    format!("`{}` of `{}` must be a {}", prop.path, focus, dt.name()),
                );
            }
        }
        if let Some(re) = &prop.pattern {
            let text = v
                .as_str()
                .map(str::to_string)
                .or_else(|| reference_id(v).map(str::to_string));
            if !text.as_deref().is_some_and(|t| re.is_match(t)) {
                emit(
                    Some(render_value(v)),
                    format!(
                        "`{}` of `{}` does not match pattern `{}`",
                        prop.path,
                        focus,
                        re.as_str()
                    ),
                );
            }
        }
        if let Some(class) = &prop.class {
            let ok = reference_id(v)
                .and_then(|id| data.node(id))
                .is_some_and(|n| has_class(n, class, options));
            if !ok {
                emit(
                    Some(render_value(v)),
                    format!(
                        "`{}` of `{}` must reference an entity of type `{}`",
                        prop.path, focus, class
                    ),
                );
            }
        }
        if !prop.in_values.is_empty() && !prop.in_values.iter().any(|e| value_matches(v, e)) {
            emit(
                Some(render_value(v)),
                format!(
                    "`{}` of `{}` must be one of the allowed values",
                    prop.path, focus
                ),
            );
        }
    }
    if let Some(expected) = &prop.has_value {
        if !values.iter().any(|v| value_matches(v, expected)) {
            emit(
                None,
                format!(
                    "`{}` of `{}` must include `{}`",
                    prop.path,
                    focus,
                    render_value(expected)
                ),
            );
        }
    }
}
