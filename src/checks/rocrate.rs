//! Built-in predicates of the base RO-Crate profile.
//!
//! Descriptor checks inspect the raw file and its JSON; entity checks use
//! the metadata graph and pass vacuously when it cannot be built.

use super::{graph_or_skip, is_local_reference, IssueSink, PredicateRegistry};
use crate::context::{DescriptorError, ValidationContext, DESCRIPTOR_FILE};
use crate::error::CheckError;
use serde_json::Value as Json;

pub fn register(reg: &mut PredicateRegistry) {
    reg.register("rocrate.file_descriptor_exists", file_descriptor_exists);
    reg.register("rocrate.file_descriptor_not_empty", file_descriptor_not_empty);
    reg.register("rocrate.file_descriptor_json_valid", file_descriptor_json_valid);
    reg.register("rocrate.file_descriptor_jsonld_context", file_descriptor_jsonld_context);
    reg.register("rocrate.file_descriptor_jsonld_graph", file_descriptor_jsonld_graph);
    reg.register("rocrate.file_descriptor_entity_exists", file_descriptor_entity_exists);
    reg.register("rocrate.root_data_entity_exists", root_data_entity_exists);
    reg.register("rocrate.data_entities_exist", data_entities_exist);
}

fn file_descriptor_exists(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let storage = ctx.storage();
    if !storage.exists(DESCRIPTOR_FILE) {
        sink.add(format!(
            "The file descriptor `{}` is not present in the RO-Crate",
            DESCRIPTOR_FILE
        ));
        return Ok(false);
    }
    if storage.is_directory(DESCRIPTOR_FILE) {
        sink.add(format!("`{}` is a directory, not a file", DESCRIPTOR_FILE));
        return Ok(false);
    }
    Ok(true)
}

fn file_descriptor_not_empty(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let storage = ctx.storage();
    if !storage.exists(DESCRIPTOR_FILE) || storage.is_directory(DESCRIPTOR_FILE) {
        return Ok(true);
    }
    if storage.size(DESCRIPTOR_FILE)? == 0 {
        sink.add(format!("The file descriptor `{}` is empty", DESCRIPTOR_FILE));
        return Ok(false);
    }
    Ok(true)
}

fn file_descriptor_json_valid(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    match ctx.metadata_json() {
        Ok(_) => Ok(true),
        Err(DescriptorError::Missing) => Ok(true),
        // An empty descriptor is reported by the size check.
        Err(DescriptorError::InvalidJson(_)) if is_blank(ctx) => Ok(true),
        Err(e) => {
            sink.add(e.to_string());
            Ok(false)
        }
    }
}

fn is_blank(ctx: &ValidationContext) -> bool {
    ctx.descriptor_text().is_ok_and(|t| t.trim().is_empty())
}

fn file_descriptor_jsonld_context(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Ok(doc) = ctx.metadata_json() else {
        return Ok(true);
    };
    let Some(obj) = doc.as_object() else {
        sink.add("The file descriptor is not a JSON object");
        return Ok(false);
    };
    match obj.get("@context") {
        None => {
            sink.add("The file descriptor has no `@context`");
            Ok(false)
        }
        Some(Json::String(_)) | Some(Json::Object(_)) => Ok(true),
        Some(Json::Array(items)) if !items.is_empty() => Ok(true),
        Some(_) => {
            sink.add("The `@context` of the file descriptor must be a string, an object or a non-empty array");
            Ok(false)
        }
    }
}

fn file_descriptor_jsonld_graph(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Ok(doc) = ctx.metadata_json() else {
        return Ok(true);
    };
    // A non-object document is reported by the `@context` check.
    let Some(obj) = doc.as_object() else {
        return Ok(true);
    };
    let Some(graph) = obj.get("@graph").and_then(Json::as_array) else {
        sink.add("The file descriptor has no `@graph` array (flattened JSON-LD expected)");
        return Ok(false);
    };
    for (pos, entity) in graph.iter().enumerate() {
        match entity.as_object() {
            None => sink.add(format!("`@graph` entry #{} is not an object", pos)),
            Some(map) => match map.get("@id").and_then(Json::as_str) {
                None => sink.add(format!("`@graph` entry #{} has no string `@id`", pos)),
                Some(id) => {
                    if let Some(nested) = map
                        .iter()
                        .filter(|(k, _)| !k.starts_with('@'))
                        .find(|(_, v)| has_nested_entity(v))
                    {
                        sink.add_at(
                            id,
                            format!(
                                "property `{}` embeds an entity; compacted JSON-LD must reference it by `@id`",
                                nested.0
                            ),
                        );
                    }
                }
            },
        }
    }
    Ok(sink.is_empty())
}

/// An object value carrying more than a bare `@id` (or a JSON-LD value object).
fn has_nested_entity(value: &Json) -> bool {
    match value {
        Json::Array(items) => items.iter().any(has_nested_entity),
        Json::Object(map) => {
            map.contains_key("@id") && map.keys().any(|k| k != "@id")
        }
        _ => false,
    }
}

fn file_descriptor_entity_exists(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "rocrate.file_descriptor_entity_exists") else {
        return Ok(true);
    };
    if graph.descriptor().is_none() {
        sink.add(format!(
            "The metadata graph has no entity for the file descriptor `{}`",
            DESCRIPTOR_FILE
        ));
        return Ok(false);
    }
    Ok(true)
}

fn root_data_entity_exists(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "rocrate.root_data_entity_exists") else {
        return Ok(true);
    };
    let Some(descriptor) = graph.descriptor() else {
        return Ok(true);
    };
    let about = descriptor.references("about");
    let Some(root_id) = about.first() else {
        sink.add_at(
            &descriptor.id,
            "The file descriptor does not reference the root data entity through `about`",
        );
        return Ok(false);
    };
    match graph.node(root_id) {
        None => {
            sink.add_at(
                &descriptor.id,
                format!("The root data entity `{}` is not described in the metadata", root_id),
            );
            Ok(false)
        }
        Some(root) if !root.has_type("Dataset") => {
            sink.add_at(&root.id, "The root data entity must be of type `Dataset`");
            Ok(false)
        }
        Some(_) => Ok(true),
    }
}

fn data_entities_exist(ctx: &ValidationContext, sink: &mut IssueSink) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "rocrate.data_entities_exist") else {
        return Ok(true);
    };
    let Some(root) = graph.root_data_entity() else {
        return Ok(true);
    };
    let storage = ctx.storage();
    for part in root.references("hasPart") {
        if !is_local_reference(part) {
            continue;
        }
        let is_dataset = graph.node(part).is_some_and(|n| n.has_type("Dataset"));
        if !storage.exists(part) {
            sink.add_at(
                part,
                format!("Data entity `{}` is referenced by `hasPart` but not present in the crate", part),
            );
        } else if is_dataset && !storage.is_directory(part) {
            sink.add_at(part, format!("Data entity `{}` is a Dataset but not a directory", part));
        } else if !is_dataset && storage.is_directory(part) {
            sink.add_at(
                part,
                format!("Data entity `{}` is a File but a directory was found", part),
            );
        }
    }
    Ok(sink.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context_for;
    use crate::storage::MemoryCrate;

    fn run(func: crate::checks::PredicateFn, storage: MemoryCrate) -> (bool, Vec<String>) {
        let ctx = context_for(storage);
        let mut sink = IssueSink::new();
        let ok = func(&ctx, &mut sink).unwrap();
        (ok, sink.into_issues().into_iter().map(|i| i.message).collect())
    }

    fn with_meta(meta: &str) -> MemoryCrate {
        MemoryCrate::new("m").with_file(DESCRIPTOR_FILE, meta)
    }

    const MINIMAL: &str = r#"{
        "@context": "https://w3id.org/ro/crate/1.1/context",
        "@graph": [
            {"@id": "ro-crate-metadata.json", "@type": "CreativeWork", "about": {"@id": "./"}},
            {"@id": "./", "@type": "Dataset", "hasPart": [{"@id": "data.csv"}, {"@id": "sub/"}, {"@id": "https://example.org/x"}]},
            {"@id": "data.csv", "@type": "File"},
            {"@id": "sub/", "@type": "Dataset"}
        ]}"#;

    #[test]
    fn test_descriptor_presence_and_size() {
        let (ok, msgs) = run(file_descriptor_exists, MemoryCrate::new("m"));
        assert!(!ok);
        assert!(msgs[0].contains("not present"));

        // Absent file: the size check has nothing to say.
        assert!(run(file_descriptor_not_empty, MemoryCrate::new("m")).0);
        assert!(!run(file_descriptor_not_empty, with_meta("")).0);
        assert!(run(file_descriptor_not_empty, with_meta("{}")).0);
    }

    #[test]
    fn test_json_validity() {
        let (ok, msgs) = run(file_descriptor_json_valid, with_meta("{broken"));
        assert!(!ok);
        assert!(msgs[0].contains("not valid JSON"));
        assert!(run(file_descriptor_json_valid, with_meta(MINIMAL)).0);
        assert!(run(file_descriptor_json_valid, MemoryCrate::new("m")).0);
        assert!(run(file_descriptor_json_valid, with_meta("  ")).0);
    }

    #[test]
    fn test_jsonld_checks_do_not_run_on_broken_json() {
        assert!(run(file_descriptor_jsonld_context, with_meta("{broken")).0);
        assert!(run(file_descriptor_jsonld_graph, with_meta("{broken")).0);
        assert!(run(file_descriptor_entity_exists, with_meta("{broken")).0);
        assert!(run(root_data_entity_exists, with_meta("{broken")).0);
        assert!(run(data_entities_exist, with_meta("{broken")).0);
    }

    #[test]
    fn test_jsonld_context_and_graph() {
        assert!(!run(file_descriptor_jsonld_context, with_meta(r#"{"@graph": []}"#)).0);
        assert!(!run(file_descriptor_jsonld_context, with_meta("[]")).0);
        assert!(run(file_descriptor_jsonld_context, with_meta(MINIMAL)).0);

        assert!(!run(file_descriptor_jsonld_graph, with_meta(r#"{"@context": "x"}"#)).0);
        let (ok, msgs) = run(
            file_descriptor_jsonld_graph,
            with_meta(
                r##"{"@context": "x", "@graph": [{"name": "no id"},
                    {"@id": "./", "author": {"@id": "#a", "name": "A"}}]}"##,
            ),
        );
        assert!(!ok);
        assert_eq!(msgs.len(), 2);
        assert!(run(file_descriptor_jsonld_graph, with_meta(MINIMAL)).0);
    }

    #[test]
    fn test_descriptor_and_root_entities() {
        assert!(run(file_descriptor_entity_exists, with_meta(MINIMAL)).0);
        assert!(!run(file_descriptor_entity_exists, with_meta(r#"{"@graph": [{"@id": "./"}]}"#)).0);

        assert!(run(root_data_entity_exists, with_meta(MINIMAL)).0);
        let (ok, msgs) = run(
            root_data_entity_exists,
            with_meta(r#"{"@graph": [{"@id": "ro-crate-metadata.json", "about": {"@id": "./"}}]}"#),
        );
        assert!(!ok);
        assert!(msgs[0].contains("not described"));
        assert!(!run(
            root_data_entity_exists,
            with_meta(r#"{"@graph": [{"@id": "ro-crate-metadata.json"}]}"#)
        )
        .0);
    }

    #[test]
    fn test_data_entities_exist() {
        let (ok, msgs) = run(data_entities_exist, with_meta(MINIMAL));
        assert!(!ok);
        assert_eq!(msgs.len(), 2);

        let full = with_meta(MINIMAL).with_file("data.csv", "a,b").with_dir("sub");
        assert!(run(data_entities_exist, full).0);

        let swapped = with_meta(MINIMAL).with_dir("data.csv").with_file("sub", "x");
        let (ok, msgs) = run(data_entities_exist, swapped);
        assert!(!ok);
        assert!(msgs.iter().any(|m| m.contains("not a directory")));
    }
}
