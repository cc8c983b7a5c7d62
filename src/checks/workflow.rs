//! Built-in predicates of the Workflow RO-Crate profile.

use super::{graph_or_skip, is_local_reference, IssueSink, PredicateRegistry};
use crate::context::ValidationContext;
use crate::error::CheckError;
use crate::graph::{MetadataGraph, Node};

pub fn register(reg: &mut PredicateRegistry) {
    reg.register("workflow.main_entity_exists", main_entity_exists);
    reg.register("workflow.main_entity_is_workflow", main_entity_is_workflow);
    reg.register("workflow.main_entity_file_exists", main_entity_file_exists);
}

const WORKFLOW_TYPE: &str = "ComputationalWorkflow";

/// The entity the root data entity names as `mainEntity`, if described.
fn main_entity(graph: &MetadataGraph) -> Option<&Node> {
    let root = graph.root_data_entity()?;
    let id = root.references("mainEntity").into_iter().next()?;
    graph.node(id)
}

fn main_entity_exists(ctx: &ValidationContext, sink: &mut IssueSink) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "workflow.main_entity_exists") else {
        return Ok(true);
    };
    let Some(root) = graph.root_data_entity() else {
        return Ok(true);
    };
    match root.references("mainEntity").first() {
        None => {
            sink.add_at(&root.id, "The root data entity has no `mainEntity`");
            Ok(false)
        }
        Some(id) if graph.node(id).is_none() => {
            sink.add_at(
                &root.id,
                format!("The main entity `{}` is not described in the metadata", id),
            );
            Ok(false)
        }
        Some(_) => Ok(true),
    }
}

fn main_entity_is_workflow(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "workflow.main_entity_is_workflow") else {
        return Ok(true);
    };
    let Some(entity) = main_entity(graph) else {
        return Ok(true);
    };
    if !entity.has_type(WORKFLOW_TYPE) {
        sink.add_at(
            &entity.id,
            format!("The main entity must be typed `{}`", WORKFLOW_TYPE),
        );
        return Ok(false);
    }
    Ok(true)
}

fn main_entity_file_exists(
    ctx: &ValidationContext,
    sink: &mut IssueSink,
) -> Result<bool, CheckError> {
    let Some(graph) = graph_or_skip(ctx, "workflow.main_entity_file_exists") else {
        return Ok(true);
    };
    let Some(entity) = main_entity(graph) else {
        return Ok(true);
    };
    if !is_local_reference(&entity.id) {
        return Ok(true);
    }
    let storage = ctx.storage();
    if !storage.exists(&entity.id) || storage.is_directory(&entity.id) {
        sink.add_at(
            &entity.id,
            format!("The workflow file `{}` is not present in the crate", entity.id),
        );
        return Ok(false);
    }
    Ok(true)
}
