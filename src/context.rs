//! Per-run validation context.
//!
//! Binds the crate storage, the profile chain being validated, and the run
//! options. Built once per run and shared read-only by every check; the
//! parsed descriptor and metadata graph are cached here lazily, so checks
//! themselves stay stateless.

use crate::engine::{BuiltinShapeEngine, ConformanceEngine, EngineOptions, InferenceMode};
use crate::graph::MetadataGraph;
use crate::models::Severity;
use crate::profile::Profile;
use crate::storage::CrateStorage;
use once_cell::sync::OnceCell;
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub use crate::graph::DESCRIPTOR_ID as DESCRIPTOR_FILE;

/// Cooperative cancellation flag, checked between checks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
/// Options fixed for the duration of a run.
pub struct RunSettings {
    pub severity: Severity,
    pub inherit: bool,
    pub allow_override: bool,
    pub fail_fast: bool,
    pub skip_checks: BTreeSet<String>,
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            severity: Severity::Required,
            inherit: true,
            allow_override: true,
            fail_fast: false,
            skip_checks: BTreeSet::new(),
            deadline: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why the metadata descriptor is unusable.
pub enum DescriptorError {
    Missing,
    Unreadable(String),
    InvalidJson(String),
    NotFlattened(String),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Missing => write!(f, "`{}` is missing", DESCRIPTOR_FILE),
            DescriptorError::Unreadable(e) => {
                write!(f, "`{}` is unreadable: {}", DESCRIPTOR_FILE, e)
            }
            DescriptorError::InvalidJson(e) => {
                write!(f, "`{}` is not valid JSON: {}", DESCRIPTOR_FILE, e)
            }
            DescriptorError::NotFlattened(e) => {
                write!(f, "`{}` is not flattened JSON-LD: {}", DESCRIPTOR_FILE, e)
            }
        }
    }
}

pub struct ValidationContext {
    storage: Box<dyn CrateStorage>,
    profiles: Vec<Arc<Profile>>,
    settings: RunSettings,
    engine: Arc<dyn ConformanceEngine>,
    ontology: Option<Arc<MetadataGraph>>,
    inference: InferenceMode,
    descriptor_text: OnceCell<Result<String, DescriptorError>>,
    descriptor_json: OnceCell<Result<Json, DescriptorError>>,
    graph: OnceCell<Result<MetadataGraph, DescriptorError>>,
}

/// Builder for [`ValidationContext`].
pub struct ContextBuilder {
    storage: Box<dyn CrateStorage>,
    profiles: Vec<Arc<Profile>>,
    settings: RunSettings,
    engine: Arc<dyn ConformanceEngine>,
    ontology: Option<Arc<MetadataGraph>>,
    inference: InferenceMode,
}

impl ContextBuilder {
    /// Profile chain, target first.
    pub fn profiles(mut self, profiles: Vec<Arc<Profile>>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ConformanceEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn ontology(
        mut self,
        ontology: Option<Arc<MetadataGraph>>,
        inference: InferenceMode,
    ) -> Self {
        self.ontology = ontology;
        self.inference = inference;
        self
    }

    pub fn build(self) -> ValidationContext {
        ValidationContext {
            storage: self.storage,
            profiles: self.profiles,
            settings: self.settings,
            engine: self.engine,
            ontology: self.ontology,
            inference: self.inference,
            descriptor_text: OnceCell::new(),
            descriptor_json: OnceCell::new(),
            graph: OnceCell::new(),
        }
    }
}

impl ValidationContext {
    pub fn builder(storage: Box<dyn CrateStorage>) -> ContextBuilder {
        ContextBuilder {
            storage,
            profiles: Vec::new(),
            settings: RunSettings::default(),
            engine: Arc::new(BuiltinShapeEngine),
            ontology: None,
            inference: InferenceMode::None,
        }
    }

    pub fn storage(&self) -> &dyn CrateStorage {
        self.storage.as_ref()
    }

    pub fn profiles(&self) -> &[Arc<Profile>] {
        &self.profiles
    }

    /// Bind the resolved profile chain once profile selection is done.
    pub(crate) fn bind_profiles(&mut self, profiles: Vec<Arc<Profile>>) {
        self.profiles = profiles;
    }

    /// The profile being validated against (first of the chain).
    pub fn target_profile(&self) -> Option<&Arc<Profile>> {
        self.profiles.first()
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn engine(&self) -> &dyn ConformanceEngine {
        self.engine.as_ref()
    }

    pub fn engine_options(&self) -> EngineOptions<'_> {
        EngineOptions {
            ontology: self.ontology.as_deref(),
            inference: self.inference,
            abort_on_first: false,
        }
    }

    /// Whether a check is in the run's skip-set, by bare id or `profile.id`.
    pub fn is_skipped(&self, profile: &str, check: &str) -> bool {
        let skip = &self.settings.skip_checks;
        skip.contains(check) || skip.contains(&format!("{}.{}", profile, check))
    }

    /// Raw descriptor text, read once per run.
    pub fn descriptor_text(&self) -> Result<&str, DescriptorError> {
        self.descriptor_text
            .get_or_init(|| {
                if !self.storage.exists(DESCRIPTOR_FILE)
                    || self.storage.is_directory(DESCRIPTOR_FILE)
                {
                    return Err(DescriptorError::Missing);
                }
                self.storage
                    .read_text(DESCRIPTOR_FILE)
                    .map_err(|e| DescriptorError::Unreadable(e.to_string()))
            })
            .as_ref()
            .map(String::as_str)
            .map_err(|e| e.clone())
    }

    /// Parsed descriptor document.
    pub fn metadata_json(&self) -> Result<&Json, DescriptorError> {
        self.descriptor_json
            .get_or_init(|| {
                let text = self.descriptor_text()?;
                serde_json::from_str::<Json>(text)
                    .map_err(|e| DescriptorError::InvalidJson(e.to_string()))
            })
            .as_ref()
            .map_err(|e| e.clone())
    }

    /// Metadata graph built from the descriptor's `@graph`.
    pub fn metadata_graph(&self) -> Result<&MetadataGraph, DescriptorError> {
        self.graph
            .get_or_init(|| {
                let doc = self.metadata_json()?;
                MetadataGraph::from_json(doc).map_err(DescriptorError::NotFlattened)
            })
            .as_ref()
            .map_err(|e| e.clone())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Context over a storage backend with default settings and no profiles.
    pub fn context_for(storage: impl CrateStorage + 'static) -> ValidationContext {
        ValidationContext::builder(Box::new(storage)).build()
    }
}
