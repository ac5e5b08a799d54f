//! Assembly manifest and the context registry built from it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Manifest exported by a test assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    /// Assembly name.
    pub name: String,
    /// Version of the spec library the assembly was built against.
    #[serde(default)]
    pub runner_version: Option<String>,
    /// Contexts defined in the assembly.
    #[serde(default)]
    pub contexts: Vec<ContextDescriptor>,
}

impl AssemblyManifest {
    /// Parse a manifest from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Manifest(format!("malformed assembly manifest: {}", e)))
    }
}

/// A context type as described by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDescriptor {
    /// Fully-qualified context type name.
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub specifications: Vec<String>,
}

impl ContextDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            specifications: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Type portion of a possibly assembly-qualified name (`Type, Assembly`).
pub fn type_portion(type_name: &str) -> &str {
    type_name.split(',').next().unwrap_or(type_name).trim()
}

/// Lookup table from context type name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: FxHashMap<String, ContextDescriptor>,
}

impl ContextRegistry {
    /// Build a registry from manifest descriptors.
    ///
    /// The first descriptor for a name wins.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ContextDescriptor>) -> Self {
        let mut contexts = FxHashMap::default();
        for descriptor in descriptors {
            if contexts.contains_key(&descriptor.name) {
                tracing::warn!("Duplicate context '{}' in manifest, ignoring", descriptor.name);
                continue;
            }
            contexts.insert(descriptor.name.clone(), descriptor);
        }
        Self { contexts }
    }

    /// Resolve a context by type name.
    ///
    /// Accepts assembly-qualified names (`Type, Assembly`) and matches on the
    /// type portion.
    pub fn get(&self, type_name: &str) -> Option<&ContextDescriptor> {
        self.contexts.get(type_portion(type_name))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Context names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contexts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
