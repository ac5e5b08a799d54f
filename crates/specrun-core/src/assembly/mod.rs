//! Context assemblies: identity, loading and context lookup.
//!
//! ```text
//! AssemblyTask (location)
//!     │
//!     └── load_context_assembly
//!             ├── exists?           → FileMissing
//!             ├── read_identity     → UnreadableMetadata / NotAnAssembly
//!             └── load(identity)    → LoadFailed
//!                     │
//!                     └── LoadedAssembly
//!                             ├── Library (dylib loaded via libloading)
//!                             └── ContextRegistry (from manifest export)
//! ```

pub mod abi;
mod loader;
mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

pub use loader::{AssemblyResolver, DylibResolver, load_context_assembly, read_identity};
pub use manifest::{AssemblyManifest, ContextDescriptor, ContextRegistry, type_portion};

/// Object format of a native assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf,
    MachO,
    Pe,
}

/// Identity read from an assembly file before it is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyIdentity {
    /// Assembly name (file stem, without a `lib` prefix on Unix formats).
    pub name: String,
    pub format: BinaryFormat,
    /// Where the assembly was found.
    pub location: PathBuf,
}

/// A context assembly loaded into this process.
///
/// Owned by one runner for the duration of one run. The native library
/// stays mapped until the last handle is dropped.
pub struct LoadedAssembly {
    identity: AssemblyIdentity,
    manifest: AssemblyManifest,
    registry: ContextRegistry,
    library: Option<Arc<Library>>,
}

impl LoadedAssembly {
    /// Wrap a loaded native library and its manifest.
    pub fn from_library(
        identity: AssemblyIdentity,
        manifest: AssemblyManifest,
        library: Library,
    ) -> Self {
        let registry = ContextRegistry::from_descriptors(manifest.contexts.iter().cloned());
        Self {
            identity,
            manifest,
            registry,
            library: Some(Arc::new(library)),
        }
    }

    /// An assembly described only by its manifest, with no native code.
    ///
    /// Used by engines that run contexts in-process.
    pub fn in_process(identity: AssemblyIdentity, manifest: AssemblyManifest) -> Self {
        let registry = ContextRegistry::from_descriptors(manifest.contexts.iter().cloned());
        Self {
            identity,
            manifest,
            registry,
            library: None,
        }
    }

    pub fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn location(&self) -> &Path {
        &self.identity.location
    }

    pub fn manifest(&self) -> &AssemblyManifest {
        &self.manifest
    }

    /// Version of the spec library the assembly references.
    pub fn runner_version(&self) -> Option<&str> {
        self.manifest.runner_version.as_deref()
    }

    /// Resolve a context type by name.
    pub fn context(&self, type_name: &str) -> Option<&ContextDescriptor> {
        self.registry.get(type_name)
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.registry
    }

    /// The native library, if the assembly was loaded from disk.
    pub fn library(&self) -> Option<&Library> {
        self.library.as_deref()
    }
}

impl std::fmt::Debug for LoadedAssembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedAssembly")
            .field("identity", &self.identity)
            .field("contexts", &self.registry.len())
            .field("native", &self.library.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_process_assembly() {
        let identity = AssemblyIdentity {
            name: "accounts".to_string(),
            format: BinaryFormat::Elf,
            location: PathBuf::from("/specs/libaccounts.so"),
        };
        let manifest = AssemblyManifest {
            name: "accounts".to_string(),
            runner_version: Some("0.1.0".to_string()),
            contexts: vec![ContextDescriptor::new("a::one")],
        };

        let assembly = LoadedAssembly::in_process(identity, manifest);
        assert_eq!(assembly.name(), "accounts");
        assert_eq!(assembly.runner_version(), Some("0.1.0"));
        assert!(assembly.context("a::one").is_some());
        assert!(assembly.context("a::missing").is_none());
        assert!(assembly.library().is_none());
    }
}
