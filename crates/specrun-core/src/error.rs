//! Error types for specrun-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for specrun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in specrun-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The context assembly could not be loaded.
    #[error(transparent)]
    AssemblyLoad(#[from] AssemblyLoadError),

    /// The assembly references an incompatible runner version.
    #[error("incompatible version: {explanation}")]
    IncompatibleVersion { explanation: String },

    /// A context type could not be resolved in the loaded assembly.
    #[error("Could not load type '{context}' from assembly {}.", .location.display())]
    ContextTypeNotFound { context: String, location: PathBuf },

    /// The assembly manifest is missing or malformed.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Failed to load or query a dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with the host process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The engine failed while running a context.
    #[error("execution error: {0}")]
    Execution(String),

    /// A runner step was called out of order.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// A short recovery hint for the user, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::AssemblyLoad(AssemblyLoadError::FileMissing { .. }) => {
                Some("build the test assembly before running it")
            }
            Error::AssemblyLoad(AssemblyLoadError::NotAnAssembly { .. }) => {
                Some("point the run at a cdylib, not an rlib or executable")
            }
            Error::IncompatibleVersion { .. } => {
                Some("rebuild the assembly against the runner's specrun version")
            }
            Error::Ipc(_) => Some("set SPECRUN_HOST_PATH or put specrun-host on PATH"),
            _ => None,
        }
    }

    /// Render the error followed by its hint, if any.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self}\nhint: {hint}"),
            None => self.to_string(),
        }
    }
}

/// Classified failures while loading a context assembly.
///
/// The display text is the explanation reported to the host.
#[derive(Debug, Error)]
pub enum AssemblyLoadError {
    /// Nothing exists at the assembly location.
    #[error("Could not load assembly from {}: File does not exist", .location.display())]
    FileMissing { location: PathBuf },

    /// The file exists but its identity could not be read.
    #[error("Could not load assembly from {}: {message}", .location.display())]
    UnreadableMetadata { location: PathBuf, message: String },

    /// The file is readable but is not a loadable assembly.
    #[error("Could not load assembly from {}: Not an assembly", .location.display())]
    NotAnAssembly { location: PathBuf },

    /// The assembly was identified but loading it failed.
    #[error("Could not load assembly from {}: {message}", .location.display())]
    LoadFailed { location: PathBuf, message: String },
}

impl AssemblyLoadError {
    /// Location of the assembly that failed to load.
    pub fn location(&self) -> &PathBuf {
        match self {
            AssemblyLoadError::FileMissing { location }
            | AssemblyLoadError::UnreadableMetadata { location, .. }
            | AssemblyLoadError::NotAnAssembly { location }
            | AssemblyLoadError::LoadFailed { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_errors_have_distinct_explanations() {
        let location = PathBuf::from("/tmp/specs.so");
        let missing = AssemblyLoadError::FileMissing { location: location.clone() };
        let not_asm = AssemblyLoadError::NotAnAssembly { location: location.clone() };
        let unreadable = AssemblyLoadError::UnreadableMetadata {
            location: location.clone(),
            message: "Is a directory".to_string(),
        };

        assert_eq!(
            missing.to_string(),
            "Could not load assembly from /tmp/specs.so: File does not exist"
        );
        assert_eq!(
            not_asm.to_string(),
            "Could not load assembly from /tmp/specs.so: Not an assembly"
        );
        assert_eq!(
            unreadable.to_string(),
            "Could not load assembly from /tmp/specs.so: Is a directory"
        );
    }

    #[test]
    fn test_with_hint() {
        let err = Error::from(AssemblyLoadError::FileMissing {
            location: PathBuf::from("/tmp/specs.so"),
        });
        assert!(err.with_hint().contains("hint: build the test assembly"));

        let err = Error::Execution("boom".to_string());
        assert_eq!(err.with_hint(), "execution error: boom");
    }
}
