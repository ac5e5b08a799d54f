//! Specification engines.
//!
//! The engine is the piece that actually runs the specifications of a
//! context. The runner only ever asks it to "run this member"; results
//! flow back through the [`RunListener`] rather than return values.
//!
//! # Module Structure
//!
//! - `options` - Tag and name filters for a run
//! - `scope` - Optional start/end run hooks bracketing all contexts
//! - `default` - `DefaultEngine` driving assemblies through their C ABI

mod default;
mod options;
mod scope;

use std::sync::Arc;

use crate::assembly::{ContextDescriptor, LoadedAssembly};
use crate::error::Result;
use crate::notify::RunListener;

pub use default::{DefaultEngine, DefaultEngineFactory};
pub use options::RunOptions;
pub use scope::{RunHook, RunScope, ScopeGuard};

/// Lifecycle hooks an engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCapabilities {
    pub start_run: bool,
    pub end_run: bool,
}

impl EngineCapabilities {
    /// No lifecycle hooks.
    pub const fn none() -> Self {
        Self {
            start_run: false,
            end_run: false,
        }
    }

    /// Both lifecycle hooks.
    pub const fn full() -> Self {
        Self {
            start_run: true,
            end_run: true,
        }
    }
}

/// Runs the specifications of one context at a time.
pub trait SpecEngine: Send {
    /// Lifecycle hooks this engine implements.
    ///
    /// Queried once per run; hooks not reported here are never called.
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::none()
    }

    /// Called once before the first context of a run.
    fn start_run(&mut self, _assembly: &LoadedAssembly) -> Result<()> {
        Ok(())
    }

    /// Called once after the last context of a run.
    fn end_run(&mut self, _assembly: &LoadedAssembly) -> Result<()> {
        Ok(())
    }

    /// Run every specification of `context`.
    ///
    /// Blocks until the context is done. Results are reported through the
    /// listener the engine was created with.
    fn run_member(&mut self, assembly: &LoadedAssembly, context: &ContextDescriptor)
    -> Result<()>;
}

/// Creates the engine for one run.
pub trait EngineFactory: Send {
    fn create(&self, listener: Arc<RunListener>, options: &RunOptions) -> Box<dyn SpecEngine>;
}
