//! Run scope: the start/end hooks bracketing all contexts of a run.
//!
//! Hooks are bound once per run from the engine's reported capabilities.
//! A missing hook is a no-op, never an error.

use crate::assembly::LoadedAssembly;
use crate::error::Result;

use super::{EngineCapabilities, SpecEngine};

/// One side of the run scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunHook {
    /// The engine implements the hook.
    Bound,
    /// The engine has no such hook.
    NoOp,
}

impl RunHook {
    fn from_capability(supported: bool) -> Self {
        if supported { RunHook::Bound } else { RunHook::NoOp }
    }
}

/// Start/end hooks bound to one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunScope {
    start: RunHook,
    end: RunHook,
}

impl RunScope {
    /// Bind hooks from the engine's capabilities.
    pub fn detect(engine: &dyn SpecEngine) -> Self {
        Self::from_capabilities(engine.capabilities())
    }

    pub fn from_capabilities(capabilities: EngineCapabilities) -> Self {
        Self {
            start: RunHook::from_capability(capabilities.start_run),
            end: RunHook::from_capability(capabilities.end_run),
        }
    }

    pub fn start_hook(&self) -> RunHook {
        self.start
    }

    pub fn end_hook(&self) -> RunHook {
        self.end
    }

    /// Run the start hook and return a guard that runs the end hook on drop.
    ///
    /// The end hook runs even when the start hook fails.
    pub fn enter<'a>(
        &self,
        engine: &'a mut dyn SpecEngine,
        assembly: &'a LoadedAssembly,
    ) -> Result<ScopeGuard<'a>> {
        let mut guard = ScopeGuard {
            engine,
            assembly,
            end: self.end,
        };
        if self.start == RunHook::Bound {
            guard.engine.start_run(assembly)?;
        }
        Ok(guard)
    }
}

/// Active run scope. Runs the end hook exactly once when dropped,
/// including during unwinding.
pub struct ScopeGuard<'a> {
    engine: &'a mut dyn SpecEngine,
    assembly: &'a LoadedAssembly,
    end: RunHook,
}

impl ScopeGuard<'_> {
    /// The engine, for running contexts inside the scope.
    pub fn engine(&mut self) -> &mut dyn SpecEngine {
        &mut *self.engine
    }

    pub fn assembly(&self) -> &LoadedAssembly {
        self.assembly
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.end == RunHook::Bound {
            if let Err(e) = self.engine.end_run(self.assembly) {
                tracing::warn!("End-of-run hook failed for {}: {}", self.assembly.name(), e);
            }
        }
    }
}
