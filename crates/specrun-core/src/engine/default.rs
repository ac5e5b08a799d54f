//! Default engine: runs contexts through an assembly's C ABI.

use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::assembly::abi::{
    END_RUN_SYMBOL, EventSinkFn, RUN_CONTEXT_SYMBOL, ReturnCode, RunContextFn, RunHookFn,
    START_RUN_SYMBOL, SpecEvent,
};
use crate::assembly::{ContextDescriptor, LoadedAssembly};
use crate::error::{Error, Result};
use crate::notify::RunListener;

use super::{EngineCapabilities, EngineFactory, RunOptions, SpecEngine};

/// Engine that calls into the assembly's exported functions.
///
/// Both run hooks are supported: they notify the listener and call the
/// assembly's optional `specrun_start_run` / `specrun_end_run` exports.
pub struct DefaultEngine {
    listener: Arc<RunListener>,
    options: RunOptions,
}

impl DefaultEngine {
    pub fn new(listener: Arc<RunListener>, options: RunOptions) -> Self {
        Self { listener, options }
    }

    fn native<'a>(&self, assembly: &'a LoadedAssembly) -> Result<&'a Library> {
        assembly.library().ok_or_else(|| {
            Error::Execution(format!(
                "Assembly {} has no native entry points",
                assembly.name()
            ))
        })
    }

    /// Call an optional run hook export, if the assembly has one.
    fn call_hook(&self, assembly: &LoadedAssembly, symbol_name: &str) -> Result<()> {
        let library = self.native(assembly)?;

        // Safety: We trust the symbol, if present, has the correct signature
        let hook: Symbol<RunHookFn> = match unsafe { library.get(symbol_name.as_bytes()) } {
            Ok(hook) => hook,
            Err(_) => {
                tracing::debug!("Assembly {} has no {} export", assembly.name(), symbol_name);
                return Ok(());
            }
        };

        match ReturnCode::from(unsafe { hook() }) {
            ReturnCode::Success => Ok(()),
            code => Err(Error::Execution(format!(
                "{} in {} returned {:?}",
                symbol_name,
                assembly.name(),
                code
            ))),
        }
    }
}

impl SpecEngine for DefaultEngine {
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::full()
    }

    fn start_run(&mut self, assembly: &LoadedAssembly) -> Result<()> {
        self.listener.on_run_start();
        self.call_hook(assembly, START_RUN_SYMBOL)
    }

    fn end_run(&mut self, assembly: &LoadedAssembly) -> Result<()> {
        let result = self.call_hook(assembly, END_RUN_SYMBOL);
        self.listener.on_run_end();
        result
    }

    fn run_member(
        &mut self,
        assembly: &LoadedAssembly,
        context: &ContextDescriptor,
    ) -> Result<()> {
        if !self.options.allows(context) {
            tracing::debug!("Context {} filtered out by run options", context.name);
            return Ok(());
        }

        let library = self.native(assembly)?;

        // Safety: We trust the symbol exists and has the correct signature
        let run: Symbol<RunContextFn> = unsafe { library.get(RUN_CONTEXT_SYMBOL.as_bytes()) }
            .map_err(|e| {
                Error::Execution(format!("Failed to get symbol {}: {}", RUN_CONTEXT_SYMBOL, e))
            })?;

        tracing::debug!("Running context {} from {}", context.name, assembly.name());

        let mut sink = EventSink {
            listener: &self.listener,
            malformed: 0,
        };
        let name = context.name.as_bytes();

        // Safety: the sink data outlives the call; the assembly only uses it through event_sink
        let code = unsafe {
            run(
                name.as_ptr(),
                name.len(),
                event_sink as EventSinkFn,
                &mut sink as *mut EventSink as *mut c_void,
            )
        };

        if sink.malformed > 0 {
            tracing::warn!(
                "Dropped {} malformed events from context {}",
                sink.malformed,
                context.name
            );
        }

        match ReturnCode::from(code) {
            ReturnCode::Success => {}
            ReturnCode::ContextNotFound => self.listener.on_fatal_error(&format!(
                "Assembly {} does not define context {}",
                assembly.name(),
                context.name
            )),
            ReturnCode::ContextError => self
                .listener
                .on_fatal_error(&format!("Context {} failed with code {}", context.name, code)),
            ReturnCode::Panic => self
                .listener
                .on_fatal_error(&format!("Context {} panicked", context.name)),
        }

        Ok(())
    }
}

/// Receives events from a running context.
struct EventSink<'a> {
    listener: &'a RunListener,
    malformed: usize,
}

impl EventSink<'_> {
    fn dispatch(&mut self, bytes: &[u8]) {
        let event: SpecEvent = match serde_json::from_slice(bytes) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Malformed spec event: {}", e);
                self.malformed += 1;
                return;
            }
        };

        match event {
            SpecEvent::ContextStart { context } => self.listener.on_context_start(&context),
            SpecEvent::SpecificationStart {
                context,
                specification,
            } => self.listener.on_specification_start(&context, &specification),
            SpecEvent::SpecificationEnd {
                context,
                specification,
                result,
            } => self
                .listener
                .on_specification_end(&context, &specification, &result),
            SpecEvent::ContextEnd { context } => self.listener.on_context_end(&context),
            SpecEvent::FatalError { message } => self.listener.on_fatal_error(&message),
        }
    }
}

unsafe extern "C" fn event_sink(data: *mut c_void, ptr: *const u8, len: usize) {
    if data.is_null() || (ptr.is_null() && len > 0) {
        return;
    }
    // Safety: data is the EventSink passed to run_member, alive for the whole call
    let sink = unsafe { &mut *(data as *mut EventSink<'_>) };
    let bytes = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len) }
    };

    // Unwinding across the FFI boundary is undefined behavior
    if catch_unwind(AssertUnwindSafe(|| sink.dispatch(bytes))).is_err() {
        tracing::error!("Listener panicked while handling a spec event");
    }
}

/// Factory for [`DefaultEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEngineFactory;

impl EngineFactory for DefaultEngineFactory {
    fn create(&self, listener: Arc<RunListener>, options: &RunOptions) -> Box<dyn SpecEngine> {
        Box::new(DefaultEngine::new(listener, options.clone()))
    }
}
