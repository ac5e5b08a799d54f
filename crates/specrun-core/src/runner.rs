//! Recursive task runner: drives one assembly run from the host's tree.
//!
//! ```text
//! start(root)              load assembly, check compatibility, build engine
//!     │
//! execute_recursive(root)  register a notification for every node
//!     │
//! finish(root)             start_run, run each child context, end_run
//! ```
//!
//! Load and compatibility failures end the run in `start`. A context
//! that cannot be resolved only fails its own node; its siblings still run.

use std::sync::Arc;

use crate::assembly::{
    AssemblyResolver, DylibResolver, LoadedAssembly, load_context_assembly,
};
use crate::compat::VersionCompatibilityChecker;
use crate::engine::{DefaultEngineFactory, EngineFactory, RunOptions, RunScope, SpecEngine};
use crate::error::{AssemblyLoadError, Error, Result};
use crate::notify::{NotificationFactory, RunListener};
use crate::server::RemoteTaskServer;
use crate::task::{RunTask, TaskNode, TaskResult};

/// Short error reported on the root when the assembly cannot be loaded.
pub const LOAD_ASSEMBLY_ERROR: &str = "Could not load context assembly";

/// Short error reported on a child whose context type cannot be resolved.
pub const LOAD_CONTEXT_ERROR: &str = "Could not load context";

/// Where a runner is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Uninitialized,
    Started,
    Registered,
    Running,
    Finished,
    /// The run failed in `start`; no further step is valid.
    Error,
}

/// State that exists between a successful `start` and `finish`.
struct ActiveRun {
    engine: Box<dyn SpecEngine>,
    scope: RunScope,
    listener: Arc<RunListener>,
    assembly: LoadedAssembly,
}

/// Runs one assembly task and the context tasks below it.
///
/// One runner handles one top-level task; create a new one per run.
pub struct RecursiveTaskRunner {
    server: Arc<dyn RemoteTaskServer>,
    resolver: Box<dyn AssemblyResolver>,
    engines: Box<dyn EngineFactory>,
    checker: VersionCompatibilityChecker,
    options: RunOptions,
    notifications: NotificationFactory,
    phase: RunnerPhase,
    run: Option<ActiveRun>,
}

impl RecursiveTaskRunner {
    /// Runner loading native assemblies and running them with the default engine.
    pub fn new(server: Arc<dyn RemoteTaskServer>) -> Self {
        Self {
            server,
            resolver: Box::new(DylibResolver),
            engines: Box::new(DefaultEngineFactory),
            checker: VersionCompatibilityChecker::default(),
            options: RunOptions::default(),
            notifications: NotificationFactory,
            phase: RunnerPhase::Uninitialized,
            run: None,
        }
    }

    pub fn with_resolver(mut self, resolver: impl AssemblyResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_engine_factory(mut self, engines: impl EngineFactory + 'static) -> Self {
        self.engines = Box::new(engines);
        self
    }

    pub fn with_checker(mut self, checker: VersionCompatibilityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Listener of the current run, between `start` and `finish`.
    pub fn listener(&self) -> Option<&Arc<RunListener>> {
        self.run.as_ref().map(|run| &run.listener)
    }

    fn expect_phase(&self, expected: RunnerPhase, step: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::InvalidOperation(format!(
                "{step} called in phase {:?}, expected {:?}",
                self.phase, expected
            )));
        }
        Ok(())
    }

    /// Load the root's assembly and prepare the run.
    ///
    /// Returns `TaskResult::Error` when the assembly cannot be loaded or is
    /// incompatible; the host has been told why through the server.
    pub fn start(&mut self, node: &TaskNode) -> Result<TaskResult> {
        self.expect_phase(RunnerPhase::Uninitialized, "start")?;
        let task = &node.task;

        let loaded = match &task.task {
            RunTask::Assembly { location } => {
                load_context_assembly(self.resolver.as_ref(), location)
            }
            other => Err(AssemblyLoadError::NotAnAssembly {
                location: other.assembly_location().to_path_buf(),
            }),
        };

        let assembly = match loaded {
            Ok(assembly) => assembly,
            Err(e) => {
                tracing::warn!("{}", e);
                self.server.task_explain(task, &e.to_string());
                self.server.task_error(task, LOAD_ASSEMBLY_ERROR);
                self.phase = RunnerPhase::Error;
                return Ok(TaskResult::Error);
            }
        };

        let compatibility = self.checker.check(&assembly);
        if !compatibility.success {
            let err = Error::IncompatibleVersion {
                explanation: compatibility.explanation.clone(),
            };
            tracing::warn!("{}", err.with_hint());
            self.server.task_explain(task, &compatibility.explanation);
            self.server.task_error(task, &compatibility.error_message);
            self.phase = RunnerPhase::Error;
            return Ok(TaskResult::Error);
        }

        let listener = Arc::new(RunListener::new(self.server.clone(), task.clone()));
        let engine = self.engines.create(listener.clone(), &self.options);
        let scope = RunScope::detect(engine.as_ref());

        tracing::debug!(
            "Started run of {} (start hook {:?}, end hook {:?})",
            assembly.name(),
            scope.start_hook(),
            scope.end_hook()
        );

        self.run = Some(ActiveRun {
            engine,
            scope,
            listener,
            assembly,
        });
        self.phase = RunnerPhase::Started;
        Ok(TaskResult::Success)
    }

    /// Does nothing; the work happens in [`finish`](Self::finish).
    pub fn execute(&mut self, _node: &TaskNode) -> Result<TaskResult> {
        Ok(TaskResult::Success)
    }

    /// Register a notification for every node below the root.
    ///
    /// Returns the number of notifications registered.
    pub fn execute_recursive(&mut self, node: &TaskNode) -> Result<usize> {
        self.expect_phase(RunnerPhase::Started, "execute_recursive")?;
        let run = self
            .run
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation("no active run".to_string()))?;

        let mut registered = 0;
        for descendant in node.descendants() {
            run.listener.register(self.notifications.create(descendant));
            registered += 1;
        }

        tracing::debug!("Registered {} notifications", registered);
        self.phase = RunnerPhase::Registered;
        Ok(registered)
    }

    /// Run every child context of the root inside the run scope.
    ///
    /// The end-of-run hook runs on every exit path. An engine error is
    /// returned after it has run.
    pub fn finish(&mut self, node: &TaskNode) -> Result<TaskResult> {
        self.expect_phase(RunnerPhase::Registered, "finish")?;
        let run = self
            .run
            .take()
            .ok_or_else(|| Error::InvalidOperation("no active run".to_string()))?;
        self.phase = RunnerPhase::Running;

        match run_contexts(self.server.as_ref(), node, run) {
            Ok(()) => {
                self.phase = RunnerPhase::Finished;
                Ok(TaskResult::Success)
            }
            Err(e) => {
                self.phase = RunnerPhase::Error;
                Err(e)
            }
        }
    }

    /// Every step in order. Stops after `start` if it fails.
    pub fn run_to_completion(&mut self, node: &TaskNode) -> Result<TaskResult> {
        if self.start(node)? == TaskResult::Error {
            return Ok(TaskResult::Error);
        }
        self.execute(node)?;
        self.execute_recursive(node)?;
        self.finish(node)
    }
}

fn run_contexts(server: &dyn RemoteTaskServer, node: &TaskNode, run: ActiveRun) -> Result<()> {
    let ActiveRun {
        mut engine,
        scope,
        assembly,
        ..
    } = run;

    let mut guard = scope.enter(engine.as_mut(), &assembly)?;

    for child in &node.children {
        let Some(type_name) = child.task.task.context_type_name() else {
            tracing::warn!("Skipping non-context child task {}", child.task.id);
            continue;
        };

        let Some(context) = assembly.context(type_name) else {
            let err = Error::ContextTypeNotFound {
                context: type_name.to_string(),
                location: child.task.task.assembly_location().to_path_buf(),
            };
            tracing::warn!("{}", err);
            server.task_explain(&child.task, &err.to_string());
            server.task_error(&child.task, LOAD_CONTEXT_ERROR);
            continue;
        };

        guard.engine().run_member(&assembly, context)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{AssemblyIdentity, AssemblyManifest, BinaryFormat, ContextDescriptor};
    use crate::server::{MemoryTaskServer, ServerCall};
    use crate::task::RemoteTask;
    use std::path::{Path, PathBuf};

    struct ManifestResolver;

    impl AssemblyResolver for ManifestResolver {
        fn exists(&self, _location: &Path) -> bool {
            true
        }

        fn read_identity(&self, location: &Path) -> std::io::Result<Option<AssemblyIdentity>> {
            Ok(Some(AssemblyIdentity {
                name: "accounts".to_string(),
                format: BinaryFormat::Elf,
                location: location.to_path_buf(),
            }))
        }

        fn load(&self, identity: &AssemblyIdentity) -> Result<LoadedAssembly> {
            Ok(LoadedAssembly::in_process(
                identity.clone(),
                AssemblyManifest {
                    name: "accounts".to_string(),
                    runner_version: Some(crate::compat::RUNNER_VERSION.to_string()),
                    contexts: vec![ContextDescriptor::new("a::one")],
                },
            ))
        }
    }

    struct NullEngine;

    impl SpecEngine for NullEngine {
        fn run_member(
            &mut self,
            _assembly: &LoadedAssembly,
            _context: &ContextDescriptor,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct NullEngines;

    impl EngineFactory for NullEngines {
        fn create(&self, _listener: Arc<RunListener>, _options: &RunOptions) -> Box<dyn SpecEngine> {
            Box::new(NullEngine)
        }
    }

    fn runner(server: Arc<MemoryTaskServer>) -> RecursiveTaskRunner {
        RecursiveTaskRunner::new(server)
            .with_resolver(ManifestResolver)
            .with_engine_factory(NullEngines)
    }

    #[test]
    fn test_steps_out_of_order_are_rejected() {
        let server = Arc::new(MemoryTaskServer::new());
        let mut runner = runner(server);
        let root = TaskNode::new(RemoteTask::assembly("asm", "/specs/libaccounts.so"));

        assert!(matches!(
            runner.finish(&root),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            runner.execute_recursive(&root),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(runner.phase(), RunnerPhase::Uninitialized);

        assert_eq!(runner.start(&root).unwrap(), TaskResult::Success);
        assert!(matches!(runner.start(&root), Err(Error::InvalidOperation(_))));
        assert_eq!(runner.phase(), RunnerPhase::Started);
    }

    #[test]
    fn test_phases_of_a_full_run() {
        let server = Arc::new(MemoryTaskServer::new());
        let mut runner = runner(server);
        let root = TaskNode::new(RemoteTask::assembly("asm", "/specs/libaccounts.so"))
            .with_child(TaskNode::new(RemoteTask::context(
                "c1",
                "/specs/libaccounts.so",
                "a::one",
            )));

        runner.start(&root).unwrap();
        assert_eq!(runner.execute(&root).unwrap(), TaskResult::Success);
        assert_eq!(runner.execute_recursive(&root).unwrap(), 1);
        assert_eq!(runner.phase(), RunnerPhase::Registered);
        assert_eq!(runner.listener().map(|l| l.registered_count()), Some(1));

        assert_eq!(runner.finish(&root).unwrap(), TaskResult::Success);
        assert_eq!(runner.phase(), RunnerPhase::Finished);
        assert!(runner.listener().is_none());
    }

    #[test]
    fn test_context_root_is_reported_as_load_failure() {
        let server = Arc::new(MemoryTaskServer::new());
        let mut runner = runner(server.clone());
        let root = TaskNode::new(RemoteTask::context("c1", "/specs/libaccounts.so", "a::one"));

        assert_eq!(runner.start(&root).unwrap(), TaskResult::Error);
        assert_eq!(runner.phase(), RunnerPhase::Error);
        assert_eq!(
            server.calls_for("c1"),
            vec![
                ServerCall::Explain {
                    task_id: "c1".to_string(),
                    explanation: format!(
                        "Could not load assembly from {}: Not an assembly",
                        PathBuf::from("/specs/libaccounts.so").display()
                    ),
                },
                ServerCall::Error {
                    task_id: "c1".to_string(),
                    message: LOAD_ASSEMBLY_ERROR.to_string(),
                },
            ]
        );
    }
}
