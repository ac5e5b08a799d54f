//! Core of the specrun test-runner bridge.
//!
//! This crate provides:
//! - Assembly loading with classified failures
//! - Version compatibility checking between runner and assembly
//! - The recursive task runner driving an engine over a task tree
//! - The run listener turning engine callbacks into task notifications
//! - IPC with out-of-process host processes

pub mod assembly;
pub mod compat;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod notify;
pub mod runner;
pub mod server;
pub mod task;

pub use assembly::{
    AssemblyIdentity, AssemblyManifest, AssemblyResolver, BinaryFormat, ContextDescriptor,
    ContextRegistry, DylibResolver, LoadedAssembly, load_context_assembly,
};
pub use compat::{CompatibilityResult, RUNNER_VERSION, Version, VersionCompatibilityChecker};
pub use engine::{
    DefaultEngine, DefaultEngineFactory, EngineCapabilities, EngineFactory, RunHook, RunOptions,
    RunScope, ScopeGuard, SpecEngine,
};
pub use error::{AssemblyLoadError, Error, Result};
pub use ipc::{HostCommand, HostEvent, HostHandle, RunOutcome, RunRequest, StreamTaskServer};
pub use notify::{NotificationFactory, RunListener, TaskNotification};
pub use runner::{RecursiveTaskRunner, RunnerPhase};
pub use server::{MemoryTaskServer, RemoteTaskServer, ServerCall};
pub use task::{OutputKind, RemoteTask, RunTask, TaskNode, TaskResult};
