//! Trunk port synchronization service.
//!
//! The server side reconciles sub-port bindings with their parent port,
//! records trunk status reported by agents and pushes trunk lifecycle
//! events. The agent side calls the server and receives those pushes.
//!
//! # Modules
//!
//! - [`store`]: Collaborator traits for trunk storage and port operations
//! - [`memory`]: In-memory implementations of the collaborators
//! - [`server`]: Trunk skeleton, trunk stub and the assembled service
//! - [`agent`]: Server client and push receiver for compute hosts
//! - [`config`]: TOML configuration
//! - [`audit`]: Audit records and logging setup

pub mod agent;
pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod server;
pub mod store;

pub use agent::{
    LoggingEventHandler, SubportBindingHandler, TrunkAgentSkeleton, TrunkEventHandler,
    TrunkServerClient,
};
pub use config::TrunkdConfig;
pub use error::{TrunkError, TrunkResult};
pub use memory::{MemoryCorePlugin, MemoryTrunkStore};
pub use server::{TrunkRpcApi, TrunkService, TrunkSkeleton, TrunkStub};
pub use store::{CorePlugin, HooksId, TrunkLifecycleHooks, TrunkStore};
