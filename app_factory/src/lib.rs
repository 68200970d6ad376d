//! Cordova App Factory: generates Cordova app repositories, pushes them to
//! GitHub, triggers Codemagic builds and tracks them to completion.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

pub use error::{ApiError, ErrorKind};
pub use events::{EventBus, FactoryEvent};
pub use services::orchestrator::{FactoryContext, GenerationReport, GenerationRequest, Orchestrator};
