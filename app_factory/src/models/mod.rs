//! App factory data models.

pub mod app;
pub mod build;
pub mod push;
pub mod repository;
pub mod settings;
pub mod template;

pub use app::{AppSpec, Author, GeneratedApp, GeneratedFile};
pub use build::{BuildArtifact, BuildRecord, BuildStatus};
pub use push::{FailedFile, PushResult};
pub use repository::Repository;
pub use settings::FactorySettings;
pub use template::{Template, TemplateFile};
