//! App factory services: remote clients, trackers and the generation pipeline.

pub mod appstore;
pub mod build_status;
pub mod codemagic;
pub mod cordova_build;
pub mod generator;
pub mod github;
pub mod orchestrator;
pub mod push_service;
pub mod settings_service;
pub mod template_service;
