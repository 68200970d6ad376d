//! Renders app specs into concrete file sets.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::{ApiError, ErrorKind};
use crate::models::{AppSpec, Author, GeneratedApp, GeneratedFile, Template};
use crate::services::template_service::{render, TemplateManager};

static PACKAGE_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*(\.[a-zA-Z][a-zA-Z0-9_]*)+$").unwrap()
});

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

pub struct AppGenerator {
    templates: Arc<TemplateManager>,
}

impl AppGenerator {
    pub fn new(templates: Arc<TemplateManager>) -> Self {
        Self { templates }
    }

    /// Check the app definition and that its template exists.
    pub fn validate(&self, spec: &AppSpec) -> Result<(), ApiError> {
        self.template_for(spec).map(|_| ())
    }

    pub fn generate(&self, spec: &AppSpec, author: &Author) -> Result<GeneratedApp, ApiError> {
        let template = self.template_for(spec)?;

        let repo_name = repo_slug(&spec.name);
        let values = HashMap::from([
            ("appName", spec.name.clone()),
            ("packageId", spec.package_id.clone()),
            ("version", spec.version.clone()),
            ("description", spec.description.clone()),
            ("authorName", author.name.clone()),
            ("authorEmail", author.email.clone()),
            ("repoName", repo_name.clone()),
        ]);

        let files: Vec<GeneratedFile> = template
            .files
            .iter()
            .map(|f| GeneratedFile::new(f.path.clone(), render(&f.content, &values)))
            .collect();

        tracing::info!(
            app = %spec.name,
            repo = %repo_name,
            template = %template.id,
            files = files.len(),
            "App generated"
        );
        crate::metrics::app_generated(&template.id);

        Ok(GeneratedApp {
            spec: spec.clone(),
            repo_name,
            files,
        })
    }

    fn template_for(&self, spec: &AppSpec) -> Result<Template, ApiError> {
        validate_spec(spec)?;
        self.templates
            .get(&spec.template_id)
            .map_err(|e| ApiError::new(ErrorKind::Storage, format!("cannot read templates: {e:#}")))?
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "unknown template {:?} for app {:?}",
                    spec.template_id, spec.name
                ))
            })
    }
}

pub fn validate_spec(spec: &AppSpec) -> Result<(), ApiError> {
    if spec.name.trim().is_empty() {
        return Err(ApiError::validation("app name must not be empty"));
    }
    if repo_slug(&spec.name).is_empty() {
        return Err(ApiError::validation(format!(
            "app name {:?} has no characters usable in a repository name",
            spec.name
        )));
    }
    if !PACKAGE_ID_REGEX.is_match(&spec.package_id) {
        return Err(ApiError::validation(format!(
            "package id {:?} must be reverse-domain, e.g. com.example.app",
            spec.package_id
        )));
    }
    if !VERSION_REGEX.is_match(&spec.version) {
        return Err(ApiError::validation(format!(
            "version {:?} must be major.minor.patch",
            spec.version
        )));
    }
    Ok(())
}

/// Lowercase, ASCII alphanumerics, runs of anything else collapsed to `-`.
pub fn repo_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::template_service::BASIC_TEMPLATE_ID;
    use crate::store::MemoryStore;

    fn spec(name: &str, package_id: &str, version: &str) -> AppSpec {
        AppSpec {
            name: name.to_string(),
            package_id: package_id.to_string(),
            version: version.to_string(),
            description: "A demo".to_string(),
            template_id: BASIC_TEMPLATE_ID.to_string(),
        }
    }

    fn generator() -> AppGenerator {
        AppGenerator::new(Arc::new(TemplateManager::new(Arc::new(MemoryStore::new()))))
    }

    #[test]
    fn slugs() {
        assert_eq!(repo_slug("Demo App"), "demo-app");
        assert_eq!(repo_slug("  My  Cool__App!! "), "my-cool-app");
        assert_eq!(repo_slug("Café 2"), "caf-2");
        assert_eq!(repo_slug("***"), "");
    }

    #[test]
    fn rejects_invalid_specs() {
        let g = generator();
        for bad in [
            spec("", "com.example.demo", "1.0.0"),
            spec("Demo", "demo", "1.0.0"),
            spec("Demo", "com.1example", "1.0.0"),
            spec("Demo", "com.example.demo", "1.0"),
        ] {
            assert_eq!(g.validate(&bad).unwrap_err().kind, ErrorKind::Validation);
        }

        let mut unknown = spec("Demo", "com.example.demo", "1.0.0");
        unknown.template_id = "nope".to_string();
        assert_eq!(g.validate(&unknown).unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn renders_basic_template() {
        let author = Author {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        };
        let app = generator()
            .generate(&spec("Demo App", "com.example.demo", "2.1.0"), &author)
            .unwrap();

        assert_eq!(app.repo_name, "demo-app");
        assert_eq!(app.files.len(), 5);

        let config = app.files.iter().find(|f| f.path == "config.xml").unwrap();
        assert!(config.content.contains(r#"id="com.example.demo""#));
        assert!(config.content.contains(r#"version="2.1.0""#));
        assert!(config.content.contains("<name>Demo App</name>"));
        assert!(config.content.contains("ada@example.com"));
        assert!(!app.files.iter().any(|f| f.content.contains("{{appName}}")));
    }
}
