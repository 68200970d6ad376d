//! CI scaffolding added to generated apps before they are pushed.

use crate::models::{GeneratedApp, GeneratedFile};

pub const CODEMAGIC_YAML: &str = "codemagic.yaml";
pub const GITIGNORE: &str = ".gitignore";
pub const README: &str = "README.md";

/// Add `codemagic.yaml`, `.gitignore` and `README.md` unless the app already has them.
///
/// Returns the paths that were added.
pub fn prepare_build(app: &mut GeneratedApp, workflow_id: &str) -> Vec<String> {
    let candidates = [
        (CODEMAGIC_YAML, codemagic_yaml(app, workflow_id)),
        (GITIGNORE, GITIGNORE_BODY.to_string()),
        (README, readme(app, workflow_id)),
    ];

    let mut added = Vec::new();
    for (path, content) in candidates {
        if app.has_file(path) {
            tracing::debug!(app = %app.spec.name, path, "Keeping existing file");
            continue;
        }
        app.files.push(GeneratedFile::new(path, content));
        added.push(path.to_string());
    }

    tracing::info!(app = %app.spec.name, added = added.len(), "Build scaffolding prepared");
    added
}

fn codemagic_yaml(app: &GeneratedApp, workflow_id: &str) -> String {
    format!(
        r#"workflows:
  {workflow_id}:
    name: {name} Android debug
    max_build_duration: 60
    environment:
      node: 20
      java: 17
    scripts:
      - name: Install dependencies
        script: npm ci || npm install
      - name: Add Android platform
        script: npx cordova platform add android --nosave
      - name: Build debug APK
        script: npx cordova build android --debug
    artifacts:
      - platforms/android/app/build/outputs/**/*.apk
"#,
        name = app.spec.name,
    )
}

const GITIGNORE_BODY: &str = "platforms/\nplugins/\nnode_modules/\n";

fn readme(app: &GeneratedApp, workflow_id: &str) -> String {
    let description = if app.spec.description.is_empty() {
        "Cordova application.".to_string()
    } else {
        app.spec.description.clone()
    };
    format!(
        "# {name}\n\n{description}\n\n\
         - Package: `{package}`\n\
         - Version: `{version}`\n\n\
         ## Building\n\n\
         ```sh\nnpm install\nnpx cordova platform add android\nnpx cordova build android\n```\n\n\
         Codemagic builds this repository with the `{workflow_id}` workflow from `codemagic.yaml`.\n",
        name = app.spec.name,
        package = app.spec.package_id,
        version = app.spec.version,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppSpec;

    fn app(files: Vec<GeneratedFile>) -> GeneratedApp {
        GeneratedApp {
            spec: AppSpec {
                name: "Demo App".to_string(),
                package_id: "com.example.demo".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                template_id: "cordova-basic".to_string(),
            },
            repo_name: "demo-app".to_string(),
            files,
        }
    }

    #[test]
    fn adds_missing_scaffolding() {
        let mut app = app(vec![GeneratedFile::new("config.xml", "<widget/>")]);
        let added = prepare_build(&mut app, "cordova-android");

        assert_eq!(added, vec![CODEMAGIC_YAML, GITIGNORE, README]);
        let yaml = app.files.iter().find(|f| f.path == CODEMAGIC_YAML).unwrap();
        assert!(yaml.content.starts_with("workflows:\n  cordova-android:\n"));
        assert!(yaml.content.contains("Demo App Android debug"));
    }

    #[test]
    fn keeps_existing_files() {
        let mut app = app(vec![GeneratedFile::new(README, "custom")]);
        let added = prepare_build(&mut app, "cordova-android");

        assert_eq!(added, vec![CODEMAGIC_YAML, GITIGNORE]);
        let readme = app.files.iter().find(|f| f.path == README).unwrap();
        assert_eq!(readme.content, "custom");
        assert_eq!(app.files.iter().filter(|f| f.path == README).count(), 1);
    }
}
