//! Template management: the built-in Cordova starter plus user templates.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

use crate::models::{Template, TemplateFile};
use crate::store::{self, KeyValueStore, TEMPLATES_KEY};

pub const BASIC_TEMPLATE_ID: &str = "cordova-basic";

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Replace `{{key}}` tokens from `values`; unknown keys are left as written.
pub fn render(content: &str, values: &HashMap<&str, String>) -> String {
    PLACEHOLDER_REGEX
        .replace_all(content, |caps: &Captures| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub struct TemplateManager {
    store: Arc<dyn KeyValueStore>,
}

impl TemplateManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Built-in templates followed by custom ones.
    pub fn list(&self) -> anyhow::Result<Vec<Template>> {
        let mut templates = builtin_templates();
        templates.extend(self.load_custom()?);
        Ok(templates)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<Template>> {
        Ok(self.list()?.into_iter().find(|t| t.id == id))
    }

    /// Insert or replace a custom template.
    pub fn save(&self, template: Template) -> anyhow::Result<()> {
        if is_builtin(&template.id) {
            anyhow::bail!("template {} is built in and cannot be modified", template.id);
        }
        if template.id.trim().is_empty() {
            anyhow::bail!("template id must not be empty");
        }
        if template.files.is_empty() {
            anyhow::bail!("template {} has no files", template.id);
        }

        let mut custom = self.load_custom()?;
        let template = Template {
            builtin: false,
            ..template
        };
        match custom.iter_mut().find(|t| t.id == template.id) {
            Some(slot) => *slot = template.clone(),
            None => custom.push(template.clone()),
        }
        store::save_json(self.store.as_ref(), TEMPLATES_KEY, &custom)?;
        tracing::info!(template = %template.id, "Template saved");
        Ok(())
    }

    /// Delete a custom template. Returns `false` when no such template exists.
    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        if is_builtin(id) {
            anyhow::bail!("template {id} is built in and cannot be deleted");
        }
        let mut custom = self.load_custom()?;
        let before = custom.len();
        custom.retain(|t| t.id != id);
        if custom.len() == before {
            return Ok(false);
        }
        store::save_json(self.store.as_ref(), TEMPLATES_KEY, &custom)?;
        tracing::info!(template = id, "Template deleted");
        Ok(true)
    }

    fn load_custom(&self) -> anyhow::Result<Vec<Template>> {
        Ok(store::load_json(self.store.as_ref(), TEMPLATES_KEY)?.unwrap_or_default())
    }
}

fn is_builtin(id: &str) -> bool {
    builtin_templates().iter().any(|t| t.id == id)
}

fn builtin_templates() -> Vec<Template> {
    vec![Template {
        id: BASIC_TEMPLATE_ID.to_string(),
        name: "Cordova basic".to_string(),
        description: "Single-page Cordova app with the device-ready handler wired up".to_string(),
        files: vec![
            TemplateFile {
                path: "config.xml".to_string(),
                content: BASIC_CONFIG_XML.to_string(),
            },
            TemplateFile {
                path: "package.json".to_string(),
                content: BASIC_PACKAGE_JSON.to_string(),
            },
            TemplateFile {
                path: "www/index.html".to_string(),
                content: BASIC_INDEX_HTML.to_string(),
            },
            TemplateFile {
                path: "www/css/index.css".to_string(),
                content: BASIC_INDEX_CSS.to_string(),
            },
            TemplateFile {
                path: "www/js/index.js".to_string(),
                content: BASIC_INDEX_JS.to_string(),
            },
        ],
        builtin: true,
    }]
}

const BASIC_CONFIG_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<widget id="{{packageId}}" version="{{version}}" xmlns="http://www.w3.org/ns/widgets" xmlns:cdv="http://cordova.apache.org/ns/1.0">
    <name>{{appName}}</name>
    <description>{{description}}</description>
    <author email="{{authorEmail}}">{{authorName}}</author>
    <content src="index.html" />
    <allow-intent href="http://*/*" />
    <allow-intent href="https://*/*" />
    <platform name="android">
        <preference name="AndroidXEnabled" value="true" />
    </platform>
</widget>
"#;

const BASIC_PACKAGE_JSON: &str = r#"{
  "name": "{{packageId}}",
  "displayName": "{{appName}}",
  "version": "{{version}}",
  "description": "{{description}}",
  "main": "index.js",
  "scripts": {
    "build:android": "cordova build android"
  },
  "author": "{{authorName}} <{{authorEmail}}>",
  "license": "UNLICENSED",
  "devDependencies": {
    "cordova": "^12.0.0",
    "cordova-android": "^13.0.0"
  },
  "cordova": {
    "platforms": ["android"],
    "plugins": {}
  }
}
"#;

const BASIC_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta http-equiv="Content-Security-Policy" content="default-src 'self' data: https://ssl.gstatic.com 'unsafe-eval'; style-src 'self' 'unsafe-inline'; media-src *; img-src 'self' data: content:;">
    <meta name="viewport" content="initial-scale=1, width=device-width, viewport-fit=cover">
    <link rel="stylesheet" href="css/index.css">
    <title>{{appName}}</title>
</head>
<body>
    <div class="app">
        <h1>{{appName}}</h1>
        <p id="deviceready" class="blink">Connecting to device</p>
    </div>
    <script src="cordova.js"></script>
    <script src="js/index.js"></script>
</body>
</html>
"#;

const BASIC_INDEX_CSS: &str = r#"body {
    font-family: system-ui, sans-serif;
    margin: 0;
    text-align: center;
}

.app {
    padding: 4rem 1rem;
}

.blink {
    animation: fade 3s ease-in-out infinite alternate;
}

@keyframes fade {
    from { opacity: 1; }
    to { opacity: 0.4; }
}
"#;

const BASIC_INDEX_JS: &str = r#"document.addEventListener('deviceready', function () {
    var el = document.getElementById('deviceready');
    el.textContent = '{{appName}} is ready (Cordova ' + cordova.platformId + ')';
    el.classList.remove('blink');
}, false);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> TemplateManager {
        TemplateManager::new(Arc::new(MemoryStore::new()))
    }

    fn custom(id: &str) -> Template {
        Template {
            id: id.to_string(),
            name: "Custom".to_string(),
            description: String::new(),
            files: vec![TemplateFile {
                path: "www/index.html".to_string(),
                content: "<h1>{{appName}}</h1>".to_string(),
            }],
            builtin: false,
        }
    }

    #[test]
    fn render_replaces_known_and_keeps_unknown() {
        let values = HashMap::from([("appName", "Demo".to_string())]);
        assert_eq!(
            render("<h1>{{ appName }}</h1><p>{{missing}}</p>", &values),
            "<h1>Demo</h1><p>{{missing}}</p>"
        );
    }

    #[test]
    fn builtin_template_is_listed_and_protected() {
        let templates = manager();
        let basic = templates.get(BASIC_TEMPLATE_ID).unwrap().unwrap();
        assert!(basic.builtin);
        assert!(basic.files.iter().any(|f| f.path == "config.xml"));

        assert!(templates.save(custom(BASIC_TEMPLATE_ID)).is_err());
        assert!(templates.delete(BASIC_TEMPLATE_ID).is_err());
    }

    #[test]
    fn custom_templates_round_trip() {
        let templates = manager();
        templates.save(custom("landing")).unwrap();

        let mut updated = custom("landing");
        updated.name = "Landing page".to_string();
        templates.save(updated).unwrap();

        let all = templates.list().unwrap();
        assert_eq!(all.len(), 2);
        let landing = templates.get("landing").unwrap().unwrap();
        assert_eq!(landing.name, "Landing page");
        assert!(!landing.builtin);

        assert!(templates.delete("landing").unwrap());
        assert!(!templates.delete("landing").unwrap());
        assert!(templates.get("landing").unwrap().is_none());
    }
}
