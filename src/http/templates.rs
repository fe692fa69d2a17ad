//! Error page templates.
//!
//! Templates are plain HTML with `{{ name }}` placeholders, loaded once at
//! startup and addressed by logical name. Values are HTML-escaped.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use serde_json::Value;

/// Logical name of the internal-error page.
pub const INTERNAL_ERROR: &str = "500";

const BUILTIN_INTERNAL_ERROR: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>500 Internal Server Error</title></head>
<body>
<h1>Something went wrong</h1>
<p>{{ domain }} could not serve <code>{{ route }}</code> right now. Please try again later.</p>
</body>
</html>
"#;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template {0:?}")]
    Unknown(String),
    #[error("failed to read template {name:?}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unterminated placeholder in template {0:?}")]
    Unterminated(String),
}

/// Renders a named template with a JSON object as context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, context: &Value) -> Result<Bytes, TemplateError>;
}

/// Templates loaded at startup, indexed by logical name.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    /// Registry holding only the built-in pages.
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(INTERNAL_ERROR.to_string(), BUILTIN_INTERNAL_ERROR.to_string());
        Self { templates }
    }

    /// Load every configured file; configured names override built-ins.
    pub fn load(files: &HashMap<String, PathBuf>) -> Result<Self, TemplateError> {
        let mut registry = Self::builtin();
        for (name, path) in files {
            let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
                name: name.clone(),
                source,
            })?;
            registry.insert(name, source)?;
            tracing::debug!(template = %name, path = %path.display(), "Template loaded");
        }
        Ok(registry)
    }

    /// Add or replace a template, checking its placeholders.
    pub fn insert(&mut self, name: &str, source: String) -> Result<(), TemplateError> {
        let mut rest = source.as_str();
        while let Some(start) = rest.find("{{") {
            match rest[start..].find("}}") {
                Some(end) => rest = &rest[start + end + 2..],
                None => return Err(TemplateError::Unterminated(name.to_string())),
            }
        }
        self.templates.insert(name.to_string(), source);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

impl TemplateRenderer for TemplateRegistry {
    fn render(&self, name: &str, context: &Value) -> Result<Bytes, TemplateError> {
        let source = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))?;

        let mut out = String::with_capacity(source.len());
        let mut rest = source.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| TemplateError::Unterminated(name.to_string()))?;
            let key = after[..end].trim();
            if let Some(value) = context.get(key) {
                push_escaped(&mut out, &display_value(value));
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);

        Ok(Bytes::from(out))
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_escaped(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}
