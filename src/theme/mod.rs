//! Template engine
//!
//! Page templates are rendered with Tera. The default templates are
//! embedded in the binary; a directory on disk may override any of them
//! by providing a file with the same relative name.

use anyhow::{Context, Result};
use rust_embed::RustEmbed;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera, Value};

mod error;

pub use error::TemplateError;

/// Default templates compiled into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct DefaultTemplates;

/// Renders pages from embedded templates plus on-disk overrides
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load the embedded templates, then any `.html` files under
    /// `override_dir`. A missing override directory is not an error.
    pub fn new(override_dir: &Path) -> Result<Self> {
        let mut templates: HashMap<String, String> = HashMap::new();

        for name in DefaultTemplates::iter() {
            if let Some(file) = DefaultTemplates::get(&name) {
                let content = String::from_utf8(file.data.into_owned())
                    .with_context(|| format!("Embedded template {} is not UTF-8", name))?;
                templates.insert(name.replace('\\', "/"), content);
            }
        }

        let mut overridden = Vec::new();
        collect_templates_from_dir(override_dir, override_dir, &mut overridden)?;
        if !overridden.is_empty() {
            tracing::info!(
                "Loaded {} template override(s) from {}",
                overridden.len(),
                override_dir.display()
            );
        }
        templates.extend(overridden);

        Self::from_templates(templates.into_iter().collect())
    }

    /// Build an engine from `(name, source)` pairs only
    pub fn from_templates(templates: Vec<(String, String)>) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Template(describe(&e)))?;
        register_filters(&mut tera);
        Ok(Self { tera })
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            TemplateError::Template(format!("Failed to render '{}': {}", template, describe(&e)))
                .into()
        })
    }

    /// Render a template, or a bare HTML page naming the failure.
    ///
    /// Used for error pages, which must produce a body even when the
    /// templates themselves are broken.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext, title: &str) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("{}", e);
                simple_page(title)
            }
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| TemplateError::Template("Failed to get relative path".to_string()))?;
            let template_name = relative_path.to_string_lossy().replace('\\', "/");

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((template_name, content));
        }
    }

    Ok(())
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("linebreaksbr", linebreaksbr);
}

/// Escape text and turn newlines into `<br>`; pipe the result through `safe`.
fn linebreaksbr(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("linebreaksbr expects a string"))?;
    let html = tera::escape_html(&text.replace("\r\n", "\n")).replace('\n', "<br>");
    Ok(Value::String(html))
}

fn simple_page(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ru">
<head><meta charset="UTF-8"><title>{0}</title></head>
<body><h1>{0}</h1></body>
</html>"#,
        tera::escape_html(title)
    )
}

#[cfg(test)]
mod tests;
