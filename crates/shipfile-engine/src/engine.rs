//! Template engine based on MiniJinja

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value as JsonValue;
use shipfile_core::{FileSystem, OsFileSystem, ReleaseSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::TemplateContext;
use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
    base_dir: PathBuf,
    fs: Option<Arc<dyn FileSystem>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict_mode: true,
            base_dir: PathBuf::from("."),
            fs: None,
        }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Directory `readFile` resolves against
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Filesystem used by `readFile`
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine {
            strict_mode: self.strict_mode,
            base_dir: self.base_dir,
            fs: self.fs.unwrap_or_else(|| Arc::new(OsFileSystem)),
        }
    }
}

/// The template engine
///
/// An engine is bound to one manifest's base directory. Every render builds
/// a fresh MiniJinja environment, so renders never share state.
#[derive(Clone)]
pub struct Engine {
    strict_mode: bool,
    base_dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strict_mode", &self.strict_mode)
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

impl Engine {
    /// Create a strict engine for the given base directory
    pub fn new(fs: Arc<dyn FileSystem>, base_dir: impl Into<PathBuf>) -> Self {
        Self::builder().file_system(fs).base_dir(base_dir).build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Same engine with undefined values rendering as empty
    pub fn lenient(&self) -> Self {
        Self {
            strict_mode: false,
            ..self.clone()
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(UndefinedBehavior::Chainable);
        }
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("getOrNil", functions::get_or_nil);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("env", functions::env);
        env.add_function("requiredEnv", functions::required_env);
        env.add_function("toYaml", functions::to_yaml);
        env.add_function("fromYaml", functions::from_yaml);
        env.add_function("toJson", functions::to_json_fn);
        env.add_function("fromJson", functions::from_json);
        env.add_function(
            "readFile",
            functions::read_file(Arc::clone(&self.fs), self.base_dir.clone()),
        );

        env
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();

        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
            })?;

        let tmpl = env.get_template(template_name).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
        })?;

        let ctx = minijinja::Value::from_serialize(context);

        tmpl.render(ctx).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
        })
    }

    /// Expand templated fields of a release
    ///
    /// `name`, `namespace`, `chart` and `version` are rendered first, so the
    /// rest of the release can refer to their final values through
    /// `release.*`. Hooks are left untouched; they are rendered when fired.
    pub fn render_release(
        &self,
        release: &ReleaseSpec,
        context: &TemplateContext,
        source: &str,
    ) -> Result<ReleaseSpec> {
        let template_name = format!("{} (release \"{}\")", source, release.name);
        let raw_ctx = context.clone().with_release(release)?;

        let mut identity = release.clone();
        identity.name = self.render_field(&release.name, &raw_ctx, &template_name)?;
        identity.chart = self.render_field(&release.chart, &raw_ctx, &template_name)?;
        identity.namespace = self.render_optional(release.namespace.as_deref(), &raw_ctx, &template_name)?;
        identity.version = self.render_optional(release.version.as_deref(), &raw_ctx, &template_name)?;

        let ctx = context.clone().with_release(&identity)?;
        let mut tree = serde_json::to_value(&identity).map_err(|e| conversion(&identity, e))?;

        if let JsonValue::Object(fields) = &mut tree {
            for (key, value) in fields.iter_mut() {
                if key == "hooks" {
                    continue;
                }
                self.render_leaves(value, &ctx, &template_name)?;
            }
        }

        serde_json::from_value(tree).map_err(|e| conversion(&identity, e))
    }

    /// Render every templated string inside a value tree
    pub fn render_leaves(
        &self,
        value: &mut JsonValue,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<()> {
        match value {
            JsonValue::String(s) if is_template(s) => {
                *s = self.render_string(s, context, template_name)?;
            }
            JsonValue::Array(items) => {
                for item in items {
                    self.render_leaves(item, context, template_name)?;
                }
            }
            JsonValue::Object(map) => {
                for item in map.values_mut() {
                    self.render_leaves(item, context, template_name)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn render_field(&self, field: &str, context: &TemplateContext, template_name: &str) -> Result<String> {
        if is_template(field) {
            self.render_string(field, context, template_name)
        } else {
            Ok(field.to_string())
        }
    }

    fn render_optional(
        &self,
        field: Option<&str>,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<Option<String>> {
        field
            .map(|f| self.render_field(f, context, template_name))
            .transpose()
    }
}

/// Whether a string holds template syntax
pub fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

fn conversion(release: &ReleaseSpec, err: serde_json::Error) -> EngineError {
    EngineError::Conversion {
        what: format!("release \"{}\"", release.name),
        message: err.to_string(),
    }
}
