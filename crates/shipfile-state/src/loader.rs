//! Manifest loading
//!
//! Turns the raw text of one manifest file into its rendered form and the
//! environment in effect for it; [`parse`] then reads the rendered text into
//! a [`ManifestDocument`].
//!
//! A manifest may hold several parts separated by `---` lines. Parts are
//! handled in order, and each is rendered twice:
//!
//! 1. a lenient pass that only looks for the part's `environments:` entry
//!    for the requested environment, whose values are then loaded and merged
//!    into the accumulated environment;
//! 2. a strict pass with that environment, whose output is kept as the
//!    part's rendered text.
//!
//! Later parts therefore see values declared by earlier ones.

use indexmap::IndexMap;
use shipfile_core::values::merge_maps;
use shipfile_core::{
    CoreError, DEFAULT_ENVIRONMENT, DecryptCache, Environment, EnvironmentSpec, FileSystem,
    ManifestDocument, MissingFileHandler, ReleaseSpec, SecretDecryptor, ValueMap, Values,
    ValuesEntry, any_matches, parse_selector_sets,
};
use shipfile_engine::{Engine, TemplateContext};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StateError};

/// Everything needed to load one manifest file
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    /// Absolute path of the manifest
    pub path: &'a Path,

    /// Directory relative references resolve against
    pub base_dir: &'a Path,

    /// Raw manifest text
    pub content: &'a str,

    /// Environment inherited from the importing manifest
    pub environment: &'a Environment,

    /// Command line overrides, re-applied after every declaration
    pub overrides: Option<&'a Environment>,

    pub namespace: &'a str,
}

/// A rendered manifest
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    /// Rendered text, parts separated by `---` lines
    pub rendered: String,
    pub environment: Environment,
}

/// Reads, renders and parses manifest files
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    fs: Arc<dyn FileSystem>,
    decryptor: Option<Arc<dyn SecretDecryptor>>,
    cache: DecryptCache,
}

impl ManifestLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            decryptor: None,
            cache: DecryptCache::new(),
        }
    }

    /// Decrypt environment secrets with `decryptor`
    pub fn with_decryptor(mut self, decryptor: Arc<dyn SecretDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Share a decryption cache with other consumers of the run
    pub fn with_cache(mut self, cache: DecryptCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Render a manifest, loading its environment declarations
    pub fn load(&self, request: &LoadRequest<'_>) -> Result<LoadedManifest> {
        let file = request.path.display().to_string();
        let engine = Engine::new(Arc::clone(&self.fs), request.base_dir);
        let parts = split_parts(request.content);
        let multi_part = parts.len() > 1;

        let mut rendered = String::new();
        let mut environment = overlay(request.environment, request.overrides);

        for (index, part) in parts.iter().enumerate() {
            let name = if multi_part {
                format!("{} (part {})", file, index + 1)
            } else {
                file.clone()
            };

            if let Some(declared) = self.discover_environment(&engine, part, &name, &environment, request)? {
                environment = overlay(&overlay(&environment, Some(&declared)), request.overrides);
            }

            let ctx = TemplateContext::new(&environment, request.namespace);
            let output = engine.render_string(part, &ctx, &name)?;
            tracing::debug!(file = %name, environment = %environment.name, "rendered manifest part");

            if index > 0 {
                if !rendered.is_empty() && !rendered.ends_with('\n') {
                    rendered.push('\n');
                }
                rendered.push_str("---\n");
            }
            rendered.push_str(&output);
        }

        Ok(LoadedManifest {
            rendered,
            environment,
        })
    }

    /// Lenient pass over one part: load the requested environment's declaration
    fn discover_environment(
        &self,
        engine: &Engine,
        part: &str,
        name: &str,
        environment: &Environment,
        request: &LoadRequest<'_>,
    ) -> Result<Option<Environment>> {
        let ctx = TemplateContext::new(environment, request.namespace);
        let lenient = engine.lenient();

        // Templates elsewhere in the part may need the very values being
        // discovered; retry on just the entries discovery reads.
        let discovered = render_document(&lenient, part, &ctx, name).or_else(|err| {
            tracing::debug!(file = %name, error = %err, "retrying environment discovery on its own entries");
            let entries = top_level_entries(part, DISCOVERY_KEYS).ok_or(err)?;
            render_document(&lenient, &entries, &ctx, name)
        });

        let doc = match discovered {
            Ok(doc) => doc,
            Err(err) => {
                // The strict pass reports the real problem, if any.
                tracing::debug!(file = %name, error = %err, "environment discovery pass failed");
                return Ok(None);
            }
        };

        let Some(spec) = doc.environment(&environment.name) else {
            return Ok(None);
        };

        let handler = spec
            .missing_file_handler
            .or(doc.missing_file_handler)
            .unwrap_or_default();

        self.load_environment(spec, handler, engine, environment, request)
            .map(Some)
    }

    fn load_environment(
        &self,
        spec: &EnvironmentSpec,
        handler: MissingFileHandler,
        engine: &Engine,
        current: &Environment,
        request: &LoadRequest<'_>,
    ) -> Result<Environment> {
        let file = request.path.display().to_string();
        let ctx = TemplateContext::new(current, request.namespace);

        let mut values = self.load_values(&spec.values, engine, &ctx, handler, &file)?;
        let defaults = self.load_values(&spec.defaults, engine, &ctx, handler, &file)?;

        for secret in &spec.secrets {
            if let Some(layer) = self.load_secret(secret, engine.base_dir(), handler, &file)? {
                merge_maps(&mut values, &layer);
            }
        }

        tracing::debug!(
            environment = %current.name,
            file = %file,
            "loaded environment declaration"
        );

        Ok(Environment {
            name: current.name.clone(),
            values,
            defaults,
        })
    }

    /// Merge a list of inline maps and values files, later entries winning
    ///
    /// Files ending in `.gotmpl` or `.j2` are rendered with `ctx` first.
    pub fn load_values(
        &self,
        entries: &[ValuesEntry],
        engine: &Engine,
        ctx: &TemplateContext,
        handler: MissingFileHandler,
        file: &str,
    ) -> Result<ValueMap> {
        let mut merged = ValueMap::new();

        for entry in entries {
            let layer = match entry {
                ValuesEntry::Inline(map) => map.clone(),
                ValuesEntry::Path(path) => {
                    match self.read_values_file(path, engine, ctx, handler, file)? {
                        Some(map) => map,
                        None => continue,
                    }
                }
            };
            merge_maps(&mut merged, &layer);
        }

        Ok(merged)
    }

    fn read_values_file(
        &self,
        path: &str,
        engine: &Engine,
        ctx: &TemplateContext,
        handler: MissingFileHandler,
        file: &str,
    ) -> Result<Option<ValueMap>> {
        let abs = self.fs.abs_path(Path::new(path), engine.base_dir());
        if !self.fs.file_exists(&abs) {
            report_missing(handler, &abs, file)?;
            return Ok(None);
        }

        let display = abs.display().to_string();
        let mut content = self.fs.read_to_string(&abs)?;
        if is_template_file(&abs) {
            content = engine.render_string(&content, ctx, &display)?;
        }

        let values = Values::from_yaml(&content).map_err(|e| CoreError::yaml(display, &e))?;
        Ok(Some(values.into_map()))
    }

    fn load_secret(
        &self,
        path: &str,
        base_dir: &Path,
        handler: MissingFileHandler,
        file: &str,
    ) -> Result<Option<ValueMap>> {
        let abs = self.fs.abs_path(Path::new(path), base_dir);
        if !self.fs.file_exists(&abs) {
            report_missing(handler, &abs, file)?;
            return Ok(None);
        }

        let display = abs.display().to_string();
        let decryptor = self
            .decryptor
            .as_ref()
            .ok_or_else(|| StateError::NoDecryptor {
                path: display.clone(),
            })?;

        let bytes = self
            .cache
            .get_or_decrypt(&abs, |p| decryptor.decrypt(p))?;
        let text = std::str::from_utf8(&bytes).map_err(|e| CoreError::Decrypt {
            path: display.clone(),
            message: format!("decrypted content is not valid UTF-8: {}", e),
        })?;

        let values = Values::from_yaml(text).map_err(|e| CoreError::yaml(display, &e))?;
        Ok(Some(values.into_map()))
    }
}

/// Parse an already rendered manifest, check the environment and select releases
///
/// Parts separated by `---` lines are combined into one document.
pub fn parse(
    content: &str,
    file: &str,
    selectors: &[String],
    environment: &str,
) -> Result<ManifestDocument> {
    let parts = split_parts(content);
    let multi_part = parts.len() > 1;

    let mut document = ManifestDocument::default();
    for (index, part) in parts.iter().enumerate() {
        let name = if multi_part {
            format!("{} (part {})", file, index + 1)
        } else {
            file.to_string()
        };
        let parsed = ManifestDocument::from_yaml(&name, part)?;
        tracing::debug!(
            file = %name,
            releases = parsed.releases.len(),
            imports = parsed.helmfiles.len(),
            "parsed manifest part"
        );
        document.merge_part(parsed);
    }

    validate_environment(&document, environment, file)?;
    document.releases = select_releases(&document.releases, selectors, file)?;
    Ok(document)
}

/// Fail if the document declares environments but not the requested one
///
/// The default environment is always defined.
pub fn validate_environment(document: &ManifestDocument, name: &str, file: &str) -> Result<()> {
    if name == DEFAULT_ENVIRONMENT
        || !document.declares_environments()
        || document.environment(name).is_some()
    {
        return Ok(());
    }

    Err(StateError::UndefinedEnvironment {
        name: name.to_string(),
        file: file.to_string(),
    })
}

/// Filter releases by OR-ed selector sets, rejecting duplicate names
///
/// Duplicates are checked per set, on the releases that set selects.
pub fn select_releases(
    releases: &[ReleaseSpec],
    selectors: &[String],
    file: &str,
) -> Result<Vec<ReleaseSpec>> {
    let sets = parse_selector_sets(selectors).map_err(|source| StateError::Selector {
        file: file.to_string(),
        source,
    })?;

    if sets.is_empty() {
        check_duplicates(releases.iter(), file)?;
        return Ok(releases.to_vec());
    }

    for set in &sets {
        check_duplicates(
            releases
                .iter()
                .filter(|release| set.matches(&release.selector_labels())),
            file,
        )?;
    }

    Ok(releases
        .iter()
        .filter(|release| any_matches(&sets, &release.selector_labels()))
        .cloned()
        .collect())
}

fn check_duplicates<'a>(releases: impl Iterator<Item = &'a ReleaseSpec>, file: &str) -> Result<()> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for release in releases {
        *counts.entry(release.name.as_str()).or_default() += 1;
    }

    match counts.into_iter().find(|(_, count)| *count > 1) {
        Some((name, count)) => Err(StateError::DuplicateRelease {
            name: name.to_string(),
            file: file.to_string(),
            count,
        }),
        None => Ok(()),
    }
}

/// Top-level keys the discovery pass reads
const DISCOVERY_KEYS: &[&str] = &["environments", "missingFileHandler"];

fn render_document(
    engine: &Engine,
    text: &str,
    ctx: &TemplateContext,
    name: &str,
) -> Result<ManifestDocument> {
    let rendered = engine.render_string(text, ctx, name)?;
    Ok(ManifestDocument::from_yaml(name, &rendered)?)
}

/// The text of the named top-level entries of a part, `None` if none is present
///
/// An entry runs from its `key:` line up to the next line that starts at
/// column zero and is neither blank nor a comment.
fn top_level_entries(part: &str, keys: &[&str]) -> Option<String> {
    let mut entries = String::new();
    let mut inside = false;

    for line in part.split_inclusive('\n') {
        let body = line.trim_end();
        let continues = body.is_empty() || body.starts_with([' ', '\t', '#']);
        if !continues {
            inside = keys.iter().any(|key| {
                body.strip_prefix(key)
                    .is_some_and(|rest| rest.trim_start().starts_with(':'))
            });
        }
        if inside {
            entries.push_str(line);
        }
    }

    (!entries.is_empty()).then_some(entries)
}

/// Split manifest text on `---` lines
fn split_parts(content: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
        }
    }
    parts.push(current);

    parts
}

fn is_template_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("gotmpl") | Some("j2")
    )
}

fn overlay(base: &Environment, overlay: Option<&Environment>) -> Environment {
    Environment::merge(Some(base), overlay).unwrap_or_else(|| base.clone())
}

fn report_missing(handler: MissingFileHandler, path: &Path, file: &str) -> Result<()> {
    let path_str = path.display().to_string();
    match handler {
        MissingFileHandler::Error => {
            return Err(StateError::MissingValuesFile {
                path: path_str,
                file: file.to_string(),
            });
        }
        MissingFileHandler::Warn => {
            tracing::warn!(path = %path_str, file = %file, "skipping missing values file")
        }
        MissingFileHandler::Info => {
            tracing::info!(path = %path_str, file = %file, "skipping missing values file")
        }
        MissingFileHandler::Debug => {
            tracing::debug!(path = %path_str, file = %file, "skipping missing values file")
        }
    }
    Ok(())
}
