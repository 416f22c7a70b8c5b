//! Recursive manifest resolution
//!
//! Starting from an entry manifest, imports are expanded depth first. Each
//! imported manifest is resolved relative to the directory of the manifest
//! that imports it; only the entry point is resolved against the working
//! directory. Children are emitted before their parent, in declaration order,
//! and the whole sequence is reversed at the end when requested.

use shipfile_core::{
    DEFAULT_ENVIRONMENT, DecryptCache, Environment, FileSystem, MissingFileHandler, SecretDecryptor,
    SubManifestSpec, ValueMap, Values, parse_set_values,
};
use shipfile_engine::{Engine, TemplateContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, StateError};
use crate::loader::{LoadRequest, ManifestLoader, parse};
use crate::state::ResolvedState;

/// Manifest looked up in the working directory when none is given
pub const DEFAULT_MANIFEST: &str = "shipfile.yaml";

/// Directory of manifests looked up when [`DEFAULT_MANIFEST`] is absent
pub const DEFAULT_MANIFEST_DIR: &str = "shipfile.d";

/// What to resolve and how
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Entry manifest, directory or glob; relative to the working directory
    pub file: Option<PathBuf>,

    /// Environment name
    pub environment: String,

    /// Namespace for releases that do not set one
    pub namespace: String,

    /// Selector sets, each a comma separated list of `k=v` / `k!=v`
    pub selectors: Vec<String>,

    /// YAML files layered over every manifest's environment values
    pub state_values_files: Vec<PathBuf>,

    /// `key=value` pairs layered over `state_values_files`
    pub state_values_set: Vec<String>,

    /// Reverse the resolved sequence (teardown order)
    pub reverse: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            file: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            namespace: String::new(),
            selectors: Vec::new(),
            state_values_files: Vec::new(),
            state_values_set: Vec::new(),
            reverse: false,
        }
    }
}

/// Settings shared by every manifest of one resolution
struct Run<'a> {
    options: &'a ResolveOptions,
    overrides: Option<Environment>,
}

/// Expands manifests and their imports into resolved states
#[derive(Debug, Clone)]
pub struct StateResolver {
    fs: Arc<dyn FileSystem>,
    loader: ManifestLoader,
}

impl StateResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            loader: ManifestLoader::new(Arc::clone(&fs)),
            fs,
        }
    }

    /// Decrypt environment secrets with `decryptor`
    pub fn with_decryptor(mut self, decryptor: Arc<dyn SecretDecryptor>) -> Self {
        self.loader = self.loader.with_decryptor(decryptor);
        self
    }

    pub fn with_cache(mut self, cache: DecryptCache) -> Self {
        self.loader = self.loader.with_cache(cache);
        self
    }

    /// Resolve the entry manifest and everything it imports
    ///
    /// Any failure aborts the whole resolution.
    pub fn resolve(&self, options: &ResolveOptions) -> Result<Vec<ResolvedState>> {
        let span = tracing::info_span!("resolve", environment = %options.environment);
        let _guard = span.enter();

        let cwd = self.fs.working_dir()?;
        let run = Run {
            options,
            overrides: self.state_value_overrides(options, &cwd)?,
        };

        let root = Environment::new(&options.environment);
        let mut states = Vec::new();
        for entry in self.entry_points(options.file.as_deref(), &cwd)? {
            states.extend(self.resolve_file(&run, &entry, &[], &root, &options.selectors)?);
        }

        if options.reverse {
            states.reverse();
        }

        tracing::debug!(states = states.len(), "resolution complete");
        Ok(states)
    }

    fn resolve_file(
        &self,
        run: &Run<'_>,
        path: &Path,
        ancestors: &[PathBuf],
        parent_env: &Environment,
        selectors: &[String],
    ) -> Result<Vec<ResolvedState>> {
        if ancestors.iter().any(|ancestor| ancestor == path) {
            let chain = ancestors
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(StateError::ImportCycle { chain });
        }

        let file = path.display().to_string();
        let base_dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
        tracing::debug!(file = %file, "resolving manifest");

        let content = self.fs.read_to_string(path)?;
        let loaded = self.loader.load(&LoadRequest {
            path,
            base_dir: &base_dir,
            content: &content,
            environment: parent_env,
            overrides: run.overrides.as_ref(),
            namespace: &run.options.namespace,
        })?;
        let document = parse(&loaded.rendered, &file, selectors, &run.options.environment)?;

        let engine = Engine::new(Arc::clone(&self.fs), &base_dir);
        let mut chain = ancestors.to_vec();
        chain.push(path.to_path_buf());

        let mut states = Vec::new();
        for import in &document.helmfiles {
            let child_selectors = match (&import.selectors, import.selectors_inherited) {
                (Some(own), false) => own.clone(),
                _ => selectors.to_vec(),
            };
            let child_env = self.import_environment(run, import, &loaded.environment, &engine, &file)?;

            for child in self.expand_import(import, &base_dir, &file)? {
                states.extend(self.resolve_file(run, &child, &chain, &child_env, &child_selectors)?);
            }
        }

        let ctx = TemplateContext::new(&loaded.environment, &run.options.namespace);
        let mut releases = Vec::with_capacity(document.releases.len());
        for release in &document.releases {
            let mut rendered = engine.render_release(release, &ctx, &file)?;
            if rendered.namespace.as_deref().is_none_or(str::is_empty)
                && !run.options.namespace.is_empty()
            {
                rendered.namespace = Some(run.options.namespace.clone());
            }
            releases.push(rendered);
        }

        tracing::debug!(file = %file, releases = releases.len(), "resolved manifest");

        states.push(ResolvedState {
            file_path: path.to_path_buf(),
            base_dir,
            environment: loaded.environment,
            namespace: run.options.namespace.clone(),
            releases,
            hooks: document.hooks,
            repositories: document.repositories,
            helm_defaults: document.helm_defaults.unwrap_or_default(),
            selectors: selectors.to_vec(),
        });

        Ok(states)
    }

    /// Environment handed to an imported manifest
    fn import_environment(
        &self,
        run: &Run<'_>,
        import: &SubManifestSpec,
        current: &Environment,
        engine: &Engine,
        file: &str,
    ) -> Result<Environment> {
        if import.values.is_empty() {
            return Ok(current.deep_copy());
        }

        let ctx = TemplateContext::new(current, &run.options.namespace);
        let values = self
            .loader
            .load_values(&import.values, engine, &ctx, MissingFileHandler::Error, file)?;
        let layer = Environment::with_values(current.name.clone(), values);

        Ok(Environment::merge(Some(current), Some(&layer)).unwrap_or_else(|| current.deep_copy()))
    }

    /// Absolute paths an import refers to, in glob order
    fn expand_import(&self, import: &SubManifestSpec, base_dir: &Path, file: &str) -> Result<Vec<PathBuf>> {
        let abs = self.fs.abs_path(Path::new(&import.path), base_dir);

        let matches = if import.is_glob() {
            self.fs
                .glob(&abs)?
                .into_iter()
                .filter(|path| self.fs.file_exists(path))
                .collect()
        } else if self.fs.file_exists(&abs) {
            vec![abs]
        } else {
            Vec::new()
        };

        if matches.is_empty() {
            return Err(StateError::UnresolvedImport {
                pattern: import.path.clone(),
                file: file.to_string(),
            });
        }

        tracing::debug!(pattern = %import.path, matches = matches.len(), "expanded import");
        Ok(matches)
    }

    /// Manifests named on the command line, or found in the working directory
    fn entry_points(&self, file: Option<&Path>, cwd: &Path) -> Result<Vec<PathBuf>> {
        let Some(file) = file else {
            let default = cwd.join(DEFAULT_MANIFEST);
            if self.fs.file_exists(&default) {
                return Ok(vec![default]);
            }

            let dir = cwd.join(DEFAULT_MANIFEST_DIR);
            let matches = self.fs.glob(&dir.join("*.yaml"))?;
            if matches.is_empty() {
                return Err(StateError::NoManifest {
                    dir: cwd.display().to_string(),
                });
            }
            return Ok(matches);
        };

        let abs = self.fs.abs_path(file, cwd);
        if self.fs.directory_exists(&abs) {
            let matches = self.fs.glob(&abs.join("*.yaml"))?;
            if matches.is_empty() {
                return Err(StateError::NoManifest {
                    dir: abs.display().to_string(),
                });
            }
            return Ok(matches);
        }

        if SubManifestSpec::new(file.display().to_string()).is_glob() {
            let matches = self.fs.glob(&abs)?;
            if matches.is_empty() {
                return Err(StateError::ManifestNotFound {
                    path: abs.display().to_string(),
                });
            }
            return Ok(matches);
        }

        if !self.fs.file_exists(&abs) {
            return Err(StateError::ManifestNotFound {
                path: abs.display().to_string(),
            });
        }
        Ok(vec![abs])
    }

    /// Values from `--state-values-file` and `--state-values-set`
    fn state_value_overrides(&self, options: &ResolveOptions, cwd: &Path) -> Result<Option<Environment>> {
        if options.state_values_files.is_empty() && options.state_values_set.is_empty() {
            return Ok(None);
        }

        let mut values = Values::new();
        for file in &options.state_values_files {
            let abs = self.fs.abs_path(file, cwd);
            let content = self.fs.read_to_string(&abs)?;
            let layer = Values::from_yaml(&content)
                .map_err(|e| shipfile_core::CoreError::yaml(abs.display().to_string(), &e))?;
            values.merge(&layer);
        }
        values.merge(&parse_set_values(&options.state_values_set)?);

        let map: ValueMap = values.into_map();
        Ok(Some(Environment::with_values(options.environment.clone(), map)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfile_core::MemoryFileSystem;

    fn resolver(files: &[(&str, &str)]) -> StateResolver {
        StateResolver::new(Arc::new(MemoryFileSystem::new("/work").with_files(files.iter().copied())))
    }

    #[test]
    fn test_default_manifest_lookup() {
        let resolver = resolver(&[("shipfile.yaml", "releases:\n  - name: a\n    chart: c\n")]);
        let states = resolver.resolve(&ResolveOptions::default()).unwrap();

        assert_eq!(states.len(), 1);
        assert_eq!(states[0].file_path, PathBuf::from("/work/shipfile.yaml"));
    }

    #[test]
    fn test_default_manifest_dir_lookup() {
        let resolver = resolver(&[
            ("shipfile.d/b.yaml", "releases:\n  - name: b\n"),
            ("shipfile.d/a.yaml", "releases:\n  - name: a\n"),
        ]);
        let states = resolver.resolve(&ResolveOptions::default()).unwrap();

        let names: Vec<_> = states.iter().flat_map(|s| s.release_names()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_no_manifest() {
        let err = resolver(&[]).resolve(&ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, StateError::NoManifest { .. }));
    }

    #[test]
    fn test_missing_entry_manifest() {
        let options = ResolveOptions {
            file: Some(PathBuf::from("nope.yaml")),
            ..Default::default()
        };
        let err = resolver(&[]).resolve(&options).unwrap_err();
        assert_eq!(err.to_string(), "manifest /work/nope.yaml does not exist");
    }

    #[test]
    fn test_namespace_fills_unset_release_namespace() {
        let resolver = resolver(&[(
            "shipfile.yaml",
            "releases:\n  - name: a\n  - name: b\n    namespace: kube-system\n",
        )]);
        let options = ResolveOptions {
            namespace: "apps".into(),
            ..Default::default()
        };

        let states = resolver.resolve(&options).unwrap();
        let namespaces: Vec<_> = states[0]
            .releases
            .iter()
            .map(|r| r.namespace.clone().unwrap_or_default())
            .collect();
        assert_eq!(namespaces, vec!["apps", "kube-system"]);
    }

    #[test]
    fn test_state_values_override() {
        let resolver = resolver(&[
            (
                "shipfile.yaml",
                "environments:\n  default:\n    values:\n      - replicas: 1\n        image: nginx\n---\nreleases:\n  - name: web-{{ values.replicas }}-{{ values.image }}\n",
            ),
            ("overrides.yaml", "image: caddy\n"),
        ]);
        let options = ResolveOptions {
            state_values_files: vec![PathBuf::from("overrides.yaml")],
            state_values_set: vec!["replicas=4".into()],
            ..Default::default()
        };

        let states = resolver.resolve(&options).unwrap();
        assert_eq!(states[0].release_names(), vec!["web-4-caddy"]);
    }
}
