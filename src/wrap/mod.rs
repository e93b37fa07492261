//! Producing wrapper artifacts.
//!
//! A wrapper is the launcher stub with a [`Manifest`] appended. Wrapping
//! follows this order:
//!
//! 1. **Folding** - Combines the arguments into one [`WrapSpec`]
//! 2. **Flattening** - Lowers an existing wrapper so its manifest is rebuilt
//!    instead of nested
//! 3. **Classification** - Reads the executable's metadata
//! 4. **Interpreter Resolution** - Picks the loader and toolchain
//! 5. **Writing** - Appends the manifest to the launcher

mod spec;

pub use spec::*;

use std::sync::Arc;

use tracing::{debug, info};

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::build::BuildExecutor;
use crate::error::{Error, Result};
use crate::interpreter::{self, ResolveRequest, Target};
use crate::manifest::{Executable, Identity, Manifest, Unwrapped};
use crate::metadata::{classify, ExecutableMetadata};
use crate::triple::Triple;

/// Defaults applied when a wrap request leaves a field unset.
#[derive(Debug, Clone)]
pub struct WrapConfig {
    /// Host the wrapper runs on
    pub host: Triple,
    /// Fold environment mutations across kinds (see [`crate::mutation::merge`])
    pub aggressive_env_merge: bool,
    /// Identity when none is requested
    pub default_identity: Identity,
}

impl Default for WrapConfig {
    fn default() -> Self {
        Self {
            host: Triple::host(),
            aggressive_env_merge: false,
            default_identity: Identity::Executable,
        }
    }
}

/// Builds wrappers into an artifact store.
pub struct Wrapper {
    store: Arc<dyn ArtifactStore>,
    executor: Arc<dyn BuildExecutor>,
    config: WrapConfig,
}

impl Wrapper {
    /// Creates a wrapper builder.
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        executor: Arc<dyn BuildExecutor>,
        config: WrapConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WrapConfig {
        &self.config
    }

    /// Wraps an executable and returns the wrapper file.
    pub fn wrap<I>(&self, args: I) -> Result<ArtifactId>
    where
        I: IntoIterator<Item = WrapArg>,
    {
        let aggressive = self.config.aggressive_env_merge;
        let spec = fold_args(args, aggressive)?;
        let mut spec = self.flatten(spec)?;

        let executable = spec.executable.take().ok_or(Error::MissingExecutable)?;
        let identity = spec.identity.unwrap_or(self.config.default_identity);
        let host = spec.host.take().unwrap_or_else(|| self.config.host.clone());

        let metadata: Option<ExecutableMetadata> = match &executable {
            Executable::Content(_) => None,
            Executable::Path(path) => {
                let id = self.store.resolve_file(path)?;
                Some(classify(self.store.as_ref(), &id)?)
            }
        };
        let target = match &metadata {
            None => Target::Content,
            Some(metadata) => Target::File(metadata),
        };

        let resolution = interpreter::resolve(
            self.executor.as_ref(),
            ResolveRequest {
                target,
                identity,
                host: &host,
                interpreter: spec.interpreter,
                library_paths: spec.library_paths,
                preloads: spec.preloads,
                build_toolchain: spec.build_toolchain,
            },
        )?;

        let mut env = resolution.env;
        env.merge(spec.env, aggressive)?;

        let manifest = Manifest {
            identity,
            interpreter: resolution.interpreter,
            executable,
            env: (!env.is_empty()).then(|| env.to_mutation()),
            args: spec.args,
        };

        let launcher = self.executor.launcher(&host)?;
        let id = manifest.write(self.store.as_ref(), &launcher)?;
        info!(
            "wrapped {} as {} ({} interpreter, identity {})",
            describe(&manifest.executable),
            id,
            manifest.interpreter.as_ref().map_or("no", |i| i.kind()),
            identity.as_str()
        );
        Ok(id)
    }

    /// Replaces a wrapper executable with the [`WrapSpec`] that built it.
    ///
    /// With `merge: Some(false)` the wrapper is kept and wrapped by reference.
    fn flatten(&self, mut spec: WrapSpec) -> Result<WrapSpec> {
        let Some(Executable::Path(path)) = &spec.executable else {
            if spec.merge == Some(true) {
                return Err(Error::MergeWithoutManifest);
            }
            return Ok(spec);
        };

        let id = self.store.resolve_file(path)?;
        let manifest = Manifest::read(self.store.as_ref(), &id)?;

        match (manifest, spec.merge) {
            (None, Some(true)) => Err(Error::MergeWithoutManifest),
            (None, _) => Ok(spec),
            (Some(_), Some(false)) => {
                debug!("wrapping {} by reference", id);
                if spec.identity.is_none() {
                    spec.identity = Some(Identity::Wrapper);
                }
                Ok(spec)
            }
            (Some(manifest), _) => {
                debug!("flattening wrapper {}", id);
                let aggressive = self.config.aggressive_env_merge;
                let mut lowered = WrapSpec::from_manifest(&manifest, aggressive)?;
                spec.executable = None;
                spec.merge = None;
                lowered.fold(spec, aggressive)?;
                Ok(lowered)
            }
        }
    }

    /// Reads the manifest of a wrapper, if `id` is one.
    pub fn manifest(&self, id: &ArtifactId) -> Result<Option<Manifest>> {
        Manifest::read(self.store.as_ref(), id)
    }

    /// Returns the executable a wrapper launches.
    pub fn unwrap(&self, id: &ArtifactId) -> Result<Option<Unwrapped>> {
        match self.manifest(id)? {
            Some(manifest) => manifest.unwrap(self.store.as_ref()).map(Some),
            None => Ok(None),
        }
    }
}

fn describe(executable: &Executable) -> String {
    match executable {
        Executable::Path(path) => path.artifact.to_string(),
        Executable::Content(_) => "script".to_string(),
    }
}
