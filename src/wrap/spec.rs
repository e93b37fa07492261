//! Wrap arguments and how they combine.

use crate::artifact::{ArtifactId, ArtifactPath};
use crate::build::Toolchain;
use crate::error::Result;
use crate::manifest::{Executable, Identity, Interpreter, Manifest};
use crate::mutation::Env;
use crate::template::Template;
use crate::triple::Triple;

/// A structured wrap request. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct WrapSpec {
    /// Arguments passed to the executable
    pub args: Vec<Template>,
    /// Toolchain to use instead of building one
    pub build_toolchain: Option<Toolchain>,
    /// Environment mutations
    pub env: Env,
    /// The program to wrap
    pub executable: Option<Executable>,
    /// Host the wrapper runs on
    pub host: Option<Triple>,
    /// What the process appears to be
    pub identity: Option<Identity>,
    /// Interpreter to use instead of resolving one
    pub interpreter: Option<Interpreter>,
    /// Extra library search paths
    pub library_paths: Vec<ArtifactPath>,
    /// Libraries to preload
    pub preloads: Vec<ArtifactPath>,
    /// Whether to flatten an existing wrapper (`None` means yes, if it is one)
    pub merge: Option<bool>,
}

impl WrapSpec {
    /// Applies `later` on top of this spec.
    ///
    /// Lists and the environment accumulate; every other field is replaced
    /// when `later` sets it.
    pub fn fold(&mut self, later: WrapSpec, aggressive: bool) -> Result<()> {
        self.args.extend(later.args);
        self.env.merge(later.env, aggressive)?;
        self.library_paths.extend(later.library_paths);
        self.preloads.extend(later.preloads);

        macro_rules! last_wins {
            ($($field:ident),*) => {
                $(if later.$field.is_some() {
                    self.$field = later.$field;
                })*
            };
        }
        last_wins!(build_toolchain, executable, host, identity, interpreter, merge);

        Ok(())
    }

    /// Lowers an existing manifest into the spec that would rebuild it.
    pub fn from_manifest(manifest: &Manifest, aggressive: bool) -> Result<Self> {
        Ok(Self {
            args: manifest.args.clone(),
            env: manifest.env(aggressive)?,
            executable: Some(manifest.executable.clone()),
            identity: Some(manifest.identity),
            interpreter: manifest.interpreter.clone(),
            ..Default::default()
        })
    }
}

/// One argument to [`crate::Wrapper::wrap`].
#[derive(Debug, Clone)]
pub enum WrapArg {
    /// Script text to run
    Content(Template),
    /// An executable file, symlink, or path inside a directory
    Path(ArtifactPath),
    /// A structured request
    Spec(WrapSpec),
}

impl WrapArg {
    /// Converts the argument into a spec.
    pub fn into_spec(self) -> WrapSpec {
        match self {
            WrapArg::Content(template) => WrapSpec {
                executable: Some(Executable::Content(template)),
                ..Default::default()
            },
            WrapArg::Path(path) => WrapSpec {
                executable: Some(Executable::Path(path)),
                ..Default::default()
            },
            WrapArg::Spec(spec) => spec,
        }
    }
}

impl From<Template> for WrapArg {
    fn from(template: Template) -> Self {
        WrapArg::Content(template)
    }
}

impl From<ArtifactPath> for WrapArg {
    fn from(path: ArtifactPath) -> Self {
        WrapArg::Path(path)
    }
}

impl From<ArtifactId> for WrapArg {
    fn from(id: ArtifactId) -> Self {
        WrapArg::Path(ArtifactPath::new(id))
    }
}

impl From<WrapSpec> for WrapArg {
    fn from(spec: WrapSpec) -> Self {
        WrapArg::Spec(spec)
    }
}

/// Folds arguments left to right into one spec.
pub fn fold_args<I>(args: I, aggressive: bool) -> Result<WrapSpec>
where
    I: IntoIterator<Item = WrapArg>,
{
    let mut spec = WrapSpec::default();
    for arg in args {
        spec.fold(arg.into_spec(), aggressive)?;
    }
    Ok(spec)
}
