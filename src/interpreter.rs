//! Interpreter resolution.
//!
//! Decides how the launcher should start an executable: directly, through a
//! libc loader, through dyld, or through a script interpreter.

use tracing::{debug, info};

use crate::artifact::ArtifactPath;
use crate::build::{BuildExecutor, Libc, Toolchain};
use crate::error::{Error, Result};
use crate::manifest::{DyldInterpreter, Identity, Interpreter, LdInterpreter, NormalInterpreter};
use crate::metadata::{ExecutableMetadata, Format};
use crate::mutation::Env;
use crate::triple::{Arch, Triple};

/// The kind of executable being wrapped.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Inline script text
    Content,
    /// A file with known metadata
    File(&'a ExecutableMetadata),
}

impl Target<'_> {
    fn format(&self) -> Option<Format> {
        match self {
            Target::Content => None,
            Target::File(metadata) => Some(metadata.format()),
        }
    }
}

/// Inputs to [`resolve`].
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    /// The executable
    pub target: Target<'a>,
    /// The identity the wrapper will have
    pub identity: Identity,
    /// Host the wrapper runs on
    pub host: &'a Triple,
    /// Interpreter supplied by the caller
    pub interpreter: Option<Interpreter>,
    /// Library paths searched after the resolver's own
    pub library_paths: Vec<ArtifactPath>,
    /// Preloads; when empty, the injection shim is preloaded
    pub preloads: Vec<ArtifactPath>,
    /// Toolchain to use instead of building one
    pub build_toolchain: Option<Toolchain>,
}

/// The result of [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// The chosen interpreter, if any
    pub interpreter: Option<Interpreter>,
    /// Environment of the toolchain that was consulted
    pub env: Env,
}

/// Chooses the interpreter for an executable.
pub fn resolve(executor: &dyn BuildExecutor, request: ResolveRequest<'_>) -> Result<Resolution> {
    let ResolveRequest {
        target,
        identity,
        host,
        interpreter,
        library_paths,
        preloads,
        build_toolchain,
    } = request;

    // An explicit interpreter wins.
    if let Some(mut interpreter) = interpreter {
        interpreter.check_target(target.format())?;
        interpreter.extend(&library_paths, &preloads);
        debug!("using caller-supplied {} interpreter", interpreter.kind());
        return Ok(Resolution {
            interpreter: Some(interpreter),
            env: build_toolchain.map(|tc| tc.env).unwrap_or_default(),
        });
    }

    let metadata = match target {
        Target::Content => {
            if identity != Identity::Executable {
                return Ok(Resolution::default());
            }
            let shell = executor.default_shell(host)?;
            return Ok(normal(shell));
        }
        Target::File(metadata) => metadata,
    };

    match metadata {
        ExecutableMetadata::Shebang(shebang) => {
            let path = match executor.shebang_interpreter(&shebang.interpreter, host)? {
                Some(path) => path,
                None => {
                    debug!(
                        "no artifact for shebang interpreter {}, using default shell",
                        shebang.interpreter
                    );
                    executor.default_shell(host)?
                }
            };
            Ok(normal(path))
        }

        ExecutableMetadata::Elf(elf) => {
            let Some(interp) = &elf.interpreter else {
                if identity == Identity::Executable {
                    return Err(Error::StaticExecutableIdentity);
                }
                debug!("static executable, no interpreter");
                return Ok(Resolution::default());
            };

            let libc = if interp.contains("ld-linux") {
                Libc::Gnu
            } else if interp.contains("ld-musl") {
                Libc::Musl
            } else {
                return Err(Error::UnsupportedInterpreter(interp.clone()));
            };

            let triple = libc.triple(elf.arch);
            let toolchain = match build_toolchain {
                Some(toolchain) => toolchain,
                None => executor.toolchain(&triple, libc)?,
            };
            let preloads = if preloads.is_empty() {
                vec![executor.injection(&triple)?]
            } else {
                preloads
            };

            let mut paths = toolchain.library_paths;
            paths.extend(library_paths);

            let ld = LdInterpreter {
                path: toolchain.loader,
                library_paths: paths,
                preloads,
                args: Vec::new(),
            };
            info!("resolved {} interpreter for {}", libc, triple);
            Ok(Resolution {
                interpreter: Some(match libc {
                    Libc::Gnu => Interpreter::LdLinux(ld),
                    Libc::Musl => Interpreter::LdMusl(ld),
                }),
                env: toolchain.env,
            })
        }

        ExecutableMetadata::MachO(macho) => {
            let arch = preferred_arch(host.arch, macho.arches.iter().copied());
            let preloads = if preloads.is_empty() {
                vec![executor.injection(&Triple::darwin(arch))?]
            } else {
                preloads
            };
            info!("resolved dyld interpreter for {}", arch);
            Ok(Resolution {
                interpreter: Some(Interpreter::Dyld(DyldInterpreter {
                    library_paths,
                    preloads,
                })),
                env: build_toolchain.map(|tc| tc.env).unwrap_or_default(),
            })
        }
    }
}

fn normal(path: ArtifactPath) -> Resolution {
    Resolution {
        interpreter: Some(Interpreter::Normal(NormalInterpreter {
            path,
            args: Vec::new(),
        })),
        env: Env::new(),
    }
}

/// Picks the host architecture if available, else the first one offered.
fn preferred_arch(host: Arch, mut arches: impl Iterator<Item = Arch> + Clone) -> Arch {
    if arches.clone().any(|arch| arch == host) {
        host
    } else {
        arches.next().unwrap_or(host)
    }
}
