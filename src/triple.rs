//! Target architectures and platform triples.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A CPU architecture that wrapped executables can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// 64-bit x86
    X86_64,
    /// 64-bit ARM (`arm64` on Darwin)
    Aarch64,
}

impl Arch {
    /// Returns the architecture as it appears in a triple.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Returns the architecture this crate was compiled for, if supported.
    pub fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Arch::X86_64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Arch::Aarch64)
        } else {
            None
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            _ => Err(Error::InvalidTriple(s.to_string())),
        }
    }
}

/// An (architecture, vendor, operating system, environment) tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Triple {
    /// CPU architecture
    pub arch: Arch,
    /// Vendor, e.g. "unknown" or "apple"
    pub vendor: String,
    /// Operating system, e.g. "linux" or "darwin"
    pub os: String,
    /// Environment / libc, e.g. "gnu" or "musl"
    pub environment: Option<String>,
}

impl Triple {
    /// Creates a GNU/Linux triple.
    pub fn linux_gnu(arch: Arch) -> Self {
        Self {
            arch,
            vendor: "unknown".into(),
            os: "linux".into(),
            environment: Some("gnu".into()),
        }
    }

    /// Creates a musl/Linux triple.
    pub fn linux_musl(arch: Arch) -> Self {
        Self {
            arch,
            vendor: "unknown".into(),
            os: "linux".into(),
            environment: Some("musl".into()),
        }
    }

    /// Creates a Darwin triple.
    pub fn darwin(arch: Arch) -> Self {
        Self {
            arch,
            vendor: "apple".into(),
            os: "darwin".into(),
            environment: None,
        }
    }

    /// Returns the triple this crate was compiled for.
    ///
    /// Unsupported host architectures fall back to x86_64.
    pub fn host() -> Self {
        let arch = Arch::host().unwrap_or(Arch::X86_64);
        if cfg!(target_os = "macos") {
            Self::darwin(arch)
        } else if cfg!(target_env = "musl") {
            Self::linux_musl(arch)
        } else {
            Self::linux_gnu(arch)
        }
    }

    /// Returns true if the operating system is Darwin.
    pub fn is_darwin(&self) -> bool {
        self.os == "darwin" || self.os == "macos"
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.arch, self.vendor, self.os)?;
        if let Some(env) = &self.environment {
            write!(f, "-{}", env)?;
        }
        Ok(())
    }
}

impl FromStr for Triple {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        let invalid = || Error::InvalidTriple(s.to_string());
        match parts.as_slice() {
            [arch, vendor, os] => Ok(Self {
                arch: arch.parse().map_err(|_| invalid())?,
                vendor: (*vendor).to_string(),
                os: (*os).to_string(),
                environment: None,
            }),
            [arch, vendor, os, env] => Ok(Self {
                arch: arch.parse().map_err(|_| invalid())?,
                vendor: (*vendor).to_string(),
                os: (*os).to_string(),
                environment: Some((*env).to_string()),
            }),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Triple {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Triple> for String {
    fn from(value: Triple) -> Self {
        value.to_string()
    }
}
