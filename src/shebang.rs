//! Shebang (`#!`) line parsing.

use crate::error::{Error, Result};

/// Maximum number of bytes examined for a shebang line.
pub const MAX_SHEBANG_LEN: usize = 128;

/// Returns true if `data` starts with `#!`.
#[inline]
pub fn is_shebang(data: &[u8]) -> bool {
    data.starts_with(b"#!")
}

/// Extracts the interpreter named by a shebang line.
///
/// Only the first [`MAX_SHEBANG_LEN`] bytes are examined. The interpreter is
/// the first whitespace-delimited token after `#!`; arguments are ignored.
pub fn interpreter(data: &[u8]) -> Result<String> {
    let head = &data[..data.len().min(MAX_SHEBANG_LEN)];
    let line = match memchr::memchr(b'\n', head) {
        Some(end) => &head[..end],
        None => head,
    };

    let rest = line
        .strip_prefix(b"#!")
        .ok_or_else(|| Error::parse(0, "missing #! prefix"))?;
    let line = String::from_utf8_lossy(rest);
    line.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or(Error::MissingShebangInterpreter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter() {
        assert_eq!(interpreter(b"#!/bin/sh\necho hi\n").unwrap(), "/bin/sh");
        assert_eq!(
            interpreter(b"#! /usr/bin/env python3 -u\n").unwrap(),
            "/usr/bin/env"
        );
        assert_eq!(interpreter(b"#!/bin/bash").unwrap(), "/bin/bash");
        assert_eq!(interpreter(b"#!\t/bin/sh\r\n").unwrap(), "/bin/sh");
    }

    #[test]
    fn test_missing_interpreter() {
        assert!(matches!(
            interpreter(b"#!\n/bin/sh"),
            Err(Error::MissingShebangInterpreter)
        ));
        assert!(matches!(
            interpreter(b"#!   "),
            Err(Error::MissingShebangInterpreter)
        ));
    }

    #[test]
    fn test_not_a_shebang() {
        assert!(!is_shebang(b"\x7FELF"));
        assert!(is_shebang(b"#!"));
        assert!(matches!(interpreter(b"echo"), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_only_first_bytes_are_examined() {
        let mut data = b"#!".to_vec();
        data.extend(std::iter::repeat(b' ').take(MAX_SHEBANG_LEN));
        data.extend_from_slice(b"/bin/sh\n");
        assert!(matches!(
            interpreter(&data),
            Err(Error::MissingShebangInterpreter)
        ));
    }
}
