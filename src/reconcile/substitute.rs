//! Environment variable expansion.
//!
//! Recognised references:
//! - `$VAR` and `${VAR}`
//! - `${VAR-default}`: `default` when `VAR` is unset
//! - `${VAR:-default}`: `default` when `VAR` is unset or empty
//! - `$$`: a literal `$`
//!
//! Defaults may themselves contain references, up to [`MAX_DEFAULT_DEPTH`] levels deep.
//! A `$` that does not start a reference (`$5`, `$ `, trailing `$`) is copied through
//! unchanged.

use crate::error::{ReloadError, Result};
use std::ffi::OsString;

/// Deepest nesting of `${VAR:-${...}}` defaults that will be expanded.
pub const MAX_DEFAULT_DEPTH: usize = 32;

/// Expands environment variable references in raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Substituter {
    ignore_missing: bool,
}

impl Substituter {
    /// Create a substituter. With `ignore_missing`, unset variables expand to the empty
    /// string instead of failing.
    pub fn new(ignore_missing: bool) -> Self {
        Self { ignore_missing }
    }

    /// Expand against the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::MissingVariable`] for an unset variable without a default
    /// (unless missing variables are ignored) and [`ReloadError::BadSubstitution`] for a
    /// malformed `${...}` reference.
    pub fn expand(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len());
        self.expand_into(
            input,
            0,
            0,
            &|name: &str| std::env::var_os(name).map(os_bytes),
            &mut out,
        )?;
        Ok(out)
    }

    /// Expand with a custom variable lookup.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use reconfy::reconcile::Substituter;
    ///
    /// let out = Substituter::new(false)
    ///     .expand_with(b"URL=${API_URL:-http://localhost}", |_| None)
    ///     .unwrap();
    /// assert_eq!(out, b"URL=http://localhost");
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`expand`](Self::expand).
    pub fn expand_with<F>(&self, input: &[u8], lookup: F) -> Result<Vec<u8>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = Vec::with_capacity(input.len());
        self.expand_into(
            input,
            0,
            0,
            &|name: &str| lookup(name).map(String::into_bytes),
            &mut out,
        )?;
        Ok(out)
    }

    fn expand_into<F>(
        &self,
        input: &[u8],
        base: usize,
        depth: usize,
        lookup: &F,
        out: &mut Vec<u8>,
    ) -> Result<()>
    where
        F: Fn(&str) -> Option<Vec<u8>>,
    {
        let mut i = 0;
        while i < input.len() {
            let Some(offset) = input[i..].iter().position(|&b| b == b'$') else {
                out.extend_from_slice(&input[i..]);
                break;
            };
            out.extend_from_slice(&input[i..i + offset]);
            i += offset;

            match input.get(i + 1) {
                Some(b'$') => {
                    out.push(b'$');
                    i += 2;
                }
                Some(b'{') => {
                    i += self.braced(input, i, base, depth, lookup, out)?;
                }
                Some(&c) if is_name_start(c) => {
                    let end = name_end(input, i + 1);
                    let name = ascii(&input[i + 1..end]);
                    out.extend_from_slice(&self.resolve(name, lookup)?);
                    i = end;
                }
                _ => {
                    out.push(b'$');
                    i += 1;
                }
            }
        }
        Ok(())
    }

    /// Expand the `${...}` reference starting at `start`; returns the bytes consumed.
    fn braced<F>(
        &self,
        input: &[u8],
        start: usize,
        base: usize,
        depth: usize,
        lookup: &F,
        out: &mut Vec<u8>,
    ) -> Result<usize>
    where
        F: Fn(&str) -> Option<Vec<u8>>,
    {
        let bad = |reason: &str| ReloadError::BadSubstitution {
            offset: base + start,
            reason: reason.to_string(),
        };

        let name_start = start + 2;
        if !input.get(name_start).copied().is_some_and(is_name_start) {
            return Err(bad("expected a variable name after '${'"));
        }
        let name_end = name_end(input, name_start);
        let name = ascii(&input[name_start..name_end]);

        let (colon, default_start) = match (input.get(name_end), input.get(name_end + 1)) {
            (Some(b'}'), _) => {
                out.extend_from_slice(&self.resolve(name, lookup)?);
                return Ok(name_end + 1 - start);
            }
            (Some(b'-'), _) => (false, name_end + 1),
            (Some(b':'), Some(b'-')) => (true, name_end + 2),
            (None, _) => return Err(bad("unterminated reference")),
            _ => return Err(bad("unsupported reference syntax")),
        };

        let close = closing_brace(input, default_start).ok_or_else(|| bad("unterminated reference"))?;
        let default = &input[default_start..close];

        match lookup(name) {
            Some(value) if !(colon && value.is_empty()) => out.extend_from_slice(&value),
            _ if depth >= MAX_DEFAULT_DEPTH => return Err(bad("defaults nested too deeply")),
            _ => self.expand_into(default, base + default_start, depth + 1, lookup, out)?,
        }
        Ok(close + 1 - start)
    }

    fn resolve<F>(&self, name: &str, lookup: &F) -> Result<Vec<u8>>
    where
        F: Fn(&str) -> Option<Vec<u8>>,
    {
        match lookup(name) {
            Some(value) => Ok(value),
            None if self.ignore_missing => Ok(Vec::new()),
            None => Err(ReloadError::MissingVariable {
                name: name.to_string(),
            }),
        }
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn name_end(input: &[u8], from: usize) -> usize {
    input[from..]
        .iter()
        .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_'))
        .map_or(input.len(), |n| from + n)
}

/// Index of the `}` closing a default value, skipping nested `${...}`.
fn closing_brace(input: &[u8], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = from;
    while i < input.len() {
        match input[i] {
            b'$' if input.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(unix)]
fn os_bytes(value: OsString) -> Vec<u8> {
    std::os::unix::ffi::OsStringExt::into_vec(value)
}

#[cfg(not(unix))]
fn os_bytes(value: OsString) -> Vec<u8> {
    value.to_string_lossy().into_owned().into_bytes()
}

fn ascii(bytes: &[u8]) -> &str {
    // Names only ever contain [A-Za-z0-9_].
    std::str::from_utf8(bytes).unwrap_or_default()
}
