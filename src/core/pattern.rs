//! Lazily compiled regular expressions

use regex::Regex;
use std::sync::OnceLock;

/// Compile `pattern` into `cell` on first use
///
/// A pattern that fails to compile is reported on every call instead of
/// being cached.
pub(crate) fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex, regex::Error> {
    if let Some(regex) = cell.get() {
        return Ok(regex);
    }
    let regex = Regex::new(pattern)?;
    Ok(cell.get_or_init(|| regex))
}
