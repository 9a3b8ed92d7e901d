//! Ordinal model
//!
//! Sibling order is carried in the filename itself: `"0003_notes.md"` sits at
//! position 3. The numeric prefix is the **ordinal**; the padding width is
//! commonly four digits but wider legacy prefixes survive import and must
//! round-trip unchanged, so every helper here reports the width it saw.

use crate::error::{Result, TreeError};

/// Default zero-padding width for newly assigned ordinals.
pub const ORDINAL_WIDTH: usize = 4;

/// Decompose `"NNNN_rest"` into `(ordinal, padding width, rest)`.
///
/// Returns `None` for filenames that do not participate in ordering.
pub fn split_ordinal(filename: &str) -> Option<(u32, usize, &str)> {
    let digits = filename.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &filename[digits..];
    let rest = rest.strip_prefix('_')?;
    if rest.is_empty() {
        return None;
    }
    let ordinal: u32 = filename[..digits].parse().ok()?;
    Some((ordinal, digits, rest))
}

/// The ordinal of a filename, or `InvalidFormat` when the prefix is missing.
pub fn ordinal_of(filename: &str) -> Result<u32> {
    split_ordinal(filename)
        .map(|(ord, _, _)| ord)
        .ok_or_else(|| {
            TreeError::InvalidFormat(format!("filename has no ordinal prefix: {filename}"))
        })
}

pub fn has_ordinal(filename: &str) -> bool {
    split_ordinal(filename).is_some()
}

/// The filename without its ordinal prefix, or unchanged when it has none.
pub fn display_name(filename: &str) -> &str {
    split_ordinal(filename)
        .map(|(_, _, rest)| rest)
        .unwrap_or(filename)
}

/// Format `name` under `ordinal`, zero-padded to at least `width` digits.
pub fn with_ordinal(ordinal: u32, width: usize, name: &str) -> String {
    format!("{ordinal:0width$}_{name}")
}

/// Sort key used by `readdir`: ordinal ascending, with non-ordinal entries
/// after all ordered ones, filename as the tiebreak.
pub fn sibling_sort_key(filename: &str) -> (u32, String) {
    let ord = split_ordinal(filename)
        .map(|(ord, _, _)| ord)
        .unwrap_or(u32::MAX);
    (ord, filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_format() {
        assert_eq!(split_ordinal("0003_a.md"), Some((3, 4, "a.md")));
        assert_eq!(split_ordinal("012345_a"), Some((12345, 6, "a")));
        assert_eq!(split_ordinal("a.md"), None);
        assert_eq!(split_ordinal("0003_"), None);
        assert_eq!(split_ordinal("_a.md"), None);

        assert_eq!(with_ordinal(7, 4, "a.md"), "0007_a.md");
        // width grows when the ordinal outruns the padding
        assert_eq!(with_ordinal(12345, 4, "a"), "12345_a");
    }

    #[test]
    fn ordinal_of_requires_prefix() {
        assert_eq!(ordinal_of("0010_x").unwrap(), 10);
        assert!(matches!(
            ordinal_of("x"),
            Err(TreeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn display_name_strips_prefix() {
        assert_eq!(display_name("0001_readme.md"), "readme.md");
        assert_eq!(display_name("readme.md"), "readme.md");
    }
}
