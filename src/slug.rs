//! Identifier derivation for taxonomy nodes
//!
//! Root categories and subcategories are identified by a slug derived from
//! their display name at creation time. The slug is stable for the lifetime
//! of the node: renames change the display name only, never the id.
//!
//! Two different names can derive the same slug ("Café" and "Cafe"), so
//! collision detection is the caller's job and is checked explicitly against
//! the existing siblings before any write.

/// Derive a slug from a display name.
///
/// Lowercases the name and joins alphanumeric runs with single hyphens.
/// Leading/trailing separators are dropped. Returns an empty string when the
/// name contains no alphanumeric characters at all; callers must reject that
/// as invalid input.
pub fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_sep = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_name() {
        assert_eq!(derive_slug("Bakeries"), "bakeries");
    }

    #[test]
    fn test_spaces_become_hyphens() {
        assert_eq!(derive_slug("LOCAL BUSINESSES"), "local-businesses");
    }

    #[test]
    fn test_punctuation_collapses() {
        assert_eq!(derive_slug("Helena's  Fine Bakery!"), "helena-s-fine-bakery");
    }

    #[test]
    fn test_leading_trailing_separators_dropped() {
        assert_eq!(derive_slug("  -- Shops --  "), "shops");
    }

    #[test]
    fn test_unicode_preserved() {
        assert_eq!(derive_slug("Café Río"), "café-río");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(derive_slug(""), "");
        assert_eq!(derive_slug("!!!"), "");
    }

    #[test]
    fn test_collision_by_design() {
        // Different names may slug identically; callers detect this.
        assert_eq!(derive_slug("Local Businesses"), derive_slug("local  businesses"));
    }
}
