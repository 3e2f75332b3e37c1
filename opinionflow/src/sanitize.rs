//! Markup stripping for fetched documents.

use regex::Regex;
use std::sync::LazyLock;

static NON_CONTENT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->")
        .expect("block pattern is valid")
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static SPACE_ENTITIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&nbsp;|&#160;").expect("entity pattern is valid"));

/// Reduces a raw document to plain text.
///
/// Script, style and comment blocks are dropped with their contents, the
/// remaining tags are removed, and whitespace runs collapse to one space.
/// The output contains no complete tag, so running it again is a no-op.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let without_blocks = NON_CONTENT_BLOCKS.replace_all(raw, " ");
    let without_tags = TAGS.replace_all(&without_blocks, " ");
    let spaced = SPACE_ENTITIES.replace_all(&without_tags, " ");
    collapse_whitespace(&spaced)
}

/// Collapses whitespace runs to a single space and trims both ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
