//! Parsing and serialization of cross-references
//!
//! Relationship properties hold links in one of three notations:
//! wiki links (`[[target|alias]]`), markdown links (`[alias](target.md)`),
//! or a bare vault path. Every notation parses to the same [`LinkReference`].

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;
use crate::model::{DocumentId, LinkReference};

static WIKI_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!?\[\[([^\[\]|]*)(?:\|([^\[\]]*))?\]\]$").expect("valid regex"));

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^!?\[([^\[\]]*)\]\(([^()]*)\)$").expect("valid regex"));

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("valid regex"));

/// Parse one cross-reference.
pub fn parse(text: &str) -> Result<LinkReference, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(caps) = WIKI_LINK.captures(text) {
        let target = normalize_target(&caps[1]);
        if target.is_empty() {
            return Err(ParseError::MissingTarget(text.to_string()));
        }
        let alias = caps
            .get(2)
            .map(|m| m.as_str().trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        return Ok(LinkReference { target, alias });
    }

    if let Some(caps) = MARKDOWN_LINK.captures(text) {
        let raw = caps[2].trim().trim_start_matches('<').trim_end_matches('>');
        if URL_SCHEME.is_match(raw) {
            return Err(ParseError::External(text.to_string()));
        }
        let target = normalize_target(&decode_spaces(raw));
        if target.is_empty() {
            return Err(ParseError::MissingTarget(text.to_string()));
        }
        let alias = Some(caps[1].trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        return Ok(LinkReference { target, alias });
    }

    if text.contains('[') || text.contains(']') {
        return Err(ParseError::Unbalanced(text.to_string()));
    }
    if URL_SCHEME.is_match(text) {
        return Err(ParseError::External(text.to_string()));
    }

    let target = normalize_target(text);
    if target.is_empty() {
        return Err(ParseError::MissingTarget(text.to_string()));
    }
    Ok(LinkReference::new(target))
}

/// Render a link in wiki notation, the form written back into frontmatter.
pub fn serialize(link: &LinkReference) -> String {
    match &link.alias {
        Some(alias) => format!("[[{}|{}]]", link.target, alias),
        None => format!("[[{}]]", link.target),
    }
}

/// Resolve a link against the set of known documents.
///
/// Lookup order: exact vault path, path relative to the linking document's
/// folder, then the first document (in path order) sharing the file stem.
pub fn resolve(
    link: &LinkReference,
    from: &DocumentId,
    known: &BTreeSet<DocumentId>,
) -> Option<DocumentId> {
    let exact = DocumentId::new(format!("{}.md", link.target));
    if known.contains(&exact) {
        return Some(exact);
    }

    let folder = from.folder();
    if !folder.is_empty() {
        let relative = DocumentId::new(format!("{}/{}.md", folder, link.target));
        if known.contains(&relative) {
            return Some(relative);
        }
    }

    if link.target.contains('/') {
        return None;
    }
    known
        .iter()
        .find(|candidate| candidate.stem() == link.target)
        .cloned()
}

/// Strip heading/block suffixes, the `.md` extension and surrounding slashes.
fn normalize_target(raw: &str) -> String {
    let without_anchor = match raw.find(['#', '^']) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let trimmed = without_anchor.trim().trim_start_matches("./").trim_matches('/');
    trimmed
        .strip_suffix(".md")
        .unwrap_or(trimmed)
        .to_string()
}

fn decode_spaces(raw: &str) -> String {
    raw.replace("%20", " ")
}
