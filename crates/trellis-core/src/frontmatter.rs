//! YAML frontmatter extraction from markdown documents

use serde_json::Value;

use crate::model::Frontmatter;

/// Split a document into its frontmatter block and body.
///
/// Returns `None` for the frontmatter when the document does not open with a
/// `---` fence, the block is unterminated, or the YAML is not a mapping.
pub fn split_document(input: &str) -> (Option<Frontmatter>, &str) {
    let Some((yaml, body)) = frontmatter_block(input) else {
        return (None, input);
    };
    (parse_yaml_mapping(yaml), body)
}

/// Parse only the frontmatter of a document.
pub fn parse_frontmatter(input: &str) -> Option<Frontmatter> {
    split_document(input).0
}

/// Body of a document with any frontmatter block removed.
pub fn body(input: &str) -> &str {
    split_document(input).1
}

fn frontmatter_block(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start_matches('\u{feff}');
    let rest = input
        .strip_prefix("---\r\n")
        .or_else(|| input.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Parse YAML into a JSON-compatible map so downstream code handles one value type.
fn parse_yaml_mapping(yaml: &str) -> Option<Frontmatter> {
    if yaml.trim().is_empty() {
        return Some(Frontmatter::new());
    }
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml).ok()?;
    let json_value: Value = serde_json::to_value(yaml_value).ok()?;

    match json_value {
        Value::Object(map) => Some(map.into_iter().collect()),
        Value::Null => Some(Frontmatter::new()),
        _ => None,
    }
}
