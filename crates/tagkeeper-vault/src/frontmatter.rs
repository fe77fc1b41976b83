use std::io;

use serde_yaml::Mapping;
use serde_yaml::Value;

/// Split a document into its frontmatter header and body. The body keeps
/// its exact bytes.
fn split(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };
    if let Some(after) = rest.strip_prefix("---\n") {
        return (Some(""), after);
    }
    if let Some(idx) = rest.find("\n---\n") {
        return (Some(&rest[..idx + 1]), &rest[idx + 5..]);
    }
    if let Some(idx) = rest.find("\n---\r\n") {
        return (Some(&rest[..idx + 1]), &rest[idx + 6..]);
    }
    if let Some(header) = rest.strip_suffix("\n---") {
        return (Some(header), "");
    }
    (None, content)
}

fn scalar_tag(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read the tags key, normalizing the scalar-vs-list representations seen
/// in the wild to one canonical list.
pub fn read_tags(content: &str) -> Vec<String> {
    let (Some(header), _) = split(content) else {
        return Vec::new();
    };
    let Ok(mapping) = serde_yaml::from_str::<Mapping>(header) else {
        return Vec::new();
    };
    let tags_key = Value::String("tags".to_string());
    match mapping.get(&tags_key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Sequence(seq)) => seq.iter().filter_map(scalar_tag).collect(),
        Some(other) => scalar_tag(other).into_iter().collect(),
    }
}

/// Replace the tags key through a structured merge: every other
/// frontmatter key and the body survive untouched. Never raw text
/// splicing of the tags line.
pub fn replace_tags(content: &str, tags: &[String]) -> io::Result<String> {
    let (header, body) = split(content);
    let mut mapping = match header {
        Some(header) if !header.trim().is_empty() => serde_yaml::from_str::<Mapping>(header)
            .map_err(|err| io::Error::other(format!("parse frontmatter: {err}")))?,
        _ => Mapping::new(),
    };

    let tags_key = Value::String("tags".to_string());
    if tags.is_empty() {
        mapping.remove(&tags_key);
    } else {
        let list = Value::Sequence(tags.iter().map(|t| Value::String(t.clone())).collect());
        mapping.insert(tags_key, list);
    }

    if mapping.is_empty() {
        return Ok(match header {
            Some(_) => body.to_string(),
            None => content.to_string(),
        });
    }

    let yaml = serde_yaml::to_string(&mapping)
        .map_err(|err| io::Error::other(format!("serialize frontmatter: {err}")))?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn read_normalizes_list_scalar_and_comma_forms() {
        assert_eq!(
            read_tags("---\ntags:\n- a\n- b\n---\nbody"),
            tags(&["a", "b"])
        );
        assert_eq!(read_tags("---\ntags: solo\n---\nbody"), tags(&["solo"]));
        assert_eq!(
            read_tags("---\ntags: a, b , c\n---\nbody"),
            tags(&["a", "b", "c"])
        );
        assert_eq!(read_tags("---\ntags: 2024\n---\nbody"), tags(&["2024"]));
        assert!(read_tags("no frontmatter here").is_empty());
        assert!(read_tags("---\ntitle: x\n---\nbody").is_empty());
    }

    #[test]
    fn replace_preserves_unrelated_keys_and_the_body() {
        let content = "---\ntitle: My Note\naliases:\n- alt\ntags:\n- old\n---\nLine one.\n\nLine two.\n";
        let next = replace_tags(content, &tags(&["new", "tags"])).unwrap();

        assert!(next.contains("title: My Note"));
        assert!(next.contains("aliases:\n- alt"));
        assert!(next.contains("tags:\n- new\n- tags"));
        assert!(!next.contains("old"));
        assert!(next.ends_with("---\nLine one.\n\nLine two.\n"));
        assert_eq!(read_tags(&next), tags(&["new", "tags"]));
    }

    #[test]
    fn replace_creates_a_block_when_none_exists() {
        let next = replace_tags("Just a body.\n", &tags(&["a"])).unwrap();
        assert_eq!(next, "---\ntags:\n- a\n---\nJust a body.\n");
    }

    #[test]
    fn emptying_the_only_key_drops_the_block() {
        let content = "---\ntags:\n- a\n---\nbody\n";
        let next = replace_tags(content, &[]).unwrap();
        assert_eq!(next, "body\n");
    }

    #[test]
    fn emptying_tags_keeps_other_keys() {
        let content = "---\ntitle: x\ntags:\n- a\n---\nbody\n";
        let next = replace_tags(content, &[]).unwrap();
        assert_eq!(next, "---\ntitle: x\n---\nbody\n");
    }

    #[test]
    fn writing_into_an_empty_frontmatter_block_works() {
        let next = replace_tags("---\n---\nbody\n", &tags(&["a"])).unwrap();
        assert_eq!(read_tags(&next), tags(&["a"]));
        assert!(next.ends_with("---\nbody\n"));
    }

    #[test]
    fn replace_round_trips_to_the_same_content() {
        let content = "---\ntitle: x\ntags:\n- a\n- b\n---\nbody\n";
        let current = read_tags(content);
        let next = replace_tags(content, &current).unwrap();
        assert_eq!(next, content);
    }
}
