use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use ammonia::Builder;
use regex::Regex;

const ALLOWED_TAGS: [&str; 18] = [
    "p", "b", "i", "u", "em", "strong", "a", "ul", "ol", "li", "blockquote", "code", "pre",
    "br", "img", "h1", "h2", "h3",
];

const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "data"];

/// Length of list-view excerpts, in characters.
pub const EXCERPT_LENGTH: usize = 300;

/// Clean user-supplied HTML down to the small formatting subset posts and
/// comments are allowed to carry. Disallowed tags are stripped, their text
/// kept.
pub fn sanitize_html(content: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.into_iter().collect();

    let mut attributes: HashMap<&str, HashSet<&str>> = HashMap::new();
    attributes.insert("a", ["href", "title", "target"].into_iter().collect());
    attributes.insert(
        "img",
        ["src", "alt", "title", "width", "height"].into_iter().collect(),
    );

    Builder::default()
        .tags(tags)
        .tag_attributes(attributes)
        .url_schemes(ALLOWED_SCHEMES.into_iter().collect())
        .clean(content)
        .to_string()
        .trim()
        .to_string()
}

static TAG_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// Plain text for fields that must never hold markup (contact form, names).
///
/// Tags are removed and everything else is kept as typed: no entity
/// escaping, so `&` stays one character and length limits count what the
/// user wrote.
pub fn strip_tags(value: &str) -> String {
    match TAG_PATTERN.as_ref() {
        Some(re) => re.replace_all(value, "").trim().to_string(),
        None => value.trim().to_string(),
    }
}

/// Plain-text preview of an HTML body.
pub fn excerpt(content: &str) -> String {
    let text = html2text::from_read(content.as_bytes(), 10_000)
        .unwrap_or_else(|_| strip_tags(content));
    let text = text.trim();

    if text.chars().count() > EXCERPT_LENGTH {
        let cut: String = text.chars().take(EXCERPT_LENGTH).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Username for accounts created from a social profile name: keeps word
/// characters, whitespace, `@`, `.` and `-`.
pub fn sanitize_username(name: &str) -> String {
    let clean: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || "@.-".contains(*c))
        .collect();
    let clean = clean.trim();
    if clean.is_empty() {
        "User".to_string()
    } else {
        clean.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_removed_formatting_kept() {
        let dirty = r#"<p onclick="x()">Hello <script>alert(1)</script><strong>world</strong></p>"#;
        let clean = sanitize_html(dirty);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(clean.contains("<strong>world</strong>"));
    }

    #[test]
    fn disallowed_link_scheme_dropped() {
        let clean = sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#);
        assert!(!clean.contains("javascript"));
    }

    #[test]
    fn strip_tags_leaves_text() {
        assert_eq!(strip_tags("  <b>Hi</b> there "), "Hi there");
    }

    #[test]
    fn strip_tags_keeps_ampersands_and_quotes() {
        assert_eq!(strip_tags("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(strip_tags(r#"<i>"quoted"</i> & 'so on'"#), r#""quoted" & 'so on'"#);
        assert_eq!(strip_tags("<b></b>"), "");
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = format!("<p>{}</p>", "a".repeat(EXCERPT_LENGTH + 50));
        let out = excerpt(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), EXCERPT_LENGTH + 3);

        assert_eq!(excerpt("<p>short</p>"), "short");
    }

    #[test]
    fn social_usernames() {
        assert_eq!(sanitize_username("Jane <Doe>!"), "Jane Doe");
        assert_eq!(sanitize_username("$$$"), "User");
        assert_eq!(sanitize_username(""), "User");
    }
}
