use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

const CSS: &str = "css";
const TAG_NAME: &str = "tag_name";
const TEXT: &str = "text";
const CLASS: &str = "class";

/// Immutable description of how to find an element under its parent.
///
/// A locator is a set of keyed constraints plus an optional position among the matches. Keys are
/// `css`, `tag_name`, `text` (exact, trimmed visible text), `class`, or any attribute name.
/// `css` takes precedence over `tag_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default)]
    constraints: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl Locator {
    /// Locator matching any element
    pub fn any() -> Self {
        Self::default()
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::any().with(CSS, selector)
    }

    pub fn tag(tag_name: impl Into<String>) -> Self {
        Self::any().with(TAG_NAME, tag_name)
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::any().with("id", id)
    }

    pub fn attr(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::any().with(name, value)
    }

    /// Builder method: add or replace one constraint
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// Builder method: require this exact visible text
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with(TEXT, text)
    }

    /// Builder method: require these classes (space separated)
    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with(CLASS, class)
    }

    /// Builder method: pick the match at `index`
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.constraints.get(key).map(String::as_str)
    }

    /// Text the matched element must have, checked after the CSS query
    pub fn text(&self) -> Option<&str> {
        self.get(TEXT)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.index.is_none()
    }

    /// Combine two locators. Constraints of `other` replace those with the same key, and its index
    /// (when set) replaces ours. Neither input is modified.
    pub fn merge(&self, other: &Locator) -> Locator {
        let mut constraints = self.constraints.clone();
        for (key, value) in &other.constraints {
            constraints.insert(key.clone(), value.clone());
        }
        Locator { constraints, index: other.index.or(self.index) }
    }

    /// CSS selector equivalent to every constraint except `text` and the index.
    ///
    /// Attribute and class constraints apply to every alternative of a selector list.
    pub fn to_css(&self) -> String {
        let base = match (self.get(CSS), self.get(TAG_NAME)) {
            (Some(css), _) => css.trim().to_string(),
            (None, Some(tag)) => escape_ident(tag.trim()),
            (None, None) => String::new(),
        };

        let mut filters = String::new();
        for (key, value) in &self.constraints {
            match key.as_str() {
                CSS | TAG_NAME | TEXT => {}
                CLASS => {
                    for class in value.split_whitespace() {
                        filters.push('.');
                        filters.push_str(&escape_ident(class));
                    }
                }
                name => filters.push_str(&format!("[{}=\"{}\"]", escape_ident(name), escape_string(value))),
            }
        }

        if filters.is_empty() {
            return if base.is_empty() { "*".to_string() } else { base };
        }

        split_selector_list(&base)
            .into_iter()
            .map(|alternative| format!("{}{}", alternative, filters))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Top-level alternatives of a selector list, ignoring commas inside brackets, parentheses and strings
fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in selector.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            (q, Some(open)) if q == open => quote = None,
            (_, Some(_)) => {}
            ('"' | '\'', None) => quote = Some(c),
            ('(' | '[', None) => depth += 1,
            (')' | ']', None) => depth = depth.saturating_sub(1),
            (',', None) if depth == 0 => {
                parts.push(selector[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[start..].trim());
    parts
}

/// Escape a CSS identifier the way `CSS.escape` does
fn escape_ident(ident: &str) -> String {
    let mut escaped = String::with_capacity(ident.len());
    let lone_dash = ident == "-";

    for (i, c) in ident.chars().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && ident.starts_with('-')));
        match c {
            '\0' => escaped.push('\u{FFFD}'),
            c if c.is_control() || leading_digit => escaped.push_str(&format!("\\{:x} ", c as u32)),
            c if c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii() => escaped.push(c),
            '-' if !lone_dash => escaped.push(c),
            c => {
                escaped.push('\\');
                escaped.push(c);
            }
        }
    }
    escaped
}

/// Escape the contents of a double-quoted CSS string
fn escape_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_control() => escaped.push_str(&format!("\\{:x} ", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

impl From<&str> for Locator {
    fn from(css: &str) -> Self {
        Locator::css(css)
    }
}

impl From<String> for Locator {
    fn from(css: String) -> Self {
        Locator::css(css)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_css())?;
        if let Some(text) = self.text() {
            write!(f, " with text {:?}", text)?;
        }
        if let Some(index) = self.index {
            write!(f, " [{}]", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_css() {
        assert_eq!(Locator::css("form#login").to_css(), "form#login");
        assert_eq!(Locator::tag("input").with("name", "email").to_css(), "input[name=\"email\"]");
        assert_eq!(Locator::id("save").to_css(), "[id=\"save\"]");
        assert_eq!(Locator::tag("button").with_class("btn primary").to_css(), "button.btn.primary");
        assert_eq!(Locator::any().to_css(), "*");
        assert_eq!(Locator::attr("title", "say \"hi\"").to_css(), "[title=\"say \\\"hi\\\"\"]");
    }

    #[test]
    fn test_identifiers_are_escaped() {
        assert_eq!(Locator::tag("div").with_class("w-1/2 2xl").to_css(), "div.w-1\\/2.\\32 xl");
        assert_eq!(Locator::attr("data:role", "x").to_css(), "[data\\:role=\"x\"]");
        assert_eq!(Locator::attr("title", "a\nb").to_css(), "[title=\"a\\a b\"]");
    }

    #[test]
    fn test_constraints_apply_to_each_alternative() {
        let locator = Locator::css("a, button").with("role", "tab");
        assert_eq!(locator.to_css(), "a[role=\"tab\"], button[role=\"tab\"]");

        let nested = Locator::css(":is(a, b) > span, [title=\"x, y\"]").with_class("on");
        assert_eq!(nested.to_css(), ":is(a, b) > span.on, [title=\"x, y\"].on");
    }

    #[test]
    fn test_css_wins_over_tag() {
        let locator = Locator::css("li.item").with(TAG_NAME, "div");
        assert_eq!(locator.to_css(), "li.item");
    }

    #[test]
    fn test_merge_later_wins() {
        let base = Locator::tag("input").with("name", "email").at(2);
        let runtime = Locator::attr("name", "phone").with_text("x");

        let merged = base.merge(&runtime);

        assert_eq!(merged.get("name"), Some("phone"));
        assert_eq!(merged.get("tag_name"), Some("input"));
        assert_eq!(merged.text(), Some("x"));
        assert_eq!(merged.index(), Some(2));
        assert_eq!(base.get("name"), Some("email"));

        assert_eq!(base.merge(&Locator::any().at(0)).index(), Some(0));
    }

    #[test]
    fn test_display() {
        let locator = Locator::css("a.nav").with_text("Home").at(1);
        assert_eq!(locator.to_string(), "a.nav with text \"Home\" [1]");
    }

    #[test]
    fn test_deserialize() {
        let locator: Locator = serde_json::from_str(r#"{"constraints": {"css": "tr"}, "index": 3}"#).unwrap();
        assert_eq!(locator, Locator::css("tr").at(3));
    }
}
