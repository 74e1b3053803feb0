use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete kind of an element, chosen from its live tag name and attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Generic,
    TextField,
    TextArea,
    Select,
    CheckBox,
    Radio,
    Button,
    Link,
    ContentEditable,
    FileField,
}

impl ElementKind {
    /// Whether text can be typed into the element
    pub fn is_editable(&self) -> bool {
        matches!(self, ElementKind::TextField | ElementKind::TextArea | ElementKind::ContentEditable)
    }

    /// Whether the element carries a checked state
    pub fn is_toggle(&self) -> bool {
        matches!(self, ElementKind::CheckBox | ElementKind::Radio)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Generic => "generic",
            ElementKind::TextField => "text field",
            ElementKind::TextArea => "text area",
            ElementKind::Select => "select",
            ElementKind::CheckBox => "checkbox",
            ElementKind::Radio => "radio",
            ElementKind::Button => "button",
            ElementKind::Link => "link",
            ElementKind::ContentEditable => "content editable",
            ElementKind::FileField => "file field",
        };
        f.write_str(name)
    }
}

/// Input `type`s that behave like buttons
const BUTTON_INPUT_TYPES: [&str; 4] = ["button", "submit", "reset", "image"];

/// Choose the most specific kind for an element
pub fn promote(tag_name: &str, attributes: &IndexMap<String, String>, content_editable: bool) -> ElementKind {
    let tag = tag_name.to_ascii_lowercase();
    let input_type = attributes.get("type").map(|t| t.to_ascii_lowercase()).unwrap_or_default();

    match tag.as_str() {
        "input" => match input_type.as_str() {
            "checkbox" => ElementKind::CheckBox,
            "radio" => ElementKind::Radio,
            "file" => ElementKind::FileField,
            t if BUTTON_INPUT_TYPES.contains(&t) => ElementKind::Button,
            _ => ElementKind::TextField,
        },
        "textarea" => ElementKind::TextArea,
        "select" => ElementKind::Select,
        "button" => ElementKind::Button,
        "a" if attributes.contains_key("href") => ElementKind::Link,
        _ if content_editable => ElementKind::ContentEditable,
        _ => match attributes.get("role").map(String::as_str) {
            Some("button") => ElementKind::Button,
            Some("link") => ElementKind::Link,
            Some("checkbox") => ElementKind::CheckBox,
            Some("textbox") => ElementKind::TextField,
            _ => ElementKind::Generic,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_input_types() {
        assert_eq!(promote("input", &attrs(&[]), false), ElementKind::TextField);
        assert_eq!(promote("INPUT", &attrs(&[("type", "email")]), false), ElementKind::TextField);
        assert_eq!(promote("input", &attrs(&[("type", "Checkbox")]), false), ElementKind::CheckBox);
        assert_eq!(promote("input", &attrs(&[("type", "radio")]), false), ElementKind::Radio);
        assert_eq!(promote("input", &attrs(&[("type", "submit")]), false), ElementKind::Button);
        assert_eq!(promote("input", &attrs(&[("type", "file")]), false), ElementKind::FileField);
    }

    #[test]
    fn test_content_editable_promotion() {
        assert_eq!(promote("div", &attrs(&[("contenteditable", "true")]), true), ElementKind::ContentEditable);
        assert_eq!(promote("div", &attrs(&[]), false), ElementKind::Generic);
    }

    #[test]
    fn test_roles_and_links() {
        assert_eq!(promote("a", &attrs(&[("href", "/home")]), false), ElementKind::Link);
        assert_eq!(promote("a", &attrs(&[]), false), ElementKind::Generic);
        assert_eq!(promote("span", &attrs(&[("role", "button")]), false), ElementKind::Button);
        assert_eq!(promote("select", &attrs(&[]), false), ElementKind::Select);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ElementKind::CheckBox.to_string(), "checkbox");
        assert!(ElementKind::ContentEditable.is_editable());
        assert!(!ElementKind::Button.is_editable());
        assert!(ElementKind::Radio.is_toggle());
    }
}
