use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Characters kept verbatim by `{+var}` expansion
const RESERVED: &str = ":/?#[]@!$&'()*+,;=%";

/// Named values substituted into (or extracted from) a URL template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriVars(IndexMap<String, String>);

impl UriVars {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder method: set a variable
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every variable in `expected` has the same value here.
    ///
    /// An empty `expected` is satisfied by any set of variables.
    pub fn satisfies(&self, expected: &UriVars) -> bool {
        expected.iter().all(|(name, value)| self.get(name) == Some(value))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for UriVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = UriVars::new();
        for (name, value) in iter {
            vars.insert(name, value);
        }
        vars
    }
}

impl<K: Into<String>, V: ToString, const N: usize> From<[(K, V); N]> for UriVars {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Custom encoding for one template variable.
///
/// A codec replaces the default percent-encoding of its variable: `encode` runs on expansion and
/// `decode` on extraction. Returning `None` from `decode` makes the URL not match.
pub trait VarCodec: Send + Sync {
    fn encode(&self, value: &str) -> String;
    fn decode(&self, raw: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    /// `{name}`: percent-encoded, never spans `/`
    Simple,
    /// `{+name}`: reserved characters kept, may span `/`
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var { name: String, op: Operator },
    Query(Vec<String>),
}

/// A URL pattern with `{name}` placeholders.
///
/// Supports simple `{id}`, reserved `{+path}` and query `{?page,sort}` expressions. Literal text
/// must match exactly.
#[derive(Clone)]
pub struct UrlTemplate {
    pattern: String,
    parts: Vec<Part>,
    matcher: Regex,
    codecs: IndexMap<String, Arc<dyn VarCodec>>,
}

impl fmt::Debug for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlTemplate")
            .field("pattern", &self.pattern)
            .field("codecs", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl PartialEq for UrlTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl UrlTemplate {
    /// Parse a template such as `/users/{id}`
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| BrowserError::InvalidTemplate {
            template: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(invalid("unmatched `}`"));
            }
            literal.push_str(&rest[..open]);
            let close = rest[open..].find('}').ok_or_else(|| invalid("unterminated `{`"))? + open;
            let expression = &rest[open + 1..close];
            if expression.contains('{') {
                return Err(invalid("nested `{`"));
            }

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Self::parse_expression(expression).ok_or_else(|| invalid("invalid variable name"))?);
            rest = &rest[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        let mut names: Vec<&str> = Vec::new();
        for part in &parts {
            let part_names: Vec<&str> = match part {
                Part::Var { name, .. } => vec![name.as_str()],
                Part::Query(query) => query.iter().map(String::as_str).collect(),
                Part::Literal(_) => continue,
            };
            for name in part_names {
                if names.contains(&name) {
                    return Err(invalid(&format!("variable `{}` appears twice", name)));
                }
                names.push(name);
            }
        }

        let matcher = Regex::new(&Self::matcher_source(&parts)).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self { pattern: pattern.to_string(), parts, matcher, codecs: IndexMap::new() })
    }

    fn parse_expression(expression: &str) -> Option<Part> {
        let valid = |name: &str| !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

        if let Some(names) = expression.strip_prefix('?') {
            let names: Vec<String> = names.split(',').map(str::trim).map(str::to_string).collect();
            return names.iter().all(|n| valid(n.as_str())).then_some(Part::Query(names));
        }

        let (name, op) = match expression.strip_prefix('+') {
            Some(name) => (name, Operator::Reserved),
            None => (expression, Operator::Simple),
        };
        valid(name).then(|| Part::Var { name: name.to_string(), op })
    }

    fn matcher_source(parts: &[Part]) -> String {
        let mut source = String::from("^");
        for part in parts {
            match part {
                Part::Literal(text) => source.push_str(&regex::escape(text)),
                Part::Var { op: Operator::Simple, .. } => source.push_str("([^/?#]*)"),
                Part::Var { op: Operator::Reserved, .. } => source.push_str("([^?#]*)"),
                Part::Query(_) => source.push_str(r"(?:\?([^#]*))?"),
            }
        }
        source.push('$');
        source
    }

    /// Builder method: install a codec for one variable
    pub fn with_codec(mut self, name: impl Into<String>, codec: Arc<dyn VarCodec>) -> Self {
        self.codecs.insert(name.into(), codec);
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Names of all variables, in template order
    pub fn variables(&self) -> Vec<&str> {
        self.parts
            .iter()
            .flat_map(|part| match part {
                Part::Var { name, .. } => vec![name.as_str()],
                Part::Query(names) => names.iter().map(String::as_str).collect(),
                Part::Literal(_) => Vec::new(),
            })
            .collect()
    }

    /// Substitute `vars` into the template. Missing variables expand to nothing.
    pub fn expand(&self, vars: &UriVars) -> String {
        let mut url = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => url.push_str(text),
                Part::Var { name, op } => {
                    if let Some(value) = vars.get(name) {
                        url.push_str(&self.encode(name, value, *op));
                    }
                }
                Part::Query(names) => {
                    let pairs: Vec<String> = names
                        .iter()
                        .filter_map(|name| {
                            vars.get(name).map(|value| format!("{}={}", name, self.encode(name, value, Operator::Simple)))
                        })
                        .collect();
                    if !pairs.is_empty() {
                        url.push('?');
                        url.push_str(&pairs.join("&"));
                    }
                }
            }
        }
        url
    }

    /// Extract variables from `url`, or `None` when it does not match the template.
    ///
    /// Values come back percent-decoded. Expanding them again always yields canonical encoding,
    /// so a URL that was not canonically encoded does not round-trip: `/users/a b` extracts
    /// `id = "a b"`, which expands to `/users/a%20b`.
    pub fn extract(&self, url: &str) -> Option<UriVars> {
        let caps = self.matcher.captures(url)?;
        let mut vars = UriVars::new();
        let mut group = 1;

        for part in &self.parts {
            match part {
                Part::Literal(_) => continue,
                Part::Var { name, .. } => {
                    let raw = caps.get(group).map_or("", |m| m.as_str());
                    vars.insert(name.as_str(), self.decode(name, raw)?);
                }
                Part::Query(names) => {
                    if let Some(query) = caps.get(group) {
                        for pair in query.as_str().split('&').filter(|p| !p.is_empty()) {
                            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
                            if names.iter().any(|n| n == key) {
                                vars.insert(key, self.decode(key, raw)?);
                            } else {
                                return None;
                            }
                        }
                    }
                }
            }
            group += 1;
        }

        Some(vars)
    }

    /// Whether `url` matches this template
    pub fn matches(&self, url: &str) -> bool {
        self.extract(url).is_some()
    }

    fn encode(&self, name: &str, value: &str, op: Operator) -> String {
        if let Some(codec) = self.codecs.get(name) {
            return codec.encode(value);
        }
        match op {
            Operator::Simple => urlencoding::encode(value).into_owned(),
            Operator::Reserved => value
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || "-._~".contains(c) || RESERVED.contains(c) {
                        c.to_string()
                    } else {
                        urlencoding::encode(c.encode_utf8(&mut [0; 4])).into_owned()
                    }
                })
                .collect(),
        }
    }

    fn decode(&self, name: &str, raw: &str) -> Option<String> {
        match self.codecs.get(name) {
            Some(codec) => codec.decode(raw),
            None => urlencoding::decode(raw).ok().map(|value| value.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Base36;

    impl VarCodec for Base36 {
        fn encode(&self, value: &str) -> String {
            value.parse::<u64>().map(|n| to_base36(n)).unwrap_or_default()
        }

        fn decode(&self, raw: &str) -> Option<String> {
            u64::from_str_radix(raw, 36).ok().map(|n| n.to_string())
        }
    }

    fn to_base36(mut n: u64) -> String {
        let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut out = Vec::new();
        loop {
            out.push(digits[(n % 36) as usize]);
            n /= 36;
            if n == 0 {
                break;
            }
        }
        out.reverse();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_user_template_scenario() {
        let template = UrlTemplate::parse("/users/{id}").unwrap();

        assert!(template.matches("/users/42"));
        assert_eq!(template.extract("/users/42"), Some(UriVars::from([("id", "42")])));
        assert_eq!(template.expand(&UriVars::new().with("id", 42)), "/users/42");
    }

    #[test]
    fn test_literal_segments_must_match() {
        let template = UrlTemplate::parse("/users/{id}/edit").unwrap();
        assert!(template.matches("/users/7/edit"));
        assert!(!template.matches("/users/7"));
        assert!(!template.matches("/users/7/edit/extra"));
        assert!(!template.matches("/accounts/7/edit"));
    }

    #[test]
    fn test_simple_variable_does_not_span_segments() {
        let template = UrlTemplate::parse("/files/{name}").unwrap();
        assert!(!template.matches("/files/a/b"));

        let reserved = UrlTemplate::parse("/files/{+path}").unwrap();
        assert_eq!(reserved.extract("/files/a/b").unwrap().get("path"), Some("a/b"));
        assert_eq!(reserved.expand(&UriVars::from([("path", "a/b c")])), "/files/a/b%20c");
    }

    #[test]
    fn test_percent_encoding_round_trip() {
        let template = UrlTemplate::parse("/search/{term}").unwrap();
        let url = template.expand(&UriVars::from([("term", "rust & wasm")]));
        assert_eq!(url, "/search/rust%20%26%20wasm");
        assert_eq!(template.extract(&url).unwrap().get("term"), Some("rust & wasm"));
    }

    #[test]
    fn test_non_canonical_encoding_expands_canonically() {
        let template = UrlTemplate::parse("/users/{id}").unwrap();

        let vars = template.extract("/users/a b").unwrap();
        assert_eq!(vars.get("id"), Some("a b"));
        assert_eq!(template.expand(&vars), "/users/a%20b");

        let vars = template.extract("/users/a%2fb").unwrap();
        assert_eq!(vars.get("id"), Some("a/b"));
        assert_eq!(template.expand(&vars), "/users/a%2Fb");
    }

    #[test]
    fn test_query_expression() {
        let template = UrlTemplate::parse("/items{?page,sort}").unwrap();

        assert_eq!(template.expand(&UriVars::from([("page", "2")])), "/items?page=2");
        assert_eq!(template.expand(&UriVars::new()), "/items");

        let vars = template.extract("/items?sort=name&page=3").unwrap();
        assert_eq!(vars.get("page"), Some("3"));
        assert_eq!(vars.get("sort"), Some("name"));
        assert!(template.extract("/items").unwrap().is_empty());
        assert!(template.extract("/items?other=1").is_none());
    }

    #[test]
    fn test_codec_is_applied_both_ways() {
        let template = UrlTemplate::parse("/orders/{id}").unwrap().with_codec("id", Arc::new(Base36));

        assert_eq!(template.expand(&UriVars::from([("id", 1295)])), "/orders/zz");
        assert_eq!(template.extract("/orders/zz").unwrap().get("id"), Some("1295"));
        assert!(template.extract("/orders/!!").is_none());
    }

    #[test]
    fn test_invalid_templates_rejected() {
        for pattern in ["/users/{id", "/users/id}", "/users/{}", "/users/{a b}", "/x/{id}/{id}", "/{a{b}}"] {
            let err = UrlTemplate::parse(pattern).unwrap_err();
            assert!(matches!(err, BrowserError::InvalidTemplate { .. }), "{} should be rejected", pattern);
        }
    }

    #[test]
    fn test_variables_listed_in_order() {
        let template = UrlTemplate::parse("/{org}/repos/{+path}{?ref}").unwrap();
        assert_eq!(template.variables(), vec!["org", "path", "ref"]);
    }

    #[test]
    fn test_satisfies_empty_expectation() {
        let vars = UriVars::from([("id", "5")]);
        assert!(vars.satisfies(&UriVars::new()));
        assert!(vars.satisfies(&UriVars::from([("id", 5)])));
        assert!(!vars.satisfies(&UriVars::from([("id", 6)])));
        assert!(!vars.satisfies(&UriVars::from([("slug", "x")])));
    }

    proptest! {
        #[test]
        fn prop_expand_inverts_extract(a in "[a-zA-Z0-9_~.-]{1,12}", b in "[a-zA-Z0-9]{1,12}") {
            let template = UrlTemplate::parse("/org/{org}/repo/{repo}").unwrap();
            let path = format!("/org/{}/repo/{}", a, b);
            let vars = template.extract(&path).unwrap();
            prop_assert_eq!(template.expand(&vars), path);
        }
    }
}
