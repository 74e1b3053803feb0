use crate::error::{BrowserError, Result};
use crate::page::{Page, PageHandle};
use crate::routing::template::{UriVars, UrlTemplate};
use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// Load-validation hook of a page kind
pub type Validator = fn(&PageHandle) -> Result<bool>;

struct PageKindInner {
    name: String,
    type_id: Option<TypeId>,
    template: UrlTemplate,
    validator: Option<Validator>,
}

/// Descriptor of a declared page: its name, URL template and load validation.
///
/// Typed kinds come from [`PageKind::of`]; ad-hoc kinds from [`PageKind::new`] always validate.
#[derive(Clone)]
pub struct PageKind {
    inner: Arc<PageKindInner>,
}

fn validate_as<P: Page>(root: &PageHandle) -> Result<bool> {
    P::from_root(root.clone()).validate_loading()
}

impl PageKind {
    /// Descriptor for the page type `P`
    pub fn of<P: Page>() -> Result<Self> {
        let mut template = UrlTemplate::parse(P::URL_TEMPLATE)?;
        for (name, codec) in P::url_codecs() {
            template = template.with_codec(name, codec);
        }
        let full_name = type_name::<P>();
        let name = full_name.rsplit("::").next().unwrap_or(full_name);

        Ok(Self {
            inner: Arc::new(PageKindInner {
                name: name.to_string(),
                type_id: Some(TypeId::of::<P>()),
                template,
                validator: Some(validate_as::<P> as Validator),
            }),
        })
    }

    /// Untyped page kind with no load validation
    pub fn new(name: impl Into<String>, template: UrlTemplate) -> Self {
        Self {
            inner: Arc::new(PageKindInner { name: name.into(), type_id: None, template, validator: None }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.inner.template
    }

    /// Whether this kind describes the page type `P`
    pub fn is<P: Page>(&self) -> bool {
        self.inner.type_id == Some(TypeId::of::<P>())
    }

    /// Expand the template with `vars`
    pub fn uri(&self, vars: &UriVars) -> String {
        self.inner.template.expand(vars)
    }

    pub fn extract_vars(&self, url: &str) -> Option<UriVars> {
        self.inner.template.extract(url)
    }

    /// Whether `url` is a URL of this page
    pub fn loads(&self, url: &str) -> bool {
        self.inner.template.matches(url)
    }

    pub(crate) fn validate(&self, page: &PageHandle) -> Result<bool> {
        match self.inner.validator {
            Some(validator) => validator(page),
            None => Ok(true),
        }
    }
}

impl PartialEq for PageKind {
    fn eq(&self, other: &Self) -> bool {
        match (self.inner.type_id, other.inner.type_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.inner.name == other.inner.name && self.inner.template == other.inner.template,
            _ => false,
        }
    }
}

impl fmt::Debug for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageKind")
            .field("name", &self.inner.name)
            .field("template", &self.inner.template.pattern())
            .finish()
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// Insertion-ordered mapping of URL templates to page kinds.
///
/// Built once by the application and shared with every [`Session`](crate::Session). Matching is
/// a linear scan in registration order; the first template that matches wins.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: Vec<PageKind>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register the page type `P`
    pub fn register<P: Page>(&mut self) -> Result<&mut Self> {
        Ok(self.register_kind(PageKind::of::<P>()?))
    }

    /// Builder method: register the page type `P`
    pub fn with<P: Page>(mut self) -> Result<Self> {
        self.register::<P>()?;
        Ok(self)
    }

    /// Register a page kind. Registering the same kind twice keeps the first registration.
    pub fn register_kind(&mut self, kind: PageKind) -> &mut Self {
        if self.routes.contains(&kind) {
            return self;
        }
        if let Some(existing) = self.routes.iter().find(|k| k.template() == kind.template()) {
            log::warn!(
                "{} shares template {} with {}; {} wins when routing",
                kind,
                kind.template(),
                existing,
                existing
            );
        }
        log::debug!("registered {} at {}", kind, kind.template());
        self.routes.push(kind);
        self
    }

    /// First registered page kind whose template matches `path`
    pub fn match_path(&self, path: &str) -> Option<&PageKind> {
        self.routes.iter().find(|kind| kind.loads(path))
    }

    /// Like [`match_path`](Self::match_path), also returning the extracted variables
    pub fn resolve(&self, path: &str) -> Option<(&PageKind, UriVars)> {
        self.routes.iter().find_map(|kind| kind.extract_vars(path).map(|vars| (kind, vars)))
    }

    /// Page kind for `path`, failing when no page is declared for it
    pub fn page_for(&self, path: &str) -> Result<&PageKind> {
        self.match_path(path).ok_or_else(|| BrowserError::UnknownPage(path.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over kinds in registration order
    pub fn iter(&self) -> impl Iterator<Item = &PageKind> {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kind(name: &str, pattern: &str) -> PageKind {
        PageKind::new(name, UrlTemplate::parse(pattern).unwrap())
    }

    #[test]
    fn test_first_registered_match_wins() {
        let mut table = RoutingTable::new();
        table.register_kind(kind("NewUser", "/users/new"));
        table.register_kind(kind("User", "/users/{id}"));

        assert_eq!(table.match_path("/users/new").unwrap().name(), "NewUser");
        assert_eq!(table.match_path("/users/12").unwrap().name(), "User");
        assert!(table.match_path("/teams/12").is_none());
    }

    #[test]
    fn test_declaration_order_resolves_ambiguity() {
        let mut table = RoutingTable::new();
        table.register_kind(kind("User", "/users/{id}"));
        table.register_kind(kind("NewUser", "/users/new"));

        assert_eq!(table.match_path("/users/new").unwrap().name(), "User");
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let mut table = RoutingTable::new();
        table.register_kind(kind("User", "/users/{id}"));
        table.register_kind(kind("User", "/users/{id}"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_extracts_variables() {
        let mut table = RoutingTable::new();
        table.register_kind(kind("Repo", "/{org}/{repo}"));

        let (found, vars) = table.resolve("/rust-lang/cargo").unwrap();
        assert_eq!(found.name(), "Repo");
        assert_eq!(vars.get("org"), Some("rust-lang"));
        assert_eq!(vars.get("repo"), Some("cargo"));
    }

    #[test]
    fn test_page_for_unknown_path() {
        let table = RoutingTable::new();
        let err = table.page_for("/missing").unwrap_err();
        assert_eq!(err.to_string(), "No page matching `/missing` is registered");
    }

    proptest! {
        #[test]
        fn prop_match_is_first_template_that_extracts(segments in proptest::collection::vec("[a-c]{1,2}", 1..4)) {
            let patterns = ["/a/{x}", "/{x}/b", "/{x}/{y}", "/a", "/{x}", "/b/{x}/c"];
            let mut table = RoutingTable::new();
            for (i, pattern) in patterns.iter().enumerate() {
                table.register_kind(kind(&format!("P{}", i), pattern));
            }

            let path = format!("/{}", segments.join("/"));
            let expected = patterns
                .iter()
                .position(|p| UrlTemplate::parse(p).unwrap().extract(&path).is_some())
                .map(|i| format!("P{}", i));

            prop_assert_eq!(table.match_path(&path).map(|k| k.name().to_string()), expected);
        }
    }
}
