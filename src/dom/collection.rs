use crate::browser::driver::DriverError;
use crate::dom::element::{Element, ElementHandle};
use crate::dom::locator::Locator;
use crate::dom::node::{NodeHandle, match_all};
use crate::error::{BrowserError, Result};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

/// Live view over every element matching a locator under one parent.
///
/// Nothing is cached: [`size`](Self::size) asks the driver on every call and positional access
/// returns lazy handles.
pub struct ElementCollection<E = ElementHandle> {
    parent: NodeHandle,
    locator: Locator,
    _element: PhantomData<fn() -> E>,
}

impl<E> Clone for ElementCollection<E> {
    fn clone(&self) -> Self {
        Self { parent: self.parent.clone(), locator: self.locator.clone(), _element: PhantomData }
    }
}

impl<E: Element> ElementCollection<E> {
    pub fn new(parent: NodeHandle, locator: Locator) -> Self {
        Self { parent, locator, _element: PhantomData }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Number of matching elements right now
    pub fn size(&self) -> Result<usize> {
        let driver = self.parent.session().driver()?;
        let Some(scope) = self.parent.scope(&*driver)?.search_root() else {
            return Ok(0);
        };
        match match_all(&*driver, scope, &self.locator) {
            Ok(nodes) => Ok(nodes.len()),
            Err(DriverError::UnknownObject(_)) => Ok(0),
            Err(err) => Err(BrowserError::from_interaction(err)),
        }
    }

    pub fn count(&self) -> Result<usize> {
        self.size()
    }

    pub fn len(&self) -> Result<usize> {
        self.size()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.size()? == 0)
    }

    /// Lazy handle to the element at `index`, whether or not it exists
    pub fn at(&self, index: usize) -> E {
        let node = self.parent.child(self.locator.clone().at(index));
        E::from_handle(ElementHandle::new(node, E::declared_kind()))
    }

    /// Handle to the element at `index`, or `None` when there is no such element right now
    pub fn get(&self, index: usize) -> Result<Option<E>> {
        let element = self.at(index);
        Ok(if element.as_element().exists()? { Some(element) } else { None })
    }

    pub fn first(&self) -> E {
        self.at(0)
    }

    /// Handle to the last element, positioned by the size at call time
    pub fn last(&self) -> Result<E> {
        Ok(self.at(self.size()?.saturating_sub(1)))
    }

    /// Lazy iterator over `[0, size)`, with the size taken once, when iteration starts
    pub fn iter(&self) -> Result<Iter<E>> {
        let end = self.size()?;
        Ok(Iter { collection: self.clone(), next: 0, end })
    }

    pub fn to_vec(&self) -> Result<Vec<E>> {
        Ok(self.iter()?.collect())
    }

    /// New collection with `locator` merged over this one's constraints
    pub fn with(&self, locator: impl Into<Locator>) -> Self {
        Self::new(self.parent.clone(), self.locator.merge(&locator.into()))
    }

    /// Whether the first element becomes visible within `timeout`
    pub fn visible(&self, timeout: Option<Duration>) -> Result<bool> {
        self.first().as_element().visible(timeout)
    }

    /// Whether the first element becomes absent or hidden within `timeout`
    pub fn not_visible(&self, timeout: Option<Duration>) -> Result<bool> {
        self.first().as_element().not_visible(timeout)
    }
}

impl<E> fmt::Debug for ElementCollection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCollection")
            .field("parent", &self.parent.key())
            .field("locator", &self.locator)
            .finish()
    }
}

/// Iterator returned by [`ElementCollection::iter`]
pub struct Iter<E> {
    collection: ElementCollection<E>,
    next: usize,
    end: usize,
}

impl<E: Element> Iterator for Iter<E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        if self.next >= self.end {
            return None;
        }
        let element = self.collection.at(self.next);
        self.next += 1;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<E: Element> ExactSizeIterator for Iter<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::config::Config;
    use crate::browser::session::Session;
    use crate::browser::stub::{StubDriver, StubNode};
    use crate::dom::node::Node;
    use crate::page::PageHandle;
    use crate::routing::{PageKind, RoutingTable, UrlTemplate};

    fn page(stub: &StubDriver) -> PageHandle {
        let session = Session::with_driver(Config::new().default_timeout_ms(200).poll_interval_ms(10), RoutingTable::new(), stub.clone())
            .unwrap();
        PageHandle::new(session, PageKind::new("List", UrlTemplate::parse("/list").unwrap()))
    }

    fn list(stub: &StubDriver, items: &[&str]) {
        let ul = stub.append(None, StubNode::new("ul").id("todo"));
        for item in items {
            stub.append(Some(ul), StubNode::new("li").class("item").text(item));
        }
    }

    #[test]
    fn test_with_does_not_mutate() {
        let stub = StubDriver::new();
        list(&stub, &["a", "b", "a"]);
        let page = page(&stub);

        let items = page.elements("li.item");
        let only_a = items.with(Locator::any().with_text("a"));

        assert_eq!(only_a.size().unwrap(), 2);
        assert_eq!(items.size().unwrap(), 3);
        assert_eq!(items.locator().text(), None);
    }

    #[test]
    fn test_iter_fixes_size_at_start() {
        let stub = StubDriver::new();
        list(&stub, &["one", "two"]);
        let page = page(&stub);

        let items = page.elements("li");
        let iter = items.iter().unwrap();
        stub.append(None, StubNode::new("li").text("three"));

        assert_eq!(iter.len(), 2);
        let texts: Vec<String> = iter.map(|item| item.text().unwrap()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(items.to_vec().unwrap().len(), 3);
    }

    #[test]
    fn test_first_and_last() {
        let stub = StubDriver::new();
        list(&stub, &["first", "middle", "last"]);
        let page = page(&stub);

        let items = page.elements("li");
        assert_eq!(items.first().text().unwrap(), "first");
        assert_eq!(items.last().unwrap().text().unwrap(), "last");
    }

    #[test]
    fn test_missing_parent_has_no_elements() {
        let stub = StubDriver::new();
        let page = page(&stub);

        let items = page.element("#absent").elements("li");
        assert_eq!(items.size().unwrap(), 0);
        assert!(items.get(0).unwrap().is_none());
    }
}
