use crate::browser::driver::{Driver, DriverError, DriverResult, MouseButton, NodeRef, PointerAction, SelectOption};
use crate::dom::geometry::{Point, Rect, Size};
use crate::dom::kind::{ElementKind, promote};
use crate::dom::locator::Locator;
use crate::dom::node::{Node, NodeHandle};
use crate::error::{BrowserError, Result};
use crate::page::{AnyPage, RedirectOptions};
use crate::routing::PageKind;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Low-level drag-and-drop sequence.
///
/// Press at the source center, nudge by `initiation_offset` so drag libraries notice the gesture,
/// move to the destination center, release, then sleep `settle_delay` to let the page re-render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragAndDrop {
    pub initiation_offset: (f64, f64),
    pub settle_delay: Duration,
}

impl Default for DragAndDrop {
    fn default() -> Self {
        Self { initiation_offset: (0.0, -5.0), settle_delay: Duration::from_secs(1) }
    }
}

impl DragAndDrop {
    /// Builder method: set the initiation nudge
    pub fn initiation_offset(mut self, dx: f64, dy: f64) -> Self {
        self.initiation_offset = (dx, dy);
        self
    }

    /// Builder method: set the settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Pointer sequence dragging from `from` to `to`
    pub fn actions(&self, from: Point, to: Point) -> Vec<PointerAction> {
        let (dx, dy) = self.initiation_offset;
        vec![PointerAction::PressAndHold(from), PointerAction::MoveBy { dx, dy }, PointerAction::MoveTo(to), PointerAction::Release]
    }
}

/// A typed element wrapper. Implement this to give an element custom operations.
pub trait Element: Sized {
    fn from_handle(handle: ElementHandle) -> Self;

    fn as_element(&self) -> &ElementHandle;

    /// Kind to use instead of promoting from the live tag
    fn declared_kind() -> Option<ElementKind> {
        None
    }
}

/// Lazy handle to a single element.
///
/// Construction performs no driver round-trip. Every operation re-resolves the element and fails
/// with [`BrowserError::ElementNotFound`] when it does not exist.
#[derive(Clone)]
pub struct ElementHandle {
    node: NodeHandle,
    declared: Option<ElementKind>,
    promoted: OnceCell<ElementKind>,
}

impl ElementHandle {
    pub fn new(node: NodeHandle, declared: Option<ElementKind>) -> Self {
        Self { node, declared, promoted: OnceCell::new() }
    }

    pub fn locator(&self) -> Option<&Locator> {
        self.node.locator()
    }

    pub fn key(&self) -> String {
        self.node.key()
    }

    fn kind_with(&self, driver: &dyn Driver, node: NodeRef) -> Result<ElementKind> {
        if let Some(kind) = self.declared.or_else(|| self.promoted.get().copied()) {
            return Ok(kind);
        }
        let info = driver.describe(node).map_err(|err| self.node.translate(err))?;
        let kind = promote(&info.tag_name, &info.attributes, info.content_editable);
        log::trace!("{} promoted to {}", self.key(), kind);
        Ok(*self.promoted.get_or_init(|| kind))
    }

    /// Concrete kind of the element, promoted from the live tag at most once per handle
    pub fn kind(&self) -> Result<ElementKind> {
        let (_, _, kind) = self.ensured()?;
        Ok(kind)
    }

    /// Ensured resolution: the element exists now and its kind is known
    fn ensured(&self) -> Result<(Rc<dyn Driver>, NodeRef, ElementKind)> {
        let driver = self.node.session().driver()?;
        let node = self.node.ensure_with(&*driver)?;
        let kind = self.kind_with(&*driver, node)?;
        Ok((driver, node, kind))
    }

    fn interact<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn Driver, NodeRef, ElementKind) -> DriverResult<T>,
    {
        let (driver, node, kind) = self.ensured()?;
        op(&*driver, node, kind).map_err(|err| self.node.translate(err))
    }

    fn unsupported(operation: &'static str, kind: ElementKind) -> BrowserError {
        BrowserError::UnsupportedOperation { operation, kind }
    }

    pub fn click(&self) -> Result<()> {
        self.interact(|driver, node, _| driver.click(node, MouseButton::Left, 1))
    }

    pub fn double_click(&self) -> Result<()> {
        self.interact(|driver, node, _| driver.click(node, MouseButton::Left, 2))
    }

    pub fn right_click(&self) -> Result<()> {
        self.interact(|driver, node, _| driver.click(node, MouseButton::Right, 1))
    }

    pub fn hover(&self) -> Result<()> {
        self.interact(|driver, node, _| driver.hover(node))
    }

    /// Replace the element's content with `value`.
    ///
    /// Text entry for editable kinds, option selection for selects, file path for file fields.
    pub fn set(&self, value: &str) -> Result<()> {
        let (driver, node, kind) = self.ensured()?;
        let outcome = match kind {
            ElementKind::TextField | ElementKind::TextArea | ElementKind::ContentEditable => {
                driver.clear(node).and_then(|_| driver.send_keys(node, value))
            }
            ElementKind::Select => driver.select_option(node, value),
            ElementKind::FileField => driver.send_keys(node, value),
            other => return Err(Self::unsupported("set", other)),
        };
        outcome.map_err(|err| self.node.translate(err))
    }

    /// Check or uncheck a checkbox or radio button
    pub fn set_checked(&self, checked: bool) -> Result<()> {
        let (driver, node, kind) = self.ensured()?;
        if !kind.is_toggle() {
            return Err(Self::unsupported("set_checked", kind));
        }
        driver.set_checked(node, checked).map_err(|err| self.node.translate(err))
    }

    /// Select the option whose value or visible text equals `option`
    pub fn select_value(&self, option: &str) -> Result<()> {
        let (driver, node, kind) = self.ensured()?;
        if kind != ElementKind::Select {
            return Err(Self::unsupported("select_value", kind));
        }
        driver.select_option(node, option).map_err(|err| self.node.translate(err))
    }

    /// All options of a select
    pub fn options(&self) -> Result<Vec<SelectOption>> {
        let (driver, node, kind) = self.ensured()?;
        if kind != ElementKind::Select {
            return Err(Self::unsupported("options", kind));
        }
        driver.options(node).map_err(|err| self.node.translate(err))
    }

    pub fn selected_options(&self) -> Result<Vec<SelectOption>> {
        Ok(self.options()?.into_iter().filter(|option| option.selected).collect())
    }

    /// Type `keys` without clearing first
    pub fn send_keys(&self, keys: &str) -> Result<()> {
        self.interact(|driver, node, _| driver.send_keys(node, keys))
    }

    /// Press a named key such as `"Enter"` with focus on the element
    pub fn press_key(&self, key: &str) -> Result<()> {
        self.interact(|driver, node, _| driver.press_key(node, key))
    }

    pub fn scroll_into_view(&self) -> Result<()> {
        self.interact(|driver, node, _| driver.scroll_into_view(node))
    }

    pub fn rect(&self) -> Result<Rect> {
        self.interact(|driver, node, _| driver.rect(node))
    }

    /// Top-left corner in viewport coordinates
    pub fn location(&self) -> Result<Point> {
        Ok(self.rect()?.location())
    }

    pub fn size(&self) -> Result<Size> {
        Ok(self.rect()?.size())
    }

    pub fn center(&self) -> Result<Point> {
        Ok(self.rect()?.center())
    }

    pub fn enabled(&self) -> Result<bool> {
        self.interact(|driver, node, _| driver.is_enabled(node))
    }

    pub fn focused(&self) -> Result<bool> {
        self.interact(|driver, node, _| driver.is_focused(node))
    }

    pub fn value(&self) -> Result<String> {
        self.interact(|driver, node, _| driver.value(node))
    }

    pub fn html(&self) -> Result<String> {
        self.interact(|driver, node, _| driver.html(node))
    }

    pub fn text(&self) -> Result<String> {
        self.interact(|driver, node, _| driver.text(node))
    }

    pub fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.interact(|driver, node, _| driver.attribute(node, name))
    }

    /// Single existence check, never waits or raises on absence
    pub fn exists(&self) -> Result<bool> {
        self.node.exists()
    }

    /// Present and displayed right now
    pub fn is_displayed(&self) -> Result<bool> {
        let driver = self.node.session().driver()?;
        let Some(node) = self.node.resolve_with(&*driver)? else {
            return Ok(false);
        };
        match driver.is_displayed(node) {
            Ok(displayed) => Ok(displayed),
            Err(DriverError::UnknownObject(_)) => Ok(false),
            Err(err) => Err(self.node.translate(err)),
        }
    }

    /// Wait until the element is present and displayed. Returns false on timeout.
    pub fn visible(&self, timeout: Option<Duration>) -> Result<bool> {
        self.node.wait_until(timeout, || self.is_displayed())
    }

    /// Wait until the element is absent or hidden. Returns false on timeout.
    pub fn not_visible(&self, timeout: Option<Duration>) -> Result<bool> {
        self.node.wait_while(timeout, || self.is_displayed())
    }

    /// Wait until `predicate` holds for this element. Returns false on timeout.
    pub fn wait_for<F>(&self, timeout: Option<Duration>, mut predicate: F) -> Result<bool>
    where
        F: FnMut(&ElementHandle) -> Result<bool>,
    {
        self.node.wait_until(timeout, || predicate(self))
    }

    /// Call a JavaScript function with `this` bound to the element
    pub fn execute_script(&self, function: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        self.node.execute_script(function, args)
    }

    /// Drag this element onto `destination` with the default sequence
    pub fn drag_and_drop_to(&self, destination: &impl Element) -> Result<()> {
        self.drag_and_drop_with(destination, &DragAndDrop::default())
    }

    pub fn drag_and_drop_with(&self, destination: &impl Element, sequence: &DragAndDrop) -> Result<()> {
        let from = self.center()?;
        let to = destination.as_element().center()?;
        let driver = self.node.session().driver()?;

        log::debug!("dragging {} to {}", self.key(), destination.as_element().key());
        driver.perform(&sequence.actions(from, to)).map_err(|err| self.node.translate(err))?;
        std::thread::sleep(sequence.settle_delay);
        Ok(())
    }

    /// Wait for an action on this element to take the browser from its page to one of `candidates`
    pub fn wait_until_redirection(&self, candidates: &[PageKind], options: RedirectOptions) -> Result<Option<AnyPage>> {
        self.node.wait_until_redirection(candidates, options)
    }
}

impl Element for ElementHandle {
    fn from_handle(handle: ElementHandle) -> Self {
        handle
    }

    fn as_element(&self) -> &ElementHandle {
        self
    }
}

impl Node for ElementHandle {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("key", &self.key())
            .field("declared", &self.declared)
            .field("promoted", &self.promoted.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::session::Session;
    use crate::browser::stub::{StubDriver, StubNode};
    use crate::browser::config::Config;
    use crate::page::PageHandle;
    use crate::routing::{PageKind, RoutingTable, UrlTemplate};

    fn page(stub: &StubDriver) -> PageHandle {
        let session = Session::with_driver(Config::new().default_timeout_ms(200).poll_interval_ms(10), RoutingTable::new(), stub.clone())
            .unwrap();
        PageHandle::new(session, PageKind::new("Form", UrlTemplate::parse("/form").unwrap()))
    }

    #[test]
    fn test_drag_and_drop_sequence() {
        let actions = DragAndDrop::default().actions(Point::new(10.0, 10.0), Point::new(200.0, 50.0));
        assert_eq!(
            actions,
            vec![
                PointerAction::PressAndHold(Point::new(10.0, 10.0)),
                PointerAction::MoveBy { dx: 0.0, dy: -5.0 },
                PointerAction::MoveTo(Point::new(200.0, 50.0)),
                PointerAction::Release,
            ]
        );
    }

    #[test]
    fn test_promotion_happens_once_per_handle() {
        let stub = StubDriver::new();
        stub.append(None, StubNode::new("div").id("editor").attr("contenteditable", "true"));
        let page = page(&stub);

        let editor = page.element(Locator::id("editor"));
        assert_eq!(editor.kind().unwrap(), ElementKind::ContentEditable);
        assert_eq!(editor.promoted.get(), Some(&ElementKind::ContentEditable));

        let other = page.element(Locator::id("editor"));
        assert!(other.promoted.get().is_none());
    }

    #[test]
    fn test_declared_kind_skips_promotion() {
        let stub = StubDriver::new();
        stub.append(None, StubNode::new("div").id("fake"));
        let page = page(&stub);

        let handle = ElementHandle::new(page.node().child(Locator::id("fake")), Some(ElementKind::Button));
        assert_eq!(handle.kind().unwrap(), ElementKind::Button);
    }

    #[test]
    fn test_set_replaces_text() {
        let stub = StubDriver::new();
        let input = stub.append(None, StubNode::new("input").attr("name", "q").value("old"));
        let page = page(&stub);

        page.element(Locator::attr("name", "q")).set("rust").unwrap();
        assert_eq!(stub.value_of(input), "rust");
    }

    #[test]
    fn test_set_checked_on_text_field_is_unsupported() {
        let stub = StubDriver::new();
        stub.append(None, StubNode::new("input").attr("name", "q"));
        let page = page(&stub);

        let err = page.element(Locator::attr("name", "q")).set_checked(true).unwrap_err();
        assert_eq!(err.to_string(), "set_checked is not supported on text field elements");
    }

    #[test]
    fn test_missing_element_reports_its_key() {
        let stub = StubDriver::new();
        let page = page(&stub);

        let err = page.element("#nope").click().unwrap_err();
        match err {
            BrowserError::ElementNotFound(message) => assert_eq!(message, "page:Form > #nope"),
            other => panic!("Expected ElementNotFound, got {:?}", other),
        }
    }
}
