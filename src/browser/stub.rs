//! In-memory driver for tests and offline development
//!
//! [`StubDriver`] keeps a small element tree, a current URL and a log of every interaction. The
//! tree can be edited while a session is using the driver (clones share state), which makes it
//! possible to exercise live re-resolution, waits and redirections without a browser.

use crate::browser::config::Config;
use crate::browser::driver::{
    Connector, Driver, DriverError, DriverResult, MouseButton, NodeInfo, NodeRef, PointerAction, SelectOption,
};
use crate::dom::geometry::Rect;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Declarative description of a stub element
#[derive(Debug, Clone, PartialEq)]
pub struct StubNode {
    tag: String,
    attributes: IndexMap<String, String>,
    text: String,
    value: String,
    displayed: bool,
    enabled: bool,
    checked: bool,
    rect: Rect,
    options: Vec<SelectOption>,
    navigates_to: Option<String>,
    obscured_by: Option<String>,
}

impl StubNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: IndexMap::new(),
            text: String::new(),
            value: String::new(),
            displayed: true,
            enabled: true,
            checked: false,
            rect: Rect::new(0.0, 0.0, 100.0, 20.0),
            options: Vec::new(),
            navigates_to: None,
            obscured_by: None,
        }
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    /// Add a class to the `class` attribute
    pub fn class(mut self, class: &str) -> Self {
        let classes = match self.attributes.get("class") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.attributes.insert("class".to_string(), classes);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    /// Add an `<option>` to a choice control
    pub fn option(mut self, value: &str, text: &str, selected: bool) -> Self {
        if selected {
            self.value = value.to_string();
        }
        self.options.push(SelectOption { value: value.to_string(), text: text.to_string(), selected });
        self
    }

    /// Clicking the element changes the current URL
    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }
}

#[derive(Debug)]
struct Slot {
    node: StubNode,
    parent: Option<usize>,
    attached: bool,
}

#[derive(Debug, Default)]
struct StubState {
    slots: Vec<Slot>,
    url: String,
    pending_url: Option<(String, u32)>,
    navigation_error: Option<DriverError>,
    time_out_next_navigation: bool,
    lookup_timeouts: u32,
    spurious_load_timeouts: bool,
    focused: Option<usize>,
    script_results: Vec<serde_json::Value>,
    events: Vec<String>,
    pointer_actions: Vec<PointerAction>,
    quit: bool,
}

const HTML: usize = 0;
const BODY: usize = 1;

/// Driver backed by an in-memory element tree.
///
/// Clones share the same tree, so a test can keep one handle while a session owns another.
#[derive(Debug, Clone)]
pub struct StubDriver {
    state: Arc<Mutex<StubState>>,
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StubDriver {
    /// Empty document at `about:blank`
    pub fn new() -> Self {
        let html = Slot { node: StubNode::new("html"), parent: None, attached: true };
        let body = Slot { node: StubNode::new("body"), parent: Some(HTML), attached: true };
        let state = StubState { slots: vec![html, body], url: "about:blank".to_string(), ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn body(&self) -> NodeRef {
        NodeRef(BODY as u32)
    }

    /// Append a node under `parent` (the body when `None`)
    pub fn append(&self, parent: Option<NodeRef>, node: StubNode) -> NodeRef {
        let mut state = self.state();
        let parent = parent.map_or(BODY, |p| p.0 as usize);
        state.slots.push(Slot { node, parent: Some(parent), attached: true });
        NodeRef((state.slots.len() - 1) as u32)
    }

    /// Detach a node and its subtree from the document
    pub fn remove(&self, node: NodeRef) {
        let mut state = self.state();
        let root = node.0 as usize;
        for index in 0..state.slots.len() {
            if index == root || state.is_descendant(index, root) {
                state.slots[index].attached = false;
            }
        }
    }

    /// Remove every element under the body
    pub fn clear_body(&self) {
        let mut state = self.state();
        for index in 0..state.slots.len() {
            if state.is_descendant(index, BODY) {
                state.slots[index].attached = false;
            }
        }
    }

    pub fn set_displayed(&self, node: NodeRef, displayed: bool) {
        if let Some(slot) = self.state().slots.get_mut(node.0 as usize) {
            slot.node.displayed = displayed;
        }
    }

    pub fn set_text(&self, node: NodeRef, text: &str) {
        if let Some(slot) = self.state().slots.get_mut(node.0 as usize) {
            slot.node.text = text.to_string();
        }
    }

    /// Make clicks on `node` land on another element, described by its opening tag
    pub fn obscure(&self, node: NodeRef, covering: &str) {
        if let Some(slot) = self.state().slots.get_mut(node.0 as usize) {
            slot.node.obscured_by = Some(covering.to_string());
        }
    }

    pub fn set_url(&self, url: &str) {
        let mut state = self.state();
        state.url = url.to_string();
        state.pending_url = None;
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    /// Switch to `url` once the current URL has been read `after_reads` more times
    pub fn navigate_later(&self, url: &str, after_reads: u32) {
        self.state().pending_url = Some((url.to_string(), after_reads));
    }

    /// The next navigation fails with `err` and the URL does not change
    pub fn fail_next_navigation(&self, err: DriverError) {
        self.state().navigation_error = Some(err);
    }

    /// The next navigation lands but still reports a load timeout
    pub fn time_out_next_navigation(&self) {
        self.state().time_out_next_navigation = true;
    }

    /// The next `lookups` element lookups time out
    pub fn time_out_lookups(&self, lookups: u32) {
        self.state().lookup_timeouts = lookups;
    }

    /// Whether this driver claims to report load timeouts for pages that did load
    pub fn set_spurious_load_timeouts(&self, spurious: bool) {
        self.state().spurious_load_timeouts = spurious;
    }

    /// Queue a value returned by the next script call
    pub fn push_script_result(&self, value: serde_json::Value) {
        self.state().script_results.push(value);
    }

    /// Interaction log, oldest first
    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn pointer_actions(&self) -> Vec<PointerAction> {
        self.state().pointer_actions.clone()
    }

    pub fn value_of(&self, node: NodeRef) -> String {
        self.state().slots.get(node.0 as usize).map(|slot| slot.node.value.clone()).unwrap_or_default()
    }

    pub fn is_checked(&self, node: NodeRef) -> bool {
        self.state().slots.get(node.0 as usize).is_some_and(|slot| slot.node.checked)
    }

    pub fn is_quit(&self) -> bool {
        self.state().quit
    }
}

impl StubState {
    fn slot(&self, node: NodeRef) -> DriverResult<&Slot> {
        match self.slots.get(node.0 as usize) {
            Some(slot) if slot.attached => Ok(slot),
            _ => Err(DriverError::UnknownObject(format!("{} is not attached to the document", node))),
        }
    }

    fn slot_mut(&mut self, node: NodeRef) -> DriverResult<&mut Slot> {
        match self.slots.get_mut(node.0 as usize) {
            Some(slot) if slot.attached => Ok(slot),
            _ => Err(DriverError::UnknownObject(format!("{} is not attached to the document", node))),
        }
    }

    /// Whether `index` is a strict descendant of `ancestor`
    fn is_descendant(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.slots[index].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.slots[parent].parent;
        }
        false
    }

    fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, slot)| slot.attached && slot.parent == Some(index))
            .map(|(i, _)| i)
    }

    fn displayed(&self, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if !self.slots[i].node.displayed {
                return false;
            }
            current = self.slots[i].parent;
        }
        true
    }

    fn text(&self, index: usize) -> String {
        let mut parts = Vec::new();
        let own = self.slots[index].node.text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for child in self.children(index) {
            let text = self.text(child);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }

    fn open_tag(&self, index: usize) -> String {
        let node = &self.slots[index].node;
        let mut tag = format!("<{}", node.tag);
        for (name, value) in &node.attributes {
            tag.push_str(&format!(" {}=\"{}\"", name, value));
        }
        tag.push('>');
        tag
    }

    fn html(&self, index: usize) -> String {
        let node = &self.slots[index].node;
        let mut html = self.open_tag(index);
        html.push_str(&node.text);
        for child in self.children(index) {
            html.push_str(&self.html(child));
        }
        html.push_str(&format!("</{}>", node.tag));
        html
    }

    fn matches(&self, index: usize, selector: &[Compound]) -> bool {
        let Some((last, ancestors)) = selector.split_last() else {
            return false;
        };
        if !last.matches(&self.slots[index].node) {
            return false;
        }

        let mut remaining = ancestors;
        let mut current = self.slots[index].parent;
        while let Some((wanted, rest)) = remaining.split_last() {
            let Some(parent) = current else {
                return false;
            };
            if wanted.matches(&self.slots[parent].node) {
                remaining = rest;
            }
            current = self.slots[parent].parent;
        }
        true
    }

    fn record(&mut self, event: String) {
        log::trace!("stub: {}", event);
        self.events.push(event);
    }

    fn label(&self, node: NodeRef) -> String {
        let slot = &self.slots[node.0 as usize];
        match slot.node.attributes.get("id") {
            Some(id) => format!("#{}", id),
            None => format!("{}", node),
        }
    }
}

/// One compound selector: tag, `#id`, `.class` and `[attr]`/`[attr="value"]` parts
#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &StubNode) -> bool {
        if self.tag.as_ref().is_some_and(|tag| *tag != node.tag) {
            return false;
        }
        if self.id.as_ref().is_some_and(|id| node.attributes.get("id") != Some(id)) {
            return false;
        }
        let classes: Vec<&str> = node.attributes.get("class").map(|c| c.split_whitespace().collect()).unwrap_or_default();
        if !self.classes.iter().all(|class| classes.contains(&class.as_str())) {
            return false;
        }
        self.attributes.iter().all(|(name, value)| match (node.attributes.get(name), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], pos: &mut usize) -> String {
    let start = *pos;
    while *pos < chars.len() && is_ident(chars[*pos]) {
        *pos += 1;
    }
    chars[start..*pos].iter().collect()
}

fn parse_compound(source: &str) -> DriverResult<Compound> {
    let unsupported = || DriverError::Other(format!("unsupported selector: {}", source));
    let chars: Vec<char> = source.chars().collect();
    let mut compound = Compound::default();
    let mut pos = 0;

    if chars.first() == Some(&'*') {
        pos = 1;
    } else if chars.first().is_some_and(|c| is_ident(*c)) {
        compound.tag = Some(take_ident(&chars, &mut pos).to_ascii_lowercase());
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                pos += 1;
                compound.id = Some(take_ident(&chars, &mut pos));
            }
            '.' => {
                pos += 1;
                compound.classes.push(take_ident(&chars, &mut pos));
            }
            '[' => {
                let close = chars[pos..].iter().position(|c| *c == ']').ok_or_else(unsupported)? + pos;
                let inner: String = chars[pos + 1..close].iter().collect();
                let attribute = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches('"').trim_matches('\'').replace("\\\"", "\"");
                        (name.trim().to_string(), Some(value))
                    }
                    None => (inner.trim().to_string(), None),
                };
                compound.attributes.push(attribute);
                pos = close + 1;
            }
            _ => return Err(unsupported()),
        }
    }
    Ok(compound)
}

/// Split on `separator` outside of brackets and quotes
fn split_top_level(source: &str, separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut quote: Option<char> = None;

    for c in source.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth -= 1,
            (None, _) if depth == 0 && separator(c) => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Parse a selector list into descendant chains of compound selectors
fn parse_selector(css: &str) -> DriverResult<Vec<Vec<Compound>>> {
    split_top_level(css, |c| c == ',')
        .iter()
        .map(|group| split_top_level(group, char::is_whitespace).iter().map(|part| parse_compound(part)).collect())
        .collect()
}

impl Driver for StubDriver {
    fn name(&self) -> &str {
        "stub"
    }

    fn reports_spurious_load_timeouts(&self) -> bool {
        self.state().spurious_load_timeouts
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state();
        if let Some(err) = state.navigation_error.take() {
            return Err(err);
        }
        state.record(format!("navigate:{}", url));
        state.url = url.to_string();
        state.pending_url = None;
        if std::mem::take(&mut state.time_out_next_navigation) {
            return Err(DriverError::CommandTimeout(format!("timed out loading {}", url)));
        }
        Ok(())
    }

    fn current_url(&self) -> DriverResult<String> {
        let mut state = self.state();
        if let Some((url, reads)) = state.pending_url.take() {
            if reads == 0 {
                state.url = url;
            } else {
                state.pending_url = Some((url, reads - 1));
            }
        }
        Ok(state.url.clone())
    }

    fn reload(&self) -> DriverResult<()> {
        self.state().record("reload".to_string());
        Ok(())
    }

    fn find_elements(&self, scope: Option<NodeRef>, css: &str) -> DriverResult<Vec<NodeRef>> {
        let selector = parse_selector(css)?;
        let mut state = self.state();
        if state.lookup_timeouts > 0 {
            state.lookup_timeouts -= 1;
            return Err(DriverError::CommandTimeout(format!("lookup of {} timed out", css)));
        }
        if let Some(scope) = scope {
            state.slot(scope)?;
        }

        Ok((0..state.slots.len())
            .filter(|&index| state.slots[index].attached)
            .filter(|&index| scope.is_none_or(|scope| state.is_descendant(index, scope.0 as usize)))
            .filter(|&index| selector.iter().any(|chain| state.matches(index, chain)))
            .map(|index| NodeRef(index as u32))
            .collect())
    }

    fn describe(&self, node: NodeRef) -> DriverResult<NodeInfo> {
        let state = self.state();
        let slot = state.slot(node)?;
        let content_editable =
            slot.node.attributes.get("contenteditable").is_some_and(|value| value.is_empty() || value == "true");
        Ok(NodeInfo { tag_name: slot.node.tag.clone(), attributes: slot.node.attributes.clone(), content_editable })
    }

    fn is_displayed(&self, node: NodeRef) -> DriverResult<bool> {
        let state = self.state();
        state.slot(node)?;
        Ok(state.displayed(node.0 as usize))
    }

    fn text(&self, node: NodeRef) -> DriverResult<String> {
        let state = self.state();
        state.slot(node)?;
        Ok(state.text(node.0 as usize))
    }

    fn html(&self, node: NodeRef) -> DriverResult<String> {
        let state = self.state();
        state.slot(node)?;
        Ok(state.html(node.0 as usize))
    }

    fn attribute(&self, node: NodeRef, name: &str) -> DriverResult<Option<String>> {
        let state = self.state();
        let slot = state.slot(node)?;
        Ok(match name {
            "value" => Some(slot.node.value.clone()),
            _ => slot.node.attributes.get(name).cloned(),
        })
    }

    fn value(&self, node: NodeRef) -> DriverResult<String> {
        Ok(self.state().slot(node)?.node.value.clone())
    }

    fn is_enabled(&self, node: NodeRef) -> DriverResult<bool> {
        let state = self.state();
        let slot = state.slot(node)?;
        Ok(slot.node.enabled && !slot.node.attributes.contains_key("disabled"))
    }

    fn is_focused(&self, node: NodeRef) -> DriverResult<bool> {
        let state = self.state();
        state.slot(node)?;
        Ok(state.focused == Some(node.0 as usize))
    }

    fn rect(&self, node: NodeRef) -> DriverResult<Rect> {
        Ok(self.state().slot(node)?.node.rect)
    }

    fn click(&self, node: NodeRef, button: MouseButton, click_count: u32) -> DriverResult<()> {
        let mut state = self.state();
        let slot = state.slot(node)?;
        if !state.displayed(node.0 as usize) {
            return Err(DriverError::Other(format!("element not interactable: {}", state.label(node))));
        }
        if let Some(covering) = &slot.node.obscured_by {
            let center = slot.node.rect.center();
            return Err(DriverError::Other(format!(
                "unknown error: Element {}...</{}> is not clickable at point ({}, {}). Other element would receive the click: {}",
                state.open_tag(node.0 as usize),
                slot.node.tag,
                center.x.round(),
                center.y.round(),
                covering
            )));
        }

        let navigates_to = slot.node.navigates_to.clone();
        let label = state.label(node);
        state.record(format!("click:{:?}:{}:{}", button, click_count, label));
        state.focused = Some(node.0 as usize);

        if button == MouseButton::Left {
            let slot = state.slot_mut(node)?;
            if slot.node.attributes.get("type").is_some_and(|t| t == "checkbox") {
                slot.node.checked = !slot.node.checked;
            } else if slot.node.attributes.get("type").is_some_and(|t| t == "radio") {
                slot.node.checked = true;
            }
            if let Some(url) = navigates_to {
                state.url = url;
                state.pending_url = None;
            }
        }
        Ok(())
    }

    fn hover(&self, node: NodeRef) -> DriverResult<()> {
        let mut state = self.state();
        state.slot(node)?;
        let label = state.label(node);
        state.record(format!("hover:{}", label));
        Ok(())
    }

    fn send_keys(&self, node: NodeRef, keys: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.slot_mut(node)?.node.value.push_str(keys);
        state.focused = Some(node.0 as usize);
        let label = state.label(node);
        state.record(format!("keys:{}:{}", label, keys));
        Ok(())
    }

    fn press_key(&self, node: NodeRef, key: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.slot(node)?;
        state.focused = Some(node.0 as usize);
        let label = state.label(node);
        state.record(format!("key:{}:{}", label, key));
        Ok(())
    }

    fn clear(&self, node: NodeRef) -> DriverResult<()> {
        self.state().slot_mut(node)?.node.value.clear();
        Ok(())
    }

    fn set_checked(&self, node: NodeRef, checked: bool) -> DriverResult<()> {
        self.state().slot_mut(node)?.node.checked = checked;
        Ok(())
    }

    fn select_option(&self, node: NodeRef, option: &str) -> DriverResult<()> {
        let mut state = self.state();
        let slot = state.slot_mut(node)?;
        let multiple = slot.node.attributes.contains_key("multiple");
        let position = slot
            .node
            .options
            .iter()
            .position(|o| o.value == option || o.text == option)
            .ok_or_else(|| DriverError::Other(format!("cannot locate option with value or text {}", option)))?;

        for (i, candidate) in slot.node.options.iter_mut().enumerate() {
            if i == position {
                candidate.selected = true;
            } else if !multiple {
                candidate.selected = false;
            }
        }
        slot.node.value = slot.node.options[position].value.clone();
        Ok(())
    }

    fn options(&self, node: NodeRef) -> DriverResult<Vec<SelectOption>> {
        Ok(self.state().slot(node)?.node.options.clone())
    }

    fn scroll_into_view(&self, node: NodeRef) -> DriverResult<()> {
        let mut state = self.state();
        state.slot(node)?;
        let label = state.label(node);
        state.record(format!("scroll:{}", label));
        Ok(())
    }

    fn call_function(&self, node: NodeRef, function: &str, _args: &[serde_json::Value]) -> DriverResult<serde_json::Value> {
        let mut state = self.state();
        state.slot(node)?;
        state.record(format!("script:{}", function.trim()));
        if state.script_results.is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(state.script_results.remove(0))
        }
    }

    fn perform(&self, actions: &[PointerAction]) -> DriverResult<()> {
        let mut state = self.state();
        state.pointer_actions.extend_from_slice(actions);
        state.record(format!("pointer:{}", actions.len()));
        Ok(())
    }

    fn quit(&self) -> DriverResult<()> {
        let mut state = self.state();
        state.quit = true;
        state.record("quit".to_string());
        Ok(())
    }
}

impl Connector for StubDriver {
    fn connect(&self, _config: &Config) -> DriverResult<Box<dyn Driver>> {
        Ok(Box::new(self.clone()))
    }
}
