//! Chrome/Chromium backend over the DevTools protocol

use crate::browser::config::{Config, ConnectionOptions, LaunchOptions};
use crate::browser::driver::{
    ConnectionPhase, Connector, Driver, DriverError, DriverResult, MouseButton, NodeInfo, NodeRef, PointerAction,
    SelectOption,
};
use crate::dom::geometry::{Point, Rect};
use headless_chrome::protocol::cdp::DOM;
use headless_chrome::{Browser, Element, Tab};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::cell::Cell;
use std::ffi::OsStr;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

/// Keeps the browser alive for as long as the session is
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Rejection reason of a page script that outlived `script_timeout_ms`
const SCRIPT_EXPIRED: &str = "browser-pages: script expired";

/// Map a headless_chrome failure onto a driver error category
pub fn classify(err: anyhow::Error) -> DriverError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("could not find node")
        || lower.contains("no node with given id")
        || lower.contains("node is detached")
        || lower.contains("cannot find context with specified id")
    {
        DriverError::UnknownObject(message)
    } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("never came") {
        DriverError::CommandTimeout(message)
    } else if lower.contains("connection is closed") || lower.contains("connection closed") {
        DriverError::Connection { phase: ConnectionPhase::Read, message }
    } else {
        DriverError::Other(message)
    }
}

fn js_failed(err: impl std::fmt::Display) -> DriverError {
    DriverError::Other(format!("unexpected script result: {}", err))
}

const DESCRIBE_JS: &str = r#"function() {
    const attributes = {};
    for (const attr of this.attributes) attributes[attr.name] = attr.value;
    return JSON.stringify({
        tag_name: this.tagName.toLowerCase(),
        attributes,
        content_editable: this.isContentEditable
    });
}"#;

const DISPLAYED_JS: &str = r#"function() {
    const style = window.getComputedStyle(this);
    const rect = this.getBoundingClientRect();
    return JSON.stringify(
        style.display !== 'none' && style.visibility !== 'hidden' && rect.width > 0 && rect.height > 0
    );
}"#;

const RECT_JS: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    return JSON.stringify({ x: rect.x, y: rect.y, width: rect.width, height: rect.height });
}"#;

/// Selenium-style description of the element covering the center of `this`, or null
const OBSCURED_JS: &str = r#"function() {
    this.scrollIntoView({ block: 'center', inline: 'center' });
    const rect = this.getBoundingClientRect();
    const x = rect.left + rect.width / 2;
    const y = rect.top + rect.height / 2;
    const hit = document.elementFromPoint(x, y);
    if (!hit || hit === this || this.contains(hit)) return JSON.stringify(null);
    const open = (el) => el.outerHTML.slice(0, el.outerHTML.indexOf('>') + 1);
    const tag = this.tagName.toLowerCase();
    return JSON.stringify(
        `Element ${open(this)}...</${tag}> is not clickable at point (${Math.round(x)}, ${Math.round(y)}). ` +
        `Other element would receive the click: ${open(hit)}`
    );
}"#;

const SYNTHETIC_CLICK_JS: &str = r#"function(type, button, detail) {
    const rect = this.getBoundingClientRect();
    const init = {
        bubbles: true, cancelable: true, view: window, button, detail,
        clientX: rect.left + rect.width / 2, clientY: rect.top + rect.height / 2
    };
    if (type === 'dblclick') {
        this.dispatchEvent(new MouseEvent('mousedown', init));
        this.dispatchEvent(new MouseEvent('mouseup', init));
        this.dispatchEvent(new MouseEvent('click', init));
    } else {
        this.dispatchEvent(new MouseEvent('mousedown', init));
        this.dispatchEvent(new MouseEvent('mouseup', init));
    }
    this.dispatchEvent(new MouseEvent(type, init));
    return JSON.stringify(true);
}"#;

const SELECT_JS: &str = r#"function(wanted) {
    const option = Array.from(this.options || []).find(o => o.value === wanted || o.text.trim() === wanted);
    if (!option) return JSON.stringify(false);
    option.selected = true;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return JSON.stringify(true);
}"#;

const OPTIONS_JS: &str = r#"function() {
    return JSON.stringify(Array.from(this.options || []).map(o => ({
        value: o.value, text: o.text.trim(), selected: o.selected
    })));
}"#;

const POINTER_JS: &str = r#"(function(type, x, y, buttons) {
    const target = document.elementFromPoint(x, y) || document.body;
    const init = { bubbles: true, cancelable: true, view: window, clientX: x, clientY: y, button: 0, buttons };
    target.dispatchEvent(new PointerEvent(type.replace('mouse', 'pointer'), init));
    target.dispatchEvent(new MouseEvent(type, init));
    return true;
})"#;

/// Driver controlling one tab of a Chrome/Chromium instance
pub struct ChromeDriver {
    /// Keeps the browser process (or connection) alive for the tab
    _browser: Browser,
    tab: Arc<Tab>,
    pointer: Cell<Point>,
    script_timeout_ms: u64,
}

/// Open the DevTools connection on a helper thread so a silent endpoint cannot block past `timeout`
fn connect_within(ws_url: &str, timeout: Duration) -> DriverResult<Browser> {
    let (tx, rx) = mpsc::channel();
    let url = ws_url.to_string();
    thread::spawn(move || {
        // The receiver is gone once the deadline passed
        let _ = tx.send(Browser::connect_with_timeout(url, IDLE_BROWSER_TIMEOUT));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(browser)) => Ok(browser),
        Ok(Err(e)) => Err(DriverError::Connection {
            phase: ConnectionPhase::Open,
            message: format!("Failed to connect to {}: {}", ws_url, e),
        }),
        Err(_) => Err(DriverError::Connection {
            phase: ConnectionPhase::Open,
            message: format!("No answer from {} within {:?}", ws_url, timeout),
        }),
    }
}

/// Wrap a function declaration so it runs with `this` bound and settles within `timeout_ms`
fn bounded_script(function: &str, timeout_ms: u64) -> String {
    format!(
        "function(...args) {{ \
            const result = ({function}).apply(this, args); \
            const expired = new Promise((_, reject) => setTimeout(() => reject(new Error({marker})), {timeout_ms})); \
            return Promise.race([Promise.resolve(result), expired]) \
                .then(value => JSON.stringify(value === undefined ? null : value)); \
        }}",
        marker = json!(SCRIPT_EXPIRED),
    )
}

impl ChromeDriver {
    /// Launch a new browser instance with the given options
    pub fn launch(options: &LaunchOptions, config: &Config) -> DriverResult<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        launch_opts.idle_browser_timeout = IDLE_BROWSER_TIMEOUT;

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path.clone();
        launch_opts.user_data_dir = options.user_data_dir.clone();
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| DriverError::LaunchFailed(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| DriverError::Other(format!("Failed to create tab: {}", e)))?;

        Ok(Self::with_tab(browser, tab, config))
    }

    /// Connect to an existing browser instance via WebSocket.
    ///
    /// Gives up when the handshake or the first tab takes longer than `connection.timeout`.
    pub fn connect(connection: &ConnectionOptions, config: &Config) -> DriverResult<Self> {
        let timeout = Duration::from_millis(connection.timeout);
        let browser = connect_within(&connection.ws_url, timeout)?;
        browser.set_default_timeout(timeout);
        let tab = browser.new_tab().map_err(|e| DriverError::Connection {
            phase: ConnectionPhase::Open,
            message: format!("Failed to create tab on {}: {}", connection.ws_url, e),
        })?;

        Ok(Self::with_tab(browser, tab, config))
    }

    fn with_tab(browser: Browser, tab: Arc<Tab>, config: &Config) -> Self {
        tab.set_default_timeout(Duration::from_millis(config.page_load_timeout_ms.max(config.read_timeout_ms)));
        Self {
            _browser: browser,
            tab,
            pointer: Cell::new(Point::default()),
            script_timeout_ms: config.script_timeout_ms,
        }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn element(&self, node: NodeRef) -> DriverResult<Element<'_>> {
        Element::new(&self.tab, node.0).map_err(classify)
    }

    /// Call a function on the node that returns a JSON string and decode it
    fn call_json<T: DeserializeOwned>(&self, node: NodeRef, function: &str, args: Vec<Value>) -> DriverResult<T> {
        let element = self.element(node)?;
        let object = element.call_js_fn(function, args, false).map_err(classify)?;
        let raw = object
            .value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| js_failed("function returned no string"))?
            .to_string();
        serde_json::from_str(&raw).map_err(js_failed)
    }

    fn dispatch_pointer(&self, kind: &str, at: Point, buttons: u32) -> DriverResult<()> {
        let script = format!("{}({}, {}, {}, {})", POINTER_JS, json!(kind), at.x, at.y, buttons);
        self.tab.evaluate(&script, false).map_err(classify)?;
        self.pointer.set(at);
        Ok(())
    }
}

impl Driver for ChromeDriver {
    fn name(&self) -> &str {
        "chrome"
    }

    fn reports_spurious_load_timeouts(&self) -> bool {
        true
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        self.tab.navigate_to(url).map_err(classify)?;
        self.tab.wait_until_navigated().map_err(classify)?;
        Ok(())
    }

    fn current_url(&self) -> DriverResult<String> {
        Ok(self.tab.get_url())
    }

    fn reload(&self) -> DriverResult<()> {
        self.tab.reload(false, None).map_err(classify)?;
        self.tab.wait_until_navigated().map_err(classify)?;
        Ok(())
    }

    fn find_elements(&self, scope: Option<NodeRef>, css: &str) -> DriverResult<Vec<NodeRef>> {
        let node_id = match scope {
            Some(node) => node.0,
            None => self.tab.get_document().map_err(classify)?.node_id,
        };

        let result = self
            .tab
            .call_method(DOM::QuerySelectorAll { node_id, selector: css.to_string() })
            .map_err(classify)?;

        Ok(result.node_ids.into_iter().map(NodeRef).collect())
    }

    fn describe(&self, node: NodeRef) -> DriverResult<NodeInfo> {
        self.call_json(node, DESCRIBE_JS, Vec::new())
    }

    fn is_displayed(&self, node: NodeRef) -> DriverResult<bool> {
        self.call_json(node, DISPLAYED_JS, Vec::new())
    }

    fn text(&self, node: NodeRef) -> DriverResult<String> {
        self.call_json(node, "function() { return JSON.stringify(this.innerText || ''); }", Vec::new())
    }

    fn html(&self, node: NodeRef) -> DriverResult<String> {
        self.call_json(node, "function() { return JSON.stringify(this.outerHTML); }", Vec::new())
    }

    fn attribute(&self, node: NodeRef, name: &str) -> DriverResult<Option<String>> {
        self.call_json(node, "function(name) { return JSON.stringify(this.getAttribute(name)); }", vec![json!(name)])
    }

    fn value(&self, node: NodeRef) -> DriverResult<String> {
        self.call_json(node, "function() { return JSON.stringify(this.value == null ? '' : String(this.value)); }", Vec::new())
    }

    fn is_enabled(&self, node: NodeRef) -> DriverResult<bool> {
        self.call_json(node, "function() { return JSON.stringify(!this.disabled); }", Vec::new())
    }

    fn is_focused(&self, node: NodeRef) -> DriverResult<bool> {
        self.call_json(node, "function() { return JSON.stringify(document.activeElement === this); }", Vec::new())
    }

    fn rect(&self, node: NodeRef) -> DriverResult<Rect> {
        self.call_json(node, RECT_JS, Vec::new())
    }

    fn click(&self, node: NodeRef, button: MouseButton, click_count: u32) -> DriverResult<()> {
        if let Some(message) = self.call_json::<Option<String>>(node, OBSCURED_JS, Vec::new())? {
            return Err(DriverError::ElementObscured(message));
        }

        match (button, click_count) {
            (MouseButton::Left, 1) => {
                self.element(node)?.click().map_err(classify)?;
            }
            (MouseButton::Left, _) => {
                self.call_json::<bool>(node, SYNTHETIC_CLICK_JS, vec![json!("dblclick"), json!(0), json!(click_count)])?;
            }
            (MouseButton::Right, _) => {
                self.call_json::<bool>(node, SYNTHETIC_CLICK_JS, vec![json!("contextmenu"), json!(2), json!(1)])?;
            }
            (MouseButton::Middle, _) => {
                self.call_json::<bool>(node, SYNTHETIC_CLICK_JS, vec![json!("auxclick"), json!(1), json!(1)])?;
            }
        }
        Ok(())
    }

    fn hover(&self, node: NodeRef) -> DriverResult<()> {
        self.element(node)?.move_mouse_over().map_err(classify)?;
        Ok(())
    }

    fn send_keys(&self, node: NodeRef, keys: &str) -> DriverResult<()> {
        self.element(node)?.focus().map_err(classify)?;
        self.tab.type_str(keys).map_err(classify)?;
        Ok(())
    }

    fn press_key(&self, node: NodeRef, key: &str) -> DriverResult<()> {
        self.element(node)?.focus().map_err(classify)?;
        self.tab.press_key(key).map_err(classify)?;
        Ok(())
    }

    fn clear(&self, node: NodeRef) -> DriverResult<()> {
        self.call_json::<bool>(
            node,
            r#"function() {
                if (this.isContentEditable) { this.textContent = ''; } else { this.value = ''; }
                this.dispatchEvent(new Event('input', { bubbles: true }));
                return JSON.stringify(true);
            }"#,
            Vec::new(),
        )?;
        Ok(())
    }

    fn set_checked(&self, node: NodeRef, checked: bool) -> DriverResult<()> {
        self.call_json::<bool>(
            node,
            "function(checked) { if (this.checked !== checked) this.click(); return JSON.stringify(this.checked); }",
            vec![json!(checked)],
        )?;
        Ok(())
    }

    fn select_option(&self, node: NodeRef, option: &str) -> DriverResult<()> {
        if self.call_json::<bool>(node, SELECT_JS, vec![json!(option)])? {
            Ok(())
        } else {
            Err(DriverError::Other(format!("cannot locate option with value or text {}", option)))
        }
    }

    fn options(&self, node: NodeRef) -> DriverResult<Vec<SelectOption>> {
        self.call_json(node, OPTIONS_JS, Vec::new())
    }

    fn scroll_into_view(&self, node: NodeRef) -> DriverResult<()> {
        self.element(node)?.scroll_into_view().map_err(classify)?;
        Ok(())
    }

    fn call_function(&self, node: NodeRef, function: &str, args: &[Value]) -> DriverResult<Value> {
        let element = self.element(node)?;
        let object = element
            .call_js_fn(&bounded_script(function, self.script_timeout_ms), args.to_vec(), true)
            .map_err(classify)?;

        if let Some(raw) = object.value.as_ref().and_then(Value::as_str) {
            return serde_json::from_str(raw).map_err(js_failed);
        }

        // A thrown or rejected script leaves its error in the description
        let description = object.description.unwrap_or_else(|| "script returned no result".to_string());
        if description.contains(SCRIPT_EXPIRED) {
            Err(DriverError::ScriptTimeout(format!("no result after {}ms", self.script_timeout_ms)))
        } else {
            Err(DriverError::Other(description))
        }
    }

    fn perform(&self, actions: &[PointerAction]) -> DriverResult<()> {
        for action in actions {
            match *action {
                PointerAction::PressAndHold(at) => {
                    self.dispatch_pointer("mousemove", at, 0)?;
                    self.dispatch_pointer("mousedown", at, 1)?;
                }
                PointerAction::MoveBy { dx, dy } => {
                    let at = self.pointer.get().offset(dx, dy);
                    self.dispatch_pointer("mousemove", at, 1)?;
                }
                PointerAction::MoveTo(at) => self.dispatch_pointer("mousemove", at, 1)?,
                PointerAction::Release => self.dispatch_pointer("mouseup", self.pointer.get(), 0)?,
            }
        }
        Ok(())
    }

    fn quit(&self) -> DriverResult<()> {
        // The process itself exits when the Browser is dropped
        self.tab.close(false).map_err(classify)?;
        Ok(())
    }
}

/// Launches Chrome, or connects to `remote_driver_url` when one is configured
#[derive(Debug, Clone, Default)]
pub struct ChromeConnector;

impl Connector for ChromeConnector {
    fn connect(&self, config: &Config) -> DriverResult<Box<dyn Driver>> {
        let driver = match config.connection() {
            Some(connection) => {
                log::info!("connecting to browser at {}", connection.ws_url);
                ChromeDriver::connect(&connection, config)?
            }
            None => {
                log::info!("launching browser (headless: {})", config.launch.headless);
                ChromeDriver::launch(&config.launch, config)?
            }
        };
        Ok(Box::new(driver))
    }
}
