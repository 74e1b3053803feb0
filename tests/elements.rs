use browser_pages::browser::driver::PointerAction;
use browser_pages::routing::{PageKind, UrlTemplate};
use browser_pages::{
    BrowserError, Config, DragAndDrop, Element, ElementHandle, ElementKind, Locator, Node, PageHandle, Point, Rect,
    RoutingTable, Session, StubDriver, StubNode,
};
use std::thread;
use std::time::Duration;

fn page(stub: &StubDriver) -> PageHandle {
    let config = Config::new().default_timeout_ms(300).poll_interval_ms(10);
    let session = Session::with_driver(config, RoutingTable::new(), stub.clone()).unwrap();
    PageHandle::new(session, PageKind::new("Board", UrlTemplate::parse("/board").unwrap()))
}

/// Search box with a custom operation
struct SearchBox {
    handle: ElementHandle,
}

impl SearchBox {
    fn search(&self, query: &str) -> browser_pages::Result<()> {
        self.handle.set(query)?;
        self.handle.press_key("Enter")
    }
}

impl Element for SearchBox {
    fn from_handle(handle: ElementHandle) -> Self {
        Self { handle }
    }

    fn as_element(&self) -> &ElementHandle {
        &self.handle
    }

    fn declared_kind() -> Option<ElementKind> {
        Some(ElementKind::TextField)
    }
}

#[test]
fn test_obscured_click_names_the_overlay() {
    let stub = StubDriver::new();
    let save = stub.append(None, StubNode::new("button").id("save").rect(Rect::new(100.0, 40.0, 40.0, 16.0)));
    stub.obscure(save, "<div class=\"modal-backdrop\"></div>");
    let page = page(&stub);

    let err = page.element("#save").click().unwrap_err();
    match err {
        BrowserError::ElementNotFound(message) => {
            assert!(message.starts_with("Element <button id=\"save\">"));
            assert!(message.contains("is not clickable at point (120, 48)"));
            assert!(message.ends_with("<div class=\"modal-backdrop\"></div>"));
        }
        other => panic!("Expected ElementNotFound, got {:?}", other),
    }
}

#[test]
fn test_collection_size_is_live() {
    let stub = StubDriver::new();
    let list = stub.append(None, StubNode::new("ul").id("cards"));
    stub.append(Some(list), StubNode::new("li").class("card"));
    stub.append(Some(list), StubNode::new("li").class("card"));
    let page = page(&stub);

    let cards = page.element("#cards").elements("li.card");
    assert_eq!(cards.size().unwrap(), 2);

    stub.append(Some(list), StubNode::new("li").class("card"));
    assert_eq!(cards.size().unwrap(), 3);
    assert!(cards.get(2).unwrap().is_some());
    assert!(cards.get(3).unwrap().is_none());
}

#[test]
fn test_handle_survives_rerender() {
    let stub = StubDriver::new();
    let old = stub.append(None, StubNode::new("h2").id("title").text("Draft"));
    let page = page(&stub);

    let title = page.element("#title");
    assert_eq!(title.text().unwrap(), "Draft");

    stub.set_text(old, "In review");
    assert_eq!(title.text().unwrap(), "In review");

    stub.remove(old);
    assert!(!title.exists().unwrap());
    assert!(title.text().unwrap_err().is_element_not_found());

    stub.append(None, StubNode::new("h2").id("title").text("Published"));
    assert_eq!(title.text().unwrap(), "Published");
}

#[test]
fn test_nested_lookup_scopes_to_parent() {
    let stub = StubDriver::new();
    let billing = stub.append(None, StubNode::new("form").id("billing"));
    let shipping = stub.append(None, StubNode::new("form").id("shipping"));
    stub.append(Some(billing), StubNode::new("input").attr("name", "city").value("Oslo"));
    stub.append(Some(shipping), StubNode::new("input").attr("name", "city").value("Bergen"));
    let page = page(&stub);

    let city = page.element("#shipping").element(Locator::tag("input").with("name", "city"));
    assert_eq!(city.value().unwrap(), "Bergen");
    assert_eq!(city.key(), "page:Board > #shipping > input[name=\"city\"]");

    let form = city.node().parent().unwrap();
    assert_eq!(form.key(), "page:Board > #shipping");
    assert!(!form.is_root());
    assert!(form.parent().unwrap().is_root());
    assert!(page.node().parent().is_none());
}

#[test]
fn test_text_locator_filters_on_exact_text() {
    let stub = StubDriver::new();
    stub.append(None, StubNode::new("button").text("Save draft"));
    stub.append(None, StubNode::new("button").id("publish").text("Save"));
    let page = page(&stub);

    let save = page.element(Locator::tag("button").with_text("Save"));
    assert_eq!(save.attribute("id").unwrap().as_deref(), Some("publish"));
}

#[test]
fn test_visible_waits_for_element_to_show() {
    let stub = StubDriver::new();
    let toast = stub.append(None, StubNode::new("div").id("toast").hidden());
    let page = page(&stub);
    let element = page.element("#toast");

    assert!(!element.visible(Some(Duration::ZERO)).unwrap());

    let later = stub.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        later.set_displayed(toast, true);
    });

    assert!(element.visible(None).unwrap());
    worker.join().unwrap();
    assert!(!element.not_visible(Some(Duration::from_millis(30))).unwrap());
}

#[test]
fn test_unbounded_visibility_timeout() {
    let stub = StubDriver::new();
    stub.append(None, StubNode::new("div").id("banner"));
    let page = page(&stub);

    assert!(page.element("#banner").visible(Some(Duration::MAX)).unwrap());
    assert!(page.element("#missing").not_visible(Some(Duration::MAX)).unwrap());
}

#[test]
fn test_not_visible_when_removed() {
    let stub = StubDriver::new();
    let spinner = stub.append(None, StubNode::new("div").class("spinner"));
    let page = page(&stub);

    let later = stub.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        later.remove(spinner);
    });

    assert!(page.element(".spinner").not_visible(None).unwrap());
    worker.join().unwrap();
}

#[test]
fn test_collection_visibility_uses_first_element() {
    let stub = StubDriver::new();
    let page = page(&stub);
    let rows = page.elements("tr");

    assert!(!rows.visible(Some(Duration::from_millis(20))).unwrap());
    assert!(rows.not_visible(Some(Duration::ZERO)).unwrap());

    stub.append(None, StubNode::new("tr"));
    assert!(rows.visible(Some(Duration::ZERO)).unwrap());
}

#[test]
fn test_drag_and_drop_sequence_is_recorded() {
    let stub = StubDriver::new();
    stub.append(None, StubNode::new("li").id("card").rect(Rect::new(0.0, 0.0, 20.0, 20.0)));
    stub.append(None, StubNode::new("ul").id("done").rect(Rect::new(200.0, 100.0, 100.0, 40.0)));
    let page = page(&stub);

    let sequence = DragAndDrop::default().settle_delay(Duration::ZERO);
    page.element("#card").drag_and_drop_with(&page.element("#done"), &sequence).unwrap();

    assert_eq!(
        stub.pointer_actions(),
        vec![
            PointerAction::PressAndHold(Point::new(10.0, 10.0)),
            PointerAction::MoveBy { dx: 0.0, dy: -5.0 },
            PointerAction::MoveTo(Point::new(250.0, 120.0)),
            PointerAction::Release,
        ]
    );
}

#[test]
fn test_custom_element_type() {
    let stub = StubDriver::new();
    let input = stub.append(None, StubNode::new("input").attr("type", "search").value("old"));
    let page = page(&stub);

    let search: SearchBox = page.element_as("input[type=\"search\"]");
    search.search("rust").unwrap();

    assert_eq!(stub.value_of(input), "rust");
    assert!(stub.events().iter().any(|event| event.ends_with(":Enter")));
    assert_eq!(search.as_element().kind().unwrap(), ElementKind::TextField);
}

#[test]
fn test_select_and_checkbox() {
    let stub = StubDriver::new();
    stub.append(
        None,
        StubNode::new("select")
            .id("size")
            .option("s", "Small", true)
            .option("m", "Medium", false)
            .option("l", "Large", false),
    );
    let terms = stub.append(None, StubNode::new("input").id("terms").attr("type", "checkbox"));
    let page = page(&stub);

    let size = page.element("#size");
    assert_eq!(size.kind().unwrap(), ElementKind::Select);
    size.select_value("Large").unwrap();
    let selected: Vec<String> = size.selected_options().unwrap().into_iter().map(|o| o.value).collect();
    assert_eq!(selected, vec!["l"]);

    let checkbox = page.element("#terms");
    checkbox.set_checked(true).unwrap();
    assert!(stub.is_checked(terms));
    assert!(matches!(
        size.set_checked(true),
        Err(BrowserError::UnsupportedOperation { operation: "set_checked", kind: ElementKind::Select })
    ));
}

#[test]
fn test_execute_script_is_bound_to_element() {
    let stub = StubDriver::new();
    stub.append(None, StubNode::new("canvas").id("chart"));
    stub.push_script_result(serde_json::json!({"width": 640}));
    let page = page(&stub);

    let result = page.element("#chart").execute_script("function() { return { width: this.width }; }", &[]).unwrap();
    assert_eq!(result["width"], 640);
    assert!(stub.events().iter().any(|event| event.starts_with("script:function()")));
}

#[test]
fn test_missing_parent_fails_with_its_key() {
    let stub = StubDriver::new();
    let page = page(&stub);

    let err = page.element("#sidebar").element("a.logout").click().unwrap_err();
    assert!(matches!(err, BrowserError::ElementNotFound(ref key) if key == "page:Board > #sidebar > a.logout"));
}
