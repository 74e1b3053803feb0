use browser_pages::routing::{PageKind, UrlTemplate};
use browser_pages::{
    BrowserError, Config, ElementKind, LaunchOptions, Navigator, Node, PageHandle, RoutingTable, Session, UriVars,
};
use std::time::Duration;

fn launch() -> Session {
    let config = Config::new().launch(LaunchOptions::new().headless(true)).default_timeout_ms(5_000);
    Session::new(config, RoutingTable::new()).expect("Failed to create session")
}

fn open(session: &Session, html: &str) -> PageHandle {
    let page = PageHandle::new(session.clone(), PageKind::new("Data", UrlTemplate::parse("{+url}").unwrap()));
    let url = format!("data:text/html,{}", html);
    Navigator::new(session)
        .visit(&page, &UriVars::from([("url", url.as_str())]))
        .expect("Failed to navigate");
    page
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_resolve_and_read() {
    let session = launch();
    let page = open(
        &session,
        "<html><body><h1 id='title'>Hello</h1><ul><li>a</li><li>b</li><li>c</li></ul></body></html>",
    );

    assert_eq!(page.element("#title").text().unwrap(), "Hello");
    assert_eq!(page.elements("li").size().unwrap(), 3);
    assert!(!page.element("#missing").exists().unwrap());

    session.quit().unwrap();
}

#[test]
#[ignore]
fn test_input_promotion_and_set() {
    let session = launch();
    let page = open(&session, "<html><body><input id='name' type='text' value='old'></body></html>");

    let name = page.element("#name");
    assert_eq!(name.kind().unwrap(), ElementKind::TextField);
    name.set("new value").unwrap();
    assert_eq!(name.value().unwrap(), "new value");

    session.quit().unwrap();
}

#[test]
#[ignore]
fn test_visible_after_script_reveals_element() {
    let session = launch();
    let page = open(
        &session,
        "<html><body><div id='late' style='display:none'>later</div>\
         <script>setTimeout(function() { document.getElementById('late').style.display = 'block'; }, 200);</script>\
         </body></html>",
    );

    assert!(page.element("#late").visible(Some(Duration::from_secs(3))).unwrap());
    session.quit().unwrap();
}

#[test]
#[ignore]
fn test_obscured_click_is_element_not_found() {
    let session = launch();
    let page = open(
        &session,
        "<html><body><button id='save' style='position:absolute;top:10px;left:10px'>Save</button>\
         <div class='backdrop' style='position:fixed;top:0;left:0;width:100%;height:100%'></div></body></html>",
    );

    let err = page.element("#save").click().unwrap_err();
    assert!(matches!(err, BrowserError::ElementNotFound(ref message) if message.contains("backdrop")));
    session.quit().unwrap();
}

#[test]
#[ignore]
fn test_execute_script_binds_this() {
    let session = launch();
    let page = open(&session, "<html><body><p id='p' data-count='3'>x</p></body></html>");

    let count = page
        .element("#p")
        .execute_script("function(step) { return Number(this.dataset.count) + step; }", &[serde_json::json!(2)])
        .unwrap();
    assert_eq!(count, serde_json::json!(5));
    session.quit().unwrap();
}

#[test]
#[ignore]
fn test_unsettled_script_hits_script_timeout() {
    let config = Config::new()
        .launch(LaunchOptions::new().headless(true))
        .default_timeout_ms(5_000)
        .script_timeout_ms(200);
    let session = Session::new(config, RoutingTable::new()).expect("Failed to create session");
    let page = open(&session, "<html><body><p id='p'>x</p></body></html>");

    let err = page
        .element("#p")
        .execute_script("function() { return new Promise(() => {}); }", &[])
        .unwrap_err();
    assert!(matches!(err, BrowserError::Automation(ref message) if message.contains("script_timeout_ms")));
    session.quit().unwrap();
}
