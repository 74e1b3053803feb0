//! browser-pages command line
//!
//! Inspect how URLs route to templates, or probe a live page for a selector.

use anyhow::{Context, Result};
use browser_pages::routing::{PageKind, RoutingTable, UriVars, UrlTemplate};
use browser_pages::{Config, LaunchOptions, Node, PageHandle, Session};
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "browser-pages")]
#[command(version)]
#[command(about = "Page-object routing and probing for Chrome", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the first template matching a path and the variables it extracts
    Route {
        /// Path (or URL) to route
        path: String,

        /// URL template, in registration order
        #[arg(long = "template", short = 't', value_name = "TEMPLATE", required = true)]
        templates: Vec<String>,
    },

    /// Visit a URL and report how many elements match a selector
    Probe {
        /// URL to visit, absolute or relative to --app-host
        url: String,

        /// CSS selector to look for
        #[arg(long, short = 's')]
        selector: String,

        /// How long to wait for the first match to become visible
        #[arg(long, default_value = "5000")]
        timeout_ms: u64,

        /// Launch browser in headed mode (default: headless)
        #[arg(long, short = 'H')]
        headed: bool,

        /// Host prefix for relative URLs
        #[arg(long, value_name = "URL")]
        app_host: Option<String>,

        /// WebSocket endpoint of an already running browser
        #[arg(long, value_name = "URL")]
        ws_endpoint: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Route { path, templates } => route(&path, &templates),
        Command::Probe { url, selector, timeout_ms, headed, app_host, ws_endpoint } => {
            let mut config = Config::new().launch(LaunchOptions::new().headless(!headed));
            if let Some(host) = app_host {
                config = config.app_host(host);
            }
            if let Some(endpoint) = ws_endpoint {
                config = config.remote_driver_url(endpoint);
            }
            probe(config, &url, &selector, Duration::from_millis(timeout_ms))
        }
    }
}

fn route(path: &str, templates: &[String]) -> Result<()> {
    let mut table = RoutingTable::new();
    for template in templates {
        let parsed = UrlTemplate::parse(template).with_context(|| format!("Invalid template {}", template))?;
        table.register_kind(PageKind::new(template.as_str(), parsed));
    }

    match table.resolve(path) {
        Some((kind, vars)) => {
            println!("{}", kind.template());
            for (name, value) in vars.iter() {
                println!("  {} = {}", name, value);
            }
        }
        None => {
            eprintln!("No template matches {}", path);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn probe(config: Config, url: &str, selector: &str, timeout: Duration) -> Result<()> {
    let session = Session::new(config, RoutingTable::new()).context("Failed to create session")?;
    let page = PageHandle::new(session.clone(), PageKind::new("Probe", UrlTemplate::parse("{+url}")?));

    eprintln!("Visiting {}", url);
    browser_pages::Navigator::new(&session)
        .visit(&page, &UriVars::from([("url", url)]))
        .with_context(|| format!("Failed to visit {}", url))?;

    let matches = page.elements(selector);
    let visible = matches.visible(Some(timeout))?;
    let count = matches.size()?;

    println!("url: {}", session.current_url()?);
    println!("matches: {}", count);
    println!("first visible: {}", visible);

    session.quit()?;
    Ok(())
}
