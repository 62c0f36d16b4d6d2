// file: src/extract/html.rs
// description: visible text of an html page, entities decoded by the parser
// reference: https://docs.rs/scraper

use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements whose content never reaches the reader.
const SKIPPED: &[&str] = &[
    "head", "script", "style", "noscript", "template", "iframe", "svg",
];

/// Elements that start and end on their own line.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tr", "ul",
];

pub fn html_to_text(content: &str) -> String {
    let document = Html::parse_document(content);
    let mut text = String::with_capacity(content.len() / 2);
    collect_text(document.root_element(), &mut text);
    text
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }

    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    match name {
        "td" | "th" => out.push(' '),
        _ if block => out.push('\n'),
        _ => {}
    }
}
