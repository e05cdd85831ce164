use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

// Any `"key": "string"` pair; the value may contain escaped quotes.
static STRING_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([\w@$-]+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

/// Read-only query surface over one parsed page.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Document {
            html: Html::parse_document(markup),
        }
    }

    /// `content` of a `<meta property=…>` or `<meta name=…>` tag.
    pub fn meta(&self, key: &str) -> Option<String> {
        let css = format!(r#"meta[property="{key}"], meta[name="{key}"]"#);
        let sel = Selector::parse(&css).ok()?;
        self.html
            .select(&sel)
            .find_map(|el| el.value().attr("content"))
            .map(clean)
            .filter(|s| !s.is_empty())
    }

    /// Collapsed text of the first element matching `css`.
    pub fn text(&self, css: &str) -> Option<String> {
        let sel = Selector::parse(css).ok()?;
        self.html
            .select(&sel)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
    }

    pub fn attr(&self, css: &str, attr: &str) -> Option<String> {
        let sel = Selector::parse(css).ok()?;
        self.html
            .select(&sel)
            .find_map(|el| el.value().attr(attr))
            .map(clean)
            .filter(|s| !s.is_empty())
    }

    /// String value of `"key": "…"` inside any embedded JSON-LD script.
    pub fn linked_data(&self, key: &str) -> Option<String> {
        let sel = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
        self.html.select(&sel).find_map(|script| {
            let body = script.inner_html();
            let raw = STRING_PAIR
                .captures_iter(&body)
                .find(|c| &c[1] == key)?
                .get(2)?
                .as_str()
                .to_string();
            let value = serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or(raw);
            Some(clean(&value)).filter(|s| !s.is_empty())
        })
    }

    /// A profile section: `section[data-section=…]` first, else a `<section>` whose
    /// own heading is one of `headings` (case-insensitive).
    pub fn section(&self, data_section: &str, headings: &[&str]) -> Option<ElementRef<'_>> {
        let css = format!(r#"section[data-section="{data_section}"]"#);
        if let Some(el) = Selector::parse(&css)
            .ok()
            .and_then(|sel| self.html.select(&sel).next())
        {
            return Some(el);
        }

        let sections = Selector::parse("section").ok()?;
        self.html.select(&sections).find(|section| {
            own_heading(*section).is_some_and(|h| {
                let text = element_text(h);
                headings.iter().any(|want| text.eq_ignore_ascii_case(want))
            })
        })
    }

    /// True when the page carries no text and no metadata at all.
    pub fn is_blank(&self) -> bool {
        let meta = Selector::parse("meta[content]").ok();
        let has_meta = meta.is_some_and(|sel| self.html.select(&sel).next().is_some());
        let has_text = self
            .html
            .root_element()
            .text()
            .any(|t| !t.trim().is_empty());
        !has_meta && !has_text
    }
}

// First heading that is a direct child of the section (or of its `<header>`).
// Headings nested deeper belong to the section's content.
fn own_heading(section: ElementRef<'_>) -> Option<ElementRef<'_>> {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .find_map(|child| {
            if is_heading(&child) {
                Some(child)
            } else if child.value().name() == "header" {
                child.children().filter_map(ElementRef::wrap).find(is_heading)
            } else {
                None
            }
        })
}

fn is_heading(el: &ElementRef<'_>) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3")
}

/// Whitespace-collapsed text content of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first descendant matching any of the comma-separated selectors.
pub fn child_text(el: ElementRef<'_>, css: &str) -> Option<String> {
    let sel = Selector::parse(css).ok()?;
    el.select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Descendant items of a section, trying each selector in order.
pub fn items<'a>(section: ElementRef<'a>, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    for css in selectors {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        let found: Vec<_> = section.select(&sel).collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
