use super::document::Document;

/// One way of reading a field out of a page.
#[derive(Clone, Copy)]
pub enum Rule {
    /// `<meta property|name=…>` content.
    Meta(&'static str),
    /// Text of the first element matching a CSS selector.
    Text(&'static str),
    /// Attribute of the first element matching a CSS selector.
    Attr(&'static str, &'static str),
    /// String value of a key inside embedded JSON-LD.
    LinkedData(&'static str),
    Derived(fn(&Document) -> Option<String>),
}

impl Rule {
    pub fn apply(&self, doc: &Document) -> Option<String> {
        match *self {
            Rule::Meta(key) => doc.meta(key),
            Rule::Text(css) => doc.text(css),
            Rule::Attr(css, attr) => doc.attr(css, attr),
            Rule::LinkedData(key) => doc.linked_data(key),
            Rule::Derived(f) => f(doc),
        }
    }
}

/// Tries `rules` in order; the first trimmed, non-empty value wins.
pub fn first_match(doc: &Document, rules: &[Rule]) -> Option<String> {
    rules.iter().find_map(|rule| {
        rule.apply(doc)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
