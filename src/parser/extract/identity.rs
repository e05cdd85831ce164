use crate::model::Location;
use crate::parser::chain::{first_match, Rule};
use crate::parser::decompose_location;
use crate::parser::document::Document;

use super::experience;

static NAME: &[Rule] = &[
    Rule::Derived(tagged_name),
    Rule::Text("h1.top-card-layout__title"),
    Rule::Text("h1.text-heading-xlarge"),
    Rule::Text("h1"),
];

static HEADLINE: &[Rule] = &[
    Rule::Derived(page_title),
    Rule::Derived(experience::summary),
    Rule::Text("h2.top-card-layout__headline"),
    Rule::Text(".text-body-medium.break-words"),
];

static CURRENT_JOB: &[Rule] = &[
    Rule::Meta("profile:current_job"),
    Rule::Derived(experience::summary),
    Rule::Text("h2.top-card-layout__headline"),
];

static VISIBLE_LOCATION: &[Rule] = &[
    Rule::Text(".top-card-layout__first-subline span:first-child"),
    Rule::Text(".top-card__subline-item"),
    Rule::Text(".top-card-location"),
    Rule::Text(".text-body-small.inline.t-black--light.break-words"),
];

static PROFILE_URL: &[Rule] = &[
    Rule::Meta("og:url"),
    Rule::Attr(r#"link[rel="canonical"]"#, "href"),
];

static EMAIL: &[Rule] = &[Rule::Derived(mailto), Rule::LinkedData("email")];

static PHONE: &[Rule] = &[
    Rule::Text("span.phone"),
    Rule::Derived(tel),
    Rule::LinkedData("telephone"),
];

pub fn full_name(doc: &Document) -> Option<String> {
    first_match(doc, NAME)
}

pub fn headline(doc: &Document) -> Option<String> {
    first_match(doc, HEADLINE)
}

pub fn current_job(doc: &Document) -> Option<String> {
    first_match(doc, CURRENT_JOB)
}

/// Declared page URL, if the page carries one.
pub fn declared_url(doc: &Document) -> Option<String> {
    first_match(doc, PROFILE_URL)
}

pub fn email(doc: &Document) -> Option<String> {
    first_match(doc, EMAIL)
}

pub fn phone(doc: &Document) -> Option<String> {
    first_match(doc, PHONE)
}

pub fn birthdate(doc: &Document) -> Option<String> {
    first_match(doc, &[Rule::Meta("profile:birthdate")])
}

pub fn military_branch(doc: &Document) -> Option<String> {
    first_match(doc, &[Rule::Meta("profile:military_branch")])
}

pub fn school_district(doc: &Document) -> Option<String> {
    first_match(doc, &[Rule::Meta("profile:school_district")])
}

pub fn street_address(doc: &Document) -> Option<String> {
    first_match(doc, &[Rule::LinkedData("streetAddress")])
}

pub fn zip_code(doc: &Document) -> Option<String> {
    first_match(doc, &[Rule::LinkedData("postalCode")])
}

/// Visible subline first, decomposed positionally; else the linked-data address.
pub fn location(doc: &Document) -> Location {
    if let Some(text) = first_match(doc, VISIBLE_LOCATION) {
        return decompose_location(&text);
    }

    let Some(locality) = doc.linked_data("addressLocality") else {
        return Location {
            state: doc.linked_data("addressRegion"),
            country: doc.linked_data("addressCountry"),
            ..Default::default()
        };
    };
    if locality.contains(',') {
        return decompose_location(&locality);
    }
    Location {
        raw: None,
        city: Some(locality),
        state: doc.linked_data("addressRegion"),
        country: doc.linked_data("addressCountry"),
    }
}

fn tagged_name(doc: &Document) -> Option<String> {
    let parts: Vec<String> = [doc.meta("profile:first_name"), doc.meta("profile:last_name")]
        .into_iter()
        .flatten()
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn page_title(doc: &Document) -> Option<String> {
    let title = doc.meta("og:title")?;
    let trimmed = title
        .strip_suffix("| LinkedIn")
        .unwrap_or(&title)
        .trim_end_matches([' ', '|'])
        .to_string();
    Some(trimmed)
}

fn mailto(doc: &Document) -> Option<String> {
    let href = doc.attr(r#"a[href^="mailto:"]"#, "href")?;
    let addr = href.trim_start_matches("mailto:");
    Some(addr.split('?').next().unwrap_or(addr).to_string())
}

fn tel(doc: &Document) -> Option<String> {
    let href = doc.attr(r#"a[href^="tel:"]"#, "href")?;
    Some(href.trim_start_matches("tel:").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_name_beats_heading() {
        let doc = Document::parse(
            r#"<head><meta property="profile:first_name" content="Maria">
            <meta property="profile:last_name" content="Lopez"></head>
            <body><h1 class="top-card-layout__title">M. Lopez-Garcia</h1></body>"#,
        );
        assert_eq!(full_name(&doc).as_deref(), Some("Maria Lopez"));
    }

    #[test]
    fn heading_when_untagged() {
        let doc = Document::parse(r#"<body><h1 class="text-heading-xlarge"> Dana  Reyes </h1></body>"#);
        assert_eq!(full_name(&doc).as_deref(), Some("Dana Reyes"));
    }

    #[test]
    fn headline_strips_site_suffix() {
        let doc = Document::parse(
            r#"<head><meta property="og:title" content="Dana Reyes - Analyst - Verizon | LinkedIn"></head>"#,
        );
        assert_eq!(headline(&doc).as_deref(), Some("Dana Reyes - Analyst - Verizon"));
    }

    #[test]
    fn headline_falls_back_to_first_experience() {
        let doc = Document::parse(
            r#"<body><section data-section="experience"><ul>
              <li><h3>Data Analyst</h3><h4>Verizon</h4></li>
              <li><h3>Cashier</h3><h4>Target</h4></li>
            </ul></section></body>"#,
        );
        assert_eq!(headline(&doc).as_deref(), Some("Data Analyst at Verizon"));
        assert_eq!(current_job(&doc).as_deref(), Some("Data Analyst at Verizon"));
    }

    #[test]
    fn experience_headline_beats_visible_headline() {
        let doc = Document::parse(
            r#"<body><h2 class="top-card-layout__headline">Open to work</h2>
            <section data-section="experience"><ul>
              <li><h3>Data Analyst</h3><h4>Verizon</h4></li>
            </ul></section></body>"#,
        );
        assert_eq!(headline(&doc).as_deref(), Some("Data Analyst at Verizon"));

        let doc = Document::parse(
            r#"<body><h2 class="top-card-layout__headline">Open to work</h2></body>"#,
        );
        assert_eq!(headline(&doc).as_deref(), Some("Open to work"));
    }

    #[test]
    fn visible_location_is_decomposed() {
        let doc = Document::parse(
            r#"<body><div class="top-card-layout__first-subline"><span>Austin, TX</span><span>500+ connections</span></div></body>"#,
        );
        let loc = location(&doc);
        assert_eq!(loc.city.as_deref(), Some("Austin"));
        assert_eq!(loc.state.as_deref(), Some("TX"));
        assert_eq!(loc.country, None);
        assert_eq!(loc.raw.as_deref(), Some("Austin, TX"));
    }

    #[test]
    fn linked_data_location() {
        let doc = Document::parse(
            r#"<script type="application/ld+json">{"address":{"addressLocality":"Glendale","addressRegion":"AZ","addressCountry":"US"}}</script>"#,
        );
        let loc = location(&doc);
        assert_eq!(loc.city.as_deref(), Some("Glendale"));
        assert_eq!(loc.state.as_deref(), Some("AZ"));
        assert_eq!(loc.country.as_deref(), Some("US"));
        assert_eq!(loc.query_text().as_deref(), Some("Glendale, AZ, US"));
    }

    #[test]
    fn contact_links() {
        let doc = Document::parse(
            r#"<body><a href="mailto:dana@example.com?subject=hi">mail</a><a href="tel:+1-555-0100">call</a></body>"#,
        );
        assert_eq!(email(&doc).as_deref(), Some("dana@example.com"));
        assert_eq!(phone(&doc).as_deref(), Some("+1-555-0100"));
    }

    #[test]
    fn missing_fields_are_none() {
        let doc = Document::parse("<body><p>nothing here</p></body>");
        assert!(full_name(&doc).is_none());
        assert!(headline(&doc).is_none());
        assert!(location(&doc).is_empty());
        assert!(birthdate(&doc).is_none());
    }
}
