//! Field extraction for medicament detail pages.

use crate::text::{collapse_whitespace, strip_accents};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

lazy_static! {
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").expect("Invalid title selector");
    static ref ROOT_SELECTOR: Selector =
        Selector::parse(".single-medicament").expect("Invalid root selector");
    static ref MAIN_TITLE_SELECTOR: Selector =
        Selector::parse("h1.main-title").expect("Invalid main title selector");
    static ref H1_SELECTOR: Selector = Selector::parse("h1").expect("Invalid h1 selector");
    static ref DETAIL_ITEM_SELECTOR: Selector =
        Selector::parse(".medicine-details .detail-item").expect("Invalid detail item selector");
    static ref DETAIL_HEADER_SELECTOR: Selector =
        Selector::parse(".detail-header").expect("Invalid detail header selector");
    static ref DETAIL_CONTENT_SELECTOR: Selector =
        Selector::parse(".detail-content").expect("Invalid detail content selector");

    static ref UPDATED_PATTERN: Regex =
        Regex::new(r"(?i)mise\s+a\s+jour\s+le\s*:\s*(\d{1,2}\s+[a-z]+\s+\d{4})")
            .expect("Invalid update date regex");
    static ref FR_DATE_PATTERN: Regex =
        Regex::new(r"(\d{1,2})\s+([a-z]+)\s+(\d{4})").expect("Invalid date regex");
}

const NOT_FOUND_MARKER: &str = "page non trouv";

/// Raw fields of one detail page, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub name: String,
    /// Detail table keyed by `normalize_header(label)`
    pub details: BTreeMap<String, String>,
    /// ISO date from the "Mise à jour le" notice
    pub updated_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPage {
    /// The site rendered its "page non trouvée" template
    NotFound,
    /// The page does not have the expected structure
    Invalid(String),
    Page(RawPage),
}

pub fn parse_medicament_page(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| element_text(&el).to_lowercase())
        .unwrap_or_default();
    if title.contains(NOT_FOUND_MARKER)
        || element_text(&document.root_element())
            .to_lowercase()
            .contains(NOT_FOUND_MARKER)
    {
        return ParsedPage::NotFound;
    }

    let Some(root) = document.select(&ROOT_SELECTOR).next() else {
        return ParsedPage::Invalid("missing .single-medicament container".to_string());
    };

    let Some(title_el) = root
        .select(&MAIN_TITLE_SELECTOR)
        .next()
        .or_else(|| root.select(&H1_SELECTOR).next())
    else {
        return ParsedPage::Invalid("missing title".to_string());
    };

    let name = element_text(&title_el);
    if name.is_empty() {
        return ParsedPage::Invalid("empty title".to_string());
    }

    ParsedPage::Page(RawPage {
        name,
        details: extract_details(&root),
        updated_date: extract_updated_date(&element_text(&root)),
    })
}

fn extract_details(root: &ElementRef<'_>) -> BTreeMap<String, String> {
    let mut details = BTreeMap::new();
    for item in root.select(&DETAIL_ITEM_SELECTOR) {
        let (Some(header), Some(content)) = (
            item.select(&DETAIL_HEADER_SELECTOR).next(),
            item.select(&DETAIL_CONTENT_SELECTOR).next(),
        ) else {
            continue;
        };
        let key = normalize_header(&element_text(&header));
        let value = element_text(&content);
        if !key.is_empty() && !value.is_empty() {
            details.insert(key, value);
        }
    }
    details
}

fn extract_updated_date(text: &str) -> Option<String> {
    let folded = strip_accents(text);
    let captures = UPDATED_PATTERN.captures(&folded)?;
    parse_fr_date(&captures[1])
}

/// All text under `element`, whitespace-collapsed.
fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Lower-case, accent-free, single-spaced detail label (`"Classe Thérapeutique"` ->
/// `"classe therapeutique"`).
pub fn normalize_header(value: &str) -> String {
    collapse_whitespace(&strip_accents(&value.to_lowercase()))
}

/// Parse a French long-form date such as `"5 novembre 2024"` into `2024-11-05`.
pub fn parse_fr_date(raw: &str) -> Option<String> {
    let folded = strip_accents(&raw.trim().to_lowercase());
    let captures = FR_DATE_PATTERN.captures(&folded)?;

    let day: u32 = captures[1].parse().ok()?;
    let month = french_month(&captures[2])?;
    let year: i32 = captures[3].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day).map(|date| date.format("%Y-%m-%d").to_string())
}

fn french_month(name: &str) -> Option<u32> {
    let month = match name {
        "janvier" => 1,
        "fevrier" => 2,
        "mars" => 3,
        "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" => 7,
        "aout" => 8,
        "septembre" => 9,
        "octobre" => 10,
        "novembre" => 11,
        "decembre" => 12,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>DOLIPRANE 1000 MG, Comprimé - Médicament</title></head>
<body>
  <div class="single-medicament">
    <h1 class="main-title">  DOLIPRANE 1000 MG,
        Comprimé </h1>
    <div class="medicine-details">
      <div class="detail-item"><span class="detail-header">Présentation</span><span class="detail-content">Boite de 8</span></div>
      <div class="detail-item"><span class="detail-header">Classe   Thérapeutique</span><span class="detail-content">Antalgique, antipyrétique</span></div>
      <div class="detail-item"><span class="detail-header">PPV</span><span class="detail-content">  15,60 dhs </span></div>
      <div class="detail-item"><span class="detail-header">Vide</span><span class="detail-content"> </span></div>
    </div>
    <p>Mise à jour le : 5 novembre 2024 Ajouté le : 1 janvier 2020</p>
  </div>
</body></html>"#;

    #[test]
    fn test_parse_detail_page() {
        let ParsedPage::Page(page) = parse_medicament_page(PAGE) else {
            panic!("expected a parsed page");
        };
        assert_eq!(page.name, "DOLIPRANE 1000 MG, Comprimé");
        assert_eq!(page.details["presentation"], "Boite de 8");
        assert_eq!(page.details["classe therapeutique"], "Antalgique, antipyrétique");
        assert_eq!(page.details["ppv"], "15,60 dhs");
        assert!(!page.details.contains_key("vide"));
        assert_eq!(page.updated_date.as_deref(), Some("2024-11-05"));
    }

    #[test]
    fn test_not_found_marker_in_title() {
        let html = "<html><head><title>Page non trouvée - Médicament</title></head><body></body></html>";
        assert_eq!(parse_medicament_page(html), ParsedPage::NotFound);
    }

    #[test]
    fn test_not_found_marker_in_body() {
        let html = "<html><body><div class=\"single-medicament\"><h1>Oups</h1><p>Page non trouvée</p></div></body></html>";
        assert_eq!(parse_medicament_page(html), ParsedPage::NotFound);
    }

    #[test]
    fn test_missing_container() {
        let html = "<html><body><h1>Autre chose</h1></body></html>";
        assert!(matches!(parse_medicament_page(html), ParsedPage::Invalid(msg) if msg.contains("single-medicament")));
    }

    #[test]
    fn test_falls_back_to_plain_h1() {
        let html = "<html><body><div class=\"single-medicament\"><h1>ASPEGIC</h1></div></body></html>";
        let ParsedPage::Page(page) = parse_medicament_page(html) else {
            panic!("expected a parsed page");
        };
        assert_eq!(page.name, "ASPEGIC");
        assert!(page.updated_date.is_none());
    }

    #[test]
    fn test_empty_title() {
        let html = "<html><body><div class=\"single-medicament\"><h1>  </h1></div></body></html>";
        assert_eq!(parse_medicament_page(html), ParsedPage::Invalid("empty title".to_string()));
    }

    #[test]
    fn test_parse_fr_date() {
        assert_eq!(parse_fr_date("5 novembre 2024").as_deref(), Some("2024-11-05"));
        assert_eq!(parse_fr_date(" 12 Février 2023").as_deref(), Some("2023-02-12"));
        assert_eq!(parse_fr_date("1 août 2021").as_deref(), Some("2021-08-01"));
        assert_eq!(parse_fr_date("31 fevrier 2023"), None);
        assert_eq!(parse_fr_date("5 brumaire 2024"), None);
        assert_eq!(parse_fr_date("bientôt"), None);
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Distributeur ou  Fabriquant "), "distributeur ou fabriquant");
        assert_eq!(normalize_header("Présentation"), "presentation");
    }
}
