//! Maps raw detail-page fields onto the published schema.org `Drug` record.

use crate::models::{Entity, Record};
use crate::parser::RawPage;
use crate::therapeutic::normalize_therapeutic_classes;
use crate::text::collapse_whitespace;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

lazy_static! {
    static ref VALUE_SEPARATOR: Regex =
        Regex::new(r"(?i)\s*(?:\||;|,|/|\+|\bet\b)\s*").expect("Invalid separator regex");
    static ref PRICE_NOISE: Regex = Regex::new(r"[^0-9,.]").expect("Invalid price regex");
}

/// Build the dataset record for one fetched page.
///
/// `today` is used as `updatedAt` when the page carries no update notice.
pub fn normalize_fields(entity: &Entity, page: &RawPage, today: &str) -> Record {
    let details = &page.details;
    let detail = |key: &str| details.get(key).cloned();

    let mut active_ingredients = split_values(details.get("composition").map(String::as_str).unwrap_or(""));
    if active_ingredients.is_empty() {
        let head = page.name.split(',').next().unwrap_or("").trim();
        if !head.is_empty() {
            active_ingredients.push(head.to_string());
        }
    }

    let therapeutic = normalize_therapeutic_classes(&split_values(
        details.get("classe therapeutique").map(String::as_str).unwrap_or(""),
    ));

    let description = detail("indication(s)")
        .or_else(|| detail("indications"))
        .unwrap_or_else(|| format!("Fiche medicament Maroc issue de medicament.ma ({}).", entity.url));

    let mut price = serde_json::Map::new();
    price.insert("currency".to_string(), json!("MAD"));
    if let Some(public) = details.get("ppv").and_then(|v| parse_price(v)) {
        price.insert("public".to_string(), json!(public));
    }
    if let Some(hospital) = details.get("prix hospitalier").and_then(|v| parse_price(v)) {
        price.insert("hospital".to_string(), json!(hospital));
    }
    let price = (price.len() > 1).then_some(Value::Object(price));

    let manufacturer = detail("distributeur ou fabriquant").or_else(|| detail("fabricant"));

    let fields: [(&str, Option<Value>); 17] = [
        ("@context", Some(json!("https://schema.org"))),
        ("@type", Some(json!("Drug"))),
        ("id", Some(json!(entity.external_id))),
        ("name", Some(json!(page.name))),
        ("description", Some(json!(description))),
        ("activeIngredient", Some(json!(active_ingredients))),
        ("dosageForm", infer_dosage_form(&page.name).map(Value::from)),
        ("strength", detail("dosage").map(Value::from)),
        ("presentation", detail("presentation").map(Value::from)),
        ("therapeuticClass", Some(json!(therapeutic))),
        ("atcCode", detail("code atc").map(Value::from)),
        ("status", detail("statut").map(Value::from)),
        ("productType", Some(json!("Drug"))),
        ("manufacturer", manufacturer.map(Value::from)),
        ("price", price),
        ("table", detail("tableau").map(Value::from)),
        (
            "updatedAt",
            Some(json!(page.updated_date.clone().unwrap_or_else(|| today.to_string()))),
        ),
    ];

    fields
        .into_iter()
        .filter_map(|(key, value)| value.filter(is_present).map(|value| (key.to_string(), value)))
        .collect()
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Split a multi-valued cell on `| ; , / +` and the word `et`, dropping blanks
/// and case-insensitive repeats.
pub fn split_values(value: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in VALUE_SEPARATOR.split(value) {
        let part = collapse_whitespace(part.trim_matches(|c: char| c == '-' || c.is_whitespace()));
        if part.is_empty() {
            continue;
        }
        if seen.insert(part.to_lowercase()) {
            out.push(part);
        }
    }
    out
}

/// Parse a price cell such as `"1.234,50 dhs"` into `1234.5`.
pub fn parse_price(value: &str) -> Option<f64> {
    let cleaned = value
        .replace("dhs", "")
        .replace("dh", "")
        .replace("MAD", "");
    let cleaned = PRICE_NOISE.replace_all(&cleaned, "").replace(',', ".");

    // Every dot but the last is a thousands separator.
    let cleaned = match cleaned.rfind('.') {
        Some(last) if cleaned.matches('.').count() > 1 => {
            format!("{}.{}", cleaned[..last].replace('.', ""), &cleaned[last + 1..])
        }
        _ => cleaned,
    };

    cleaned.parse().ok()
}

/// The part of the product name after the first comma (`"X 500 MG, Comprimé"`).
pub fn infer_dosage_form(name: &str) -> Option<String> {
    let (_, form) = name.split_once(',')?;
    let form = form.trim();
    (!form.is_empty()).then(|| form.to_string())
}
