//! Cleanup of the free-text "classe thérapeutique" values scraped from detail
//! pages: junk removal, typo and accent repair, case normalization, dedup.

use crate::text::{capitalize_first, strip_accents};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const MAX_CLASS_LEN: usize = 120;

const ACRONYMS: &[&str] = &[
    "AINS", "IPP", "IEC", "ISRS", "IRSNa", "IRDN", "GnRH", "DPP-4", "ECA", "IRSN", "ISRSN", "PDE5",
    "ADN", "HMG", "CoA", "MAO", "ARA", "II", "III", "IV", "XA", "Xa", "H1", "H2", "B1", "B2", "B6",
    "B9", "B12", "D3", "K", "SGLT2", "DHA", "EPA", "RGO",
];

/// Active ingredients that show up in the class column.
const NOT_A_CLASS: &[&str] = &[
    "fer",
    "iode",
    "zinc",
    "sélénium",
    "lévodopa",
    "métformine",
    "repaglinide",
    "prégabaline",
    "cyclophosphamide",
    "follitropine alfa",
];

// Keys are lowercase; values carry the preferred casing.
const TYPOS: &[(&str, &str)] = &[
    ("abtibactérien", "Antibactérien"),
    ("ais", "AINS"),
    ("ant-inflammatoire non stéroïdien", "Anti-inflammatoire non stéroïdien"),
    ("ant-inflammatoire stéroïdien", "Anti-inflammatoire stéroïdien"),
    ("antagioniste", "Antagoniste"),
    ("anti-inflammatoire non stroïdien", "Anti-inflammatoire non stéroïdien"),
    ("anti-inflammatoire non stéroidien", "Anti-inflammatoire non stéroïdien"),
    ("anti-inflammatoire stéroidien", "Anti-inflammatoire stéroïdien"),
    ("anti-inflammatoires non stéroïdes", "Anti-inflammatoires non stéroïdiens"),
    ("antimycosique a usage systemiqu", "Antimycosique à usage systémique"),
    ("antaengoreux", "Antiangoreux"),
    ("anytipyrétique", "antipyrétique"),
    ("antbiotique", "Antibiotique"),
    ("macropodes", "macrolides"),
    ("fluoquinolone", "fluoroquinolone"),
    ("fluoquinolones", "fluoroquinolones"),
    ("plaguettaire", "plaquettaire"),
    ("antihistamique", "Antihistaminique"),
    ("musculoptrope", "musculotrope"),
    ("musculotrpe", "musculotrope"),
    ("anasthésique", "Anesthésique"),
    ("anxolytique", "Anxiolytique"),
    ("hynotique", "Hypnotique"),
    ("hypolémiant", "Hypolipémiant"),
    ("neuroleptiaue", "Neuroleptique"),
    ("neuroléptique", "Neuroleptique"),
    ("corticostroïde", "Corticostéroïde"),
    ("glucostéroïdes", "Glucocorticoïdes"),
    ("biphosphonate", "Bisphosphonate"),
    ("immunosuppreseur", "Immunosuppresseur"),
    ("immunosuppreseurs", "Immunosuppresseurs"),
    ("antidiabètique", "Antidiabétique"),
    ("mycolytique", "Mucolytique"),
    ("votamines", "Vitamines"),
    ("chelateur", "Chélateur"),
    ("hypolipidemiant", "Hypolipémiant"),
    ("cytologique", "cytotoxique"),
    ("occulaire", "oculaire"),
    ("veinotoniqueique", "veinotonique"),
    ("duirétique", "diurétique"),
    ("complémént", "Complément"),
    ("allimentaire", "alimentaire"),
    ("hypolémiants", "hypolipémiants"),
    ("probiotics", "Probiotiques"),
    ("emoliant", "Émollient"),
    ("emolients", "Émollients"),
    ("analoque", "analogue"),
    ("antidiarrheique", "Antidiarrhéique"),
    ("acétylchlinestérase", "acétylcholinestérase"),
    ("sooscié", "associé"),
    ("systèmique", "systémique"),
    ("phosphodiésterase", "phosphodiestérase"),
    ("eréctile", "érectile"),
    ("hypertenseurs", "antihypertenseurs"),
    ("facteur xa", "facteur Xa"),
];

// Accent-free lowercase word -> correctly accented word.
const ACCENT_FIXES: &[(&str, &str)] = &[
    ("antidepresseur", "antidépresseur"),
    ("antidepresseurs", "antidépresseurs"),
    ("antiemetique", "antiémétique"),
    ("antiemetiques", "antiémétiques"),
    ("antianemique", "antianémique"),
    ("antiasthenique", "antiasthénique"),
    ("antibacterien", "antibactérien"),
    ("antibacteriens", "antibactériens"),
    ("antiagregant", "antiagrégant"),
    ("antiacneique", "antiacnéique"),
    ("peripherique", "périphérique"),
    ("opioide", "opioïde"),
    ("opioides", "opioïdes"),
    ("steroidien", "stéroïdien"),
    ("steroidiens", "stéroïdiens"),
    ("steroide", "stéroïde"),
    ("steroides", "stéroïdes"),
    ("steroidienne", "stéroïdienne"),
    ("corticosteroide", "corticostéroïde"),
    ("corticosteroides", "corticostéroïdes"),
    ("antipyretique", "antipyrétique"),
    ("antipyretiques", "antipyrétiques"),
    ("analgesique", "analgésique"),
    ("analgesiques", "analgésiques"),
    ("antiulcereux", "antiulcéreux"),
    ("antineoplasique", "antinéoplasique"),
    ("antineoplasiques", "antinéoplasiques"),
    ("antiepileptique", "antiépileptique"),
    ("antiepileptiques", "antiépileptiques"),
    ("hypoglycemiant", "hypoglycémiant"),
    ("hypolipidemiant", "hypolipidémiant"),
    ("hypolipemiant", "hypolipémiant"),
    ("hypolipemiants", "hypolipémiants"),
    ("diuretique", "diurétique"),
    ("diuretiques", "diurétiques"),
    ("antitetanique", "antitétanique"),
    ("cephalosporine", "céphalosporine"),
    ("cephalosporines", "céphalosporines"),
    ("generation", "génération"),
    ("adrenergiques", "adrénergiques"),
    ("homeopathique", "homéopathique"),
    ("homeopathiques", "homéopathiques"),
    ("betabloquant", "bêtabloquant"),
    ("betabloquants", "bêtabloquants"),
    ("beta-bloquant", "bêta-bloquant"),
    ("beta-bloquants", "bêta-bloquants"),
    ("complement", "complément"),
    ("corticoide", "corticoïde"),
    ("corticoides", "corticoïdes"),
    ("thyroidienne", "thyroïdienne"),
    ("thyroidiennes", "thyroïdiennes"),
    ("phosphodiesterase", "phosphodiestérase"),
    ("mineraux", "minéraux"),
    ("mineral", "minéral"),
    ("oligoelements", "oligoéléments"),
    ("oligoelement", "oligoélément"),
    ("penicilline", "pénicilline"),
    ("penicillines", "pénicillines"),
    ("erectile", "érectile"),
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid therapeutic class pattern"))
        .collect()
}

lazy_static! {
    /// Values that are not therapeutic classes at all
    static ref JUNK_PATTERNS: Vec<Regex> = compile_all(&[
        r"^\d{5,}$",
        r"^[A-Z]\d{2}[A-Z]{0,2}\d{0,2}$",
        r"(?i)Statut\s*:",
        r"(?i)\b(?:cpr|caps|pell)\s+\d",
        r"\bDIOVAN\b|\bREVATIO\b|\bDEMETRIN\b|\bHYCAMTIN\b",
        r"\bUROMI\b",
        r"^(?:CalmTu|ReConnect|Vitadigest)\b",
        r"(?i)^Ce complément alimentaire",
        r"(?i)^Agalsidase bêta \(produite",
        r"(?i)est un cytostatique",
        r"(?i)^Traitement des infections suivantes",
        r"(?i)\bATC\s+[A-Z]\d{2}",
        r"(?i)\bliste\s+\d",
        r"(?i)\bDCI\s*:",
        r"(?i)^flacon compte goutte",
        r"(?i)^20 ML$",
        r"^ÉDICAMENTS?\b",
    ]);

    /// Pieces of a longer sentence that the column splitter cut apart
    static ref FRAGMENT_PATTERNS: Vec<Regex> = compile_all(&[
        r"(?i)^(?:cystite|pyélonéphrite|otite moyenne aiguë|pneumonie aiguë communautaire)$",
        r"(?i)^(?:infections de la peau|infections des os|morsures animales)$",
        r"(?i)^(?:abcès dentaire|exacerbations aiguës|sinusite bactérienne)",
        r"(?i)^en particulier (?:ostéomyélite|cellulite)",
        r"(?i)^les enfants",
        r"(?i)ayant un effet bénéfique",
        r"^(?:CD3\)|CDK6|D3\)|EPA\)|III|dose réduite\))$",
        r"(?i)^(?:alpha|puissant|monovalent|recombinant|sélectif|non fractionnée|non ionique|prolongée\.?)$",
        r"(?i)^(?:apparentés|associations\.?\s*(?:IEC)?|autres combinaisons|incluant les associations)$",
        r"(?i)^(?:de basse osmolarité|des propriétés vasoconstrictrices|à élimination rénale)$",
        r"(?i)^(?:la coqueluche|la diphtérie|la poliomyélite|la vitamine|le sommeil|le reflux)$",
        r"(?i)^de (?:la noradrénaline|l'hypothalamus|Antagoniste|bronchodilatateur)$",
        r"(?i)^(?:des articulations|des tissus mous|des fissures anales|scabicides inclus)$",
        r"(?i)^(?:non stéroïdiens|immunomodulateurs\)|anti-IL-23\)|diurétique \))$",
        r"(?i)^(?:LE REFLUX GASTRO|DES FISSURES ANALES|SCABICIDES INCLUS)",
        r"(?i)^(?:rhCG|rhFSH|rhLH|époétine alfa|époétine bêta|insuline glargine|lixisénatide|somatropine)$",
    ]);

    static ref TYPO_WORDS: Vec<(Regex, &'static str)> = TYPOS
        .iter()
        .map(|(typo, fix)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(typo));
            (Regex::new(&pattern).expect("Invalid typo pattern"), *fix)
        })
        .collect();

    static ref ACCENT_MAP: HashMap<&'static str, &'static str> = ACCENT_FIXES.iter().copied().collect();

    static ref CONCATENATED: Regex = Regex::new(r"([a-zé])([A-Z])").expect("Invalid concatenation regex");
    static ref TRAILING_PUNCT: Regex = Regex::new(r"[.,;:]+\s*$").expect("Invalid punctuation regex");
    static ref MULTI_SPACE: Regex = Regex::new(r"\s{2,}").expect("Invalid whitespace regex");
}

/// Normalize a list of therapeutic class labels, preserving first-seen order.
pub fn normalize_therapeutic_classes<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    let mut result = Vec::new();
    let mut seen = HashSet::new();

    for raw in values {
        let value = raw.as_ref().trim();
        if value.is_empty() || is_junk(value) {
            continue;
        }

        let value = CONCATENATED.replace_all(value, "${1}, ${2}").replace("Anti-inAnti-", "Anti-");
        let value = TRAILING_PUNCT.replace(&value, "").into_owned();
        let value = MULTI_SPACE.replace_all(&value, " ").trim().to_string();
        let value = balance_parentheses(value);
        let value = apply_typo_fixes(&value);
        let value = fix_accents(&value);
        let value = capitalize_first(&normalize_case(&value));

        if is_junk(&value) {
            continue;
        }

        let key = strip_accents(&value.trim().to_lowercase());
        let dedup_key = if key.chars().count() > 3 {
            key.trim_end_matches('s').to_string()
        } else {
            key.clone()
        };
        if seen.contains(&dedup_key) {
            continue;
        }
        seen.insert(dedup_key);
        seen.insert(key);

        let value = value.trim();
        if !value.is_empty() {
            result.push(value.to_string());
        }
    }

    result
}

fn is_junk(value: &str) -> bool {
    let value = value.trim();
    let len = value.chars().count();
    if len < 2 || len > MAX_CLASS_LEN {
        return true;
    }
    if NOT_A_CLASS.contains(&value.to_lowercase().as_str()) {
        return true;
    }
    JUNK_PATTERNS.iter().any(|p| p.is_match(value)) || FRAGMENT_PATTERNS.iter().any(|p| p.is_match(value))
}

fn balance_parentheses(mut value: String) -> String {
    let open = value.matches('(').count();
    let close = value.matches(')').count();
    if open > close {
        value.push_str(&")".repeat(open - close));
    }
    value
}

fn apply_typo_fixes(value: &str) -> String {
    let lower = value.to_lowercase();
    if let Some((_, fix)) = TYPOS.iter().find(|(typo, _)| *typo == lower) {
        return fix.to_string();
    }

    let mut result = value.to_string();
    for (pattern, fix) in TYPO_WORDS.iter() {
        if pattern.is_match(&result) {
            result = pattern.replace_all(&result, *fix).into_owned();
        }
    }
    result
}

fn fix_accents(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let core = word.trim_end_matches(|c: char| ".,;:)".contains(c));
            if core.is_empty() {
                return word.to_string();
            }
            let trail = &word[core.len()..];

            let Some(target) = ACCENT_MAP.get(strip_accents(&core.to_lowercase()).as_str()) else {
                return word.to_string();
            };

            let mut fixed = target.to_string();
            if core.chars().next().is_some_and(char::is_uppercase) {
                fixed = capitalize_first(&fixed);
            }
            if core == core.to_uppercase() && core.chars().count() > 3 {
                fixed = fixed.to_uppercase();
            }
            fixed + trail
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sentence case, keeping known acronyms and deliberate mid-word capitals.
fn normalize_case(value: &str) -> String {
    value
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            let bare = word.trim_end_matches(|c: char| ".,;:)".contains(c));
            let len = word.chars().count();
            let all_caps = word == word.to_uppercase();

            if ACRONYMS.contains(&word) || ACRONYMS.contains(&bare) {
                word.to_string()
            } else if word.chars().skip(1).any(char::is_uppercase) && !is_upper(word) {
                word.to_string()
            } else if i == 0 {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                    None => String::new(),
                }
            } else if all_caps && len > 2 {
                word.to_lowercase()
            } else if len > 1 && word.chars().next().is_some_and(char::is_uppercase) {
                word.to_lowercase()
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// At least one cased character and no lowercase ones.
fn is_upper(word: &str) -> bool {
    word.chars().any(char::is_uppercase) && !word.chars().any(char::is_lowercase)
}
