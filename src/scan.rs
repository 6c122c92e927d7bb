use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Tag delimiter grammar. Both grammars coexist as real configuration;
/// guillemet merge fields are the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BraceStyle {
    /// `«field»` — trimmed names validated against `[a-z0-9_]+`, invalid
    /// names dropped with a diagnostic, results deduplicated and sorted.
    Guillemet,
    /// `{{field}}` — any run of non-whitespace, non-brace characters taken
    /// verbatim, first-seen order. The delimiters must be adjacent to the
    /// token: `{{ field }}` is not a tag.
    DoubleBrace,
}

impl Default for BraceStyle {
    fn default() -> Self {
        BraceStyle::Guillemet
    }
}

impl BraceStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guillemet" => Some(Self::Guillemet),
            "braces" | "double-brace" | "double_brace" => Some(Self::DoubleBrace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guillemet => "guillemet",
            Self::DoubleBrace => "braces",
        }
    }
}

static BRACE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^\s{}]+)\}\}").expect("brace tag regex"));

// The inner span excludes nested delimiters and the separator characters the
// extractor inserts for tabs/breaks/paragraph ends, so a match can never
// cover a logical position with no backing run.
static GUILLEMET_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("«([^«»\t\n]*)»").expect("guillemet tag regex"));

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("field name regex"));

/// One tag occurrence in a part's logical text. `start..end` covers the
/// delimiters; `name` is the validated field name.
#[derive(Clone, Debug)]
pub struct TagMatch {
    pub start: usize,
    pub end: usize,
    pub name: String,
}

/// Scan result for one part. Scanning never fails: text with no conforming
/// tags simply yields no matches.
#[derive(Debug, Default)]
pub struct PartScan {
    pub matches: Vec<TagMatch>,
    pub invalid: Vec<String>,
}

/// A dropped field name, recorded for diagnostics. Non-fatal.
#[derive(Clone, Debug)]
pub struct InvalidField {
    pub raw: String,
    pub part: String,
}

/// The distinct field names of a document, in the grammar's documented order
/// (sorted for guillemet, first-seen for braces). Consumers bind form fields
/// to this order, so it is a contract.
#[derive(Debug, Default)]
pub struct Discovery {
    pub tokens: Vec<String>,
    pub invalid: Vec<InvalidField>,
}

impl Discovery {
    /// Soft outcome, distinct from a parse failure: the consumer decides how
    /// to prompt the user.
    pub fn no_placeholders(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Value map seeded with the empty string for every discovered token.
    /// The engine never mutates it; filling values in is the consumer's job.
    pub fn initial_values(&self) -> BTreeMap<String, String> {
        self.tokens
            .iter()
            .map(|t| (t.clone(), String::new()))
            .collect()
    }
}

pub fn scan_text(text: &str, grammar: BraceStyle) -> PartScan {
    let mut scan = PartScan::default();
    match grammar {
        BraceStyle::DoubleBrace => {
            for caps in BRACE_TAG_RE.captures_iter(text) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                scan.matches.push(TagMatch {
                    start: whole.start(),
                    end: whole.end(),
                    name: name.as_str().to_string(),
                });
            }
        }
        BraceStyle::Guillemet => {
            for caps in GUILLEMET_TAG_RE.captures_iter(text) {
                let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let name = inner.as_str().trim();
                if FIELD_NAME_RE.is_match(name) {
                    scan.matches.push(TagMatch {
                        start: whole.start(),
                        end: whole.end(),
                        name: name.to_string(),
                    });
                } else {
                    scan.invalid.push(name.to_string());
                }
            }
        }
    }
    scan
}

/// Merges per-part scans into the ordered distinct token set.
/// `parts` is (part name, logical text), in collector order.
pub fn discover_in_parts(parts: &[(String, String)], grammar: BraceStyle) -> Discovery {
    let mut discovery = Discovery::default();
    for (part_name, text) in parts {
        let scan = scan_text(text, grammar);
        for m in scan.matches {
            if !discovery.tokens.contains(&m.name) {
                discovery.tokens.push(m.name);
            }
        }
        for raw in scan.invalid {
            discovery.invalid.push(InvalidField {
                raw,
                part: part_name.clone(),
            });
        }
    }
    if grammar == BraceStyle::Guillemet {
        discovery.tokens.sort();
    }
    discovery
}
