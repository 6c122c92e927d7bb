use std::collections::{BTreeMap, HashMap};

use crate::docx::logical::LogicalText;
use crate::docx::xml::{XmlEvent, XmlPart};
use crate::error::RenderError;
use crate::scan::{scan_text, BraceStyle, TagMatch};

/// What to do with a tag whose field name has no mapped value. An empty
/// string in the map is a resolved (empty) substitution, not an unresolved
/// tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Leave the occurrence in place as literal placeholder text.
    #[default]
    Lenient,
    /// Fail the whole render. No partial output is produced.
    Strict,
}

/// Substitutes mapped values into every part and returns the re-serialized
/// bytes of the parts that changed, keyed by part name. Parts the scan did
/// not touch are left to the package writer to copy bit-for-bit.
pub fn render_parts(
    parts: &mut [XmlPart],
    values: &BTreeMap<String, String>,
    grammar: BraceStyle,
    policy: UnresolvedPolicy,
) -> Result<HashMap<String, Vec<u8>>, RenderError> {
    let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
    for part in parts.iter_mut() {
        if substitute_in_part(part, values, grammar, policy)? {
            if !part.structure_unchanged() {
                return Err(RenderError::StructureChanged {
                    part: part.name.clone(),
                });
            }
            replacements.insert(part.name.clone(), part.serialize());
        }
    }
    Ok(replacements)
}

fn substitute_in_part(
    part: &mut XmlPart,
    values: &BTreeMap<String, String>,
    grammar: BraceStyle,
    policy: UnresolvedPolicy,
) -> Result<bool, RenderError> {
    let logical = LogicalText::from_part(part);
    let scan = scan_text(&logical.text, grammar);

    let mut resolved: Vec<&TagMatch> = Vec::new();
    for m in &scan.matches {
        if values.contains_key(&m.name) {
            resolved.push(m);
        } else if policy == UnresolvedPolicy::Strict {
            return Err(RenderError::UnresolvedPlaceholder {
                name: m.name.clone(),
                part: part.name.clone(),
            });
        }
    }
    if resolved.is_empty() {
        return Ok(false);
    }

    // Plan every run's new text before touching any event. A run can host
    // several matches and a match can span several runs. The run containing
    // a match's start carries the whole replacement, so the value takes that
    // run's formatting; runs the match merely passes through are emptied and
    // the run containing its end keeps only the tail after the delimiter.
    let mut edits: Vec<(usize, String)> = Vec::new();
    for (ri, run) in logical.runs.iter().enumerate() {
        let mut out = String::new();
        let mut pos = run.start;
        let mut touched = false;
        for m in resolved.iter().filter(|m| m.start < run.end && m.end > run.start) {
            touched = true;
            let keep_until = m.start.clamp(run.start, run.end);
            if keep_until > pos {
                out.push_str(&logical.text[pos..keep_until]);
            }
            if m.start >= run.start && m.start < run.end {
                if let Some(value) = values.get(&m.name) {
                    out.push_str(value);
                }
            }
            pos = pos.max(m.end.min(run.end));
        }
        if !touched {
            continue;
        }
        if pos < run.end {
            out.push_str(&logical.text[pos..run.end]);
        }
        if out != logical.text[run.start..run.end] {
            edits.push((ri, out));
        }
    }
    if edits.is_empty() {
        return Ok(false);
    }

    for (ri, new_text) in edits {
        let run = &logical.runs[ri];
        let needs_space_attr = new_text.starts_with(|c: char| c.is_whitespace())
            || new_text.ends_with(|c: char| c.is_whitespace());
        if let Some(XmlEvent::Text { text }) = part.events.get_mut(run.text_event_index) {
            *text = new_text;
        }
        if needs_space_attr {
            if let Some(ev) = part.events.get_mut(run.elem_event_index) {
                set_attr(ev, "xml:space", "preserve");
            }
        }
    }
    Ok(true)
}

fn set_attr(ev: &mut XmlEvent, key: &str, value: &str) {
    match ev {
        XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
            for (k, v) in attrs.iter_mut() {
                if k == key {
                    *v = value.to_string();
                    return;
                }
            }
            attrs.push((key.to_string(), value.to_string()));
        }
        _ => {}
    }
}
