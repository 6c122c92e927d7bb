//! DOCX merge-field engine: discovers `«field»` / `{{field}}` tags in a
//! template and renders a filled copy, preserving every other byte of the
//! package. Tags survive being split across formatting runs by the editing
//! tool, which is the whole point.

pub mod config;
pub mod docx;
pub mod error;
mod ffi;
pub mod render;
pub mod report;
pub mod scan;

use std::collections::BTreeMap;

use docx::collect;
use docx::logical::LogicalText;
use docx::package::DocxPackage;

pub use error::{ExtractionError, RenderError};
pub use render::UnresolvedPolicy;
pub use scan::{BraceStyle, Discovery, InvalidField};

/// Discovers the distinct tag names of a template, in the grammar's
/// documented order. A template with no tags is a successful discovery whose
/// [`Discovery::no_placeholders`] is true, never an error.
pub fn discover_placeholders(
    file_bytes: &[u8],
    grammar: BraceStyle,
) -> Result<Discovery, ExtractionError> {
    let pkg = DocxPackage::from_bytes(file_bytes)?;
    let parts = collect::template_parts(&pkg)?;
    let texts: Vec<(String, String)> = parts
        .iter()
        .map(|p| (p.name.clone(), LogicalText::from_part(p).text))
        .collect();
    Ok(scan::discover_in_parts(&texts, grammar))
}

/// Renders a filled copy of the template: every tag occurrence whose field
/// name is mapped is replaced by its value, in the body and in any
/// headers/footers. Entry names, content types, relationships, and the
/// compression of untouched entries all survive unchanged.
pub fn render_document(
    file_bytes: &[u8],
    grammar: BraceStyle,
    values: &BTreeMap<String, String>,
    policy: UnresolvedPolicy,
) -> Result<Vec<u8>, RenderError> {
    let pkg = DocxPackage::from_bytes(file_bytes)?;
    let mut parts = collect::template_parts(&pkg)?;
    let replacements = render::render_parts(&mut parts, values, grammar, policy)?;
    pkg.write_with_replacements(&replacements)
}

/// The document's logical text: each processed part's run text concatenated
/// in document order, parts joined by a newline in collector order.
pub fn extract_text(file_bytes: &[u8]) -> Result<String, ExtractionError> {
    let pkg = DocxPackage::from_bytes(file_bytes)?;
    let parts = collect::template_parts(&pkg)?;
    let texts: Vec<String> = parts
        .iter()
        .map(|p| LogicalText::from_part(p).text)
        .collect();
    Ok(texts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testdoc;

    #[test]
    fn zero_tag_document_is_a_soft_outcome() {
        let bytes = testdoc::docx_with_runs(&["just an ordinary letter"]);
        let d = discover_placeholders(&bytes, BraceStyle::Guillemet).expect("discover");
        assert!(d.no_placeholders());
        assert!(d.invalid.is_empty());
    }

    #[test]
    fn corrupt_bytes_are_reported_as_corrupt_archive() {
        let err = discover_placeholders(b"PK\x03\x04 truncated", BraceStyle::Guillemet)
            .map(|_| ())
            .expect_err("corrupt");
        assert!(matches!(err, ExtractionError::CorruptArchive(_)));
    }

    #[test]
    fn split_tag_is_discovered_and_rendered() {
        let bytes = testdoc::docx_with_runs(&["«fo", "o»", " bar"]);
        let d = discover_placeholders(&bytes, BraceStyle::Guillemet).expect("discover");
        assert_eq!(d.tokens, vec!["foo"]);

        let mut values = d.initial_values();
        values.insert("foo".to_string(), "qux".to_string());
        let out = render_document(
            &bytes,
            BraceStyle::Guillemet,
            &values,
            UnresolvedPolicy::Strict,
        )
        .expect("render");
        assert_eq!(extract_text(&out).expect("text"), "qux bar\n");
    }

    #[test]
    fn headers_and_footers_participate_in_order() {
        let bytes = testdoc::build(&[
            ("word/document.xml", &testdoc::paragraph_doc(&["body «zz_body»"])),
            ("word/header1.xml", &testdoc::header_doc(&["head «aa_head»"])),
            ("word/footer1.xml", &testdoc::footer_doc(&["foot «mm_foot»"])),
        ]);
        let d = discover_placeholders(&bytes, BraceStyle::Guillemet).expect("discover");
        assert_eq!(d.tokens, vec!["aa_head", "mm_foot", "zz_body"]);

        let mut values = d.initial_values();
        values.insert("zz_body".to_string(), "B".to_string());
        values.insert("aa_head".to_string(), "H".to_string());
        values.insert("mm_foot".to_string(), "F".to_string());
        let out = render_document(
            &bytes,
            BraceStyle::Guillemet,
            &values,
            UnresolvedPolicy::Strict,
        )
        .expect("render");
        assert_eq!(
            extract_text(&out).expect("text"),
            "body B\n\nhead H\n\nfoot F\n"
        );
    }

    #[test]
    fn brace_grammar_keeps_first_seen_order_across_parts() {
        let bytes = testdoc::build(&[
            ("word/document.xml", &testdoc::paragraph_doc(&["{{zeta}} {{alpha}}"])),
            ("word/footer1.xml", &testdoc::footer_doc(&["{{beta}}"])),
        ]);
        let d = discover_placeholders(&bytes, BraceStyle::DoubleBrace).expect("discover");
        assert_eq!(d.tokens, vec!["zeta", "alpha", "beta"]);
    }

    #[test]
    fn round_trip_markers_land_exactly_once_per_occurrence() {
        let bytes = testdoc::body_doc(&[
            &["Dear «client_name», balance «amount»."],
            &["Regards, «client_name»"],
        ]);
        let bytes = testdoc::build(&[("word/document.xml", &bytes)]);

        let d = discover_placeholders(&bytes, BraceStyle::Guillemet).expect("discover");
        assert_eq!(d.tokens, vec!["amount", "client_name"]);

        let mut values = d.initial_values();
        for (i, tag) in d.tokens.iter().enumerate() {
            values.insert(tag.clone(), format!("MARK{i}"));
        }
        let out = render_document(
            &bytes,
            BraceStyle::Guillemet,
            &values,
            UnresolvedPolicy::Strict,
        )
        .expect("render");

        let text = extract_text(&out).expect("text");
        assert_eq!(text.matches("MARK0").count(), 1, "amount occurs once");
        assert_eq!(text.matches("MARK1").count(), 2, "client_name occurs twice");
        assert!(!text.contains('«') && !text.contains('»'), "got: {text}");

        let after = discover_placeholders(&out, BraceStyle::Guillemet).expect("rescan");
        assert!(after.no_placeholders());
    }

    #[test]
    fn rendered_package_still_opens_as_a_docx() {
        let bytes = testdoc::docx_with_runs(&["«name»"]);
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), "Alice".to_string());
        let out = render_document(
            &bytes,
            BraceStyle::Guillemet,
            &values,
            UnresolvedPolicy::Lenient,
        )
        .expect("render");
        let pkg = DocxPackage::from_bytes(&out).expect("reopen");
        assert!(pkg.entry("[Content_Types].xml").is_some());
        assert!(pkg.entry("_rels/.rels").is_some());
        assert!(pkg.entry("word/document.xml").is_some());
    }
}
