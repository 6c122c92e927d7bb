use crate::docx::package::DocxPackage;
use crate::docx::xml::XmlPart;
use crate::error::ExtractionError;

pub const BODY_PART: &str = "word/document.xml";

/// Optional parts scanned after the body, in this fixed order. The order is a
/// contract: discovery results and first-seen token ordering depend on it.
const HEADER_FOOTER_PARTS: [&str; 6] = [
    "word/header1.xml",
    "word/header2.xml",
    "word/header3.xml",
    "word/footer1.xml",
    "word/footer2.xml",
    "word/footer3.xml",
];

/// Parses the parts that carry template text: the document body first, then
/// any present headers and footers. A package without a body part is not a
/// processable document. Parts are kept separate so text can never merge
/// across part boundaries.
pub fn template_parts(pkg: &DocxPackage) -> Result<Vec<XmlPart>, ExtractionError> {
    let body = pkg.entry(BODY_PART).ok_or(ExtractionError::MissingBodyPart)?;
    let mut parts = vec![XmlPart::parse(BODY_PART, &body.data)?];
    for name in HEADER_FOOTER_PARTS {
        if let Some(ent) = pkg.entry(name) {
            if ent.data.is_empty() {
                continue;
            }
            parts.push(XmlPart::parse(name, &ent.data)?);
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::template_parts;
    use crate::docx::package::DocxPackage;
    use crate::docx::testdoc;
    use crate::error::ExtractionError;

    #[test]
    fn missing_body_part_is_fatal() {
        let bytes = testdoc::build(&[("word/styles.xml", "<w:styles/>")]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");
        let err = template_parts(&pkg).map(|_| ()).expect_err("no body");
        assert!(matches!(err, ExtractionError::MissingBodyPart));
    }

    #[test]
    fn body_then_headers_then_footers() {
        let bytes = testdoc::build(&[
            ("word/footer2.xml", &testdoc::footer_doc(&["page"])),
            ("word/document.xml", &testdoc::paragraph_doc(&["body"])),
            ("word/header1.xml", &testdoc::header_doc(&["title"])),
        ]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");
        let parts = template_parts(&pkg).expect("parts");
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["word/document.xml", "word/header1.xml", "word/footer2.xml"]
        );
    }

    #[test]
    fn absent_headers_are_not_an_error() {
        let bytes = testdoc::docx_with_runs(&["hello"]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");
        let parts = template_parts(&pkg).expect("parts");
        assert_eq!(parts.len(), 1);
    }
}
