use crate::docx::xml::{XmlEvent, XmlPart};

/// The byte range `[start, end)` one `w:t` leaf occupies in a part's logical
/// text, with the event indices needed to write a new value back.
#[derive(Clone, Debug)]
pub struct RunSlice {
    pub elem_event_index: usize,
    pub text_event_index: usize,
    pub start: usize,
    pub end: usize,
}

/// The human-readable text of one part: every `w:t` leaf concatenated in
/// document order, markup stripped. Run boundaries carry no meaning here —
/// a placeholder split across adjacent runs reads as one token — but
/// paragraph ends and explicit tabs/breaks insert separator characters so
/// text never merges across a visible break. Separators occupy logical
/// positions without a backing run; both tag grammars reject whitespace
/// inside a field, so no match ever covers one.
pub struct LogicalText {
    pub text: String,
    pub runs: Vec<RunSlice>,
}

impl LogicalText {
    pub fn from_part(part: &XmlPart) -> Self {
        let mut text = String::new();
        let mut runs: Vec<RunSlice> = Vec::new();
        let mut open_wt: Option<usize> = None;

        for (idx, ev) in part.events.iter().enumerate() {
            match ev {
                XmlEvent::Start { name, .. } => {
                    if name == "w:t" {
                        open_wt = Some(idx);
                    } else if let Some(c) = separator_for(name) {
                        text.push(c);
                    }
                }
                XmlEvent::Empty { name, .. } => {
                    // A self-closing w:t contributes zero length and does not
                    // break adjacent run concatenation.
                    if name == "w:p" {
                        text.push('\n');
                    } else if name != "w:t" {
                        if let Some(c) = separator_for(name) {
                            text.push(c);
                        }
                    }
                }
                XmlEvent::End { name } => {
                    if name == "w:t" {
                        open_wt = None;
                    } else if name == "w:p" {
                        text.push('\n');
                    }
                }
                XmlEvent::Text { text: t } => {
                    if let Some(elem) = open_wt {
                        let start = text.len();
                        text.push_str(t);
                        runs.push(RunSlice {
                            elem_event_index: elem,
                            text_event_index: idx,
                            start,
                            end: text.len(),
                        });
                    }
                }
                _ => {}
            }
        }
        LogicalText { text, runs }
    }

    /// Runs whose range intersects `[start, end)`, in document order.
    pub fn runs_overlapping(&self, start: usize, end: usize) -> impl Iterator<Item = &RunSlice> {
        self.runs
            .iter()
            .filter(move |r| r.start < end && r.end > start)
    }
}

fn separator_for(name: &str) -> Option<char> {
    match name {
        "w:tab" | "w:ptab" => Some('\t'),
        "w:br" | "w:cr" => Some('\n'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::LogicalText;
    use crate::docx::testdoc;
    use crate::docx::xml::XmlPart;

    fn logical_of(doc_xml: &str) -> LogicalText {
        let part = XmlPart::parse("word/document.xml", doc_xml.as_bytes()).expect("parse");
        LogicalText::from_part(&part)
    }

    #[test]
    fn adjacent_runs_concatenate() {
        let lt = logical_of(&testdoc::paragraph_doc(&["\u{ab}na", "me", "\u{bb}"]));
        assert_eq!(lt.text, "\u{ab}name\u{bb}\n");
        assert_eq!(lt.runs.len(), 3);
        assert_eq!((lt.runs[0].start, lt.runs[0].end), (0, 4));
        assert_eq!((lt.runs[1].start, lt.runs[1].end), (4, 6));
        assert_eq!((lt.runs[2].start, lt.runs[2].end), (6, 8));
    }

    #[test]
    fn empty_wt_does_not_break_concatenation() {
        let doc = format!(
            r#"<w:document xmlns:w="{}"><w:body><w:p><w:r><w:t>left</w:t></w:r><w:r><w:t/></w:r><w:r><w:t>right</w:t></w:r></w:p></w:body></w:document>"#,
            testdoc::WPML_NS
        );
        let lt = logical_of(&doc);
        assert_eq!(lt.text, "leftright\n");
        assert_eq!(lt.runs.len(), 2);
    }

    #[test]
    fn paragraph_boundary_separates_text() {
        let lt = logical_of(&testdoc::body_doc(&[&["\u{ab}na"], &["me\u{bb}"]]));
        assert_eq!(lt.text, "\u{ab}na\nme\u{bb}\n");
    }

    #[test]
    fn tabs_and_breaks_separate_text() {
        let doc = format!(
            r#"<w:document xmlns:w="{}"><w:body><w:p><w:r><w:t>a</w:t></w:r><w:r><w:tab/></w:r><w:r><w:t>b</w:t></w:r><w:r><w:br/></w:r><w:r><w:t>c</w:t></w:r></w:p></w:body></w:document>"#,
            testdoc::WPML_NS
        );
        let lt = logical_of(&doc);
        assert_eq!(lt.text, "a\tb\nc\n");
    }

    #[test]
    fn formatting_markup_is_invisible() {
        let doc = format!(
            r#"<w:document xmlns:w="{}"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:rPr><w:b/><w:i/></w:rPr><w:t>bold</w:t></w:r><w:r><w:t xml:space="preserve"> text</w:t></w:r></w:p></w:body></w:document>"#,
            testdoc::WPML_NS
        );
        let lt = logical_of(&doc);
        assert_eq!(lt.text, "bold text\n");
    }

    #[test]
    fn overlap_lookup_finds_spanning_runs() {
        let lt = logical_of(&testdoc::paragraph_doc(&["\u{ab}na", "me", "\u{bb} rest"]));
        // «name» spans [0, 8): all three runs.
        let hits: Vec<usize> = lt.runs_overlapping(0, 8).map(|r| r.start).collect();
        assert_eq!(hits, vec![0, 4, 6]);
        // "rest" lives in the last run only.
        let hits: Vec<usize> = lt.runs_overlapping(9, 13).map(|r| r.start).collect();
        assert_eq!(hits, vec![6]);
    }
}
