use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use crate::error::ExtractionError;

/// One event of a part's XML stream, owned and editable in place.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

/// A parsed XML part of the package. The event list round-trips losslessly
/// through `serialize`; `baseline` records the non-text structure at parse
/// time so the renderer can assert it only ever edited text.
#[derive(Clone)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
    baseline: String,
}

fn malformed(part: &str, detail: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::MalformedPart {
        part: part.to_string(),
        detail: detail.to_string(),
    }
}

fn utf8(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

impl XmlPart {
    pub fn parse(name: &str, xml: &[u8]) -> Result<XmlPart, ExtractionError> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        let mut events: Vec<XmlEvent> = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let ev = reader
                .read_event_into(&mut buf)
                .map_err(|e| malformed(name, e))?;
            match ev {
                Event::Eof => break,
                Event::Decl(d) => {
                    let version = utf8(d.version().map_err(|e| malformed(name, e))?);
                    let encoding = d.encoding().and_then(|r| r.ok()).map(utf8);
                    let standalone = d.standalone().and_then(|r| r.ok()).map(utf8);
                    events.push(XmlEvent::Decl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::Start(s) => {
                    let attrs = read_attrs(name, &s)?;
                    events.push(XmlEvent::Start {
                        name: utf8(s.name().as_ref()),
                        attrs,
                    });
                }
                Event::End(e) => events.push(XmlEvent::End {
                    name: utf8(e.name().as_ref()),
                }),
                Event::Empty(s) => {
                    let attrs = read_attrs(name, &s)?;
                    events.push(XmlEvent::Empty {
                        name: utf8(s.name().as_ref()),
                        attrs,
                    });
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| malformed(name, e))?.into_owned();
                    events.push(XmlEvent::Text { text });
                }
                Event::CData(t) => events.push(XmlEvent::CData {
                    text: utf8(t.into_inner()),
                }),
                Event::Comment(t) => events.push(XmlEvent::Comment {
                    text: utf8(t.into_inner()),
                }),
                Event::PI(t) => events.push(XmlEvent::PI {
                    content: format!("{}{}", utf8(t.target()), utf8(t.content())),
                }),
                Event::DocType(t) => events.push(XmlEvent::DocType {
                    text: utf8(t.into_inner()),
                }),
            }
        }

        let baseline = structure_hash(&events);
        Ok(XmlPart {
            name: name.to_string(),
            events,
            baseline,
        })
    }

    /// True while every edit since parse touched only `w:t` text content or
    /// `xml:space` attributes.
    pub fn structure_unchanged(&self) -> bool {
        structure_hash(&self.events) == self.baseline
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for ev in &self.events {
            match ev {
                XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                } => {
                    out.extend_from_slice(b"<?xml version=\"");
                    out.extend_from_slice(version.as_bytes());
                    out.push(b'"');
                    if let Some(e) = encoding {
                        out.extend_from_slice(b" encoding=\"");
                        out.extend_from_slice(e.as_bytes());
                        out.push(b'"');
                    }
                    if let Some(s) = standalone {
                        out.extend_from_slice(b" standalone=\"");
                        out.extend_from_slice(s.as_bytes());
                        out.push(b'"');
                    }
                    out.extend_from_slice(b"?>");
                }
                XmlEvent::Start { name, attrs } => write_tag(&mut out, name, attrs, false),
                XmlEvent::Empty { name, attrs } => write_tag(&mut out, name, attrs, true),
                XmlEvent::End { name } => {
                    out.extend_from_slice(b"</");
                    out.extend_from_slice(name.as_bytes());
                    out.push(b'>');
                }
                XmlEvent::Text { text } => escape_text_into(&mut out, text),
                XmlEvent::CData { text } => {
                    // CDATA content must stay unescaped.
                    out.extend_from_slice(b"<![CDATA[");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b"]]>");
                }
                XmlEvent::Comment { text } => {
                    out.extend_from_slice(b"<!--");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b"-->");
                }
                XmlEvent::PI { content } => {
                    out.extend_from_slice(b"<?");
                    out.extend_from_slice(content.as_bytes());
                    out.extend_from_slice(b"?>");
                }
                XmlEvent::DocType { text } => {
                    out.extend_from_slice(b"<!DOCTYPE");
                    out.extend_from_slice(text.as_bytes());
                    out.push(b'>');
                }
            }
        }
        out
    }
}

fn read_attrs(
    part: &str,
    s: &quick_xml::events::BytesStart<'_>,
) -> Result<Vec<(String, String)>, ExtractionError> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.map_err(|e| malformed(part, e))?;
        // Attribute values are kept as raw, already-escaped bytes and written
        // back verbatim. Unescaping a value such as `o:gfxdata` (VML) that
        // encodes CRLF as `&#13;&#10;` would let XML attribute normalization
        // turn those newlines into spaces on re-read, corrupting the payload.
        attrs.push((utf8(a.key.as_ref()), utf8(a.value.as_ref())));
    }
    Ok(attrs)
}

fn write_tag(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for (k, v) in attrs {
        out.push(b' ');
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        // Raw attribute bytes; see read_attrs.
        out.extend_from_slice(v.as_bytes());
        out.push(b'"');
    }
    if empty {
        out.extend_from_slice(b"/>");
    } else {
        out.push(b'>');
    }
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

/// Hash of everything the renderer must not change: element structure, all
/// attributes except `xml:space`, and text outside `w:t` leaves.
fn structure_hash(events: &[XmlEvent]) -> String {
    let mut hasher = Sha256::new();
    let mut stack: Vec<&str> = Vec::new();

    let hash_open = |hasher: &mut Sha256, name: &str, attrs: &[(String, String)]| {
        hasher.update(b"S:");
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        let sorted: BTreeMap<&str, &str> = attrs
            .iter()
            .filter(|(k, _)| k != "xml:space")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (k, v) in sorted {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b";");
        }
        hasher.update(b"\n");
    };

    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => {
                hash_open(&mut hasher, name, attrs);
                stack.push(name.as_str());
            }
            XmlEvent::Empty { name, attrs } => {
                hash_open(&mut hasher, name, attrs);
                hasher.update(b"E:");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::End { name } => {
                hasher.update(b"E:");
                hasher.update(name.as_bytes());
                hasher.update(b"\n");
                let _ = stack.pop();
            }
            XmlEvent::Text { text } => {
                if stack.last().copied() == Some("w:t") {
                    continue;
                }
                hasher.update(b"T:");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                hasher.update(b"D:");
                hasher.update(version.as_bytes());
                hasher.update(b"|");
                hasher.update(encoding.as_deref().unwrap_or("").as_bytes());
                hasher.update(b"|");
                hasher.update(standalone.as_deref().unwrap_or("").as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::CData { text } | XmlEvent::Comment { text } | XmlEvent::DocType { text } => {
                hasher.update(b"R:");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
            }
            XmlEvent::PI { content } => {
                hasher.update(b"P:");
                hasher.update(content.as_bytes());
                hasher.update(b"\n");
            }
        }
    }
    hex::encode(hasher.finalize())
}
