use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ExtractionError, RenderError};

/// A DOCX package held fully in memory: the ordered ZIP entry list with
/// enough metadata to rewrite untouched entries bit-for-bit.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractionError> {
        let mut zip =
            ZipArchive::new(Cursor::new(bytes)).map_err(ExtractionError::CorruptArchive)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(ExtractionError::CorruptArchive)?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| ExtractionError::CorruptArchive(e.into()))?;
            entries.push(DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Serializes a new archive. Entries named in `replacements` carry the
    /// replacement bytes; every other entry keeps its original bytes,
    /// compression method, timestamp, and permissions.
    pub fn write_with_replacements(
        &self,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<Vec<u8>, RenderError> {
        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)?;
            } else {
                zout.start_file(&ent.name, opts)?;
                zout.write_all(data)
                    .map_err(|e| RenderError::ArchiveWrite(e.into()))?;
            }
        }
        let cursor = zout.finish()?;
        Ok(cursor.into_inner())
    }

    pub fn xml_entries(&self) -> impl Iterator<Item = &DocxEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_dir && e.name.to_lowercase().ends_with(".xml"))
    }
}

#[cfg(test)]
mod tests {
    use super::DocxPackage;
    use crate::docx::testdoc;
    use crate::error::ExtractionError;
    use std::collections::HashMap;

    #[test]
    fn garbage_bytes_are_a_corrupt_archive() {
        let err = DocxPackage::from_bytes(b"this is not a zip")
            .map(|_| ())
            .expect_err("garbage input");
        assert!(matches!(err, ExtractionError::CorruptArchive(_)));
    }

    #[test]
    fn truncated_zip_is_a_corrupt_archive() {
        let full = testdoc::build(&[("word/document.xml", "<w:document/>")]);
        let err = DocxPackage::from_bytes(&full[..full.len() / 2])
            .map(|_| ())
            .expect_err("truncated input");
        assert!(matches!(err, ExtractionError::CorruptArchive(_)));
    }

    #[test]
    fn untouched_entries_survive_rewrite_byte_for_byte() {
        let bytes = testdoc::build(&[
            ("word/document.xml", "<w:document/>"),
            ("word/media/image1.png", "\u{0}PNGDATA"),
        ]);
        let pkg = DocxPackage::from_bytes(&bytes).expect("open");

        let mut replacements = HashMap::new();
        replacements.insert("word/document.xml".to_string(), b"<w:doc/>".to_vec());
        let out = pkg.write_with_replacements(&replacements).expect("rewrite");

        let rewritten = DocxPackage::from_bytes(&out).expect("reopen");
        let names: Vec<&str> = rewritten.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            pkg.entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>()
        );
        let media = rewritten.entry("word/media/image1.png").expect("media");
        let original = pkg.entry("word/media/image1.png").expect("media");
        assert_eq!(media.data, original.data);
        assert_eq!(media.compression, original.compression);
        assert_eq!(
            rewritten.entry("word/document.xml").expect("body").data,
            b"<w:doc/>".to_vec()
        );
    }
}
