use thiserror::Error;

/// Failures while opening a template and reading its text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("not a valid .docx archive")]
    CorruptArchive(#[source] zip::result::ZipError),

    #[error("archive has no word/document.xml part")]
    MissingBodyPart,

    #[error("malformed xml in {part}: {detail}")]
    MalformedPart { part: String, detail: String },
}

/// Failures while substituting values and re-serializing the archive.
///
/// None of these return partial output; the input buffer is never modified.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("unresolved placeholder \u{ab}{name}\u{bb} in {part}")]
    UnresolvedPlaceholder { name: String, part: String },

    #[error("non-text structure changed in {part}")]
    StructureChanged { part: String },

    #[error("failed to write output archive")]
    ArchiveWrite(#[from] zip::result::ZipError),
}
