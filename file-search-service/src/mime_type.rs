//! Content type detection for uploaded documents.

use std::path::Path;

/// Extensions the service recognises, mapped to the content type sent to the API.
fn known_type(extension: &str) -> Option<mime::Mime> {
    match extension {
        "pdf" => Some(mime::APPLICATION_PDF),
        "txt" | "text" => Some(mime::TEXT_PLAIN),
        _ => None,
    }
}

/// Pick the content type for an upload.
///
/// A non-empty declared type always wins. Otherwise the lower-cased file
/// extension is looked up, falling back to `application/octet-stream`.
pub fn classify(filename: &str, provided_type: Option<&str>) -> String {
    if let Some(provided) = provided_type
        && !provided.is_empty()
    {
        return provided.to_string();
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    extension
        .and_then(|ext| known_type(&ext))
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.essence_str().to_string())
}
