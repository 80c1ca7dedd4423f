//! Turning dropped or typed file references into document sources.
//!
//! Terminals deliver a drag-and-drop as bracketed paste: one or more paths,
//! possibly quoted, shell-escaped or written as `file://` URLs.

use std::path::{Path, PathBuf};

use termnote_core::DocumentSource;
use tracing::debug;
use url::Url;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Media type a file declares through its extension.
pub fn declared_media_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match extension.as_str() {
        "pdf" => PDF_MEDIA_TYPE,
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => return None,
    };
    Some(media_type)
}

/// Every path named in a paste payload, in order.
pub fn parse_drop_payload(payload: &str) -> Vec<PathBuf> {
    payload
        .lines()
        .flat_map(split_entries)
        .filter_map(|entry| parse_entry(&entry))
        .collect()
}

/// The first dropped file, when it declares itself as a PDF. Anything else
/// is ignored.
pub fn accept_drop(payload: &str) -> Option<DocumentSource> {
    let first = parse_drop_payload(payload).into_iter().next()?;
    match declared_media_type(&first) {
        Some(PDF_MEDIA_TYPE) => Some(DocumentSource::Path(first)),
        other => {
            debug!(path = %first.display(), media_type = ?other, "ignoring non-PDF drop");
            None
        }
    }
}

/// A path typed into the open prompt. The decoder decides whether it is a
/// usable document.
pub fn source_from_input(input: &str) -> Option<DocumentSource> {
    let entry = input.trim();
    if entry.is_empty() {
        return None;
    }
    parse_entry(&unquote(entry)).map(DocumentSource::Path)
}

fn split_entries(line: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.trim().chars();

    while let Some(ch) = chars.next() {
        match (ch, quote) {
            ('\\', None) => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ('\'' | '"', None) => quote = Some(ch),
            (c, Some(open)) if c == open => quote = None,
            (c, None) if c.is_whitespace() => {
                if !current.is_empty() {
                    entries.push(std::mem::take(&mut current));
                }
            }
            (c, _) => current.push(c),
        }
    }
    if !current.is_empty() {
        entries.push(current);
    }
    entries
}

fn unquote(entry: &str) -> String {
    for quote in ['\'', '"'] {
        if let Some(inner) = entry
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    entry.to_string()
}

fn parse_entry(entry: &str) -> Option<PathBuf> {
    if entry.is_empty() {
        return None;
    }
    if entry.starts_with("file://") {
        return Url::parse(entry).ok()?.to_file_path().ok();
    }
    Some(PathBuf::from(entry))
}
