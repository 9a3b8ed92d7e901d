//! Text/binary classification and MIME types
//!
//! `write_file` routes a payload into the text or blob column based on the
//! file extension: a fixed allow-list of binary extensions, everything else
//! treated as UTF-8 text. `content_type` is recorded alongside so reads can
//! be served without re-classifying.

/// Extensions stored through the binary column.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "pdf", "zip", "gz", "tgz", "tar",
    "7z", "rar", "mp3", "mp4", "m4a", "wav", "ogg", "flac", "avi", "mov", "mkv", "webm", "woff",
    "woff2", "ttf", "otf", "eot", "exe", "dll", "so", "dylib", "bin", "dat", "class", "jar",
    "wasm", "db", "sqlite",
];

/// Lowercased extension of a filename, ordinal prefix ignored.
pub fn extension(filename: &str) -> Option<String> {
    let name = crate::ordinal::display_name(filename);
    let idx = name.rfind('.')?;
    if idx == 0 || idx + 1 == name.len() {
        return None;
    }
    Some(name[idx + 1..].to_ascii_lowercase())
}

/// True when the filename classifies as binary content.
pub fn is_binary_name(filename: &str) -> bool {
    match extension(filename) {
        Some(ext) => BINARY_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// MIME type recorded for a filename at write time.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = match extension(filename) {
        Some(ext) => ext,
        None => return "text/plain",
    };
    match ext.as_str() {
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "txt" | "log" | "rs" | "py" | "sh" | "toml" | "ini" | "sql" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        _ if BINARY_EXTENSIONS.contains(&ext.as_str()) => "application/octet-stream",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert!(is_binary_name("0002_img.png"));
        assert!(is_binary_name("archive.ZIP"));
        assert!(!is_binary_name("0001_readme.md"));
        assert!(!is_binary_name("Makefile"));
    }

    #[test]
    fn mime_table() {
        assert_eq!(content_type_for("0001_readme.md"), "text/markdown");
        assert_eq!(content_type_for("img.png"), "image/png");
        assert_eq!(content_type_for("noext"), "text/plain");
    }
}
