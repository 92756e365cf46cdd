//! Supported input formats: MIME type -> extension and human label.
//!
//! Used only as an accept/reject filter for incoming files.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub mime_type: &'static str,
    /// Extension including the leading dot (e.g. ".pdf").
    pub extension: &'static str,
    pub label: &'static str,
}

pub const SUPPORTED_FORMATS: &[FormatInfo] = &[FormatInfo {
    mime_type: "application/pdf",
    extension: ".pdf",
    label: "PDF",
}];

/// Format entry for an exact MIME type.
pub fn lookup(mime_type: &str) -> Option<&'static FormatInfo> {
    SUPPORTED_FORMATS.iter().find(|f| f.mime_type == mime_type)
}

pub fn is_supported(mime_type: &str) -> bool {
    lookup(mime_type).is_some()
}

/// Accept filter for a file picker: comma-joined MIME types.
pub fn accept_filter() -> String {
    SUPPORTED_FORMATS
        .iter()
        .map(|f| f.mime_type)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn labels() -> Vec<&'static str> {
    SUPPORTED_FORMATS.iter().map(|f| f.label).collect()
}

/// MIME type of a supported format, judged by file extension (case-insensitive).
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    SUPPORTED_FORMATS
        .iter()
        .find(|f| f.extension.trim_start_matches('.') == ext)
        .map(|f| f.mime_type)
}

/// Human-readable size: base 1024, at most two decimals (e.g. "1.5 KB").
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_is_the_only_supported_type() {
        assert!(is_supported("application/pdf"));
        assert!(!is_supported("image/png"));
        assert!(!is_supported(""));
        assert_eq!(lookup("application/pdf").map(|f| f.label), Some("PDF"));
    }

    #[test]
    fn accept_filter_and_labels() {
        assert_eq!(accept_filter(), "application/pdf");
        assert_eq!(labels(), vec!["PDF"]);
    }

    #[test]
    fn mime_for_path_ignores_extension_case() {
        assert_eq!(mime_for_path(Path::new("a/b/report.PDF")), Some("application/pdf"));
        assert_eq!(mime_for_path(Path::new("scan.png")), None);
        assert_eq!(mime_for_path(Path::new("README")), None);
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }
}
