use crate::types::{Chapter, Granularity};

/// Formats a 1-based index path as a three-level code such as `01.02.00`.
///
/// Levels past the third are dropped; missing levels read as `00`.
pub fn format_index_code(path: &[usize]) -> String {
    (0..3)
        .map(|level| match path.get(level) {
            Some(n) => format!("{:02}", n),
            None if level == 0 => "01".to_string(),
            None => "00".to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Replaces every non-alphanumeric character with `_`, collapses runs of
/// underscores, trims them from both ends and lowercases the result.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Book name for a source file: the file name with a trailing `.pdf`
/// (any case) removed.
pub fn book_name(file_name: &str) -> String {
    let cut = file_name.len().saturating_sub(4);
    match file_name.get(cut..) {
        Some(ext) if file_name.len() >= 4 && ext.eq_ignore_ascii_case(".pdf") => {
            file_name[..cut].to_string()
        }
        _ => file_name.to_string(),
    }
}

pub fn archive_name(file_name: &str) -> String {
    format!("{}-Splited.zip", book_name(file_name))
}

/// Pads a numeric segment to at least two digits. Leading digits are read
/// the way a lenient integer parse would; anything else is kept as-is.
fn pad_segment(segment: &str) -> String {
    let trimmed = segment.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => segment.to_string(),
    }
}

/// File-name prefix built from a chapter's index code, truncated to the
/// number of levels the granularity asks for.
///
/// `position` is the chapter's 1-based place in the export list and stands
/// in for a missing first segment.
pub fn index_prefix(index_code: Option<&str>, position: usize, granularity: Granularity) -> String {
    let fallback = format!("{}.0.0", position);
    let raw = index_code.unwrap_or(&fallback);
    let parts: Vec<&str> = raw.split('.').collect();

    let segment = |idx: usize, default: String| -> String {
        match parts.get(idx) {
            Some(part) if !part.is_empty() => pad_segment(part),
            _ => pad_segment(&default),
        }
    };

    let major = segment(0, position.to_string());
    let minor = segment(1, "0".to_string());
    let sub = segment(2, "0".to_string());

    match granularity {
        Granularity::Chapter => major,
        Granularity::Section => format!("{}.{}", major, minor),
        Granularity::Subsection => format!("{}.{}.{}", major, minor, sub),
    }
}

/// `<indexPrefix>-<book>-<chapter>.pdf`; `sanitized_book` must already be
/// passed through [`sanitize_file_name`].
pub fn chapter_file_name(
    chapter: &Chapter,
    position: usize,
    granularity: Granularity,
    sanitized_book: &str,
) -> String {
    format!(
        "{}-{}-{}.pdf",
        index_prefix(chapter.index_code.as_deref(), position, granularity),
        sanitized_book,
        sanitize_file_name(&chapter.title)
    )
}
