//! File naming for the local library.
//!
//! Names look like `Konachan.com - 1234 tag_a tag_b.jpg`. The numeric id right
//! after the prefix is the only part that is ever parsed back.

use konakore_core::FILENAME_PREFIX;

/// Characters that are not allowed in generated file names.
const ILLEGAL_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Suffix aria2 uses for its control file next to an in-progress download.
pub const CONTROL_FILE_SUFFIX: &str = ".aria2";

/// Bucket directory name for a post id, zero padded to two digits.
pub fn bucket_name(post_id: i64, bucket_size: i64) -> String {
    let size = bucket_size.max(1);
    format!("{:02}", post_id.max(0) / size)
}

/// Remove characters that are illegal in file names.
pub fn strip_illegal(value: &str) -> String {
    value.chars().filter(|c| !ILLEGAL_CHARS.contains(c)).collect()
}

/// Join tags for a file name.
///
/// Trailing tags are dropped while the space-joined text is at least
/// `max_len` bytes long, then illegal characters are stripped.
pub fn clean_tags(tags: &[String], max_len: usize) -> String {
    let mut kept: Vec<&str> = tags.iter().map(String::as_str).collect();
    while !kept.is_empty() && kept.join(" ").len() >= max_len {
        kept.pop();
    }
    strip_illegal(&kept.join(" "))
}

/// Full file name for a post.
///
/// Posts whose tags all get dropped still get a valid name, without the
/// trailing space.
pub fn build_filename(post_id: i64, tags: &[String], ext: &str, max_tags_len: usize) -> String {
    let tags = clean_tags(tags, max_tags_len);
    if tags.is_empty() {
        format!("{FILENAME_PREFIX}{post_id}.{ext}")
    } else {
        format!("{FILENAME_PREFIX}{post_id} {tags}.{ext}")
    }
}

/// Post id encoded in a library file name.
///
/// Returns `None` for names without the prefix, without a numeric id, and for
/// aria2 control files.
pub fn parse_post_id(file_name: &str) -> Option<i64> {
    if is_control_file(file_name) {
        return None;
    }
    let rest = file_name.strip_prefix(FILENAME_PREFIX)?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    match rest[end..].chars().next() {
        None | Some(' ') | Some('.') => rest[..end].parse().ok(),
        Some(_) => None,
    }
}

/// Whether a file name belongs to the given post.
pub fn matches_post(file_name: &str, post_id: i64) -> bool {
    parse_post_id(file_name) == Some(post_id)
}

/// Whether the name is an aria2 control file.
pub fn is_control_file(file_name: &str) -> bool {
    file_name.ends_with(CONTROL_FILE_SUFFIX)
}

/// Lowercased extension of a file name, `jpg` when there is none.
pub fn extension_of(file_name: &str) -> String {
    let rest = file_name.strip_prefix(FILENAME_PREFIX).unwrap_or(file_name);
    std::path::Path::new(rest)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && !ext.contains(' '))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "jpg".to_string())
}
