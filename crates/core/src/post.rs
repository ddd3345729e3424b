//! Typed access to the opaque post payload.
//!
//! Posts are stored exactly as the remote catalog returned them. The workers
//! only need a handful of fields, read leniently: missing or mistyped values
//! behave as absent rather than failing the whole record.

use serde_json::Value;

/// File size above which a moderately compressible original is swapped for
/// its JPEG rendition.
pub const LARGE_ORIGINAL_BYTES: i64 = 5 * 1024 * 1024;

/// Size ratio at which the JPEG rendition is always preferred.
pub const HIGH_RATIO: f64 = 10.0;

/// Size ratio at which the JPEG rendition is preferred for large originals.
pub const MODERATE_RATIO: f64 = 3.0;

/// Fields of a post payload the sync workers care about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostPayload {
    pub tags: Option<String>,
    pub file_url: Option<String>,
    pub file_size: i64,
    pub jpeg_url: Option<String>,
    pub jpeg_file_size: i64,
}

/// The asset chosen for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadChoice {
    pub url: String,
    pub expected_size: i64,
    pub ext: &'static str,
}

fn non_empty_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn int_or_zero(raw: &Value, key: &str) -> i64 {
    raw.get(key).and_then(Value::as_i64).unwrap_or(0)
}

impl PostPayload {
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            tags: non_empty_str(raw, "tags").or_else(|| non_empty_str(raw, "tag_string")),
            file_url: non_empty_str(raw, "file_url"),
            file_size: int_or_zero(raw, "file_size"),
            jpeg_url: non_empty_str(raw, "jpeg_url"),
            jpeg_file_size: int_or_zero(raw, "jpeg_file_size"),
        }
    }

    /// Tag names in payload order. Empty when the post carries no tag list.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|tags| tags.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Pick between the original file and its JPEG rendition.
    ///
    /// A JPEG that is at least ten times smaller behaves photographically and
    /// wins outright; a JPEG three times smaller wins only when the original
    /// exceeds [`LARGE_ORIGINAL_BYTES`]. Everything else keeps the original.
    pub fn select_download(&self) -> Option<DownloadChoice> {
        let original = self.file_url.as_deref().map(|url| DownloadChoice {
            url: url.to_string(),
            expected_size: self.file_size,
            ext: extension_from_url(url),
        });

        if self.jpeg_file_size <= 0 {
            return original;
        }

        let ratio = self.file_size as f64 / self.jpeg_file_size as f64;
        let prefer_jpeg = ratio >= HIGH_RATIO
            || (ratio >= MODERATE_RATIO && self.file_size > LARGE_ORIGINAL_BYTES);

        match (&self.jpeg_url, prefer_jpeg) {
            (Some(url), true) => Some(DownloadChoice {
                url: url.clone(),
                expected_size: self.jpeg_file_size,
                ext: extension_from_url(url),
            }),
            _ => original,
        }
    }

    /// Source URL and size to record for a file already present on disk.
    ///
    /// A `jpg` file is attributed to the JPEG rendition unless the payload has
    /// no JPEG size, in which case the original is recorded.
    pub fn adopted_source(&self, ext: &str) -> (Option<String>, i64) {
        let is_jpeg = matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg");
        if is_jpeg && self.jpeg_file_size > 0 {
            (self.jpeg_url.clone(), self.jpeg_file_size)
        } else {
            (self.file_url.clone(), self.file_size)
        }
    }
}

/// Infer a file extension from a download URL.
pub fn extension_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "png"
    } else if path.ends_with(".gif") {
        "gif"
    } else {
        // .jpg, .jpeg and anything unrecognised
        "jpg"
    }
}
