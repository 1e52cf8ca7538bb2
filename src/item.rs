//! Clipboard item model
//!
//! Defines the records kept by the item store and the helpers shared by the
//! clipboard monitor, the enrichment pipeline and the ranking engine.

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use uuid::Uuid;

/// Content stored for image items until a description arrives
pub const IMAGE_PLACEHOLDER: &str = "[Image]";

/// Unique identifier for a clipboard item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate a new unique item ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What kind of payload an item was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    /// Image whose content has been replaced by a generated description
    VisionExtracted,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::VisionExtracted => "vision_extracted",
        }
    }

    /// Unknown values read back from storage are treated as text
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "image" => ContentType::Image,
            "vision_extracted" => ContentType::VisionExtracted,
            _ => ContentType::Text,
        }
    }

    /// Whether the item carries an image side file
    pub fn is_image(&self) -> bool {
        matches!(self, ContentType::Image | ContentType::VisionExtracted)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry in the clipboard history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardItem {
    pub id: ItemId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_app: Option<String>,
    pub usage_count: u32,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_id: Option<String>,
    pub is_favorite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
}

/// Current time at the millisecond precision the store keeps
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

impl ClipboardItem {
    /// Create a text item captured now
    pub fn text(content: impl Into<String>, source_app: Option<String>) -> Self {
        Self {
            id: ItemId::new(),
            timestamp: now_millis(),
            content: content.into(),
            content_type: ContentType::Text,
            source_app,
            usage_count: 0,
            tags: Vec::new(),
            vector_id: None,
            is_favorite: false,
            image_path: None,
        }
    }

    /// Create an image item whose PNG lives at `image_path`
    pub fn image(id: ItemId, image_path: PathBuf, source_app: Option<String>) -> Self {
        Self {
            id,
            timestamp: now_millis(),
            content: IMAGE_PLACEHOLDER.to_string(),
            content_type: ContentType::Image,
            source_app,
            usage_count: 0,
            tags: Vec::new(),
            vector_id: None,
            is_favorite: false,
            image_path: Some(image_path),
        }
    }

    /// Override the timestamp (imports and tests)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Hours elapsed since the item was captured, never negative
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.timestamp).num_milliseconds() as f64 / 1000.0;
        (secs / 3600.0).max(0.0)
    }

    /// Short single-line preview for listings and prompts
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .content
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        let flat = flat.trim();
        if flat.chars().count() <= max_chars {
            flat.to_string()
        } else {
            let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{}...", cut)
        }
    }
}

/// Leading and trailing punctuation. A trailing `+` or `#` belongs to names
/// like "c++" and "c#".
static EDGE_PUNCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\p{L}\p{N}]+|[^\p{L}\p{N}+#]+$").expect("edge punctuation pattern is valid")
});

/// Normalise tags: trim, lowercase, strip surrounding punctuation,
/// drop empties and duplicates (first occurrence wins)
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let lowered = tag.as_ref().trim().to_lowercase();
        let stripped = EDGE_PUNCT.replace_all(&lowered, "");
        let stripped = stripped.trim();
        if stripped.is_empty() || out.iter().any(|t| t == stripped) {
            continue;
        }
        out.push(stripped.to_string());
    }
    out
}

/// Split a free-form tag response ("a, b\nc") into normalised tags
pub fn parse_tag_list(response: &str) -> Vec<String> {
    normalize_tags(response.split([',', '\n', ';']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_item_id_roundtrip() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(ItemId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_image_item_uses_placeholder() {
        let id = ItemId::new();
        let item = ClipboardItem::image(id, PathBuf::from("/tmp/x.png"), None);
        assert_eq!(item.content, IMAGE_PLACEHOLDER);
        assert_eq!(item.content_type, ContentType::Image);
        assert!(item.content_type.is_image());
        assert_eq!(item.id, id);
    }

    #[test]
    fn test_content_type_strings() {
        for ct in [ContentType::Text, ContentType::Image, ContentType::VisionExtracted] {
            assert_eq!(ContentType::from_str_lossy(ct.as_str()), ct);
        }
        assert_eq!(ContentType::from_str_lossy("bogus"), ContentType::Text);
    }

    #[test]
    fn test_age_hours() {
        let now = Utc::now();
        let item = ClipboardItem::text("hello", None).with_timestamp(now - Duration::hours(6));
        assert!((item.age_hours(now) - 6.0).abs() < 0.01);

        let future = ClipboardItem::text("hello", None).with_timestamp(now + Duration::hours(1));
        assert_eq!(future.age_hours(now), 0.0);
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        let item = ClipboardItem::text("line one\nline two\tend", None);
        assert_eq!(item.preview(100), "line one line two end");
        assert_eq!(item.preview(8), "line ...");
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["  Code ", "code", "#Terminal!", "", "--", "URL"]);
        assert_eq!(tags, vec!["code", "terminal", "url"]);
    }

    #[test]
    fn test_normalize_keeps_inner_punctuation() {
        let tags = normalize_tags(["c++", "node.js", "e-mail"]);
        assert_eq!(tags, vec!["c++", "node.js", "e-mail"]);
    }

    #[test]
    fn test_normalize_keeps_language_suffixes() {
        let tags = normalize_tags(["C#", "c", "F#.", "(c++)", "#rust", "+", "c++!"]);
        assert_eq!(tags, vec!["c#", "c", "f#", "c++", "rust"]);
    }

    #[test]
    fn test_parse_tag_list() {
        let tags = parse_tag_list("shipping, Tracking\nups; shipping");
        assert_eq!(tags, vec!["shipping", "tracking", "ups"]);
    }
}
