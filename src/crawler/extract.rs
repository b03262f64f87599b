//! Content-type specific extraction
//!
//! Each strategy has two halves: the JavaScript a scripted browser runs in
//! the page, and a decoder for the JSON that script returns. Engines that do
//! not run scripts produce the same JSON shape themselves.

use crate::source::ContentType;
use crate::ExtractionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

const TEXT_SCRIPT: &str = r#"() => (document.body ? document.body.innerText : '')"#;

const IMAGE_SCRIPT: &str = r#"() => Array.from(document.images).map((img) => ({
    src: img.currentSrc || img.src,
    alt: img.getAttribute('alt'),
    width: img.naturalWidth || img.width || null,
    height: img.naturalHeight || img.height || null,
})).filter((d) => d.src)"#;

const VIDEO_SCRIPT: &str = r#"() => Array.from(document.querySelectorAll('video')).map((v) => {
    const source = v.querySelector('source[src]');
    return {
        src: v.currentSrc || v.getAttribute('src') || (source ? source.src : ''),
        mime_type: source ? source.getAttribute('type') : null,
        duration: Number.isFinite(v.duration) ? v.duration : null,
    };
}).filter((d) => d.src)"#;

/// One strategy per supported content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Text,
    Images,
    Videos,
}

impl ExtractionStrategy {
    pub fn for_content_type(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Text => Self::Text,
            ContentType::Image => Self::Images,
            ContentType::Video => Self::Videos,
        }
    }

    /// Picks the strategy for a raw content-type tag
    pub fn from_tag(tag: &str) -> Result<Self, ExtractionError> {
        ContentType::parse(tag)
            .map(Self::for_content_type)
            .ok_or_else(|| ExtractionError::UnsupportedContentType(tag.to_string()))
    }

    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Text => ContentType::Text,
            Self::Images => ContentType::Image,
            Self::Videos => ContentType::Video,
        }
    }

    /// In-page extractor for script-capable engines
    pub fn script(&self) -> &'static str {
        match self {
            Self::Text => TEXT_SCRIPT,
            Self::Images => IMAGE_SCRIPT,
            Self::Videos => VIDEO_SCRIPT,
        }
    }

    /// Decodes the value the extractor returned
    pub fn decode(&self, value: serde_json::Value) -> Result<ExtractedPayload, ExtractionError> {
        match self {
            Self::Text => match value {
                serde_json::Value::String(text) => Ok(ExtractedPayload::Text(text)),
                serde_json::Value::Null => Ok(ExtractedPayload::Text(String::new())),
                other => Err(ExtractionError::Script(format!(
                    "text extractor returned {}",
                    json_kind(&other)
                ))),
            },
            Self::Images => Ok(ExtractedPayload::Images(serde_json::from_value(value)?)),
            Self::Videos => Ok(ExtractedPayload::Videos(serde_json::from_value(value)?)),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub src: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Seconds; unknown until the media metadata has loaded
    #[serde(default)]
    pub duration: Option<f64>,
}

/// What a strategy pulled out of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ExtractedPayload {
    Text(String),
    Images(Vec<ImageDescriptor>),
    Videos(Vec<VideoDescriptor>),
}

/// One processing-lane unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub source_id: String,
    pub content_type: ContentType,
    /// Page the content was extracted from
    pub url: Url,
    pub payload: ExtractedPayload,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedContent {
    /// Splits media payloads into one content item per descriptor
    ///
    /// Text stays a single unit; an empty media list yields nothing.
    pub fn into_units(self) -> Vec<ExtractedContent> {
        let Self {
            source_id,
            content_type,
            url,
            payload,
            extracted_at,
        } = self;

        let unit = |payload| ExtractedContent {
            source_id: source_id.clone(),
            content_type,
            url: url.clone(),
            payload,
            extracted_at,
        };

        match payload {
            ExtractedPayload::Text(text) => vec![unit(ExtractedPayload::Text(text))],
            ExtractedPayload::Images(images) => images
                .into_iter()
                .map(|image| unit(ExtractedPayload::Images(vec![image])))
                .collect(),
            ExtractedPayload::Videos(videos) => videos
                .into_iter()
                .map(|video| unit(ExtractedPayload::Videos(vec![video])))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(payload: ExtractedPayload) -> ExtractedContent {
        ExtractedContent {
            source_id: "s1".to_string(),
            content_type: ContentType::Image,
            url: Url::parse("https://example.com/gallery").unwrap(),
            payload,
            extracted_at: Utc::now(),
        }
    }

    #[test]
    fn test_strategy_per_content_type() {
        assert_eq!(ExtractionStrategy::from_tag("text").unwrap(), ExtractionStrategy::Text);
        assert_eq!(ExtractionStrategy::from_tag("image").unwrap(), ExtractionStrategy::Images);
        assert_eq!(ExtractionStrategy::from_tag("video").unwrap(), ExtractionStrategy::Videos);
        assert!(matches!(
            ExtractionStrategy::from_tag("audio"),
            Err(ExtractionError::UnsupportedContentType(tag)) if tag == "audio"
        ));
    }

    #[test]
    fn test_decode_images() {
        let value = json!([
            {"src": "https://example.com/a.png", "alt": "A", "width": 10, "height": 20},
            {"src": "https://example.com/b.png", "alt": null, "width": null, "height": null}
        ]);
        let payload = ExtractionStrategy::Images.decode(value).unwrap();
        match payload {
            ExtractedPayload::Images(images) => {
                assert_eq!(images.len(), 2);
                assert_eq!(images[0].width, Some(10));
                assert_eq!(images[1].alt, None);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_video_duration() {
        let value = json!([{"src": "https://example.com/v.mp4", "mime_type": "video/mp4", "duration": 12.5}]);
        let payload = ExtractionStrategy::Videos.decode(value).unwrap();
        assert_eq!(
            payload,
            ExtractedPayload::Videos(vec![VideoDescriptor {
                src: "https://example.com/v.mp4".to_string(),
                mime_type: Some("video/mp4".to_string()),
                duration: Some(12.5),
            }])
        );
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(matches!(
            ExtractionStrategy::Text.decode(json!([1, 2])),
            Err(ExtractionError::Script(_))
        ));
        assert!(matches!(
            ExtractionStrategy::Images.decode(json!("nope")),
            Err(ExtractionError::Decode(_))
        ));
    }

    #[test]
    fn test_into_units_one_per_descriptor() {
        let image = |src: &str| ImageDescriptor {
            src: src.to_string(),
            alt: None,
            width: None,
            height: None,
        };
        let units = content(ExtractedPayload::Images(vec![image("a"), image("b")])).into_units();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].payload, ExtractedPayload::Images(vec![image("b")]));

        assert!(content(ExtractedPayload::Images(vec![])).into_units().is_empty());
        assert_eq!(content(ExtractedPayload::Text("hi".into())).into_units().len(), 1);
    }
}
