use serde::{Deserialize, Serialize};

/// First user message delivered to a freshly launched or resumed loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

impl InitialMessage {
    /// Build a message only when there is something to send: non-empty text
    /// or at least one image reference.
    pub fn from_parts(text: Option<String>, image_urls: Option<Vec<String>>) -> Option<Self> {
        let content = text.unwrap_or_default();
        let image_urls = image_urls.unwrap_or_default();
        if content.is_empty() && image_urls.is_empty() {
            return None;
        }
        Some(Self { content, image_urls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_supplied_builds_nothing() {
        assert!(InitialMessage::from_parts(None, None).is_none());
        assert!(InitialMessage::from_parts(Some(String::new()), Some(vec![])).is_none());
    }

    #[test]
    fn text_only() {
        let msg = InitialMessage::from_parts(Some("hello".into()), None).unwrap();
        assert_eq!(msg.content, "hello");
        assert!(msg.image_urls.is_empty());
    }

    #[test]
    fn images_only_gets_empty_text() {
        let msg =
            InitialMessage::from_parts(None, Some(vec!["https://img/1.png".into()])).unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.image_urls, vec!["https://img/1.png".to_string()]);
    }

    #[test]
    fn whitespace_text_still_counts() {
        assert!(InitialMessage::from_parts(Some(" ".into()), None).is_some());
    }
}
