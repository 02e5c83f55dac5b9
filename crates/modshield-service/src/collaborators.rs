//! External collaborator seams
//!
//! Translation and image-text extraction are black boxes to the engine. Both
//! are best-effort: the pipeline degrades to the text it already has when a
//! call fails.

use async_trait::async_trait;
use modshield_core::Result;

/// Result of a translation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// Translated text
    pub text: String,

    /// Detected source language, if known
    pub source_lang: Option<String>,
}

impl Translation {
    /// The input itself, language unknown
    pub fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            source_lang: None,
        }
    }

    /// Source language or `"unknown"`
    pub fn source_lang_or_unknown(&self) -> &str {
        self.source_lang.as_deref().unwrap_or("unknown")
    }
}

/// Machine translation into the moderation language
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`
    async fn translate(&self, text: &str) -> Result<Translation>;

    /// Translator name for logging
    fn name(&self) -> &str;
}

/// Translator that returns its input
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str) -> Result<Translation> {
        Ok(Translation::unchanged(text))
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// Image text extraction
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Text found in `image`; `None` when there is none
    async fn extract_text(&self, image: &[u8]) -> Result<Option<String>>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// OCR engine that never finds text
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcr;

#[async_trait]
impl OcrEngine for NoOcr {
    async fn extract_text(&self, _image: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough() {
        let t = PassthroughTranslator.translate("hola").await.unwrap();
        assert_eq!(t.text, "hola");
        assert_eq!(t.source_lang_or_unknown(), "unknown");
    }

    #[tokio::test]
    async fn test_no_ocr() {
        assert_eq!(NoOcr.extract_text(b"\x89PNG").await.unwrap(), None);
    }
}
