//! Grading rubric prompt

/// Build the prompt sent to the judgment service.
///
/// `normalized` is included only when it differs from `text`.
pub fn build_prompt(text: &str, detected_terms: &[String], normalized: Option<&str>) -> String {
    let terms = if detected_terms.is_empty() {
        "none (no terms detected, review the full content)".to_string()
    } else {
        detected_terms.join(", ")
    };

    let mut prompt = format!(
        "You are a content moderation assistant. Analyze this message for harmful intent.\n\
         \n\
         Detected terms: {terms}\n\
         Full message: \"{text}\"\n"
    );

    if let Some(normalized) = normalized.filter(|n| !n.is_empty() && *n != text) {
        prompt.push_str(&format!("De-obfuscated form: \"{normalized}\"\n"));
    }

    prompt.push_str(
        "\n\
         Rate the severity from 1-10:\n\
         - 1-3: Playful banter, friendly joking, no malice\n\
         - 4-6: Potentially inappropriate, context matters\n\
         - 7-8: Clear insults or slurs with hostile intent\n\
         - 9-10: Severe hate speech or threats\n\
         \n\
         Respond ONLY with valid JSON:\n\
         {\n\
         \x20   \"is_harmful\": true/false,\n\
         \x20   \"severity\": 1-10,\n\
         \x20   \"reason\": \"brief explanation\",\n\
         \x20   \"context\": \"playful/neutral/hostile\"\n\
         }",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_terms_and_bands() {
        let prompt = build_prompt("you c4t", &["cat".to_string()], Some("you cat"));
        assert!(prompt.contains("Detected terms: cat"));
        assert!(prompt.contains("Full message: \"you c4t\""));
        assert!(prompt.contains("De-obfuscated form: \"you cat\""));
        for band in ["1-3:", "4-6:", "7-8:", "9-10:"] {
            assert!(prompt.contains(band));
        }
        assert!(prompt.contains("\"severity\": 1-10"));
    }

    #[test]
    fn test_prompt_without_terms_requests_full_review() {
        let prompt = build_prompt("hello there", &[], Some("hello there"));
        assert!(prompt.contains("no terms detected"));
        assert!(!prompt.contains("De-obfuscated"));
    }
}
