//! Emoji name extraction
//!
//! Chat platforms render `:name:` shortcodes and custom `<:name:id>` emoji as
//! images, and Unicode emoji carry meaning only through their CLDR name, so a
//! term expressed as an emoji never shows up in the plain text scan. The names
//! are pulled out and expanded into the spellings the detector is most likely
//! to catch.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn shortcode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r":([A-Za-z0-9_\-]+):").expect("static regex"))
}

fn custom_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<a?:([A-Za-z0-9_\-]+):\d+>").expect("static regex"))
}

/// Skin tone modifiers resolve to their own names; they add nothing
fn is_skin_tone(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

/// CLDR names of the Unicode emoji in `text`, in order of appearance
fn unicode_names<'a>(text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    text.chars()
        .filter(|c| !c.is_ascii() && !is_skin_tone(*c))
        .filter_map(|c| {
            let mut buf = [0u8; 4];
            let single: &str = c.encode_utf8(&mut buf);
            // Some emoji are only registered with the emoji presentation selector
            emojis::get(single).or_else(|| emojis::get(&format!("{}\u{FE0F}", c)))
        })
        .map(|e| e.name())
}

/// Extract emoji names and their spelling variants, de-duplicated in order
pub fn extract_emoji_names(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut names: Vec<&str> = Vec::new();
    names.extend(
        shortcode_pattern()
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str())),
    );
    names.extend(
        custom_pattern()
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str())),
    );
    names.extend(unicode_names(text));

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        for variant in spellings(name) {
            if !variant.is_empty() && seen.insert(variant.clone()) {
                out.push(variant);
            }
        }
    }
    out
}

fn spellings(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut variants = vec![
        name.to_string(),
        lower.clone(),
        name.replace(['_', '-'], " "),
        lower.replace(['_', '-'], " "),
        lower.replace(['_', '-', ' '], ""),
    ];
    variants.extend(
        lower
            .split(['_', '-', ' '])
            .filter(|part| part.chars().count() > 1)
            .map(str::to_string),
    );
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortcodes_and_custom_emoji() {
        let names = extract_emoji_names("look :middle_finger: and <a:Bad-Cat:12345>");
        assert!(names.contains(&"middle_finger".to_string()));
        assert!(names.contains(&"middle finger".to_string()));
        assert!(names.contains(&"middlefinger".to_string()));
        assert!(names.contains(&"finger".to_string()));
        assert!(names.contains(&"bad cat".to_string()));
        assert!(names.contains(&"cat".to_string()));
    }

    #[test]
    fn test_no_duplicates() {
        let names = extract_emoji_names(":cat: :cat:");
        assert_eq!(names, vec!["cat".to_string()]);
    }

    #[test]
    fn test_unicode_emoji_names() {
        let names = extract_emoji_names("ok \u{1F595}\u{1F3FD} bye");
        assert!(names.contains(&"middle finger".to_string()));
        assert!(names.contains(&"middlefinger".to_string()));
        assert!(names.contains(&"finger".to_string()));
        assert!(!names.iter().any(|n| n.contains("skin tone")));

        let names = extract_emoji_names("\u{1F431}");
        assert!(names.contains(&"cat".to_string()), "{:?}", names);
    }

    #[test]
    fn test_plain_text_has_no_emoji() {
        assert!(extract_emoji_names("ratio 3:2 at 10:30").is_empty());
    }
}
