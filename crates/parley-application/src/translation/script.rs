//! Writing-system detection.
//!
//! Users frequently type their mother tongue in Latin letters ("namaste"
//! instead of "नमस्ते"). Such input needs transliteration before it is shown
//! back to the sender.

use parley_core::language::LanguageCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Devanagari,
    Bengali,
    Gurmukhi,
    Gujarati,
    Tamil,
    Telugu,
    Kannada,
    Malayalam,
    Arabic,
    Cyrillic,
    Thai,
    Han,
    Hangul,
    Kana,
}

impl Script {
    fn contains(self, c: char) -> bool {
        let cp = c as u32;
        match self {
            Script::Devanagari => (0x0900..=0x097F).contains(&cp),
            Script::Bengali => (0x0980..=0x09FF).contains(&cp),
            Script::Gurmukhi => (0x0A00..=0x0A7F).contains(&cp),
            Script::Gujarati => (0x0A80..=0x0AFF).contains(&cp),
            Script::Tamil => (0x0B80..=0x0BFF).contains(&cp),
            Script::Telugu => (0x0C00..=0x0C7F).contains(&cp),
            Script::Kannada => (0x0C80..=0x0CFF).contains(&cp),
            Script::Malayalam => (0x0D00..=0x0D7F).contains(&cp),
            Script::Arabic => (0x0600..=0x06FF).contains(&cp),
            Script::Cyrillic => (0x0400..=0x04FF).contains(&cp),
            Script::Thai => (0x0E00..=0x0E7F).contains(&cp),
            Script::Han => (0x4E00..=0x9FFF).contains(&cp),
            Script::Hangul => (0xAC00..=0xD7AF).contains(&cp),
            Script::Kana => (0x3040..=0x30FF).contains(&cp),
        }
    }
}

/// The non-Latin script a language is natively written in, if any.
pub fn native_script(language: &LanguageCode) -> Option<Script> {
    let script = match language.as_str() {
        "hi" | "mr" | "ne" | "sa" | "kok" => Script::Devanagari,
        "bn" | "as" => Script::Bengali,
        "pa" => Script::Gurmukhi,
        "gu" => Script::Gujarati,
        "ta" => Script::Tamil,
        "te" => Script::Telugu,
        "kn" => Script::Kannada,
        "ml" => Script::Malayalam,
        "ar" | "ur" | "fa" => Script::Arabic,
        "ru" | "uk" | "bg" | "sr" => Script::Cyrillic,
        "th" => Script::Thai,
        "zh" => Script::Han,
        "ko" => Script::Hangul,
        "ja" => Script::Kana,
        _ => return None,
    };
    Some(script)
}

/// Whether `text` is written in the native script of `language`.
///
/// Latin-script languages always match. Text with no letters at all
/// (digits, emoji) matches too, since there is nothing to transliterate.
pub fn typed_in_native_script(text: &str, language: &LanguageCode) -> bool {
    let Some(script) = native_script(language) else {
        return true;
    };
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    if letters.peek().is_none() {
        return true;
    }
    // Japanese mixes kana with Han.
    letters.any(|c| script.contains(c) || (script == Script::Kana && Script::Han.contains(c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_romanized_hindi_is_not_native() {
        let hi = LanguageCode::new("hi");
        assert!(!typed_in_native_script("namaste ji", &hi));
        assert!(typed_in_native_script("नमस्ते", &hi));
        assert!(typed_in_native_script("12345 :)", &hi));
    }

    #[test]
    fn test_latin_languages_always_match() {
        assert!(typed_in_native_script("hola", &LanguageCode::new("es")));
        assert!(typed_in_native_script("hello", &LanguageCode::new("en")));
    }
}
