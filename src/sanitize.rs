//! Text cleanup for model output
//! Unwraps fenced JSON, drops emphasis marks, and breaks verdicts into sentences

/// Emphasis character the model likes to sprinkle into its prose
const EMPHASIS_MARK: char = '*';

/// Sentence terminator used when splitting a verdict
const SENTENCE_TERMINATOR: char = '.';

/// Remove a markdown code fence wrapped around the text.
/// The opening fence may carry a language tag (```json). Plain text is returned trimmed.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut result = trimmed.to_string();

    if let Ok(opening) = regex_lite::Regex::new(r"^```[A-Za-z0-9_+-]*[ \t]*\r?\n?") {
        result = opening.replace(&result, "").to_string();
    }
    if let Ok(closing) = regex_lite::Regex::new(r"\r?\n?```$") {
        result = closing.replace(&result, "").to_string();
    }

    result
}

/// Remove every emphasis mark. Absent text becomes an empty string.
pub fn remove_emphasis_marks<'a>(text: impl Into<Option<&'a str>>) -> String {
    match text.into() {
        Some(text) => text.replace(EMPHASIS_MARK, ""),
        None => String::new(),
    }
}

/// Split on full stops, trimming each fragment and dropping empty ones.
/// Abbreviations and decimals get split too; callers accept that.
pub fn split_into_sentences<'a>(text: impl Into<Option<&'a str>>) -> Vec<String> {
    let Some(text) = text.into() else {
        return Vec::new();
    };

    text.split(SENTENCE_TERMINATOR)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}
