//! Caption response parsing
//!
//! The model answers in free-form markdown. Responses are never modeled
//! as a nominal type; instead the labeled sections are located with a
//! forgiving grammar, and when nothing matches the raw text is carved
//! into a usable caption and word-extracted tags. Parsing never fails.

use std::sync::OnceLock;

use drivelens_core::ports::captioner::ImageCaption;
use regex::Regex;

/// Maximum caption length on the structured path
const MAX_CAPTION_LEN: usize = 1500;

/// Maximum caption length on the fallback path
const MAX_FALLBACK_CAPTION_LEN: usize = 500;

/// Maximum number of tags kept
const MAX_TAGS: usize = 20;

/// Maximum length of a single tag
const MAX_TAG_LEN: usize = 30;

/// Tags taken from the fallback word extraction
const MAX_FALLBACK_TAGS: usize = 10;

/// Matches a section header alone on its line: `## Subjects`,
/// `**Search Keywords:**`, `Setting:` and similar variations.
fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mi)^\s*(?:#{1,6}\s*|\*{1,2}\s*)?(subjects|actions|setting|visual attributes|visible text|notable details|search keywords)\s*[:*]*\s*$",
        )
        .expect("section header regex is valid")
    })
}

/// Parses a model response into caption + tags, falling back to raw-text
/// extraction when no section headers are present.
pub fn parse_caption_response(raw: &str) -> ImageCaption {
    let sections = extract_sections(raw);

    if sections.is_empty() {
        return fallback_caption(raw);
    }

    let keywords = section_body(&sections, "search keywords");
    let subjects = section_body(&sections, "subjects");

    let mut tags: Vec<String> = Vec::new();
    if let Some(body) = keywords {
        for piece in body.split(',') {
            let tag = piece.trim().to_lowercase().replace(' ', "-");
            if !tag.is_empty() && tag.len() <= MAX_TAG_LEN {
                push_unique(&mut tags, tag);
            }
        }
    }
    if let Some(body) = subjects {
        for token in word_tokens(body).into_iter().take(5) {
            push_unique(&mut tags, token);
        }
    }
    tags.truncate(MAX_TAGS);

    // The model occasionally returns headers with empty bodies; make sure
    // search still has something lexical to bite on.
    if tags.is_empty() {
        tags = fallback_tags(raw);
    }

    ImageCaption {
        caption: truncate_chars(&strip_markers(raw), MAX_CAPTION_LEN),
        tags,
    }
}

/// Named sections with their body spans, in document order
fn extract_sections(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(usize, usize, String)> = header_regex()
        .captures_iter(raw)
        .map(|cap| {
            let whole = cap.get(0).expect("match group 0");
            let name = cap[1].to_lowercase();
            (whole.start(), whole.end(), name)
        })
        .collect();
    headers.sort_by_key(|(start, _, _)| *start);

    let mut sections = Vec::with_capacity(headers.len());
    for (idx, (_, body_start, name)) in headers.iter().enumerate() {
        let body_end = headers
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(raw.len());
        let body = raw[*body_start..body_end].trim().to_string();
        sections.push((name.clone(), body));
    }
    sections
}

/// Body of the first section with the given (lowercase) name
fn section_body<'a>(sections: &'a [(String, String)], name: &str) -> Option<&'a str> {
    sections
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, body)| body.as_str())
}

/// Lowercase alphanumeric word tokens in order of appearance
fn word_tokens(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[a-zA-Z0-9]+").expect("token regex is valid"));
    re.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

/// Removes markdown markers and normalizes whitespace, keeping the words
fn strip_markers(raw: &str) -> String {
    let without_markers: String = raw
        .chars()
        .filter(|c| !matches!(c, '#' | '*' | '`' | '_' | '>'))
        .collect();
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Char-boundary-safe truncation
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Raw-text fallback: normalized caption plus distinct word tags
fn fallback_caption(raw: &str) -> ImageCaption {
    ImageCaption {
        caption: truncate_chars(&strip_markers(raw), MAX_FALLBACK_CAPTION_LEN),
        tags: fallback_tags(raw),
    }
}

/// Up to ten distinct lowercase word tokens of length 3 to 15
fn fallback_tags(raw: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for token in word_tokens(raw) {
        if (3..=15).contains(&token.len()) {
            push_unique(&mut tags, token);
            if tags.len() == MAX_FALLBACK_TAGS {
                break;
            }
        }
    }
    tags
}
