//! The captioning prompt
//!
//! A fixed markdown-structured prompt. The parser locates the section
//! headers by name, so the header strings here and the patterns in
//! [`crate::parse`] must stay in step.

/// Section headers the model is asked to produce, in order
pub const SECTIONS: &[&str] = &[
    "Subjects",
    "Actions",
    "Setting",
    "Visual Attributes",
    "Visible Text",
    "Notable Details",
    "Search Keywords",
];

/// Builds the captioning prompt sent alongside the image bytes
pub fn caption_prompt() -> String {
    "You are an expert image cataloguer. Describe this image in markdown using \
exactly the following sections:

## Subjects
The main people, animals, or objects in the image.

## Actions
What the subjects are doing, if anything.

## Setting
The location, environment, and time of day.

## Visual Attributes
Colors, lighting, composition, and artistic style.

## Visible Text
Any text readable in the image (OCR). Write \"none\" if there is no text.

## Notable Details
Anything distinctive or unusual worth remembering.

## Search Keywords
A comma-separated list of 10 to 20 short search keywords covering the image.

Be specific and factual. Do not add sections beyond these."
        .to_string()
}
