//! Issue content handling: the markdown subset admins write issues in, and
//! the data URI used to upload the optional inline image.

use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^# (.*)$").unwrap());
static HEADING_2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^## (.*)$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n+").unwrap());
static DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;,]+)(?:;[^;,=]+=[^;,]*)*;base64,(.+)$").unwrap());

const DEFAULT_IMAGE_NAME: &str = "image";

/// An image shipped inline with every directly delivered copy of an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Parses a `data:<mime>[;param=value]*;base64,<payload>` URI. Parameters
    /// are dropped from the content type.
    pub fn from_data_uri(data_uri: &str, file_name: Option<String>) -> Result<Self, String> {
        let captures = DATA_URI
            .captures(data_uri.trim())
            .ok_or_else(|| "imageData is not a base64 data URI".to_string())?;

        let payload: String = captures[2].split_whitespace().collect();
        let data = STANDARD
            .decode(payload)
            .map_err(|e| format!("imageData is not valid base64: {}", e))?;

        Ok(InlineImage {
            file_name: file_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string()),
            content_type: captures[1].trim().to_string(),
            data,
        })
    }
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Converts issue content to an HTML fragment.
///
/// Only a handful of constructs are understood: `#`/`##` headings, `**bold**`,
/// `*italic*`, `[text](url)` links and blank-line separated paragraphs.
pub fn markdown_to_html(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let normalized = markdown.replace("\r\n", "\n");
    let escaped = normalized
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    let html = HEADING_1.replace_all(&escaped, "<h1>${1}</h1>");
    let html = HEADING_2.replace_all(&html, "<h2>${1}</h2>");
    let html = BOLD.replace_all(&html, "<strong>${1}</strong>");
    let html = ITALIC.replace_all(&html, "<em>${1}</em>");
    let html = LINK.replace_all(
        &html,
        r#"<a href="${2}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
    );

    BLANK_LINES
        .split(&html)
        .map(|paragraph| format!("<p>{}</p>", paragraph.replace('\n', "<br />")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The full HTML document sent to recipients and to the campaign API.
pub fn render_document(markdown: &str) -> String {
    format!(
        "<!doctype html><html><body>{}</body></html>",
        markdown_to_html(markdown)
    )
}
