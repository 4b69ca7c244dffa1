use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::delivery::recipients::Recipient;
use crate::domain::issue_content::escape_html;

static NAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\{\{\s*name\s*\}\}").unwrap());
static PROFESSION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{\s*profession\s*\}\}").unwrap());

/// Fills `{{name}}` and `{{profession}}` in an HTML body. Values are escaped.
pub fn personalize_html(html: &str, recipient: &Recipient) -> String {
    substitute(
        html,
        &escape_html(recipient.name.as_deref().unwrap_or_default()),
        &escape_html(recipient.profession.as_deref().unwrap_or_default()),
    )
}

pub fn personalize_text(text: &str, recipient: &Recipient) -> String {
    substitute(
        text,
        recipient.name.as_deref().unwrap_or_default(),
        recipient.profession.as_deref().unwrap_or_default(),
    )
}

fn substitute(template: &str, name: &str, profession: &str) -> String {
    let with_name = NAME_TOKEN.replace_all(template, NoExpand(name));

    PROFESSION_TOKEN
        .replace_all(&with_name, NoExpand(profession))
        .into_owned()
}
