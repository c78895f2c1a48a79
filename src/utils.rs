use lazy_static::lazy_static;
use regex::Regex;

const MAX_TITLE_CHARS: usize = 50;

lazy_static! {
    static ref UNSAFE_TITLE_CHARS: Regex = Regex::new(r"[^\p{Alphabetic}\p{Nd} _-]").unwrap();
}

/// The name a newsletter gets on the device.
///
/// Every character other than letters, digits, space, `-` and `_` becomes `_`, and the result is
/// cut to 50 characters. Subjects that leave nothing usable become `newsletter`.
pub(crate) fn document_title(subject: &str) -> String {
    let safe = UNSAFE_TITLE_CHARS.replace_all(subject.trim(), "_");
    let title: String = safe.chars().take(MAX_TITLE_CHARS).collect();
    let title = title.trim();
    if title.chars().all(|c| c == '_') {
        String::from("newsletter")
    } else {
        title.to_string()
    }
}

/// Escape the characters that are significant in HTML text and attribute values.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
