//! Message rendering for Telegram's HTML parse mode.
//!
//! Only `<b>` and `<a href>` markup is produced. Every value that came from a
//! source is escaped, and clamping happens before escaping so an entity is
//! never cut in half.

use crate::models::CandidateItem;
use html_escape::{encode_double_quoted_attribute, encode_text};

const MAX_TITLE_CHARS: usize = 300;
const MAX_BODY_CHARS: usize = 600;

fn clamp(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Escape `&`, `<` and `>` in text content.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
/// ```
pub fn escape_text(s: &str) -> String {
    encode_text(s).into_owned()
}

/// Escape a value placed inside a double-quoted `href`.
pub fn escape_href(s: &str) -> String {
    encode_double_quoted_attribute(s).into_owned()
}

fn anchor(item: &CandidateItem) -> String {
    format!(
        "<a href=\"{}\">{}</a>",
        escape_href(&item.link),
        escape_text(&clamp(&item.title, MAX_TITLE_CHARS))
    )
}

/// Standalone message for one item.
///
/// # Arguments
///
/// * `item` - The item to render; title and body are clamped, then escaped
///
/// # Returns
///
/// A bold linked title, followed by the body on its own line when present.
///
/// # Examples
///
/// ```ignore
/// // 🟧 <b><a href="https://e.test/1">Fish &amp; chips</a></b>
/// let text = single_message(&item);
/// ```
pub fn single_message(item: &CandidateItem) -> String {
    let mut msg = format!("🟧 <b>{}</b>", anchor(item));
    if let Some(body) = &item.body {
        msg.push('\n');
        msg.push_str(&escape_text(&clamp(body, MAX_BODY_CHARS)));
    }
    msg
}

/// One bullet line of a list message.
pub fn list_line(item: &CandidateItem) -> String {
    format!("• {}", anchor(item))
}

/// Header placed at the top of the first list message.
///
/// # Arguments
///
/// * `label` - Operator-chosen or source-derived name, escaped here
/// * `count` - Number of items in the whole batch, not in this message
///
/// # Examples
///
/// ```ignore
/// assert_eq!(list_header("ThingSpeak 42", 3), "ThingSpeak 42: 3 new");
/// ```
pub fn list_header(label: &str, count: usize) -> String {
    format!("{}: {count} new", escape_text(label))
}
