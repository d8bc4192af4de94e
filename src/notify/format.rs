// src/notify/format.rs
use super::Message;
use crate::candidate::ScoredCandidate;

const TITLE_PREVIEW_CHARS: usize = 100;

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// 1234567 -> "1,234,567". Negative and fractional parts are dropped.
pub fn group_thousands(v: f64) -> String {
    let n = if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 };
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let mut p: String = s.chars().take(max).collect();
        p.push_str("...");
        p
    } else {
        s.to_string()
    }
}

pub fn render_message(item: &ScoredCandidate) -> Message {
    let c = &item.candidate;
    let title = preview(c.title(), TITLE_PREVIEW_CHARS);
    let url = c.field("url").filter(|u| !u.is_empty()).unwrap_or(c.id.as_str()).to_string();

    let origin = match c.field("query").filter(|q| !q.is_empty()) {
        Some(q) => format!("{} / {}", c.source, q),
        None => c.source.clone(),
    };

    let mut body = String::new();
    body.push_str("🎯 *New viral match*\n\n");
    body.push_str(&format!("📝 *Title:* {}\n", escape_markdown(&title)));
    body.push_str(&format!("👀 *Views:* {}\n", group_thousands(c.metric("views"))));
    if let Some(author) = c.field("author").filter(|a| !a.is_empty()) {
        body.push_str(&format!("📱 *Author:* {}\n", escape_markdown(author)));
    }
    if let Some(cat) = c.field("category") {
        body.push_str(&format!("📂 *Category:* {}\n", escape_markdown(cat)));
    }
    body.push_str(&format!("🔎 *Found via:* {}\n", escape_markdown(&origin)));
    body.push_str(&format!("⭐ *Score:* {:.2}/1.00\n\n", item.score));
    body.push_str(&format!("🔗 {}", escape_markdown(&url)));

    Message { title, body, url }
}
