//! Keyword extraction and pain-point detection for problem posts.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

static RE_BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]|\(.*?\)").unwrap());
static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap());
static RE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]{3,}").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "day", "get", "has", "him", "his", "how", "its", "new", "now",
        "old", "see", "two", "who", "boy", "did", "reddit", "post", "this", "that", "with",
        "have", "from", "they", "know", "want", "been", "good", "much", "some", "time",
        "very", "when", "come", "here", "just", "like", "long", "make", "many", "over",
        "such", "take", "than", "them", "well", "were", "will", "would", "your", "about",
        "could", "there", "other", "after", "first", "never", "these", "think", "where",
        "being", "every", "great", "might", "shall", "still", "those", "under", "while",
        "along", "found", "house", "large", "right", "small", "sound", "again", "place",
        "three", "years", "before", "little", "should", "world", "going", "number",
        "people", "called", "during", "really", "though",
    ]
    .into_iter()
    .collect()
});

const PAIN_KEYWORDS: &[&str] = &[
    "pain", "hurt", "ache", "sore", "relief", "chronic", "suffering", "uncomfortable",
    "stiff", "tender", "throbbing", "burning", "sharp", "dull", "constant", "severe",
    "mild", "moderate", "can't sleep", "sleepless", "insomnia", "tired", "exhausted",
    "inflammation", "swollen", "numb", "tingling", "weakness", "mobility", "difficulty",
    "struggle", "help", "solution", "treatment", "therapy", "medication", "supplement",
    "device", "product", "recommend", "suggestion", "advice", "what works",
];

static PAIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(my|have|got|experiencing)\s+\w*pain\w*",
        r"\b(relief|help|solution)\s+(for|with|from)",
        r"\b(what|any|best)\s+\w*\s+(works|helps|relieves)",
        r"\b(recommend|suggest|advice)\s+\w*\s+(for|to)",
        r"\b(can't|cannot|unable)\s+(sleep|walk|sit|stand|move)",
        r"\b(need|looking for|searching for)\s+\w*\s+(help|relief|solution)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const CATEGORIES: &[(&str, &[&str])] = &[
    ("Back Pain", &["back", "spine", "lumbar", "sciatica", "disc"]),
    ("Neck Pain", &["neck", "cervical", "whiplash"]),
    ("Knee Pain", &["knee", "patella", "meniscus"]),
    ("Foot Care", &["foot", "feet", "plantar", "heel", "arch", "toe"]),
    ("Sleep Issues", &["sleep", "insomnia", "tired", "exhausted", "bed"]),
    ("Joint Pain", &["joint", "arthritis", "rheumatoid", "osteoarthritis"]),
    ("Muscle Pain", &["muscle", "strain", "spasm", "cramp"]),
    ("Headache/Migraine", &["headache", "migraine", "head", "temple"]),
    ("Shoulder Pain", &["shoulder", "rotator", "cuff"]),
    ("General Pain", &["chronic", "fibromyalgia", "widespread", "overall"]),
];

pub const MAX_KEYWORDS_PER_POST: usize = 5;

/// Product-ish keywords from a post title: bracketed/parenthesised text removed,
/// stop words dropped, words shorter than 4 letters dropped, at most 5 kept.
pub fn extract_keywords(title: &str) -> Vec<String> {
    let cleaned = RE_BRACKETED.replace_all(title, " ").to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for m in RE_WORD.find_iter(&cleaned) {
        let w = m.as_str();
        if w.len() <= 3 || STOP_WORDS.contains(w) || out.iter().any(|o| o == w) {
            continue;
        }
        out.push(w.to_string());
        if out.len() == MAX_KEYWORDS_PER_POST {
            break;
        }
    }
    out
}

/// Lowercase alphanumeric tokens (3+ chars) used for overlap scoring.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    RE_TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_pain_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    if PAIN_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return true;
    }
    PAIN_PATTERNS.iter().any(|re| re.is_match(&lower))
}

/// First matching problem category, "General Pain" otherwise.
pub fn problem_category(title: &str, content: &str) -> &'static str {
    let combined = format!("{title} {content}").to_lowercase();
    CATEGORIES
        .iter()
        .find(|(_, words)| words.iter().any(|w| combined.contains(w)))
        .map(|(name, _)| *name)
        .unwrap_or("General Pain")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_skip_brackets_and_stop_words() {
        let kw = extract_keywords("[Request] The best lumbar cushion (for office chairs) that works");
        assert_eq!(kw, vec!["best", "lumbar", "cushion", "works"]);
    }

    #[test]
    fn keywords_are_capped_and_unique() {
        let kw = extract_keywords("heated heated massage pillow blanket insoles brace sleeve");
        assert_eq!(kw.len(), MAX_KEYWORDS_PER_POST);
        assert_eq!(kw[0], "heated");
        assert_eq!(kw[1], "massage");
    }

    #[test]
    fn pain_detection_uses_words_and_patterns() {
        assert!(is_pain_related("My lower back is killing me, any relief?"));
        assert!(is_pain_related("Cannot sleep since the move"));
        assert!(!is_pain_related("Look at this cool keyboard I built"));
    }

    #[test]
    fn category_falls_back_to_general() {
        assert_eq!(problem_category("Plantar fasciitis again", ""), "Foot Care");
        assert_eq!(problem_category("Everything aches", "no idea"), "General Pain");
    }

    #[test]
    fn tokenize_lowercases_and_drops_short_tokens() {
        let t = tokenize("Memory FOAM pad, 3D fit");
        assert!(t.contains("memory"));
        assert!(t.contains("foam"));
        assert!(!t.contains("3d"));
    }
}
