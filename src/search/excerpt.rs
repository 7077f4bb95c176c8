//! Text normalization, excerpts and highlighting

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>").unwrap()
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SHORTCODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[/?[a-zA-Z_][^\]]*\]").unwrap());
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x?)([0-9a-fA-F]+);").unwrap());
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?。！？]+|\n+").unwrap());

const ELLIPSIS: &str = "...";

/// Plain text from markup: tags and shortcodes removed, entities decoded,
/// whitespace collapsed
pub fn strip_markup(input: &str) -> String {
    let without_scripts = SCRIPT_STYLE.replace_all(input, " ");
    let without_tags = TAG.replace_all(&without_scripts, " ");
    let without_shortcodes = SHORTCODE.replace_all(&without_tags, " ");
    collapse_whitespace(&decode_entities(&without_shortcodes))
}

/// Decode the common named entities and numeric character references
pub fn decode_entities(input: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(input, |caps: &regex::Captures| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&hellip;", "…")
        .replace("&mdash;", "—")
        .replace("&ndash;", "–")
        .replace("&amp;", "&")
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters, with an ellipsis when anything was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", text[..byte_idx].trim_end(), ELLIPSIS),
        None => text.to_string(),
    }
}

/// Split text into trimmed, non-empty sentences
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_END.find_iter(text) {
        let sentence = text[start..boundary.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = boundary.end();
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

fn count_matches(haystack_lower: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .filter(|term| !term.is_empty() && haystack_lower.contains(term.as_str()))
        .count()
}

/// The two sentences matching most query terms, highest scoring first,
/// clipped to `max_chars` around the first match.
///
/// Returns `None` when no sentence contains any term.
pub fn best_sentences(body: &str, terms: &[String], max_chars: usize) -> Option<String> {
    let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();

    let mut scored: Vec<(usize, usize, String)> = split_sentences(body)
        .into_iter()
        .enumerate()
        .filter_map(|(position, sentence)| {
            let score = count_matches(&sentence.to_lowercase(), &terms);
            (score > 0).then_some((score, position, sentence))
        })
        .collect();

    // Score desc, position asc
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut picked: Vec<String> = Vec::with_capacity(2);
    for (_, _, sentence) in scored {
        if !picked.contains(&sentence) {
            picked.push(sentence);
        }
        if picked.len() == 2 {
            break;
        }
    }

    if picked.is_empty() {
        None
    } else {
        Some(clip_around_match(&picked.join(" "), &terms, max_chars))
    }
}

/// At most `max_chars` characters of `text`. When the first lowercase term
/// sits late in the text the window starts shortly before it.
fn clip_around_match(text: &str, terms: &[String], max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let lower = text.to_lowercase();
    let first_match = terms
        .iter()
        .filter(|term| !term.is_empty())
        .filter_map(|term| lower.find(term.as_str()))
        .min()
        .map(|byte_idx| lower[..byte_idx].chars().count())
        .unwrap_or(0);

    let lead = if first_match < max_chars * 3 / 4 {
        0
    } else {
        first_match - max_chars / 4
    };

    match text.char_indices().nth(lead) {
        Some((start, _)) if lead > 0 => {
            format!("{}{}", ELLIPSIS, truncate_chars(text[start..].trim_start(), max_chars))
        }
        _ => truncate_chars(text, max_chars),
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// HTML-escape `text` and wrap every case-insensitive occurrence of a term in
/// `<mark>` tags
pub fn highlight(text: &str, terms: &[String]) -> String {
    let mut alternatives: Vec<String> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| regex::escape(t))
        .collect();

    if alternatives.is_empty() {
        return escape_html(text);
    }

    // Longest first so "vuex" wins over "vue"
    alternatives.sort_by(|a, b| b.len().cmp(&a.len()));
    alternatives.dedup();

    let pattern = match Regex::new(&format!("(?i){}", alternatives.join("|"))) {
        Ok(pattern) => pattern,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build highlight pattern");
            return escape_html(text);
        }
    };

    let mut marked = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for found in pattern.find_iter(text) {
        marked.push_str(&escape_html(&text[last..found.start()]));
        marked.push_str("<mark>");
        marked.push_str(&escape_html(found.as_str()));
        marked.push_str("</mark>");
        last = found.end();
    }
    marked.push_str(&escape_html(&text[last..]));
    marked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let html = "<p>Hello&nbsp;<b>world</b></p>\n<script>alert(1)</script>[gallery id=\"3\"] &amp; more";
        assert_eq!(strip_markup(html), "Hello world & more");
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_entities("caf&#233; &#x263A;"), "café ☺");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("日本語のテキスト", 3), "日本語...");
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First one. Second one!\nThird？最後。");
        assert_eq!(
            sentences,
            vec!["First one.", "Second one!", "Third？", "最後。"]
        );
    }

    #[test]
    fn test_best_sentences() {
        let body = "Intro text. Vue router handles navigation. Styling is separate. Vue components are reusable.";
        let terms = vec!["vue".to_string(), "router".to_string()];

        let excerpt = best_sentences(body, &terms, 200).unwrap();
        assert_eq!(
            excerpt,
            "Vue router handles navigation. Vue components are reusable."
        );

        assert!(best_sentences(body, &["angular".to_string()], 200).is_none());
    }

    #[test]
    fn test_unpunctuated_body_is_clipped() {
        let terms = vec!["needle".to_string()];

        let early = format!("needle {}", "hay ".repeat(100));
        let excerpt = best_sentences(&early, &terms, 20).unwrap();
        assert!(excerpt.starts_with("needle hay"));
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 23);

        let late = format!("{}Needle {}", "word ".repeat(100), "tail ".repeat(50));
        let excerpt = best_sentences(&late, &terms, 40).unwrap();
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.contains("Needle"));
        assert!(excerpt.chars().count() <= 46);
    }

    #[test]
    fn test_highlight_escapes_and_marks() {
        let marked = highlight("Learn <Vue> & vue", &["vue".to_string()]);
        assert_eq!(marked, "Learn &lt;<mark>Vue</mark>&gt; &amp; <mark>vue</mark>");
    }

    #[test]
    fn test_highlight_does_not_touch_entities() {
        assert_eq!(highlight("a < lt", &["lt".to_string()]), "a &lt; <mark>lt</mark>");
    }

    #[test]
    fn test_highlight_without_terms() {
        assert_eq!(highlight("a < b", &[]), "a &lt; b");
    }
}
