//! Plain-text cleanup for BGG descriptions.
//!
//! BGG ships prose with markup fragments and double-encoded entities; the
//! short-description derivation is a paragraph/sentence heuristic, not NLP.

/// Hard cap for derived short descriptions, including the ellipsis.
const SHORT_CAP: usize = 300;

/// Remove tag-like `<...>` spans and decode the entity handful BGG actually
/// emits. No full HTML parsing: the payloads are entity-encoded prose.
pub fn strip_markup(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }
    normalize_whitespace(&decode_entities(&stripped))
}

fn decode_entities(text: &str) -> String {
    // &amp; first: BGG double-encodes, so "&amp;#10;" must collapse to
    // "&#10;" before the numeric pass sees it.
    text.replace("&amp;", "&")
        .replace("&#10;", "\n")
        .replace("&#13;", "")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&mdash;", "\u{2014}")
        .replace("&ndash;", "\u{2013}")
        .replace("&hellip;", "\u{2026}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Trim line ends, drop CRs, and collapse runs of blank lines to a single
/// blank line so paragraph detection has a stable shape to work with.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.replace('\r', "").lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line);
    }
    out
}

/// Derive a one-to-two-sentence teaser from a long description.
///
/// Priority: (a) the first paragraph when its length lands in [50, 250];
/// (b) the first sentence, joined with the second when both are short;
/// (c) a raw 200-character prefix. Whatever the path, the result never
/// exceeds 300 characters.
pub fn derive_short_description(long: &str) -> String {
    let text = long.trim();
    if text.is_empty() {
        return String::new();
    }

    let candidate = paragraph_candidate(text)
        .or_else(|| sentence_candidate(text))
        .unwrap_or_else(|| prefix_candidate(text));
    cap_chars(&candidate, SHORT_CAP)
}

fn paragraph_candidate(text: &str) -> Option<String> {
    let paragraph = text.split("\n\n").next()?.trim().replace('\n', " ");
    let len = paragraph.chars().count();
    if (50..=250).contains(&len) {
        Some(ensure_terminal_punctuation(paragraph))
    } else {
        None
    }
}

fn sentence_candidate(text: &str) -> Option<String> {
    let flat = text.replace('\n', " ");
    let mut sentences = split_sentences(&flat).into_iter();
    let first = sentences.next()?;
    let second = sentences.next();

    match second {
        Some(second)
            if first.chars().count() < 100 && second.chars().count() < 100 =>
        {
            Some(format!("{} {}", first, second))
        }
        _ => Some(first),
    }
}

fn prefix_candidate(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let prefix: String = flat.chars().take(200).collect();
    format!("{}\u{2026}", prefix.trim_end())
}

/// Split on `.!?`, keeping the terminator with its sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() && sentences.is_empty() {
        // No sentence boundary at all: let the caller fall through on empty.
        return Vec::new();
    }
    sentences
}

/// First sentence of `text`, truncated to `cap` characters. Used as the
/// summary fallback when the translation backend cannot summarize.
pub fn first_sentence_summary(text: &str, cap: usize) -> String {
    let flat = text.replace('\n', " ");
    match split_sentences(&flat).into_iter().next() {
        Some(sentence) => cap_chars(&sentence, cap),
        None => cap_chars(flat.trim(), cap),
    }
}

fn ensure_terminal_punctuation(mut text: String) -> String {
    if !text.ends_with(['.', '!', '?', '\u{2026}']) {
        text.push('.');
    }
    text
}

pub(crate) fn cap_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let prefix: String = text.chars().take(cap - 3).collect();
    format!("{}\u{2026}", prefix.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let raw = "A game of <b>trading</b> &amp; building.&#10;&#10;Second paragraph.";
        let clean = strip_markup(raw);
        assert_eq!(clean, "A game of trading & building.\n\nSecond paragraph.");
    }

    #[test]
    fn strips_double_encoded_newlines() {
        // BGG thing payloads arrive XML-escaped once more: &amp;#10;
        // becomes &#10; after the XML layer, then a newline here.
        let clean = strip_markup("one&amp;#10;two");
        assert_eq!(clean, "one\ntwo");
    }

    #[test]
    fn unclosed_tag_swallows_to_end() {
        assert_eq!(strip_markup("before <i oops"), "before");
    }

    #[test]
    fn first_paragraph_in_range_wins() {
        let long = format!(
            "{}\n\n{}",
            "In Catan players collect resources and build settlements on a hex map",
            "A much longer second paragraph that should never be considered by the heuristic at all."
        );
        let short = derive_short_description(&long);
        assert_eq!(
            short,
            "In Catan players collect resources and build settlements on a hex map."
        );
    }

    #[test]
    fn paragraph_keeps_existing_terminal_punctuation() {
        let long = "Will your expedition survive the journey across the frozen wastes of the south?\n\nMore text.";
        let short = derive_short_description(long);
        assert!(short.ends_with('?'));
        assert!(!short.ends_with("?."));
    }

    #[test]
    fn short_first_paragraph_falls_back_to_sentences() {
        // First paragraph below 50 chars -> sentence branch, which joins two
        // short sentences.
        let long = "A tiny opener. It has a second short sentence.\n\nIgnored paragraph body follows here.";
        let short = derive_short_description(long);
        assert_eq!(short, "A tiny opener. It has a second short sentence.");
    }

    #[test]
    fn long_first_sentence_stands_alone() {
        // Paragraph too long for branch (a); first sentence >= 100 chars so
        // the second is not joined.
        let first = format!("{}.", "a".repeat(119));
        let second = format!("{}.", "b".repeat(199));
        let long = format!("{} {}", first, second);
        let short = derive_short_description(&long);
        assert_eq!(short, first);
    }

    #[test]
    fn no_sentence_boundary_takes_prefix_with_ellipsis() {
        let long = "word ".repeat(120); // 600 chars, no terminator, paragraph too long
        let short = derive_short_description(&long);
        assert!(short.ends_with('\u{2026}'));
        assert!(short.chars().count() <= 201);
    }

    #[test]
    fn result_is_hard_capped_at_300_chars() {
        // One 400-char sentence: branch (b) fires, the cap trims it.
        let long = format!("{}.", "x".repeat(400));
        let short = derive_short_description(&long);
        assert_eq!(short.chars().count(), 298);
        assert!(short.ends_with('\u{2026}'));
    }

    #[test]
    fn full_length_paragraph_still_derives_a_bounded_teaser() {
        let first = "The expedition sets out across the ice with three sledges and a stubborn dog team.";
        let rest = "s".repeat(300 - first.len() - 1);
        let long = format!("{} {}", first, rest);
        let short = derive_short_description(&long);
        assert!(short.chars().count() <= 300);
        assert!(short.ends_with(['.', '!', '?', '\u{2026}']));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(derive_short_description("   "), "");
    }
}
