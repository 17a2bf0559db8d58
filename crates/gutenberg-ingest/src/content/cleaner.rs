// Boilerplate stripping for Project Gutenberg plain-text editions
//
// Every text edition wraps the book between
//   *** START OF THE PROJECT GUTENBERG EBOOK <TITLE> ***
//   *** END OF THE PROJECT GUTENBERG EBOOK <TITLE> ***
// with license text and transcriber notes outside the markers.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Return the text between the start/end markers for `title`
///
/// Matching is case-insensitive and spans newlines. Whitespace inside the
/// title matches any whitespace run, since descriptor titles and text
/// headers wrap lines differently. When the markers are missing, or only
/// whitespace sits between them, the input is returned unchanged.
pub fn extract_book_content(title: &str, text: &str) -> String {
    let Some(pattern) = marker_pattern(title) else {
        return text.to_string();
    };

    match pattern.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) if !body.as_str().trim().is_empty() => body.as_str().trim().to_string(),
        _ => {
            debug!(title, "Boilerplate markers not found, keeping full text");
            text.to_string()
        }
    }
}

fn marker_pattern(title: &str) -> Option<Regex> {
    let title = title
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    if title.is_empty() {
        return None;
    }

    let marker = |kind: &str| format!(r"\*{{3}}\s*{kind} of[^*]*?ebook\s+{title}\s*\*{{3}}");
    let source = format!("{}(.+){}", marker("start"), marker("end"));

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markers() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK EXAMPLE ***\nBODY\n*** END OF THE PROJECT GUTENBERG EBOOK EXAMPLE ***";
        assert_eq!(extract_book_content("EXAMPLE", text), "BODY");
    }

    #[test]
    fn test_no_markers_returns_input() {
        let text = "Just some text\nwithout any markers.";
        assert_eq!(extract_book_content("EXAMPLE", text), text);
    }

    #[test]
    fn test_case_insensitive_with_license_around() {
        let text = "License header\r\n\
                    *** Start of the Project Gutenberg eBook Pride and Prejudice ***\r\n\
                    It is a truth universally acknowledged...\r\n\
                    *** end of the project gutenberg ebook PRIDE AND PREJUDICE ***\r\n\
                    License footer";
        assert_eq!(
            extract_book_content("Pride and Prejudice", text),
            "It is a truth universally acknowledged..."
        );
    }

    #[test]
    fn test_wrapped_title_and_regex_metacharacters() {
        let title = "Frankenstein; Or, The Modern Prometheus (1818)";
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK FRANKENSTEIN; OR, THE\nMODERN PROMETHEUS (1818) ***\nLetter 1\n*** END OF THE PROJECT GUTENBERG EBOOK FRANKENSTEIN; OR, THE MODERN PROMETHEUS (1818) ***";
        assert_eq!(extract_book_content(title, text), "Letter 1");
    }

    #[test]
    fn test_empty_body_returns_input() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK X ***\n   \n*** END OF THE PROJECT GUTENBERG EBOOK X ***";
        assert_eq!(extract_book_content("X", text), text);
    }

    #[test]
    fn test_other_title_does_not_match() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK A ***\nB\n*** END OF THE PROJECT GUTENBERG EBOOK A ***";
        assert_eq!(extract_book_content("Z", text), text);
    }
}
