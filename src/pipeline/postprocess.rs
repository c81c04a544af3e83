//! Post-processing: deterministic cleanup of generated Markdown.
//!
//! ## Why is post-processing necessary?
//!
//! The HTML → Markdown writer works block by block and does not know what
//! its neighbours produced. Pasted and edited documents also carry artefacts
//! that survive into the text:
//!
//! - Windows-style `\r\n` line endings inside text nodes
//! - Trailing spaces left behind by `&nbsp;` runs and removed inline nodes
//! - Several blank lines where empty paragraphs used to be
//! - Zero-width spaces, BOMs and soft hyphens copied out of word processors
//!
//! This module applies a handful of cheap, deterministic rules that fix those
//! without touching content. Running the same rules on every conversion is
//! what makes Markdown → HTML → Markdown stable.
//!
//! ## Fenced code
//!
//! Code blocks are content: every rule except line-ending normalisation
//! leaves lines inside a fenced block untouched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to writer output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Remove image links whose source is inline binary data
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to a single blank line
/// 6. Trim the document (no leading blank lines, no trailing newline)
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_inline_images(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_document(&s)
}

// ── Fence tracking ───────────────────────────────────────────────────────────

/// Split into lines, flagging those inside a fenced code block. Fence lines
/// themselves are not flagged.
fn classify_lines(input: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    let mut open: Option<(char, usize)> = None;

    for line in input.split('\n') {
        match (open, fence_marker(line)) {
            (None, Some(marker)) => {
                open = Some(marker);
                out.push((line, false));
            }
            (Some((ch, len)), Some((close_ch, close_len)))
                if close_ch == ch && close_len >= len && is_bare_fence(line) =>
            {
                open = None;
                out.push((line, false));
            }
            (Some(_), _) => out.push((line, true)),
            (None, None) => out.push((line, false)),
        }
    }
    out
}

/// `(fence char, run length)` when the line opens or closes a fence. Quote
/// prefixes and indentation are skipped.
fn fence_marker(line: &str) -> Option<(char, usize)> {
    let body = strip_container_prefix(line);
    let ch = body.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = body.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn is_bare_fence(line: &str) -> bool {
    let body = strip_container_prefix(line).trim_end();
    body.chars().all(|c| c == '`' || c == '~')
}

fn strip_container_prefix(line: &str) -> &str {
    line.trim_start_matches(|c: char| c == '>' || c == ' ' || c == '\t')
}

fn map_outside_fences(input: &str, f: impl Fn(&str) -> String) -> String {
    classify_lines(input)
        .into_iter()
        .map(|(line, in_code)| if in_code { line.to_string() } else { f(line) })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove inline-binary image links ─────────────────────────────────
//
// The writer already refuses to emit `data:` images; this catches any that
// arrive through raw text so binary data never reaches stored Markdown. The
// alt text is kept as plain text. Inline code spans are author text and are
// left alone.

static RE_INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)!\[([^\]]*)\]\(\s*<?data:[^)]*\)").unwrap());

fn remove_inline_images(input: &str) -> String {
    map_outside_fences(input, |line| {
        map_outside_code_spans(line, |text| {
            RE_INLINE_IMAGE
                .replace_all(text, |caps: &regex::Captures<'_>| caps[1].trim().to_string())
                .to_string()
        })
    })
}

/// Apply `f` to the parts of `line` outside inline code spans. A backtick
/// run opens a span only when the same line has a closing run of the same
/// length.
fn map_outside_code_spans(line: &str, f: impl Fn(&str) -> String) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut plain_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        if i > 0 && bytes[i - 1] == b'\\' {
            i += 1;
            continue;
        }
        let open = backtick_run(bytes, i);
        match closing_run(bytes, i + open, open) {
            Some(close) => {
                let end = close + open;
                out.push_str(&f(&line[plain_start..i]));
                out.push_str(&line[i..end]);
                plain_start = end;
                i = end;
            }
            None => i += open,
        }
    }
    out.push_str(&f(&line[plain_start..]));
    out
}

fn backtick_run(bytes: &[u8], at: usize) -> usize {
    bytes[at..].iter().take_while(|b| **b == b'`').count()
}

fn closing_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let run = backtick_run(bytes, i);
            if run == len {
                return Some(i);
            }
            i += run;
        } else {
            i += 1;
        }
    }
    None
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    map_outside_fences(input, |line| {
        line.replace(
            [
                '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
            ],
            "",
        )
    })
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    map_outside_fences(input, |line| line.trim_end().to_string())
}

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut prev_blank = false;
    for (line, in_code) in classify_lines(input) {
        let blank = !in_code && line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        prev_blank = blank;
        result.push(line);
    }
    result.join("\n")
}

// ── Rule 6: Trim the document ────────────────────────────────────────────────

fn trim_document(input: &str) -> String {
    input.trim_start_matches('\n').trim_end().to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_trim_keeps_code_whitespace() {
        let input = "text  \n```\ncode  \n```\nmore  ";
        assert_eq!(
            trim_trailing_whitespace(input),
            "text\n```\ncode  \n```\nmore"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_collapse_keeps_code_blank_lines() {
        let input = "```\na\n\n\n\nb\n```";
        assert_eq!(collapse_blank_lines(input), input);
    }

    #[test]
    fn test_tilde_fence_not_closed_by_backticks() {
        let input = "~~~\n```\n\n\n~~~\n\n\nafter";
        assert_eq!(collapse_blank_lines(input), "~~~\n```\n\n\n~~~\n\nafter");
    }

    #[test]
    fn test_fence_inside_blockquote() {
        let lines = classify_lines("> ```\n> code  \n> ```\ntext");
        let flags: Vec<bool> = lines.iter().map(|(_, c)| *c).collect();
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_remove_inline_image() {
        let input = "See ![chart](data:image/png;base64,AAAA) here";
        assert_eq!(remove_inline_images(input), "See chart here");
    }

    #[test]
    fn test_inline_image_in_code_span_is_kept() {
        let input = "Write `![x](data:image/png;base64,AAAA)` not ![y](data:image/png;base64,BBBB)";
        assert_eq!(
            remove_inline_images(input),
            "Write `![x](data:image/png;base64,AAAA)` not y"
        );
        let double = "``a ` ![x](data:,A) b`` ![z](data:,B)";
        assert_eq!(remove_inline_images(double), "``a ` ![x](data:,A) b`` z");
    }

    #[test]
    fn test_unclosed_backtick_does_not_shield() {
        let input = "a ` ![x](data:image/png;base64,AAAA)";
        assert_eq!(remove_inline_images(input), "a ` x");
        assert_eq!(remove_inline_images("\\`![x](data:,A)`"), "\\`x`");
    }

    #[test]
    fn test_keep_uploaded_image() {
        let input = "![Figure](http://localhost:4000/uploads/images/1_a.png)";
        assert_eq!(remove_inline_images(input), input);
    }

    #[test]
    fn test_trim_document() {
        assert_eq!(trim_document("\n\n# Title\n\n"), "# Title");
        assert_eq!(trim_document(""), "");
    }

    #[test]
    fn test_clean_markdown_full_pipeline() {
        let input = "\n# Title\r\n\r\nSome text\u{200B}   \n\n\n\n\n## Section\n\n```\nkeep  \n\n\n```\n\n";
        let result = clean_markdown(input);
        assert_eq!(
            result,
            "# Title\n\nSome text\n\n## Section\n\n```\nkeep  \n\n\n```"
        );
    }

    #[test]
    fn test_clean_markdown_is_idempotent() {
        let input = "a  \n\n\n\nb\r\n```\nx\n```\n";
        let once = clean_markdown(input);
        assert_eq!(clean_markdown(&once), once);
    }
}
