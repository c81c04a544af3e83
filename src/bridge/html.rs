//! Markdown → HTML for seeding a fresh document.
//!
//! Rendering goes through pulldown-cmark with strikethrough and GFM tables
//! enabled. The parser never fails: malformed Markdown renders as
//! best-effort HTML.
//!
//! Stored Markdown written before inline images were disallowed may still
//! hold `![alt](data:…)`. Those images are rendered as their alt text so the
//! seeded document carries no binary data. Raw HTML in the Markdown can carry
//! the same data (`<img src="data:…">`); when it does, the rendered HTML is
//! parsed and every element with an inline `src`, `srcset` or `poster` is
//! removed.

use crate::fragment::{Element, Fragment};
use crate::pipeline::decode::{is_inline_binary, srcset_has_inline_binary, INLINE_SCHEME};
use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use tracing::warn;

/// Convert Markdown to an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut in_inline_image = false;
    let mut raw_inline_data = false;
    let parser = Parser::new_ext(markdown, options).filter_map(|event| match event {
        Event::Start(Tag::Image { ref dest_url, .. }) if is_inline_binary(dest_url) => {
            warn!("Rendering inline binary image as its alt text");
            in_inline_image = true;
            None
        }
        Event::End(TagEnd::Image) if in_inline_image => {
            in_inline_image = false;
            None
        }
        Event::Html(ref raw) | Event::InlineHtml(ref raw) => {
            raw_inline_data |= mentions_inline_scheme(raw);
            Some(event)
        }
        other => Some(other),
    });

    let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut html_output, parser);

    if raw_inline_data {
        drop_inline_binary_elements(&html_output)
    } else {
        html_output
    }
}

fn mentions_inline_scheme(raw: &str) -> bool {
    raw.to_ascii_lowercase().contains(INLINE_SCHEME)
}

fn carries_inline_binary(el: &Element) -> bool {
    el.attr("src").is_some_and(is_inline_binary)
        || el.attr("poster").is_some_and(is_inline_binary)
        || el.attr("srcset").is_some_and(srcset_has_inline_binary)
}

/// Re-parse rendered HTML and remove every element that embeds binary data.
fn drop_inline_binary_elements(rendered: &str) -> String {
    match Fragment::parse_with_limit(rendered, usize::MAX) {
        Ok(mut fragment) => {
            let mut dropped = 0usize;
            fragment.remove_elements(&mut |el| {
                let hit = carries_inline_binary(el);
                dropped += usize::from(hit);
                hit
            });
            if dropped > 0 {
                warn!("Dropped {} raw HTML element(s) with inline binary data", dropped);
            }
            fragment.to_html()
        }
        Err(e) => {
            warn!("Could not re-read rendered HTML ({}); dropping its markup", e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_core_constructs() {
        let html = markdown_to_html("# Title\n\nSome **bold** and *em* and ~~gone~~.\n\n> quote\n\n- a\n- b\n");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<em>em</em>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<blockquote>"));
        assert!(html.contains("<li>a</li>"));
    }

    #[test]
    fn renders_fenced_code_with_language() {
        let html = markdown_to_html("```rust\nfn main() {}\n```");
        assert!(html.contains(r#"<code class="language-rust">fn main() {}"#));
    }

    #[test]
    fn renders_tables() {
        let html = markdown_to_html("| A | B |\n| --- | --- |\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>A</th>"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn inline_binary_image_becomes_alt_text() {
        let html = markdown_to_html("before ![chart](data:image/png;base64,AAAA) after");
        assert!(!html.contains("data:"));
        assert!(!html.contains("<img"));
        assert!(html.contains("before chart after"));
    }

    #[test]
    fn raw_html_inline_image_is_dropped() {
        let html = markdown_to_html(
            "Intro\n\n<img src=\"data:image/png;base64,AAAA\">\n\ntext <img alt=\"x\" src=\"DATA:image/png;base64,AAAA\"> end",
        );
        assert!(!html.to_ascii_lowercase().contains("data:"), "{html}");
        assert!(!html.contains("<img"));
        assert!(html.contains("<p>Intro</p>"));
        assert!(html.contains("text  end"));
    }

    #[test]
    fn raw_html_picture_with_inline_source_is_cleaned() {
        let html = markdown_to_html(
            "<picture><source srcset=\"data:image/webp;base64,AAAA 2x\"><img src=\"https://cdn/a.png\"></picture>",
        );
        assert!(!html.contains("data:"), "{html}");
        assert!(html.contains(r#"<img src="https://cdn/a.png">"#));
    }

    #[test]
    fn raw_html_without_inline_data_is_untouched() {
        let md = "<div class=\"note\">\n<img src=\"https://cdn/a.png\">\n</div>";
        let html = markdown_to_html(md);
        assert!(html.contains(r#"<div class="note">"#));
        assert!(html.contains(r#"<img src="https://cdn/a.png">"#));
    }

    #[test]
    fn uploaded_image_is_kept() {
        let html = markdown_to_html("![a](http://localhost:4000/uploads/images/1_a.png)");
        assert!(html.contains(r#"<img src="http://localhost:4000/uploads/images/1_a.png" alt="a""#));
    }

    #[test]
    fn malformed_input_does_not_panic() {
        let html = markdown_to_html("**unclosed *mixed _emphasis\n\n```\nno close\n\n| a |\n|");
        assert!(!html.is_empty());
        assert_eq!(markdown_to_html(""), "");
    }
}
