//! HTML → Markdown writer over the owned fragment tree.
//!
//! The writer is deterministic and total: every element either maps onto a
//! Markdown construct or contributes its children. Unknown inline elements
//! (`span`, `u`, `font`, …) pass their content through; unknown block-level
//! wrappers (`div`, `section`, a `<b>` around whole paragraphs) are treated
//! as containers.
//!
//! Output conventions:
//!
//! | HTML | Markdown |
//! |------|----------|
//! | `<h1>`…`<h6>` | `#`…`######` (ATX) |
//! | `<strong>`, `<b>` | `**x**` |
//! | `<em>`, `<i>` | `*x*` or `_x_` |
//! | `<s>`, `<del>`, `<strike>` | `~~x~~` |
//! | `<code>` | `` `x` `` |
//! | `<ul>` / `<ol start=n>` | `- x` / `n. x` |
//! | `<blockquote>` | `> x` |
//! | `<pre><code class="language-x">` | fenced block with info string `x` |
//! | `<img>` / `<a>` | `![alt](src "title")` / `[text](href "title")` |
//! | `<br>` | backslash hard break |
//! | `<table>` | GFM pipe table |
//!
//! Images whose source is a `data:` URI are never written.

use crate::config::{EmphasisStyle, MarkdownStyle};
use crate::fragment::{Element, Fragment, Node};
use crate::pipeline::decode::is_inline_binary;
use crate::pipeline::postprocess::clean_markdown;
use tracing::warn;

/// Stand-in for `<br>` while inline content is assembled. Text nodes never
/// contain it once whitespace is collapsed.
const HARD_BREAK: char = '\n';

const BLOCK_SEP: &str = "\n\n";

/// Stand-ins for `_` emphasis delimiters until the run around them is
/// complete. Control characters never survive whitespace collapsing.
const UNDERSCORE_OPEN: char = '\u{1}';
const UNDERSCORE_CLOSE: char = '\u{2}';

/// Elements whose content is never author text.
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "link", "meta", "noscript", "script", "style", "template", "title",
];

/// Convert a parsed fragment to Markdown.
pub fn fragment_to_markdown(fragment: &Fragment, style: MarkdownStyle) -> String {
    let writer = Writer { style };
    clean_markdown(&writer.blocks(&fragment.children, BLOCK_SEP))
}

/// Escape plain text so it reads back as the same text.
pub fn escape_plain_text(text: &str) -> String {
    text.split('\n')
        .map(|line| escape_line_start(&escape_text(collapse_whitespace(line).trim())))
        .collect::<Vec<_>>()
        .join("\n")
}

struct Writer {
    style: MarkdownStyle,
}

// ── Blocks ───────────────────────────────────────────────────────────────

impl Writer {
    /// Render a sequence of nodes as blocks joined by `sep`. Runs of inline
    /// nodes between blocks become paragraphs.
    fn blocks(&self, nodes: &[Node], sep: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        let mut run: Vec<&Node> = Vec::new();

        for node in nodes {
            match node {
                Node::Comment(_) => {}
                Node::Element(el) if is_skipped(el) => {}
                Node::Element(el) if el.is_block() || el.contains_block() => {
                    self.flush_paragraph(&mut run, &mut out);
                    if let Some(block) = self.block(el, sep) {
                        out.push(block);
                    }
                }
                _ => run.push(node),
            }
        }
        self.flush_paragraph(&mut run, &mut out);
        out.join(sep)
    }

    fn flush_paragraph(&self, run: &mut Vec<&Node>, out: &mut Vec<String>) {
        if run.is_empty() {
            return;
        }
        let mut inline = String::new();
        for node in run.drain(..) {
            self.inline_node(node, &mut inline);
        }
        if let Some(paragraph) = finish_paragraph(&inline) {
            out.push(paragraph);
        }
    }

    fn block(&self, el: &Element, sep: &str) -> Option<String> {
        match el.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.heading(el),
            "p" => {
                let mut inline = String::new();
                self.inline_children(&el.children, &mut inline);
                finish_paragraph(&inline)
            }
            "ul" => self.list(el, false),
            "ol" => self.list(el, true),
            "blockquote" => self.quote(el),
            "pre" => Some(self.code_block(el)),
            "hr" => Some("---".to_string()),
            "table" => self.table(el),
            _ => non_empty(self.blocks(&el.children, sep)),
        }
    }

    fn heading(&self, el: &Element) -> Option<String> {
        let level = el.name[1..].parse::<usize>().unwrap_or(1);
        let mut inline = String::new();
        self.inline_children(&el.children, &mut inline);
        let text = single_line(&inline);
        if text.is_empty() {
            return None;
        }
        // A trailing `#` would read as a closing sequence.
        let text = match text.strip_suffix('#') {
            Some(head) => format!("{head}\\#"),
            None => text,
        };
        Some(format!("{} {}", "#".repeat(level), text))
    }

    fn list(&self, el: &Element, ordered: bool) -> Option<String> {
        let start: u64 = if ordered {
            el.attr("start")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(1)
        } else {
            0
        };
        let loose = el.children.iter().filter_map(Node::as_element).any(|li| {
            li.children
                .iter()
                .filter_map(Node::as_element)
                .any(|c| c.name == "p")
        });
        let item_sep = if loose { BLOCK_SEP } else { "\n" };

        let mut items = Vec::new();
        for node in &el.children {
            let Node::Element(item) = node else { continue };
            if is_skipped(item) {
                continue;
            }
            let body = if item.name == "li" {
                self.blocks(&item.children, item_sep)
            } else {
                self.blocks(std::slice::from_ref(node), item_sep)
            };
            let marker = if ordered {
                format!("{}.", start + items.len() as u64)
            } else {
                self.style.bullet.as_char().to_string()
            };
            items.push(indent_item(&marker, &body));
        }

        if items.is_empty() {
            None
        } else {
            Some(items.join(item_sep))
        }
    }

    fn quote(&self, el: &Element) -> Option<String> {
        let inner = self.blocks(&el.children, BLOCK_SEP);
        if inner.trim().is_empty() {
            return None;
        }
        Some(
            inner
                .split('\n')
                .map(|line| {
                    if line.is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    fn code_block(&self, el: &Element) -> String {
        let code = el
            .children
            .iter()
            .filter_map(Node::as_element)
            .find(|c| c.name == "code");
        let info = code
            .and_then(language_of)
            .or_else(|| language_of(el))
            .unwrap_or_default();

        let mut text = el.text_content().replace("\r\n", "\n").replace('\u{a0}', " ");
        if text.ends_with('\n') {
            text.pop();
        }

        let ch = self.style.fence.as_char();
        let fence = ch.to_string().repeat(longest_run(&text, ch).max(2) + 1);
        if text.is_empty() {
            format!("{fence}{info}\n{fence}")
        } else {
            format!("{fence}{info}\n{text}\n{fence}")
        }
    }

    fn table(&self, el: &Element) -> Option<String> {
        let mut rows: Vec<Vec<&Element>> = Vec::new();
        collect_rows(el, &mut rows);
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return None;
        }

        let render_row = |cells: &[&Element]| -> String {
            let mut texts: Vec<String> = cells
                .iter()
                .map(|cell| {
                    let mut inline = String::new();
                    self.inline_children(&cell.children, &mut inline);
                    single_line(&inline).replace('|', "\\|")
                })
                .collect();
            texts.resize(columns, String::new());
            format!("| {} |", texts.join(" | "))
        };

        let header = &rows[0];
        let separator: Vec<&str> = (0..columns)
            .map(|i| match header.get(i).and_then(|c| alignment_of(c)) {
                Some(Align::Left) => ":---",
                Some(Align::Center) => ":---:",
                Some(Align::Right) => "---:",
                None => "---",
            })
            .collect();

        let mut lines = vec![
            render_row(header.as_slice()),
            format!("| {} |", separator.join(" | ")),
        ];
        lines.extend(rows[1..].iter().map(|row| render_row(row.as_slice())));
        Some(lines.join("\n"))
    }
}

// ── Inline ───────────────────────────────────────────────────────────────

impl Writer {
    fn inline_children(&self, nodes: &[Node], out: &mut String) {
        for node in nodes {
            self.inline_node(node, out);
        }
    }

    fn inline_node(&self, node: &Node, out: &mut String) {
        match node {
            Node::Text(text) => push_spaced(out, &escape_text(&collapse_whitespace(text))),
            Node::Comment(_) => {}
            Node::Element(el) => self.inline_element(el, out),
        }
    }

    fn inline_element(&self, el: &Element, out: &mut String) {
        match el.name.as_str() {
            _ if is_skipped(el) => {}
            "br" => out.push(HARD_BREAK),
            "strong" => self.delimited("**", "**", &el.children, out),
            "b" if !is_normal_weight(el) => self.delimited("**", "**", &el.children, out),
            "em" | "i" => match self.style.emphasis {
                EmphasisStyle::Asterisk => self.delimited("*", "*", &el.children, out),
                EmphasisStyle::Underscore => self.delimited(
                    UNDERSCORE_OPEN.encode_utf8(&mut [0; 4]),
                    UNDERSCORE_CLOSE.encode_utf8(&mut [0; 4]),
                    &el.children,
                    out,
                ),
            },
            "s" | "del" | "strike" => self.delimited("~~", "~~", &el.children, out),
            "code" | "kbd" | "samp" | "tt" => out.push_str(&code_span(&el.text_content())),
            "a" => self.link(el, out),
            "img" => self.image(el, out),
            _ => self.inline_children(&el.children, out),
        }
    }

    /// Wrap content in `open`/`close`, keeping edge whitespace outside the
    /// delimiters where Markdown requires it.
    fn delimited(&self, open: &str, close: &str, children: &[Node], out: &mut String) {
        let mut inner = String::new();
        self.inline_children(children, &mut inner);

        let is_edge = |c: char| c == ' ' || c == HARD_BREAK;
        let body = inner.trim_matches(is_edge);
        if body.is_empty() {
            push_spaced(out, &inner);
            return;
        }
        let lead = &inner[..inner.len() - inner.trim_start_matches(is_edge).len()];
        let trail = &inner[inner.trim_end_matches(is_edge).len()..];

        push_spaced(out, lead);
        out.push_str(open);
        out.push_str(body);
        out.push_str(close);
        out.push_str(trail);
    }

    fn link(&self, el: &Element, out: &mut String) {
        let mut text = String::new();
        self.inline_children(&el.children, &mut text);
        let text = single_line(&text);

        let href = el.attr("href").map(str::trim).unwrap_or("");
        if href.is_empty() || is_inline_binary(href) {
            push_spaced(out, &text);
            return;
        }
        if text.is_empty() {
            return;
        }
        out.push_str(&format!("[{}]({}{})", text, destination(href), title_of(el)));
    }

    fn image(&self, el: &Element, out: &mut String) {
        let src = el.attr("src").map(str::trim).unwrap_or("");
        if src.is_empty() {
            return;
        }
        if is_inline_binary(src) {
            warn!("Dropping image with inline binary source from Markdown output");
            return;
        }
        let alt = escape_label(collapse_whitespace(el.attr("alt").unwrap_or("")).trim());
        out.push_str(&format!("![{}]({}{})", alt, destination(src), title_of(el)));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

fn is_skipped(el: &Element) -> bool {
    SKIPPED_ELEMENTS.contains(&el.name.as_str())
}

/// Google Docs wraps whole pastes in `<b style="font-weight:normal">`.
fn is_normal_weight(el: &Element) -> bool {
    el.attr("style").is_some_and(|style| {
        css_value(style, "font-weight").is_some_and(|w| w == "normal" || w == "400")
    })
}

fn css_value(style: &str, property: &str) -> Option<String> {
    style.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case(property)
            .then(|| value.trim().to_ascii_lowercase())
    })
}

fn alignment_of(cell: &Element) -> Option<Align> {
    let value = cell
        .attr("align")
        .map(|a| a.trim().to_ascii_lowercase())
        .or_else(|| cell.attr("style").and_then(|s| css_value(s, "text-align")))?;
    match value.as_str() {
        "left" => Some(Align::Left),
        "center" => Some(Align::Center),
        "right" => Some(Align::Right),
        _ => None,
    }
}

fn collect_rows<'a>(el: &'a Element, rows: &mut Vec<Vec<&'a Element>>) {
    for child in el.children.iter().filter_map(Node::as_element) {
        match child.name.as_str() {
            "tr" => rows.push(
                child
                    .children
                    .iter()
                    .filter_map(Node::as_element)
                    .filter(|c| c.name == "td" || c.name == "th")
                    .collect(),
            ),
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

fn language_of(el: &Element) -> Option<String> {
    el.attr("class")?
        .split_whitespace()
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
        })
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}

fn title_of(el: &Element) -> String {
    match el.attr("title").map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!(
            " \"{}\"",
            title.replace('\\', "\\\\").replace('"', "\\\"")
        ),
        None => String::new(),
    }
}

/// Link destination, wrapped in `<…>` when it would not parse bare.
fn destination(url: &str) -> String {
    if url
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'))
    {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

fn indent_item(marker: &str, body: &str) -> String {
    if body.is_empty() {
        return marker.to_string();
    }
    let pad = " ".repeat(marker.len() + 1);
    body.split('\n')
        .enumerate()
        .map(|(i, line)| match (i, line.is_empty()) {
            (0, _) => format!("{marker} {line}"),
            (_, true) => String::new(),
            (_, false) => format!("{pad}{line}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn finish_paragraph(inline: &str) -> Option<String> {
    let inline = settle_underscores(inline);
    let lines: Vec<String> = inline
        .split(HARD_BREAK)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(escape_line_start)
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\\\n"))
    }
}

fn single_line(inline: &str) -> String {
    settle_underscores(inline)
        .split(HARD_BREAK)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace pending underscore delimiters. A pair that touches a letter or
/// digit on the outside cannot delimit in CommonMark (`a_b_c` is plain text),
/// so it becomes `*` instead.
fn settle_underscores(inline: &str) -> String {
    if !inline.contains([UNDERSCORE_OPEN, UNDERSCORE_CLOSE]) {
        return inline.to_string();
    }
    let chars: Vec<char> = inline.chars().collect();
    let mut intraword = vec![false; chars.len()];
    let mut opened: Vec<usize> = Vec::new();
    for (i, &c) in chars.iter().enumerate() {
        if c == UNDERSCORE_OPEN {
            opened.push(i);
        } else if c == UNDERSCORE_CLOSE {
            if let Some(start) = opened.pop() {
                let before = start.checked_sub(1).map(|j| chars[j]);
                let after = chars.get(i + 1).copied();
                let touches = before.is_some_and(char::is_alphanumeric)
                    || after.is_some_and(char::is_alphanumeric);
                intraword[start] = touches;
                intraword[i] = touches;
            }
        }
    }
    chars
        .iter()
        .zip(intraword)
        .map(|(&c, star)| match c {
            UNDERSCORE_OPEN | UNDERSCORE_CLOSE if star => '*',
            UNDERSCORE_OPEN | UNDERSCORE_CLOSE => '_',
            other => other,
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

/// Append `s`, dropping its leading space when `out` already ends in one.
fn push_spaced(out: &mut String, s: &str) {
    match s.strip_prefix(' ') {
        Some(rest) if out.ends_with(' ') => out.push_str(rest),
        _ => out.push_str(s),
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() || c == '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else if c.is_control() {
            continue;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn code_span(text: &str) -> String {
    let text = collapse_whitespace(text);
    if text.trim().is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_run(&text, '`') + 1);
    let pad = text.starts_with('`')
        || text.ends_with('`')
        || (text.starts_with(' ') && text.ends_with(' '));
    if pad {
        format!("{ticks} {text} {ticks}")
    } else {
        format!("{ticks}{text}{ticks}")
    }
}

/// Escape characters with inline meaning.
fn escape_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|j| chars.get(j)).copied();
        let next = chars.get(i + 1).copied();
        let escape = match c {
            '\\' | '*' | '_' | '`' | '[' | ']' => true,
            '<' => next.is_some_and(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')),
            '~' => prev == Some('~') || next == Some('~'),
            '&' => looks_like_entity(&chars[i + 1..]),
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn looks_like_entity(rest: &[char]) -> bool {
    let name_len = rest
        .iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == '#')
        .count();
    name_len > 0 && rest.get(name_len) == Some(&';')
}

fn escape_label(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a line that would otherwise start a block construct.
fn escape_line_start(line: &str) -> String {
    let Some(first) = line.chars().next() else {
        return String::new();
    };
    match first {
        '#' | '>' => format!("\\{line}"),
        '-' | '+' | '=' if is_marker_line(line, first) => format!("\\{line}"),
        c if c.is_ascii_digit() => {
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            let rest = &line[digits..];
            let is_marker = digits <= 9
                && (rest.starts_with('.') || rest.starts_with(')'))
                && (rest.len() == 1 || rest[1..].starts_with(' '));
            if is_marker {
                format!("{}\\{}", &line[..digits], rest)
            } else {
                line.to_string()
            }
        }
        _ => line.to_string(),
    }
}

fn is_marker_line(line: &str, first: char) -> bool {
    let list_marker = first != '=' && (line.len() == 1 || line[1..].starts_with(' '));
    let underline = line.chars().all(|c| c == first);
    list_marker || underline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BulletMarker, EmphasisStyle, FenceStyle};

    fn md(html: &str) -> String {
        fragment_to_markdown(&Fragment::parse(html).unwrap(), MarkdownStyle::default())
    }

    #[test]
    fn headings_and_inline_formatting() {
        assert_eq!(
            md("<h1>Test Heading</h1><p>This is a <strong>bold</strong> paragraph.</p>"),
            "# Test Heading\n\nThis is a **bold** paragraph."
        );
        assert_eq!(md("<h3>Three</h3>"), "### Three");
        assert_eq!(
            md("<p><em>it</em> <s>gone</s> <code>x</code></p>"),
            "*it* ~~gone~~ `x`"
        );
    }

    #[test]
    fn emphasis_whitespace_moves_outside() {
        assert_eq!(md("<p>a<strong> b </strong>c</p>"), "a **b** c");
        assert_eq!(md("<p>x<em> </em>y</p>"), "x y");
    }

    #[test]
    fn underscore_emphasis_style() {
        let style = MarkdownStyle {
            emphasis: EmphasisStyle::Underscore,
            ..Default::default()
        };
        let frag = Fragment::parse("<p><i>Italic</i></p>").unwrap();
        assert_eq!(fragment_to_markdown(&frag, style), "_Italic_");
    }

    #[test]
    fn underscore_style_falls_back_inside_words() {
        let style = MarkdownStyle {
            emphasis: EmphasisStyle::Underscore,
            ..Default::default()
        };
        let md = |html: &str| fragment_to_markdown(&Fragment::parse(html).unwrap(), style);

        assert_eq!(md("<p>a<em>b</em>c</p>"), "a*b*c");
        assert_eq!(md("<p>un<em>believ</em> able</p>"), "un*believ* able");
        assert_eq!(md("<p>see <em>this</em>, then</p>"), "see _this_, then");
        assert_eq!(md("<p>x <em>a<em>b</em>c</em> y</p>"), "x _a*b*c_ y");
        assert_eq!(md("<p><em>one<br>two</em>s</p>"), "*one\\\ntwo*s");
        assert_eq!(md("<h2>re<em>use</em></h2>"), "## re*use*");

        let html = crate::bridge::markdown_to_html(&md("<p>a<em>b</em>c</p>"));
        assert!(html.contains("a<em>b</em>c"), "{html}");
    }

    #[test]
    fn control_characters_are_dropped_from_text() {
        let p = Element::new("p").with_child(Node::text("a\u{1}b\u{2}c"));
        let frag = Fragment::new(vec![Node::Element(p)]);
        assert_eq!(fragment_to_markdown(&frag, MarkdownStyle::default()), "abc");
    }

    #[test]
    fn lists_tight_loose_and_nested() {
        assert_eq!(md("<ul><li>one</li><li>two</li></ul>"), "- one\n- two");
        assert_eq!(
            md("<ol start=\"3\"><li>c</li><li>d</li></ol>"),
            "3. c\n4. d"
        );
        assert_eq!(
            md("<ul><li><p>one</p></li><li><p>two</p></li></ul>"),
            "- one\n\n- two"
        );
        assert_eq!(
            md("<ul><li>a<ul><li>b</li></ul></li></ul>"),
            "- a\n  - b"
        );
        assert_eq!(
            md("<ol><li>a<ol><li>b</li></ol></li></ol>"),
            "1. a\n   1. b"
        );
    }

    #[test]
    fn bullet_marker_style() {
        let style = MarkdownStyle {
            bullet: BulletMarker::Asterisk,
            ..Default::default()
        };
        let frag = Fragment::parse("<ul><li>x</li></ul>").unwrap();
        assert_eq!(fragment_to_markdown(&frag, style), "* x");
    }

    #[test]
    fn blockquote_prefixes_every_line() {
        assert_eq!(md("<blockquote><p>Quote Text</p></blockquote>"), "> Quote Text");
        assert_eq!(
            md("<blockquote><p>a</p><p>b</p></blockquote>"),
            "> a\n>\n> b"
        );
    }

    #[test]
    fn code_blocks_are_fenced() {
        assert_eq!(
            md("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>"),
            "```rust\nfn main() {}\n```"
        );
        assert_eq!(
            md("<pre><code>a ``` b</code></pre>"),
            "````\na ``` b\n````"
        );
        let style = MarkdownStyle {
            fence: FenceStyle::Tilde,
            ..Default::default()
        };
        let frag = Fragment::parse("<pre>x</pre>").unwrap();
        assert_eq!(fragment_to_markdown(&frag, style), "~~~\nx\n~~~");
    }

    #[test]
    fn images_and_links() {
        assert_eq!(
            md(r#"<p><img src="http://localhost:4000/uploads/images/1_a.png" alt="chart" title="Q1"></p>"#),
            r#"![chart](http://localhost:4000/uploads/images/1_a.png "Q1")"#
        );
        assert_eq!(
            md(r#"<p>see <a href="https://example.org/a b">the docs</a></p>"#),
            "see [the docs](<https://example.org/a b>)"
        );
        assert_eq!(md(r#"<p><a>no href</a></p>"#), "no href");
    }

    #[test]
    fn inline_binary_images_are_dropped() {
        let out = md(r#"<p>before<img src="data:image/png;base64,AAAA">after</p>"#);
        assert_eq!(out, "beforeafter");
        assert!(!out.contains("data:"));
    }

    #[test]
    fn hard_breaks() {
        assert_eq!(md("<p>a<br>b</p>"), "a\\\nb");
        assert_eq!(md("<p>a<br></p>"), "a");
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(md("<p>2 * 3 = 6_</p>"), "2 \\* 3 = 6\\_");
        assert_eq!(md("<p># not a heading</p>"), "\\# not a heading");
        assert_eq!(md("<p>1. not a list</p>"), "1\\. not a list");
        assert_eq!(md("<p>- dash</p>"), "\\- dash");
        assert_eq!(md("<p>&lt;div&gt; a &lt; b</p>"), "\\<div> a < b");
        assert_eq!(md("<p>&amp;copy; and R&amp;D</p>"), "\\&copy; and R&D");
        assert_eq!(md("<p>~~x~~ ~home</p>"), "\\~\\~x\\~\\~ ~home");
    }

    #[test]
    fn tables_render_as_gfm() {
        let html = r#"<table><thead><tr><th>A</th><th style="text-align: right">B</th></tr></thead>
<tbody><tr><td>1</td><td>x|y</td></tr></tbody></table>"#;
        assert_eq!(md(html), "| A | B |\n| --- | ---: |\n| 1 | x\\|y |");
    }

    #[test]
    fn containers_and_wrappers() {
        assert_eq!(md("<div><p>a</p><div>b</div></div>"), "a\n\nb");
        assert_eq!(
            md(r#"<b style="font-weight:normal;"><p>a</p><p><b>b</b></p></b>"#),
            "a\n\n**b**"
        );
    }

    #[test]
    fn empty_and_noise_input() {
        assert_eq!(md(""), "");
        assert_eq!(md("<p>&nbsp;</p><p></p>"), "");
        assert_eq!(md("<script>x()</script><p>kept</p>"), "kept");
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(md("<p>  a \n  b  </p>"), "a b");
        assert_eq!(md("<p>a <em> b</em></p>"), "a *b*");
    }

    #[test]
    fn escape_plain_text_lines() {
        assert_eq!(escape_plain_text("# a\n  b  "), "\\# a\nb");
    }
}
