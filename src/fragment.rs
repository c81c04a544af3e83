//! Parsed fragments: an owned HTML tree outside of any full document.
//!
//! Clipboard markup is parsed with html5ever into an `RcDom`, then copied
//! into the plain owned tree defined here. Parents own their children and
//! there are no back-references, so stages can mutate the tree in place with
//! ordinary `&mut` borrows and hand it on by value.
//!
//! Parsing follows what a browser does with pasted markup: the string is
//! parsed as a full document and the children of `<body>` become the
//! fragment. Anything the HTML parser routes into `<head>` (a leading
//! `<style>`, `<meta>`, `<title>`) never reaches the fragment.

use crate::error::ParseError;
use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::QualName;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use std::fmt::Write as _;

/// Default upper bound on the markup accepted by [`Fragment::parse`].
pub const DEFAULT_MAX_HTML_BYTES: usize = 20 * 1024 * 1024;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements that start a new block rather than flowing inline.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "details", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "ul",
];

/// A parsed piece of markup: an ordered list of top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub children: Vec<Node>,
}

/// One node of a [`Fragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// An element with its attributes (in source order) and owned children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lower-cased tag name, including any `prefix:` (e.g. `o:p`).
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lower-cased attribute name, including any `prefix:` (e.g. `xmlns:o`).
    pub name: String,
    pub value: String,
}

// ── Fragment ─────────────────────────────────────────────────────────────

impl Fragment {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    /// Parse markup with the default size limit.
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        Self::parse_with_limit(html, DEFAULT_MAX_HTML_BYTES)
    }

    /// Parse markup, refusing anything longer than `max_bytes`.
    ///
    /// html5ever recovers from malformed markup the way browsers do, so an
    /// error here means the input could not be read at all or is too large
    /// to be treated as a fragment.
    pub fn parse_with_limit(html: &str, max_bytes: usize) -> Result<Self, ParseError> {
        if html.len() > max_bytes {
            return Err(ParseError::TooLarge {
                len: html.len(),
                max: max_bytes,
            });
        }

        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                drop_doctype: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let dom = parse_document(RcDom::default(), opts)
            .from_utf8()
            .read_from(&mut html.as_bytes())?;

        let body = find_body(&dom.document).ok_or(ParseError::MissingBody)?;
        Ok(Self {
            children: convert_children(&body),
        })
    }

    /// Serialise back to markup (the equivalent of `innerHTML`).
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            write_node(&mut out, node, false);
        }
        out
    }

    /// True when the fragment holds no elements and only whitespace text.
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|n| match n {
            Node::Element(_) => false,
            Node::Text(t) => t.trim().is_empty(),
            Node::Comment(_) => true,
        })
    }

    /// Concatenated text of every text node, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            node.collect_text(&mut out);
        }
        out
    }

    /// Visit every element depth-first (pre-order).
    pub fn for_each_element<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        for node in &self.children {
            if let Node::Element(el) = node {
                el.for_each_element(f);
            }
        }
    }

    /// Visit every element depth-first (pre-order), mutably.
    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        for node in &mut self.children {
            if let Node::Element(el) = node {
                el.for_each_element_mut(f);
            }
        }
    }

    /// Remove every element (at any depth) for which `pred` returns true,
    /// together with its subtree.
    pub fn remove_elements(&mut self, pred: &mut impl FnMut(&Element) -> bool) {
        remove_from(&mut self.children, pred);
    }

    /// All elements with the given tag name, in document order.
    pub fn elements_named(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.for_each_element(&mut |el| {
            if el.name == name {
                found.push(el);
            }
        });
        found
    }

    /// Number of element nodes at any depth.
    pub fn element_count(&self) -> usize {
        let mut count = 0;
        self.for_each_element(&mut |_| count += 1);
        count
    }
}

impl From<Vec<Node>> for Fragment {
    fn from(children: Vec<Node>) -> Self {
        Self { children }
    }
}

// ── Node / Element ───────────────────────────────────────────────────────

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
            Node::Comment(_) => {}
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attrs.push(Attribute { name, value }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos).value)
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }

    /// Whether this element starts a block (paragraph, heading, list, …).
    pub fn is_block(&self) -> bool {
        BLOCK_ELEMENTS.contains(&self.name.as_str())
    }

    /// Whether any descendant is a block element.
    pub fn contains_block(&self) -> bool {
        self.children
            .iter()
            .filter_map(Node::as_element)
            .any(|el| el.is_block() || el.contains_block())
    }

    fn for_each_element<'a>(&'a self, f: &mut impl FnMut(&'a Element)) {
        f(self);
        for child in &self.children {
            if let Node::Element(el) = child {
                el.for_each_element(f);
            }
        }
    }

    fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.for_each_element_mut(f);
            }
        }
    }
}

fn remove_from(nodes: &mut Vec<Node>, pred: &mut impl FnMut(&Element) -> bool) {
    nodes.retain(|n| !matches!(n, Node::Element(el) if pred(el)));
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            remove_from(&mut el.children, pred);
        }
    }
}

// ── RcDom → owned tree ───────────────────────────────────────────────────

fn find_body(handle: &Handle) -> Option<Handle> {
    for child in handle.children.borrow().iter() {
        if let NodeData::Element { name, .. } = &child.data {
            if &*name.local == "body" {
                return Some(child.clone());
            }
            if let Some(found) = find_body(child) {
                return Some(found);
            }
        }
    }
    None
}

fn convert_children(handle: &Handle) -> Vec<Node> {
    handle
        .children
        .borrow()
        .iter()
        .filter_map(convert_node)
        .collect()
}

fn convert_node(handle: &Handle) -> Option<Node> {
    match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let attrs = attrs
                .borrow()
                .iter()
                .map(|a| Attribute {
                    name: qualified_name(&a.name),
                    value: a.value.to_string(),
                })
                .collect();
            Some(Node::Element(Element {
                name: qualified_name(name),
                attrs,
                children: convert_children(handle),
            }))
        }
        NodeData::Text { contents } => Some(Node::Text(contents.borrow().to_string())),
        NodeData::Comment { contents } => Some(Node::Comment(contents.to_string())),
        _ => None,
    }
}

fn qualified_name(name: &QualName) -> String {
    let local: &str = &name.local;
    let full = match &name.prefix {
        Some(prefix) => {
            let prefix: &str = prefix;
            format!("{prefix}:{local}")
        }
        None => local.to_string(),
    };
    full.to_ascii_lowercase()
}

// ── Serialisation ────────────────────────────────────────────────────────

fn write_node(out: &mut String, node: &Node, raw_text: bool) {
    match node {
        Node::Element(el) => write_element(out, el),
        Node::Text(t) if raw_text => out.push_str(t),
        Node::Text(t) => escape_text(out, t),
        Node::Comment(c) => {
            let _ = write!(out, "<!--{c}-->");
        }
    }
}

fn write_element(out: &mut String, el: &Element) {
    out.push('<');
    out.push_str(&el.name);
    for attr in &el.attrs {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attr(out, &attr.value);
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&el.name.as_str()) {
        return;
    }

    let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
    for child in &el.children {
        write_node(out, child, raw);
    }
    let _ = write!(out, "</{}>", el.name);
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_fragment() {
        let frag = Fragment::parse("<h1>Title</h1><p>Body <strong>bold</strong></p>").unwrap();
        assert_eq!(frag.children.len(), 2);
        assert_eq!(frag.elements_named("strong").len(), 1);
        assert_eq!(frag.text_content(), "TitleBody bold");
    }

    #[test]
    fn parse_keeps_body_comments() {
        let frag = Fragment::parse("<p>a</p><!-- note --><p>b</p>").unwrap();
        assert!(frag
            .children
            .iter()
            .any(|n| matches!(n, Node::Comment(c) if c.contains("note"))));
    }

    #[test]
    fn parse_keeps_prefixed_names() {
        let frag = Fragment::parse(r#"<p class="MsoNormal" xmlns:o="urn:x">a<o:p></o:p></p>"#).unwrap();
        let p = frag.children[0].as_element().unwrap();
        assert_eq!(p.attr("xmlns:o"), Some("urn:x"));
        assert_eq!(frag.elements_named("o:p").len(), 1);
    }

    #[test]
    fn parse_empty_input() {
        let frag = Fragment::parse("").unwrap();
        assert!(frag.children.is_empty());
        assert!(frag.is_empty());
        assert_eq!(frag.to_html(), "");
    }

    #[test]
    fn parse_rejects_oversized_input() {
        let err = Fragment::parse_with_limit("<p>too long</p>", 4).unwrap_err();
        assert!(matches!(err, ParseError::TooLarge { max: 4, .. }));
    }

    #[test]
    fn serialise_escapes_and_void_elements() {
        let frag = Fragment::new(vec![
            Element::new("p")
                .with_child(Node::text("a < b & c"))
                .with_child(Element::new("br"))
                .into(),
            Element::new("img")
                .with_attr("src", "http://x/a.png")
                .with_attr("alt", "say \"hi\"")
                .into(),
        ]);
        assert_eq!(
            frag.to_html(),
            r#"<p>a &lt; b &amp; c<br></p><img src="http://x/a.png" alt="say &quot;hi&quot;">"#
        );
    }

    #[test]
    fn parse_serialise_round_trip() {
        let html = r#"<p>Hello <em>world</em></p><ul><li>one</li></ul>"#;
        assert_eq!(Fragment::parse(html).unwrap().to_html(), html);
    }

    #[test]
    fn remove_elements_prunes_subtrees() {
        let mut frag = Fragment::parse("<div><span>x</span><b>keep</b></div><span>y</span>").unwrap();
        frag.remove_elements(&mut |el| el.name == "span");
        assert_eq!(frag.to_html(), "<div><b>keep</b></div>");
    }

    #[test]
    fn attribute_helpers() {
        let mut el = Element::new("img").with_attr("src", "a");
        el.set_attr("src", "b");
        assert_eq!(el.attr("src"), Some("b"));
        assert_eq!(el.remove_attr("src"), Some("b".to_string()));
        assert_eq!(el.attr("src"), None);
    }

    #[test]
    fn block_detection() {
        let frag = Fragment::parse("<b><p>a</p></b><span><em>b</em></span>").unwrap();
        let wrapper = frag.children[0].as_element().unwrap();
        assert!(!wrapper.is_block());
        assert!(wrapper.contains_block());
        assert!(!frag.children[1].as_element().unwrap().contains_block());
    }

    #[test]
    fn is_empty_ignores_whitespace_and_comments() {
        let frag = Fragment::new(vec![Node::text("  \n"), Node::Comment("x".into())]);
        assert!(frag.is_empty());
    }
}
