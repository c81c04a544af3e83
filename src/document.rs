//! The rich-document surface the pipeline writes into.
//!
//! The editing surface itself (selection handling, undo, keyboard input) is
//! out of scope; the pipeline only needs the capabilities in
//! [`RichDocument`]. [`MemoryDocument`] implements them over an owned
//! [`Fragment`] with a block-level cursor, which is enough for the CLI and
//! for tests to observe where content lands.

use crate::fragment::{Element, Fragment, Node};
use tracing::warn;

/// What the pipeline needs from a rich-document editing surface.
///
/// Every mutation is a single call, so an operation's content is attached
/// in one step or not at all.
pub trait RichDocument: Send {
    /// Serialise the whole document to HTML.
    fn to_html(&self) -> String;

    /// Replace the whole document with parsed `html`.
    fn set_content(&mut self, html: &str);

    /// Insert a cleaned fragment at the current selection.
    fn insert_fragment(&mut self, fragment: Fragment);

    /// Insert a single node at the current selection.
    fn insert_node(&mut self, node: Node);

    /// Apply the surface's default plain-text paste handling.
    fn insert_text(&mut self, text: &str);

    /// Whether the document holds no content (at most an empty paragraph).
    fn is_empty(&self) -> bool;
}

/// An in-memory document: top-level blocks plus an insertion cursor.
///
/// The cursor is a top-level block index. Inserts go before the block at
/// the cursor and move the cursor past what was inserted; it starts at the
/// end of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDocument {
    root: Fragment,
    cursor: usize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding `html`, cursor at the end.
    pub fn from_html(html: &str) -> Self {
        let mut doc = Self::new();
        doc.set_content(html);
        doc
    }

    pub fn fragment(&self) -> &Fragment {
        &self.root
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the document length.
    pub fn set_cursor(&mut self, index: usize) {
        self.cursor = index.min(self.root.children.len());
    }

    /// Number of top-level blocks.
    pub fn block_count(&self) -> usize {
        self.root.children.len()
    }

    /// Insert nodes at the cursor. Inline runs are wrapped in paragraphs.
    /// Returns the number of blocks inserted.
    fn insert_blocks(&mut self, nodes: Vec<Node>) -> usize {
        let blocks = into_blocks(nodes);
        let count = blocks.len();
        let at = self.cursor.min(self.root.children.len());
        self.root.children.splice(at..at, blocks);
        self.cursor = at + count;
        count
    }
}

impl RichDocument for MemoryDocument {
    fn to_html(&self) -> String {
        self.root.to_html()
    }

    fn set_content(&mut self, html: &str) {
        let nodes = match Fragment::parse(html) {
            Ok(fragment) => fragment.children,
            Err(e) => {
                warn!("Content could not be parsed ({}); setting it as text", e);
                vec![Node::text(html)]
            }
        };
        self.root = Fragment::new(into_blocks(nodes));
        self.cursor = self.root.children.len();
    }

    fn insert_fragment(&mut self, fragment: Fragment) {
        self.insert_blocks(fragment.children);
    }

    fn insert_node(&mut self, node: Node) {
        self.insert_blocks(vec![node]);
    }

    fn insert_text(&mut self, text: &str) {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let paragraphs = text
            .split("\n\n")
            .map(|para| para.trim_matches('\n'))
            .filter(|para| !para.trim().is_empty())
            .map(|para| {
                let mut p = Element::new("p");
                for (i, line) in para.split('\n').enumerate() {
                    if i > 0 {
                        p.children.push(Element::new("br").into());
                    }
                    p.children.push(Node::text(line));
                }
                Node::Element(p)
            })
            .collect();
        self.insert_blocks(paragraphs);
    }

    fn is_empty(&self) -> bool {
        self.root.children.iter().all(|node| match node {
            Node::Text(t) => t.trim().is_empty(),
            Node::Comment(_) => true,
            Node::Element(el) => el.name == "p" && is_blank_paragraph(el),
        })
    }
}

fn is_blank_paragraph(p: &Element) -> bool {
    p.children.iter().all(|child| match child {
        Node::Text(t) => t.trim().is_empty(),
        Node::Comment(_) => true,
        Node::Element(el) => el.name == "br",
    })
}

/// Group top-level nodes into blocks: block elements stay as they are,
/// runs of inline nodes become one `<p>`, blank text between blocks and
/// comments are dropped.
fn into_blocks(nodes: Vec<Node>) -> Vec<Node> {
    let mut blocks = Vec::new();
    let mut run: Vec<Node> = Vec::new();

    let flush = |run: &mut Vec<Node>, blocks: &mut Vec<Node>| {
        let has_content = run.iter().any(|n| match n {
            Node::Text(t) => !t.trim().is_empty(),
            _ => true,
        });
        if has_content {
            let mut p = Element::new("p");
            p.children = std::mem::take(run);
            blocks.push(Node::Element(p));
        } else {
            run.clear();
        }
    };

    for node in nodes {
        match node {
            Node::Comment(_) => {}
            Node::Element(el) if el.is_block() || el.contains_block() => {
                flush(&mut run, &mut blocks);
                blocks.push(Node::Element(el));
            }
            other => run.push(other),
        }
    }
    flush(&mut run, &mut blocks);
    blocks
}
