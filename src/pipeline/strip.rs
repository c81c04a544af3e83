//! Noise stripping: remove producer artefacts from pasted markup.
//!
//! Office suites wrap copied content in markup that means nothing to an
//! article: conditional comments, `<style>` blocks full of `p.MsoNormal`
//! rules, `<o:p>` empty-paragraph markers, `xmlns:*` declarations,
//! `class="MsoNormal"` and `style="mso-spacerun: yes"`. This stage removes
//! those while leaving headings, paragraphs, emphasis, lists, links and
//! images untouched.
//!
//! ## Rules (depth-first, pre-order)
//!
//! 1. Comment nodes are removed.
//! 2. Elements on the denylist or carrying a producer prefix are removed
//!    with their whole subtree; the walk does not descend into them.
//! 3. On surviving elements, `xmlns*` attributes, `class` attributes with a
//!    producer marker and `style` attributes matching the producer pattern
//!    are removed.
//! 4. The walk continues into the pruned children.
//!
//! The stage performs no I/O and cannot fail. An all-noise fragment comes
//! out empty, which later stages accept.

use crate::config::NoiseRules;
use crate::fragment::{Element, Fragment, Node};
use tracing::debug;

/// What one stripping pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripStats {
    pub comments: usize,
    pub elements: usize,
    pub attributes: usize,
}

/// Strip producer noise from `fragment` in place.
pub fn strip_noise(fragment: &mut Fragment, rules: &NoiseRules) -> StripStats {
    let mut stats = StripStats::default();
    clean_children(&mut fragment.children, rules, &mut stats);
    debug!(
        "Stripped {} comments, {} elements, {} attributes",
        stats.comments, stats.elements, stats.attributes
    );
    stats
}

fn clean_children(nodes: &mut Vec<Node>, rules: &NoiseRules, stats: &mut StripStats) {
    nodes.retain(|node| match node {
        Node::Comment(_) => {
            stats.comments += 1;
            false
        }
        Node::Element(el) if is_noise_element(el, rules) => {
            stats.elements += 1;
            false
        }
        _ => true,
    });

    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            clean_attributes(el, rules, stats);
            clean_children(&mut el.children, rules, stats);
        }
    }
}

fn is_noise_element(el: &Element, rules: &NoiseRules) -> bool {
    rules
        .drop_tags
        .iter()
        .any(|tag| el.name.eq_ignore_ascii_case(tag))
        || rules
            .drop_prefixes
            .iter()
            .any(|prefix| el.name.starts_with(&prefix.to_ascii_lowercase()))
}

fn clean_attributes(el: &mut Element, rules: &NoiseRules, stats: &mut StripStats) {
    let before = el.attrs.len();
    el.attrs.retain(|attr| {
        let name = attr.name.as_str();
        if name.starts_with("xmlns") {
            return false;
        }
        if name == "class" && rules.class_markers.iter().any(|m| attr.value.contains(m.as_str())) {
            return false;
        }
        if name == "style" && rules.producer_style.is_match(&attr.value) {
            return false;
        }
        true
    });
    stats.attributes += before - el.attrs.len();
}
