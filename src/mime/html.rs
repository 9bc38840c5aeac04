//-
// Copyright (c) 2024, Tooltracker contributors
//
// This file is part of Tooltracker.
//
// Tooltracker is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Tooltracker is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along with
// Tooltracker. If not, see <http://www.gnu.org/licenses/>.

//! HTML to plain text conversion.
//!
//! This only needs to recover the first few lines a person typed into an
//! HTML mail composer. The document is parsed with `scraper`, which also
//! takes care of character references, and the text nodes are laid out with
//! a line break at each block element.

use scraper::{ElementRef, Html, Node};

const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "div",
    "dl",
    "dt",
    "dd",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

const INVISIBLE_ELEMENTS: &[&str] =
    &["head", "noscript", "script", "style", "template", "title"];

/// Converts an HTML document or fragment to plain text.
///
/// `<br>` becomes a line break. Any number of adjacent block boundaries
/// become a single line break, so only explicit `<br>`s can produce empty
/// lines. Runs of whitespace, including non-breaking spaces, collapse to a
/// single space.
pub fn to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut writer = TextWriter::default();
    writer.element(document.root_element());

    writer
        .out
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

#[derive(Default)]
struct TextWriter {
    out: String,
    pending_space: bool,
    pending_block: bool,
}

impl TextWriter {
    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if INVISIBLE_ELEMENTS.contains(&name) {
            return;
        }
        if "br" == name {
            self.out.push('\n');
            self.pending_space = false;
            self.pending_block = false;
            return;
        }

        let block = BLOCK_ELEMENTS.contains(&name);
        self.pending_block |= block;
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                },
                _ => (),
            }
        }
        self.pending_block |= block;
    }

    fn text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = true;
                continue;
            }

            let at_line_start = self.out.is_empty() || self.out.ends_with('\n');
            if self.pending_block && !at_line_start {
                self.out.push('\n');
            } else if self.pending_space && !at_line_start {
                self.out.push(' ');
            }
            self.pending_block = false;
            self.pending_space = false;
            self.out.push(ch);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paragraphs_become_lines() {
        assert_eq!(
            "Some comment",
            to_text(
                "<html>\n\t<head></head>\n\t<body>\n\t\t<p>\n\t\t\t\
                 Some comment\n\t\t</p>\n\t</body>\n</html>\n"
            ),
        );
        assert_eq!(
            "On desk\nin the shed",
            to_text("<div dir=\"ltr\">On desk<br></div><div>in the shed</div>"),
        );
        assert_eq!(
            "first\nsecond",
            to_text("<p>first</p>\n\n<p>second</p>"),
        );
    }

    #[test]
    fn double_break_leaves_blank_line() {
        assert_eq!(
            "On desk\n\n--\nBob",
            to_text("On desk<br><br>-- <br>Bob"),
        );
    }

    #[test]
    fn invisible_content_dropped() {
        assert_eq!(
            "visible",
            to_text(
                "<head><title>t</title><style>p { x: y }</style></head>\
                 <!-- hidden --><script>alert(1)</script>visible"
            ),
        );
    }

    #[test]
    fn named_entities_decoded() {
        assert_eq!(
            "Café shelf – Bob’s desk",
            to_text("<p>Caf&eacute; shelf &ndash; Bob&rsquo;s desk</p>"),
        );
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(
            "Tom & Jerry <3 \"x\" 'y' A é &bogus;",
            to_text(
                "Tom &amp; Jerry &lt;3 &quot;x&quot; &apos;y&apos;&nbsp;&#65; \
                 &#xe9; &bogus;"
            ),
        );
    }
}
