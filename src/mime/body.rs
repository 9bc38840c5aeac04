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

//! Extraction of the human-written text from a message body.

use std::borrow::Cow;

use log::debug;
use memchr::memchr;

use super::content_type::ContentType;
use super::encoded_word::decode_charset;
use super::header::{first_header_value, split_message};
use super::html;
use super::quoted_printable::qp_decode;
use crate::support::error::Error;

const MAX_DEPTH: u32 = 16;

/// Preference among text parts; lower is better.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Plain,
    Html,
    OtherText,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransferEncoding {
    Identity,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("base64") => Self::Base64,
            Some(v) if v.eq_ignore_ascii_case("quoted-printable") => {
                Self::QuotedPrintable
            },
            _ => Self::Identity,
        }
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    rank: Rank,
    content_type: ContentType,
    encoding: TransferEncoding,
    content: &'a [u8],
}

/// Finds the best text part of `message` and returns it as plain text.
///
/// HTML parts are converted to text. Fails with `InvalidMessage` if there is
/// no text part or the part cannot be decoded.
pub fn extract_text(message: &[u8]) -> Result<String, Error> {
    let part = best_part(message, 0).ok_or_else(|| {
        debug!("No text part in message");
        Error::InvalidMessage
    })?;

    let text = decode_part(&part)?;
    Ok(match part.rank {
        Rank::Html => html::to_text(&text),
        Rank::Plain | Rank::OtherText => text,
    })
}

fn best_part(entity: &[u8], depth: u32) -> Option<Candidate<'_>> {
    let (header, content) = split_message(entity);
    let content_type = first_header_value(header, "Content-Type")
        .and_then(|v| ContentType::parse(&v))
        .unwrap_or_default();

    if content_type.is_type("multipart") {
        if depth >= MAX_DEPTH {
            debug!("MIME structure nested too deeply");
            return None;
        }

        let boundary = content_type.parameter("boundary")?;
        return split_multipart(content, boundary)
            .into_iter()
            .filter_map(|part| best_part(part, depth + 1))
            .min_by_key(|candidate| candidate.rank);
    }

    if !content_type.is_type("text") || is_attachment(header) {
        return None;
    }

    let rank = match content_type.subtype.as_str() {
        "plain" => Rank::Plain,
        "html" => Rank::Html,
        _ => Rank::OtherText,
    };
    let encoding = TransferEncoding::from_header(
        first_header_value(header, "Content-Transfer-Encoding").as_deref(),
    );

    Some(Candidate {
        rank,
        content_type,
        encoding,
        content,
    })
}

fn is_attachment(header: &[u8]) -> bool {
    first_header_value(header, "Content-Disposition").is_some_and(|v| {
        v.split(';')
            .next()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case("attachment"))
    })
}

fn decode_part(part: &Candidate<'_>) -> Result<String, Error> {
    let bytes: Cow<[u8]> = match part.encoding {
        TransferEncoding::Identity => Cow::Borrowed(part.content),
        TransferEncoding::QuotedPrintable => qp_decode(part.content),
        TransferEncoding::Base64 => {
            let compact = part
                .content
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect::<Vec<u8>>();
            base64::decode_config(
                &compact,
                base64::STANDARD.decode_allow_trailing_bits(true),
            )
            .map(Cow::Owned)
            .map_err(|e| {
                debug!("Undecodable base64 body: {}", e);
                Error::InvalidMessage
            })?
        },
    };

    // Unlabelled and ASCII-labelled text is read as UTF-8.
    let text = part
        .content_type
        .parameter("charset")
        .filter(|charset| !is_us_ascii(charset))
        .and_then(|charset| decode_charset(charset, &bytes))
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes));
    Ok(text.into_owned())
}

fn is_us_ascii(charset: &str) -> bool {
    ["us-ascii", "ascii", "us"]
        .iter()
        .any(|label| charset.trim().eq_ignore_ascii_case(label))
}

/// Splits the content of a multipart entity into its body parts.
///
/// The preamble and epilogue are discarded. The line ending before each
/// delimiter belongs to the delimiter. A final part with no closing
/// delimiter is still returned.
fn split_multipart<'a>(content: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{}", boundary);
    let mut parts = Vec::new();
    let mut part_start = None::<usize>;
    let mut line_start = 0;

    while line_start < content.len() {
        let line_end = memchr(b'\n', &content[line_start..])
            .map_or(content.len(), |ix| line_start + ix + 1);
        let line = &content[line_start..line_end];

        if let Some(after) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = after.starts_with(b"--");
            let padding = if closing { &after[2..] } else { after };
            // Anything other than transport padding means this line merely
            // starts with the boundary text.
            if padding.iter().all(u8::is_ascii_whitespace) {
                if let Some(start) = part_start.take() {
                    parts.push(strip_line_ending(&content[start..line_start]));
                }
                if closing {
                    return parts;
                }
                part_start = Some(line_end);
            }
        }

        line_start = line_end;
    }

    if let Some(start) = part_start {
        parts.push(&content[start..]);
    }
    parts
}

fn strip_line_ending(s: &[u8]) -> &[u8] {
    s.strip_suffix(b"\r\n")
        .or_else(|| s.strip_suffix(b"\n"))
        .unwrap_or(s)
}

/// Removes a trailing signature block.
///
/// Leading blank lines are skipped, then the text is cut at the first line
/// made only of whitespace.
pub fn strip_signature(text: &str) -> &str {
    let text = text.trim_start();
    let mut end = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            break;
        }
        end += line.len();
    }

    text[..end].trim()
}

/// Returns the first line of `text`, trimmed.
pub fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_message() {
        assert_eq!(
            "On desk\r\n",
            extract_text(b"From: a@b.example\r\nSubject: x\r\n\r\nOn desk\r\n")
                .unwrap(),
        );
        assert_eq!("", extract_text(b"Subject: x\r\n").unwrap());
    }

    #[test]
    fn plain_preferred_over_html() {
        let message = b"Content-Type: multipart/alternative; boundary=XX\r\n\
                        \r\n\
                        preamble\r\n\
                        --XX\r\n\
                        Content-Type: text/html\r\n\
                        \r\n\
                        <p>html text</p>\r\n\
                        --XX\r\n\
                        Content-Type: text/plain; charset=utf-8\r\n\
                        \r\n\
                        plain text\r\n\
                        --XX--\r\n\
                        epilogue\r\n";
        assert_eq!("plain text", extract_text(message).unwrap());
    }

    #[test]
    fn html_used_when_no_plain() {
        let message = b"Content-Type: multipart/mixed; boundary=\"o\"\r\n\
                        \r\n\
                        --o\r\n\
                        Content-Type: multipart/alternative; boundary=\"i\"\r\n\
                        \r\n\
                        --i\r\n\
                        Content-Type: text/html; charset=\"utf-8\"\r\n\
                        Content-Transfer-Encoding: quoted-printable\r\n\
                        \r\n\
                        <div>Caf=C3=A9 table</div>\r\n\
                        --i--\r\n\
                        --o\r\n\
                        Content-Type: text/plain\r\n\
                        Content-Disposition: attachment; filename=x.txt\r\n\
                        \r\n\
                        attached\r\n\
                        --o\r\n\
                        Content-Type: image/png\r\n\
                        \r\n\
                        png\r\n\
                        --o--\r\n";
        assert_eq!("Café table", extract_text(message).unwrap());
    }

    #[test]
    fn base64_and_charset() {
        let message = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
                        Content-Transfer-Encoding: BASE64\r\n\
                        \r\n\
                        SvhybiBz\r\n\
                        IGRlc2s=\r\n";
        assert_eq!("Jørn s desk", extract_text(message).unwrap());

        let message = b"Content-Transfer-Encoding: base64\r\n\r\n!!!!\r\n";
        assert_matches!(Err(Error::InvalidMessage), extract_text(message));
    }

    #[test]
    fn unlabelled_text_is_utf8() {
        assert_eq!(
            "Café shelf\r\n",
            extract_text(
                "From: a@b.example\r\nSubject: Borrowed drill\r\n\r\n\
                 Café shelf\r\n"
                    .as_bytes()
            )
            .unwrap(),
        );
        assert_eq!(
            "Jørn\r\n",
            extract_text(
                "Content-Type: text/plain; charset=US-ASCII\r\n\r\nJørn\r\n"
                    .as_bytes()
            )
            .unwrap(),
        );
    }

    #[test]
    fn html_named_entities() {
        assert_eq!(
            "Café shelf – Bob’s desk",
            extract_text(
                b"Content-Type: text/html; charset=utf-8\r\n\r\n\
                  <p>Caf&eacute; shelf &ndash; Bob&rsquo;s desk</p>"
            )
            .unwrap(),
        );
    }

    #[test]
    fn no_text_part() {
        assert_matches!(
            Err(Error::InvalidMessage),
            extract_text(b"Content-Type: image/png\r\n\r\npng"),
        );
        assert_matches!(
            Err(Error::InvalidMessage),
            extract_text(b"Content-Type: multipart/mixed\r\n\r\n--x\r\n"),
        );
    }

    #[test]
    fn nesting_limit() {
        let mut message = String::new();
        for depth in 0..20 {
            message.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=b{}\r\n\r\n--b{}\r\n",
                depth, depth,
            ));
        }
        message.push_str("\r\ntext\r\n");
        assert_matches!(
            Err(Error::InvalidMessage),
            extract_text(message.as_bytes()),
        );
    }

    #[test]
    fn multipart_splitting() {
        assert_eq!(
            vec![&b"one"[..], &b"two\r\n\r\n--bb"[..], &b"three"[..]],
            split_multipart(
                b"--b\r\none\r\n--b \r\ntwo\r\n\r\n--bb\r\n--b\r\nthree",
                "b",
            ),
        );
        assert_eq!(
            Vec::<&[u8]>::new(),
            split_multipart(b"no delimiters here", "b"),
        );
    }

    #[test]
    fn signature_stripping() {
        assert_eq!(
            "Tool notes",
            strip_signature("Tool notes\n\nSent from my phone"),
        );
        assert_eq!(
            "On desk\r\nleft side",
            strip_signature("\r\n  \r\nOn desk\r\nleft side\r\n \t\r\n-- \r\nBob"),
        );
        assert_eq!("", strip_signature("   \n\n"));
        assert_eq!("Bob R.", strip_signature("Bob R."));
    }

    #[test]
    fn first_lines() {
        assert_eq!("On desk", first_line(" On desk \r\nleft side"));
        assert_eq!("", first_line(""));
    }
}
