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

//! Access to the header block of a message.

use std::borrow::Cow;

use lazy_static::lazy_static;
use memchr::memmem;

lazy_static! {
    /// Matches one complete header field, including any folded continuation
    /// lines.
    ///
    /// Capture 1 is the whole field without its final line ending. Capture 2
    /// is the field name and capture 3 the raw value.
    pub static ref FULL_HEADER_LINE: regex::bytes::Regex =
        regex::bytes::Regex::new(
            r"(?m-u)^(([!-9;-~]+)[ \t]*:([^\r\n]*(?:\r?\n[ \t][^\r\n]*)*))\r?(?:\n|\z)",
        )
        .unwrap();
}

/// Splits a message into its header block and body.
///
/// The header block excludes the empty line which ends it. A message with no
/// empty line is treated as all header.
pub fn split_message(message: &[u8]) -> (&[u8], &[u8]) {
    if message.starts_with(b"\r\n") {
        return (&[], &message[2..]);
    }
    if message.starts_with(b"\n") {
        return (&[], &message[1..]);
    }

    let crlf = memmem::find(message, b"\r\n\r\n").map(|ix| (ix, 4));
    let lf = memmem::find(message, b"\n\n").map(|ix| (ix, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 + 2 <= b.0 + 1 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        // Keep the line ending of the last header field
        Some((ix, len)) => (&message[..ix + len / 2], &message[ix + len..]),
        None => (message, &[]),
    }
}

/// Iterates the raw values of every field named `name` (case-insensitive) in
/// `header_block`, in order of appearance.
pub fn header_values<'a>(
    header_block: &'a [u8],
    name: &'a str,
) -> impl Iterator<Item = &'a [u8]> + 'a {
    FULL_HEADER_LINE
        .captures_iter(header_block)
        .filter(move |m| {
            m.get(2)
                .and_then(|n| std::str::from_utf8(n.as_bytes()).ok())
                .is_some_and(|n| name.eq_ignore_ascii_case(n))
        })
        .filter_map(|m| m.get(3))
        .map(|m| m.as_bytes())
}

/// Returns the first value of the field `name`, unfolded and decoded
/// leniently as UTF-8.
pub fn first_header_value(header_block: &[u8], name: &str) -> Option<String> {
    header_values(header_block, name)
        .next()
        .map(|v| unfold(&String::from_utf8_lossy(v)).trim().to_owned())
}

/// Removes folding line breaks from a raw header value.
pub fn unfold(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace(['\r', '\n'], ""))
    } else {
        Cow::Borrowed(value)
    }
}

/// Converts a message with UNIX line endings to DOS line endings.
///
/// The first line decides. A message whose first line already ends in CRLF
/// is returned unchanged, even if it mixes in some bare LFs later.
pub fn normalise_line_endings(message: &[u8]) -> Cow<'_, [u8]> {
    let first_lf = match memchr::memchr(b'\n', message) {
        None => return Cow::Borrowed(message),
        Some(ix) => ix,
    };
    if first_lf > 0 && b'\r' == message[first_lf - 1] {
        return Cow::Borrowed(message);
    }

    let mut out = Vec::with_capacity(message.len() + message.len() / 32);
    let mut prev = 0u8;
    for &b in message {
        if b'\n' == b && b'\r' != prev {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_messages() {
        assert_eq!(
            (&b"From: a\r\nTo: b\r\n"[..], &b"body\r\n"[..]),
            split_message(b"From: a\r\nTo: b\r\n\r\nbody\r\n"),
        );
        assert_eq!(
            (&b"From: a\n"[..], &b"body\n\nmore"[..]),
            split_message(b"From: a\n\nbody\n\nmore"),
        );
        assert_eq!(
            (&b""[..], &b"body"[..]),
            split_message(b"\r\nbody"),
        );
        assert_eq!(
            (&b"From: a\r\n"[..], &b""[..]),
            split_message(b"From: a\r\n"),
        );
        assert_eq!(
            (&b"From: a\r\n"[..], &b"x\n\ny"[..]),
            split_message(b"From: a\r\n\r\nx\n\ny"),
        );
    }

    #[test]
    fn header_lookup() {
        let block = b"From: a@b.example\r\n\
                      Subject: Borrowed\r\n\tdrill\r\n\
                      X-Other: x\r\n\
                      subject:again\r\n";

        let subjects = header_values(block, "SUBJECT").collect::<Vec<_>>();
        assert_eq!(vec![&b" Borrowed\r\n\tdrill"[..], &b"again"[..]], subjects);
        assert_eq!(
            Some("Borrowed\tdrill".to_owned()),
            first_header_value(block, "subject"),
        );
        assert_eq!(None, first_header_value(block, "Content-Type"));
    }

    #[test]
    fn line_ending_normalisation() {
        assert_eq!(
            &b"a\r\nb\r\n\r\nc"[..],
            &normalise_line_endings(b"a\nb\n\nc")[..],
        );
        assert_matches!(
            Cow::Borrowed(_),
            normalise_line_endings(b"a\r\nb\nc"),
        );
        assert_matches!(Cow::Borrowed(_), normalise_line_endings(b"abc"));
    }
}
