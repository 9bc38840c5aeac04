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

use std::borrow::Cow;

use encoding_rs::Encoding;
use lazy_static::lazy_static;
use regex::Regex;

use super::quoted_printable::qp_decode;

lazy_static! {
    // RFC 2047 limits encoded words to 75 characters, but agents exceed that
    // and other readers cope, so no length limit is applied.
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]*)\?([!->@-~]*)\?([!->@-~]*)\?=$").unwrap();
}

/// Test if `word` (in its entirety) is an RFC 2047 "encoded word".
///
/// If it is, decode it and return its decoded value. Returns `None` if it is
/// not an encoded word or if it could not be decoded.
pub fn ew_decode(word: &str) -> Option<String> {
    let captures = ENCODED_WORD.captures(word)?;
    let charset = captures.get(1)?.as_str();
    let transfer_encoding = captures.get(2)?.as_str();
    // `_` stands for ASCII space regardless of charset
    let content = captures.get(3)?.as_str().replace('_', " ");

    let content = decode_xfer(transfer_encoding, content.as_bytes())?;
    decode_charset(charset, &content).map(Cow::into_owned)
}

/// Decodes an unstructured header value, such as `Subject`.
///
/// The value must already be unfolded. Encoded words are decoded, and the
/// whitespace between two adjacent encoded words is dropped. Everything else
/// is kept as is.
pub fn decode_unstructured(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = "";
    let mut last_was_encoded = false;

    for token in split_whitespace_runs(value) {
        if token.chars().all(char::is_whitespace) {
            pending_space = token;
            continue;
        }

        match ew_decode(token) {
            Some(decoded) => {
                if !last_was_encoded {
                    out.push_str(pending_space);
                }
                out.push_str(&decoded);
                last_was_encoded = true;
            },
            None => {
                out.push_str(pending_space);
                out.push_str(token);
                last_was_encoded = false;
            },
        }

        pending_space = "";
    }

    out.push_str(pending_space);
    out
}

/// Splits `s` into alternating runs of whitespace and non-whitespace.
fn split_whitespace_runs(s: &str) -> impl Iterator<Item = &str> + '_ {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let ws = first.is_whitespace();
        let end = rest
            .char_indices()
            .find(|&(_, c)| c.is_whitespace() != ws)
            .map_or(rest.len(), |(ix, _)| ix);
        let (token, tail) = rest.split_at(end);
        rest = tail;
        Some(token)
    })
}

fn decode_xfer<'a>(xfer: &str, content: &'a [u8]) -> Option<Cow<'a, [u8]>> {
    match xfer {
        "q" | "Q" => Some(qp_decode(content)),
        "b" | "B" => base64::decode(content).ok().map(Cow::Owned),
        _ => None,
    }
}

/// Decodes `content` from the named charset.
///
/// An RFC 2231 language suffix (`utf-8*en`) is ignored. Returns `None` if the
/// charset is unknown.
pub fn decode_charset<'a>(
    charset: &str,
    content: &'a [u8],
) -> Option<Cow<'a, str>> {
    let charset = charset.split('*').next().unwrap_or(charset);
    Some(
        Encoding::for_label_no_replacement(charset.as_bytes())?
            .decode_with_bom_removal(content)
            .0,
    )
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_ew_decode() {
        assert_eq!(None, ew_decode("hello world"));

        // Examples from RFC 2047
        assert_eq!(
            Some("Keith Moore".to_owned()),
            ew_decode("=?US-ASCII?Q?Keith_Moore?="),
        );
        assert_eq!(
            Some("Keld Jørn Simonsen".to_owned()),
            ew_decode("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?="),
        );
        assert_eq!(
            Some("If you can read this yo".to_owned()),
            ew_decode("=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?="),
        );
        assert_eq!(
            Some("םולש ןב ילטפנ".to_owned()),
            ew_decode("=?iso-8859-8?b?7eXs+SDv4SDp7Oj08A==?="),
        );
        assert_eq!(
            Some("Borrowed".to_owned()),
            ew_decode("=?utf-8*en?q?Borrowed?="),
        );
        assert_eq!(None, ew_decode("=?x-no-such-charset?q?foo?="));
    }

    #[test]
    fn unstructured_values() {
        assert_eq!("Borrowed tool1", decode_unstructured("Borrowed tool1"));
        assert_eq!(
            "Borrowed drill",
            decode_unstructured("=?UTF-8?Q?Borrowed_?= =?UTF-8?B?ZHJpbGw=?="),
        );
        assert_eq!(
            "Borrowed  Bohrmaschine",
            decode_unstructured("Borrowed  =?ISO-8859-1?Q?Bohrmaschine?="),
        );
        assert_eq!(
            "Re: Alias Jørn ",
            decode_unstructured("Re: Alias =?ISO-8859-1?Q?J=F8rn?= "),
        );
        assert_eq!("=?broken", decode_unstructured("=?broken"));
        assert_eq!("", decode_unstructured(""));
    }

    proptest! {
        #[test]
        fn ew_decode_never_panics(s in r"=\?.*\?.*\?.*\?=") {
            ew_decode(&s);
        }

        #[test]
        fn decode_unstructured_never_panics(s in ".*") {
            decode_unstructured(&s);
        }
    }
}
