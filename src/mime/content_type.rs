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

use std::fmt;

/// A parsed `Content-Type` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    /// Lower case.
    pub typ: String,
    /// Lower case.
    pub subtype: String,
    /// Names are lower case. Values are unquoted but otherwise as written.
    pub parameters: Vec<(String, String)>,
}

impl Default for ContentType {
    /// `text/plain` with no charset, which body decoding reads as UTF-8.
    fn default() -> Self {
        ContentType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            parameters: vec![],
        }
    }
}

impl ContentType {
    /// Parses an unfolded `Content-Type` value.
    ///
    /// Malformed parameters are skipped; a malformed `type/subtype` makes the
    /// whole value invalid.
    pub fn parse(value: &str) -> Option<Self> {
        let mut segments = split_unquoted(value, ';').into_iter();
        let (typ, subtype) = segments.next()?.split_once('/')?;
        let (typ, subtype) = (typ.trim(), subtype.trim());
        if !is_token(typ) || !is_token(subtype) {
            return None;
        }

        let parameters = segments
            .filter_map(|segment| {
                let (name, value) = segment.split_once('=')?;
                let name = name.trim();
                if !is_token(name) {
                    return None;
                }
                Some((name.to_ascii_lowercase(), unquote(value.trim())))
            })
            .collect();

        Some(ContentType {
            typ: typ.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parameters,
        })
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn is(&self, typ: &str, subtype: &str) -> bool {
        self.is_type(typ) && self.subtype.eq_ignore_ascii_case(subtype)
    }

    /// Returns the first value of the named parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| &**v)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {}=\"{}\"", name, value.replace('"', "\\\""))?;
        }
        Ok(())
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

/// Splits `s` on `delim` wherever it is not inside a quoted string.
fn split_unquoted(s: &str, delim: char) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (ix, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if in_quotes && '\\' == ch {
            escaped = true;
        } else if '"' == ch {
            in_quotes = !in_quotes;
        } else if !in_quotes && delim == ch {
            segments.push(&s[start..ix]);
            start = ix + ch.len_utf8();
        }
    }

    segments.push(&s[start..]);
    segments
}

fn unquote(value: &str) -> String {
    let inner = match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => return value.to_owned(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if '\\' == ch {
            out.extend(chars.next());
        } else {
            out.push(ch);
        }
    }
    out
}
