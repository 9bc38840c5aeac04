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

//! RFC 6376 § 3.4 canonicalisation algorithms.

use std::fmt;
use std::mem;

use super::header::FWS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BodyCanonicalisation {
    #[default]
    Simple,
    Relaxed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HeaderCanonicalisation {
    #[default]
    Simple,
    Relaxed,
}

/// The `c` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Canonicalisation {
    pub header: HeaderCanonicalisation,
    pub body: BodyCanonicalisation,
}

impl fmt::Display for BodyCanonicalisation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Simple => write!(f, "simple"),
            Self::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl fmt::Display for HeaderCanonicalisation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Simple => write!(f, "simple"),
            Self::Relaxed => write!(f, "relaxed"),
        }
    }
}

impl fmt::Display for Canonicalisation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.header, self.body)
    }
}

impl Canonicalisation {
    /// Parses the value of the `c` tag. The body algorithm defaults to
    /// `simple`.
    pub(super) fn parse(s: &str) -> Result<Self, String> {
        let (header, body) = s.split_once('/').unwrap_or((s, "simple"));

        let header = match header {
            "simple" => HeaderCanonicalisation::Simple,
            "relaxed" => HeaderCanonicalisation::Relaxed,
            h => return Err(format!("unknown header canonicalisation: {h}")),
        };
        let body = match body {
            "simple" => BodyCanonicalisation::Simple,
            "relaxed" => BodyCanonicalisation::Relaxed,
            b => return Err(format!("unknown body canonicalisation: {b}")),
        };

        Ok(Self { header, body })
    }
}

impl HeaderCanonicalisation {
    /// Canonicalises one whole header field (name, colon and value, without
    /// the final line ending) and appends it to `out`.
    ///
    /// No CRLF is appended.
    pub(super) fn canonicalise(self, out: &mut Vec<u8>, field: &str) {
        match self {
            // § 3.4.1
            Self::Simple => out.extend_from_slice(field.as_bytes()),

            // § 3.4.2
            Self::Relaxed => {
                let (name, value) = field.split_once(':').unwrap_or((field, ""));
                out.extend_from_slice(
                    name.trim_matches(FWS).to_lowercase().as_bytes(),
                );
                out.push(b':');

                let mut space = false;
                for ch in value.trim_matches(FWS).chars() {
                    if FWS.contains(&ch) {
                        space = true;
                        continue;
                    }
                    if mem::take(&mut space) {
                        out.push(b' ');
                    }
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            },
        }
    }
}

impl BodyCanonicalisation {
    /// Canonicalises a whole message body.
    ///
    /// Lines are delimited by CRLF only; lone CRs and LFs are ordinary data.
    /// An empty body canonicalises to a single CRLF under both algorithms.
    pub fn canonicalise(self, body: &[u8]) -> Vec<u8> {
        let mut lines = split_crlf(body)
            .map(|line| match self {
                // § 3.4.3
                Self::Simple => line.to_vec(),
                // § 3.4.4
                Self::Relaxed => relax_line(line),
            })
            .collect::<Vec<_>>();

        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        let mut out = Vec::with_capacity(body.len() + 2);
        for line in lines {
            out.extend_from_slice(&line);
            out.extend_from_slice(b"\r\n");
        }
        if out.is_empty() {
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

fn split_crlf(mut data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }

        match memchr::memmem::find(data, b"\r\n") {
            Some(ix) => {
                let line = &data[..ix];
                data = &data[ix + 2..];
                Some(line)
            },
            None => {
                done = true;
                Some(data)
            },
        }
    })
}

/// Reduces runs of WSP to a single space and drops trailing WSP.
fn relax_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut space = false;
    for &b in line {
        if b' ' == b || b'\t' == b {
            space = true;
            continue;
        }
        if mem::take(&mut space) {
            out.push(b' ');
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(canon: HeaderCanonicalisation, field: &str) -> String {
        let mut out = Vec::new();
        canon.canonicalise(&mut out, field);
        String::from_utf8(out).unwrap()
    }

    fn body(canon: BodyCanonicalisation, body: &str) -> String {
        String::from_utf8(canon.canonicalise(body.as_bytes())).unwrap()
    }

    #[test]
    fn rfc6376_header_examples() {
        // § 3.4.5
        assert_eq!(
            "A: X",
            header(HeaderCanonicalisation::Simple, "A: X"),
        );
        assert_eq!(
            "B : Y\t\r\n\tZ  ",
            header(HeaderCanonicalisation::Simple, "B : Y\t\r\n\tZ  "),
        );
        assert_eq!("a:X", header(HeaderCanonicalisation::Relaxed, "A: X"));
        assert_eq!(
            "b:Y Z",
            header(HeaderCanonicalisation::Relaxed, "B : Y\t\r\n\tZ  "),
        );
        assert_eq!(
            "ü無:Ü無",
            header(HeaderCanonicalisation::Relaxed, "Ü無: Ü無"),
        );
        assert_eq!(
            "dkim-signature:b=;x =y",
            header(
                HeaderCanonicalisation::Relaxed,
                "DKIM-Signature: b=;x  =y"
            ),
        );
    }

    #[test]
    fn rfc6376_body_examples() {
        // § 3.4.5
        assert_eq!(
            " C \r\nD \t E\r\n",
            body(BodyCanonicalisation::Simple, " C \r\nD \t E\r\n\r\n\r\n"),
        );
        assert_eq!(
            " C\r\nD E\r\n",
            body(BodyCanonicalisation::Relaxed, " C \r\nD \t E\r\n\r\n\r\n"),
        );
    }

    #[test]
    fn simple_body_edge_cases() {
        let simple = BodyCanonicalisation::Simple;
        assert_eq!("\r\n", body(simple, ""));
        assert_eq!("\r\n", body(simple, "\r\n\r\n"));
        assert_eq!("foo\r\n", body(simple, "foo"));
        assert_eq!("foo\r\r\n", body(simple, "foo\r"));
        assert_eq!("foo\r\n\r\r\n", body(simple, "foo\r\n\r"));
        assert_eq!("foo\n\r\n", body(simple, "foo\n"));
        assert_eq!(" foo \t\r\n", body(simple, " foo \t"));
    }

    #[test]
    fn relaxed_body_edge_cases() {
        let relaxed = BodyCanonicalisation::Relaxed;
        assert_eq!("\r\n", body(relaxed, ""));
        assert_eq!("\r\n", body(relaxed, " \t\r\n\r\n"));
        assert_eq!("foo\r\n\r\nbar\r\n", body(relaxed, "foo\r\n \t\r\nbar"));
        assert_eq!("foo \rbar\r\n", body(relaxed, "foo \rbar"));
        assert_eq!("foo \r \r\r\n", body(relaxed, "foo\t\r  \r\r\n"));
        assert_eq!(
            " foo \n bar \n baz\r\n",
            body(relaxed, " foo \n bar \n baz "),
        );
        assert_eq!(
            "foo\r\r\r\n\n\nbar\n\r\n",
            body(relaxed, "foo\r\r\r\n\n\nbar\n"),
        );
    }
}
