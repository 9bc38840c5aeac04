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

//! RFC 5322 address syntax.
//!
//! The grammar accepts the "obsolete" forms (routes, dots in display names,
//! empty list elements) since real agents still produce them. RFC 6532
//! non-ASCII text is allowed wherever atoms are.

use std::borrow::Cow;
use std::fmt;

use lazy_static::lazy_static;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, take, take_while1},
    character::complete::char,
    combinator::{map, opt},
    multi::{
        fold_many0, many0, many0_count, many1_count, separated_nonempty_list,
    },
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use regex::Regex;

/// A bare e-mail address.
///
/// The domain is always lower case, so two addresses for the same mailbox
/// compare equal as long as the local parts were written the same way.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    pub fn new(local: impl Into<String>, domain: &str) -> Self {
        Self {
            local: local.into(),
            domain: domain.to_ascii_lowercase(),
        }
    }

    /// Whether this address belongs to `domain`, ignoring case.
    pub fn is_in_domain(&self, domain: &str) -> bool {
        self.domain.eq_ignore_ascii_case(domain)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

/// Parses a complete address list, as found in `From`, `To`, etc.
///
/// Groups are flattened into their member mailboxes. Returns `None` if the
/// value is not entirely an address list.
pub fn parse_address_list(value: &[u8]) -> Option<Vec<EmailAddress>> {
    match address_list(value) {
        Ok((rest, addresses)) if rest.is_empty() => Some(addresses),
        _ => None,
    }
}

/// Parses a single mailbox: `addr@example.com`, `<addr@example.com>`, or
/// `Display Name <addr@example.com>`.
pub fn parse_mailbox(value: &str) -> Option<EmailAddress> {
    match mailbox(value.trim().as_bytes()) {
        Ok((rest, address)) if rest.is_empty() => Some(address),
        _ => None,
    }
}

lazy_static! {
    static ref ADDRESS_CANDIDATE: Regex =
        Regex::new(r#"[^\s<>()\[\],;:"]+@[^\s<>()\[\],;:"]+"#).unwrap();
}

/// Finds every e-mail address mentioned in free text.
///
/// Unlike `parse_address_list`, this does not require the text to be a
/// well-formed list, so it copes with things like "bob@a.example and
/// carol@b.example." Duplicates are removed; order is preserved.
pub fn find_addresses(text: &str) -> Vec<EmailAddress> {
    let mut found = Vec::<EmailAddress>::new();
    for candidate in ADDRESS_CANDIDATE.find_iter(text) {
        // A sentence may end right after an address.
        let candidate = candidate.as_str().trim_end_matches('.');
        let address = match addr_spec(candidate.as_bytes()) {
            Ok((rest, address)) if rest.is_empty() => address,
            _ => continue,
        };

        if !found.contains(&address) {
            found.push(address);
        }
    }

    found
}

type Parsed<'a, T> = IResult<&'a [u8], T>;

fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
        // RFC 6532
        || ch >= 0x80
}

// RFC 5322 3.2.1, including the 8-bit clean obsolete form
fn quoted_pair(i: &[u8]) -> Parsed<'_, &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// Folding is undone elsewhere, so line endings are just whitespace here.
fn fws(i: &[u8]) -> Parsed<'_, &[u8]> {
    map(is_a(" \t\r\n"), |_| &b" "[..])(i)
}

fn ctext(i: &[u8]) -> Parsed<'_, &[u8]> {
    is_not("()\\ \t\r\n")(i)
}

fn ccontent(i: &[u8]) -> Parsed<'_, ()> {
    alt((
        map(ctext, |_| ()),
        map(quoted_pair, |_| ()),
        map(fws, |_| ()),
        comment,
    ))(i)
}

// Comments nest.
fn comment(i: &[u8]) -> Parsed<'_, ()> {
    map(delimited(char('('), many0_count(ccontent), char(')')), |_| ())(i)
}

// Always succeeds, possibly consuming nothing.
fn cfws(i: &[u8]) -> Parsed<'_, ()> {
    map(many0_count(alt((map(fws, |_| ()), comment))), |_| ())(i)
}

fn atom(i: &[u8]) -> Parsed<'_, &[u8]> {
    delimited(cfws, take_while1(is_atext), cfws)(i)
}

fn qcontent(i: &[u8]) -> Parsed<'_, &[u8]> {
    alt((is_not(" \t\r\n\\\""), quoted_pair, fws))(i)
}

fn quoted_string(i: &[u8]) -> Parsed<'_, Vec<u8>> {
    delimited(
        pair(cfws, char('"')),
        fold_many0(qcontent, Vec::new(), |mut acc: Vec<u8>, item| {
            acc.extend_from_slice(item);
            acc
        }),
        pair(char('"'), cfws),
    )(i)
}

fn word(i: &[u8]) -> Parsed<'_, Cow<'_, [u8]>> {
    alt((map(atom, Cow::Borrowed), map(quoted_string, Cow::Owned)))(i)
}

// Agents commonly put unquoted '.' into display names.
fn obs_dot(i: &[u8]) -> Parsed<'_, Cow<'_, [u8]>> {
    terminated(map(char('.'), |_| Cow::Borrowed(&b"."[..])), cfws)(i)
}

fn phrase(i: &[u8]) -> Parsed<'_, ()> {
    map(pair(word, many0(alt((word, obs_dot)))), |_| ())(i)
}

// `dot-atom / quoted-string / obs-local-part` all conform to
// `word *("." word)`.
fn local_part(i: &[u8]) -> Parsed<'_, Vec<Cow<'_, [u8]>>> {
    separated_nonempty_list(char('.'), word)(i)
}

fn dcontent(i: &[u8]) -> Parsed<'_, &[u8]> {
    alt((is_not("[]\\ \t\r\n"), quoted_pair, fws))(i)
}

fn domain_literal(i: &[u8]) -> Parsed<'_, Vec<u8>> {
    map(
        delimited(
            pair(cfws, char('[')),
            fold_many0(dcontent, vec![b'['], |mut acc: Vec<u8>, item| {
                acc.extend_from_slice(item);
                acc
            }),
            pair(char(']'), cfws),
        ),
        |mut literal| {
            literal.push(b']');
            literal
        },
    )(i)
}

fn domain(i: &[u8]) -> Parsed<'_, String> {
    alt((
        map(separated_nonempty_list(char('.'), atom), |parts| {
            join_parts(parts.into_iter().map(Cow::Borrowed))
        }),
        map(domain_literal, |literal| {
            String::from_utf8_lossy(&literal).into_owned()
        }),
    ))(i)
}

fn addr_spec(i: &[u8]) -> Parsed<'_, EmailAddress> {
    map(
        pair(local_part, preceded(char('@'), domain)),
        |(local, domain)| EmailAddress::new(join_parts(local), &domain),
    )(i)
}

// RFC 5322 4.4 obsolete source routes, which are discarded.
fn obs_route(i: &[u8]) -> Parsed<'_, ()> {
    map(
        tuple((
            char('@'),
            domain,
            many0_count(tuple((
                many0_count(alt((
                    map(fws, |_| ()),
                    comment,
                    map(char(','), |_| ()),
                ))),
                char('@'),
                domain,
            ))),
            char(':'),
        )),
        |_| (),
    )(i)
}

fn angle_addr(i: &[u8]) -> Parsed<'_, EmailAddress> {
    delimited(
        tuple((cfws, char('<'), opt(obs_route))),
        addr_spec,
        pair(char('>'), cfws),
    )(i)
}

fn mailbox(i: &[u8]) -> Parsed<'_, EmailAddress> {
    alt((preceded(opt(phrase), angle_addr), addr_spec))(i)
}

fn list_delimiter(i: &[u8]) -> Parsed<'_, ()> {
    map(many1_count(tuple((cfws, char(','), cfws))), |_| ())(i)
}

fn mailbox_list(i: &[u8]) -> Parsed<'_, Vec<EmailAddress>> {
    delimited(
        opt(list_delimiter),
        separated_nonempty_list(list_delimiter, mailbox),
        opt(list_delimiter),
    )(i)
}

fn group(i: &[u8]) -> Parsed<'_, Vec<EmailAddress>> {
    map(
        preceded(
            terminated(phrase, char(':')),
            terminated(opt(mailbox_list), tuple((cfws, char(';'), cfws))),
        ),
        Option::unwrap_or_default,
    )(i)
}

fn address(i: &[u8]) -> Parsed<'_, Vec<EmailAddress>> {
    alt((map(mailbox, |m| vec![m]), group))(i)
}

fn address_list(i: &[u8]) -> Parsed<'_, Vec<EmailAddress>> {
    map(
        delimited(
            opt(list_delimiter),
            separated_nonempty_list(list_delimiter, address),
            opt(list_delimiter),
        ),
        |addresses| addresses.into_iter().flatten().collect(),
    )(i)
}

fn join_parts<'a>(parts: impl IntoIterator<Item = Cow<'a, [u8]>>) -> String {
    let mut joined = Vec::<u8>::new();
    for part in parts {
        if !joined.is_empty() {
            joined.push(b'.');
        }
        joined.extend_from_slice(&part);
    }

    match String::from_utf8(joined) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
