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

use std::collections::HashMap;

use super::{Ambivalence, Error, Failure, Header};
use crate::mime::header::FULL_HEADER_LINE;

/// Builds the data covered by the signature of `header`.
///
/// Each name in `h=` takes the last not-yet-used field of that name, working
/// upwards through the header block; names with no such field contribute
/// nothing. The `DKIM-Signature` field itself comes last, with its `b=`
/// value removed and without a trailing CRLF.
pub(super) fn header_hash_data(
    header: &Header<'_>,
    header_block: &[u8],
) -> Vec<u8> {
    let fields = FULL_HEADER_LINE
        .captures_iter(header_block)
        .filter_map(|m| {
            // Non-UTF-8 fields can't be named by `h=`
            let name = std::str::from_utf8(m.get(2)?.as_bytes()).ok()?;
            let field = std::str::from_utf8(m.get(1)?.as_bytes()).ok()?;
            Some((name, field))
        })
        .collect::<Vec<_>>();

    let canonicalisation = header.canonicalisation.header;
    let mut out = Vec::<u8>::with_capacity(header_block.len() / 4);
    let mut used = HashMap::<String, usize>::new();
    for signed in &header.signed_headers {
        let n = used.entry(signed.to_ascii_lowercase()).or_insert(0);
        let field = fields
            .iter()
            .rev()
            .filter(|&&(name, _)| signed.eq_ignore_ascii_case(name))
            .nth(*n);
        *n += 1;

        if let Some(&(_, field)) = field {
            canonicalisation.canonicalise(&mut out, field);
            out.extend_from_slice(b"\r\n");
        }
    }

    canonicalisation.canonicalise(&mut out, &header.raw().without_signature());
    out
}

/// Computes the body hash of `body` as configured by `header`.
pub(super) fn body_hash(
    header: &Header<'_>,
    body: &[u8],
) -> Result<Vec<u8>, Error> {
    let canonical = header.canonicalisation.body.canonicalise(body);
    let hashed = match header.body_length {
        None => &canonical[..],
        Some(limit) => {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            canonical.get(..limit).ok_or(Failure::BodyTruncated)?
        },
    };

    openssl::hash::hash(header.algorithm.hash.message_digest(), hashed)
        .map(|digest| digest.to_vec())
        .map_err(|e| Ambivalence::Ssl(e).into())
}
