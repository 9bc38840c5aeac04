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

//! DKIM verification (RFC 6376, RFC 8301, RFC 8463).

mod canonicalisation;
mod error;
mod hash;
mod header;
#[cfg(test)]
mod sign;
mod verify;

use chrono::prelude::*;
use log::debug;

#[allow(unused_imports)]
pub use canonicalisation::{
    BodyCanonicalisation, Canonicalisation, HeaderCanonicalisation,
};
pub use error::*;
#[allow(unused_imports)]
pub use header::{
    Algorithm, HashAlgorithm, Header, SignatureAlgorithm, TxtRecord,
    HEADER_NAME,
};
#[cfg(test)]
pub use sign::{KeyPair, Signer};
pub use verify::{
    TxtRecordEntry, Verification, VerificationEnvironment, Verifier,
};

use super::header::split_message;
use crate::support::dns::{DnsError, TxtLookup};

/// Verifies every DKIM signature on `message`, fetching keys through
/// `lookup`.
///
/// `message` must use CRLF line endings.
pub fn verify(
    message: &[u8],
    lookup: &dyn TxtLookup,
    now: DateTime<Utc>,
) -> Vec<Verification> {
    let (header_block, body) = split_message(message);
    let verifier = Verifier::new(header_block);

    let mut fetched = Vec::<(&str, &str)>::new();
    let mut txt_records = Vec::<TxtRecordEntry>::new();
    for (selector, sdid) in verifier.want_txt_records() {
        if fetched.contains(&(selector, sdid)) {
            continue;
        }
        fetched.push((selector, sdid));

        let name = format!("{selector}._domainkey.{sdid}");
        let results = match lookup.lookup_txt(&name) {
            Ok(records) => records.into_iter().map(Ok).collect(),
            Err(DnsError::NotFound) => Vec::new(),
            Err(DnsError::Transport(e)) => {
                debug!("TXT lookup for {} failed: {}", name, e);
                vec![Err(e)]
            },
        };

        txt_records.extend(results.into_iter().map(|txt| TxtRecordEntry {
            selector: selector.to_owned(),
            sdid: sdid.to_owned(),
            txt,
        }));
    }

    verifier.finish(body, &VerificationEnvironment { now, txt_records })
}
