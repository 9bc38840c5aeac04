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

use chrono::prelude::*;

use super::{
    hash, Ambivalence, Error, Failure, HashAlgorithm, Header,
    SignatureAlgorithm, TxtRecord, HEADER_NAME,
};
use crate::mime::header::FULL_HEADER_LINE;

const MAX_SIGNATURES: usize = 8;
const MAX_RSA_BITS: u32 = 8192;
const MIN_RSA_BITS: u32 = 1024;

/// Environmental information passed in to the verifier.
#[derive(Clone, Debug)]
pub struct VerificationEnvironment {
    /// The current time.
    pub now: DateTime<Utc>,
    /// The TXT records that were actually fetched.
    pub txt_records: Vec<TxtRecordEntry>,
}

/// The result of fetching TXT records for one selector.
///
/// A selector whose records don't exist simply has no entries. `Err` holds
/// the description of a lookup that failed in transport.
#[derive(Clone, Debug)]
pub struct TxtRecordEntry {
    pub selector: String,
    pub sdid: String,
    pub txt: Result<String, String>,
}

/// The outcome of checking one `DKIM-Signature` header.
#[derive(Debug)]
pub struct Verification {
    /// The signing domain, or empty if the header couldn't be parsed.
    pub sdid: String,
    pub result: Result<(), Error>,
}

/// Processes DKIM verification on an inbound message.
pub struct Verifier<'a> {
    header_block: &'a [u8],
    subs: Vec<Result<Header<'a>, String>>,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier for a message with the given header block.
    ///
    /// Only the first few signatures are considered.
    pub fn new(header_block: &'a [u8]) -> Self {
        let subs = FULL_HEADER_LINE
            .captures_iter(header_block)
            .filter(|m| {
                m.get(2)
                    .and_then(|n| std::str::from_utf8(n.as_bytes()).ok())
                    .is_some_and(|n| HEADER_NAME.eq_ignore_ascii_case(n))
            })
            .filter_map(|m| std::str::from_utf8(m.get(1)?.as_bytes()).ok())
            .take(MAX_SIGNATURES)
            .map(Header::parse)
            .collect();

        Self { header_block, subs }
    }

    /// Returns the `(selector, sdid)` pairs whose TXT records are needed.
    ///
    /// The records live at `${selector}._domainkey.${sdid}`.
    pub fn want_txt_records(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.subs
            .iter()
            .filter_map(|s| s.as_ref().ok())
            .map(|h| (&*h.selector, &*h.sdid))
    }

    /// Verifies every signature against `body`, in header order.
    pub fn finish(
        self,
        body: &[u8],
        env: &VerificationEnvironment,
    ) -> Vec<Verification> {
        self.subs
            .into_iter()
            .map(|sub| match sub {
                Err(syntax_error) => Verification {
                    sdid: String::new(),
                    result: Err(Ambivalence::HeaderParse(syntax_error).into()),
                },
                Ok(header) => Verification {
                    sdid: header.sdid.to_string(),
                    result: verify_signature(
                        &header,
                        self.header_block,
                        body,
                        env,
                    ),
                },
            })
            .collect()
    }
}

// RFC 6376 § 6
fn verify_signature(
    header: &Header<'_>,
    header_block: &[u8],
    body: &[u8],
    env: &VerificationEnvironment,
) -> Result<(), Error> {
    // § 6.1.1
    if 1 != header.version {
        return Err(Ambivalence::UnsupportedVersion.into());
    }

    if !header
        .signed_headers
        .iter()
        .any(|h| h.eq_ignore_ascii_case("From"))
    {
        return Err(Failure::FromFieldUnsigned.into());
    }

    // § 6.1.2 steps 1 to 5: take the first parsable DKIM1 record, else
    // report the first problem seen.
    let selector = format!("{}._domainkey.{}", header.selector, header.sdid);
    let mut problem = None::<Ambivalence>;
    let mut txt_record = None::<TxtRecord<'_>>;
    for entry in &env.txt_records {
        if entry.selector != *header.selector || entry.sdid != *header.sdid {
            continue;
        }

        match entry.txt {
            Ok(ref txt) => match TxtRecord::parse(txt) {
                Ok(r) if "DKIM1" == r.version => {
                    txt_record = Some(r);
                    break;
                },
                Ok(_) => {},
                Err(e) => {
                    problem.get_or_insert_with(|| {
                        Ambivalence::DnsTxtParse(selector.clone(), e)
                    });
                },
            },
            Err(ref e) => {
                problem.get_or_insert_with(|| {
                    Ambivalence::DnsTxtUnavailable(selector.clone(), e.clone())
                });
            },
        }
    }

    let txt_record = match txt_record {
        Some(r) => r,
        None => {
            return Err(problem
                .unwrap_or(Ambivalence::DnsTxtNotFound(selector))
                .into())
        },
    };

    let is_test = txt_record.flags.test;
    verify_with_key(header, header_block, body, env, &txt_record).map_err(
        |e| match e {
            Error::Fail(f) if is_test => {
                Error::Ambivalent(Ambivalence::TestMode(f))
            },
            e => e,
        },
    )
}

fn verify_with_key(
    header: &Header<'_>,
    header_block: &[u8],
    body: &[u8],
    env: &VerificationEnvironment,
    txt_record: &TxtRecord<'_>,
) -> Result<(), Error> {
    // § 6.1.2 steps 6 to 8
    if txt_record
        .acceptable_hash_algorithms
        .as_ref()
        .is_some_and(|aha| !aha.contains(&header.algorithm.hash))
    {
        return Err(Failure::UnacceptableHashAlgorithm.into());
    }

    if txt_record.public_key.is_empty() {
        return Err(Failure::PublicKeyRevoked.into());
    }

    if txt_record.key_type != header.algorithm.signature {
        return Err(Failure::SignatureAlgorithmMismatch.into());
    }

    // § 6.1.3
    if hash::body_hash(header, body)? != header.body_hash {
        return Err(Failure::BodyHashMismatch.into());
    }

    let (public_key, acceptable_strength) = match txt_record.key_type {
        SignatureAlgorithm::Rsa => {
            let pk = openssl::rsa::Rsa::public_key_from_der(
                &txt_record.public_key,
            )
            .and_then(openssl::pkey::PKey::from_rsa)
            .map_err(|_| Failure::InvalidPublicKey)?;
            if pk.bits() > MAX_RSA_BITS {
                return Err(Ambivalence::RsaKeyTooBig.into());
            }
            // RFC 8301
            let acceptable_strength = pk.bits() >= MIN_RSA_BITS;
            (pk, acceptable_strength)
        },

        // RFC 8463; all Ed25519 keys are the same size
        SignatureAlgorithm::Ed25519 => (
            openssl::pkey::PKey::public_key_from_raw_bytes(
                &txt_record.public_key,
                openssl::pkey::Id::ED25519,
            )
            .map_err(|_| Failure::InvalidPublicKey)?,
            true,
        ),
    };

    let header_data = hash::header_hash_data(header, header_block);
    let mut verifier = match header.algorithm.signature {
        SignatureAlgorithm::Rsa => openssl::sign::Verifier::new(
            header.algorithm.hash.message_digest(),
            &public_key,
        ),
        SignatureAlgorithm::Ed25519 => {
            if HashAlgorithm::Sha256 != header.algorithm.hash {
                return Err(Failure::InvalidHashSignatureCombination.into());
            }
            // OpenSSL rejects explicit configuration of the digest.
            openssl::sign::Verifier::new_without_digest(&public_key)
        },
    }
    .map_err(Ambivalence::Ssl)?;

    // A malformed signature is reported as an error by some key types.
    if !verifier
        .verify_oneshot(&header.signature, &header_data)
        .unwrap_or(false)
    {
        return Err(Failure::SignatureMismatch.into());
    }

    // RFC 8301
    if HashAlgorithm::Sha1 == header.algorithm.hash {
        return Err(Ambivalence::WeakHashFunction.into());
    }

    if !acceptable_strength {
        return Err(Ambivalence::WeakKey.into());
    }

    if header.signature_expiration.is_some_and(|x| x < env.now) {
        return Err(Failure::ExpiredSignature.into());
    }

    if header
        .signature_timestamp
        .is_some_and(|t| t > env.now + chrono::Duration::days(1))
    {
        return Err(Failure::FutureSignature.into());
    }

    Ok(())
}
