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

use chrono::prelude::*;

use super::{
    hash, Algorithm, BodyCanonicalisation, Canonicalisation, HashAlgorithm,
    Header, HeaderCanonicalisation, SignatureAlgorithm,
};
use crate::mime::header::split_message;

pub type KeyPair = openssl::pkey::PKey<openssl::pkey::Private>;

/// Adds a `DKIM-Signature` header to messages.
pub struct Signer<'a> {
    selector: String,
    key: &'a KeyPair,
    template: Header<'static>,
}

impl<'a> Signer<'a> {
    /// Creates a signer using `template` for everything but the selector,
    /// hashes and signature algorithm, which follows the key type.
    pub fn new(selector: &str, key: &'a KeyPair, template: Header<'static>) -> Self {
        Self {
            selector: selector.to_owned(),
            key,
            template,
        }
    }

    /// A template signing the usual headers, valid for a week from `now`.
    pub fn default_template(now: DateTime<Utc>, sdid: &str) -> Header<'static> {
        Header {
            raw: None,
            version: 1,
            algorithm: Algorithm {
                hash: HashAlgorithm::Sha256,
                signature: SignatureAlgorithm::Rsa,
            },
            signature: Vec::new(),
            body_hash: Vec::new(),
            canonicalisation: Canonicalisation {
                header: HeaderCanonicalisation::Relaxed,
                body: BodyCanonicalisation::Simple,
            },
            sdid: Cow::Owned(sdid.to_owned()),
            signed_headers: ["Content-Type", "Date", "From", "Subject", "To"]
                .into_iter()
                .map(Cow::Borrowed)
                .collect(),
            body_length: None,
            dns_txt: true,
            selector: Cow::Borrowed(""),
            signature_timestamp: Some(now),
            signature_expiration: Some(now + chrono::Duration::days(7)),
        }
    }

    /// Returns `message` with a signature header prepended.
    ///
    /// Panics if signing fails.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let (header_block, body) = split_message(message);

        let mut header = self.template.clone();
        header.raw = None;
        header.signature.clear();
        header.selector = Cow::Owned(self.selector.clone());
        header.algorithm.signature = match self.key.id() {
            openssl::pkey::Id::RSA => SignatureAlgorithm::Rsa,
            openssl::pkey::Id::ED25519 => SignatureAlgorithm::Ed25519,
            id => panic!("unexpected key type: {id:?}"),
        };
        header.body_hash =
            hash::body_hash(&header, body).expect("body hash failed");

        let hash_data = hash::header_hash_data(&header, header_block);
        let mut signer = match header.algorithm.signature {
            SignatureAlgorithm::Rsa => openssl::sign::Signer::new(
                header.algorithm.hash.message_digest(),
                self.key,
            ),
            SignatureAlgorithm::Ed25519 => {
                openssl::sign::Signer::new_without_digest(self.key)
            },
        }
        .expect("can't create signer");
        header.signature = signer
            .sign_oneshot_to_vec(&hash_data)
            .expect("signing failed");

        let mut out = header.raw().text.as_bytes().to_vec();
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(message);
        out
    }
}
