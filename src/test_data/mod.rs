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

//! Fixtures shared by the tests of several modules.

use chrono::prelude::*;
use lazy_static::lazy_static;

use crate::mime::dkim::{KeyPair, Signer};
use crate::support::dns::DnsError;

pub const DOMAIN1: &str = "a.example.com";
pub const DOMAIN2: &str = "b.example.com";
pub const DOMAIN3: &str = "c.example.com";

pub const USER1: &str = "user1@a.example.com";
pub const USER2: &str = "user2@a.example.com";
pub const USER3: &str = "user3@b.example.com";
pub const USER4: &str = "user4@b.example.com";
pub const USER5: &str = "user5@c.example.com";

pub const TO: &str = "tooltracker@a.example.com";
pub const TOOL1: &str = "tool1";
pub const TOOL2: &str = "tool2";

/// The selector `test_dns` serves the test key under, for every domain.
pub const SELECTOR: &str = "test";
/// The selector `test_dns` serves a revoked key under, for every domain.
pub const REVOKED_SELECTOR: &str = "revoked";

/// A multipart/alternative message from USER1 with both text and HTML
/// versions of the body, as a typical webmail client sends it.
pub static BORROWED_ALTERNATIVE: &[u8] =
    include_bytes!("borrowed_alternative.eml");

/// Produces a minimal plain text message with DOS line endings.
pub fn plain_message(from: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{}\r\n",
        from,
        TO,
        subject,
        body.replace("\r\n", "\n").replace('\n', "\r\n"),
    )
    .into_bytes()
}

pub struct TestKeys {
    pub rsa1024: KeyPair,
    pub rsa1024_txt: String,
    pub rsa512: KeyPair,
    pub rsa512_txt: String,
    pub ed25519: KeyPair,
    pub ed25519_txt: String,
}

lazy_static! {
    pub static ref TEST_KEYS: TestKeys = TestKeys::new();
}

impl TestKeys {
    fn new() -> Self {
        fn format_txt(algorithm: &str, pub_key: &[u8]) -> String {
            format!("v=DKIM1;k={algorithm};p={}", base64::encode(pub_key))
        }

        let rsa1024 = openssl::rsa::Rsa::generate(1024).unwrap();
        let rsa1024_txt =
            format_txt("rsa", &rsa1024.public_key_to_der().unwrap());
        let rsa1024 = openssl::pkey::PKey::from_rsa(rsa1024).unwrap();

        let rsa512 = openssl::rsa::Rsa::generate(512).unwrap();
        let rsa512_txt = format_txt("rsa", &rsa512.public_key_to_der().unwrap());
        let rsa512 = openssl::pkey::PKey::from_rsa(rsa512).unwrap();

        let ed25519 = openssl::pkey::PKey::generate_ed25519().unwrap();
        let ed25519_txt =
            format_txt("ed25519", &ed25519.raw_public_key().unwrap());

        Self {
            rsa1024,
            rsa1024_txt,
            rsa512,
            rsa512_txt,
            ed25519,
            ed25519_txt,
        }
    }
}

/// Signs `message` as `domain` with the shared RSA key.
pub fn sign(message: &[u8], domain: &str, selector: &str) -> Vec<u8> {
    Signer::new(
        selector,
        &TEST_KEYS.rsa1024,
        Signer::default_template(Utc::now(), domain),
    )
    .sign(message)
}

/// DNS for the test domains: `test` holds the shared RSA key and `revoked`
/// a revoked one, under every domain. Nothing else exists.
pub fn test_dns() -> impl Fn(&str) -> Result<Vec<String>, DnsError> {
    |name: &str| -> Result<Vec<String>, DnsError> {
        let (selector, _domain) = name
            .split_once("._domainkey.")
            .ok_or(DnsError::NotFound)?;
        match selector {
            SELECTOR => Ok(vec![TEST_KEYS.rsa1024_txt.clone()]),
            REVOKED_SELECTOR => Ok(vec!["v=DKIM1; p=".to_owned()]),
            _ => Err(DnsError::NotFound),
        }
    }
}
