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

use thiserror::Error;

/// Reasons a DKIM signature could not be validated.
#[derive(Error, Debug)]
pub enum Error {
    /// No pass/fail status could be ascribed to the signature: unsupported
    /// or weak algorithms, missing keys, DNS trouble, unexpected errors.
    #[error(transparent)]
    Ambivalent(#[from] Ambivalence),
    /// The signature is objectively invalid.
    #[error(transparent)]
    Fail(#[from] Failure),
}

impl Error {
    /// Whether the same signature might verify if checked again later.
    pub fn is_transient(&self) -> bool {
        matches!(*self, Error::Ambivalent(Ambivalence::DnsTxtUnavailable(..)))
    }
}

#[derive(Error, Debug)]
pub enum Ambivalence {
    #[error("unexpected OpenSSL error: {0}")]
    Ssl(openssl::error::ErrorStack),
    #[error("can't parse DKIM-Signature header: {0}")]
    HeaderParse(String),
    #[error("can't parse TXT record {0}: {1}")]
    DnsTxtParse(String, String),
    #[error("can't find TXT record {0}, or it is not DKIM1")]
    DnsTxtNotFound(String),
    #[error("can't fetch TXT record {0}: {1}")]
    DnsTxtUnavailable(String, String),
    #[error("verification failed, but the selector is in test mode: {0}")]
    TestMode(Failure),
    #[error("unsupported DKIM version")]
    UnsupportedVersion,
    #[error("RSA key is unreasonably large")]
    RsaKeyTooBig,
    #[error("signature uses a weak hash function")]
    WeakHashFunction,
    #[error("signature uses a weak key")]
    WeakKey,
}

#[derive(Error, Debug)]
pub enum Failure {
    #[error("body is shorter than the l= tag indicates")]
    BodyTruncated,
    #[error("the computed body hash does not match the bh= tag")]
    BodyHashMismatch,
    #[error("the computed message hash does not match the signature")]
    SignatureMismatch,
    #[error("the public key was revoked")]
    PublicKeyRevoked,
    #[error("the From header is not signed")]
    FromFieldUnsigned,
    #[error("the hash algorithm is not allowed by the TXT record")]
    UnacceptableHashAlgorithm,
    #[error("the key type does not match the signature algorithm")]
    SignatureAlgorithmMismatch,
    #[error("the public key is invalid")]
    InvalidPublicKey,
    #[error("the hash algorithm cannot be used with the signature algorithm")]
    InvalidHashSignatureCombination,
    #[error("the signature has expired")]
    ExpiredSignature,
    #[error("the signature is dated in the future")]
    FutureSignature,
}
