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
use std::fmt;
use std::ops::Range;

use chrono::prelude::*;

use super::canonicalisation::{
    BodyCanonicalisation, Canonicalisation, HeaderCanonicalisation,
};

pub const HEADER_NAME: &str = "DKIM-Signature";
pub(super) const FWS: &[char] = &[' ', '\t', '\r', '\n'];

// 9999-12-31T23:59:59Z
const MAX_TIMESTAMP: i64 = 253_402_300_799;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum HashAlgorithm {
    /// RFC 6376, obsoleted by RFC 8301
    Sha1,
    /// RFC 6376
    Sha256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RFC 6376
    Rsa,
    /// RFC 8463
    Ed25519,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Algorithm {
    pub signature: SignatureAlgorithm,
    pub hash: HashAlgorithm,
}

/// The text of a `DKIM-Signature` header as it appears in a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHeader<'a> {
    /// The whole header field, from the `D` of `DKIM-Signature` up to but not
    /// including the final line ending.
    pub text: Cow<'a, str>,
    /// The range in `text` of the value of the `b` tag, which is left out of
    /// the header hash.
    pub b: Range<usize>,
}

impl RawHeader<'_> {
    /// The header text with the value of the `b` tag removed.
    pub fn without_signature(&self) -> String {
        let mut s = String::with_capacity(self.text.len());
        s.push_str(&self.text[..self.b.start]);
        s.push_str(&self.text[self.b.end..]);
        s
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header<'a> {
    /// The original text, if this header was parsed.
    pub raw: Option<RawHeader<'a>>,
    /// `v`
    pub version: u32,
    /// `a`
    pub algorithm: Algorithm,
    /// `b`, decoded.
    pub signature: Vec<u8>,
    /// `bh`, decoded.
    pub body_hash: Vec<u8>,
    /// `c`
    pub canonicalisation: Canonicalisation,
    /// `d`
    pub sdid: Cow<'a, str>,
    /// `h`
    pub signed_headers: Vec<Cow<'a, str>>,
    /// `l`
    pub body_length: Option<u64>,
    /// Whether `q` includes `dns/txt`.
    pub dns_txt: bool,
    /// `s`
    pub selector: Cow<'a, str>,
    /// `t`
    pub signature_timestamp: Option<DateTime<Utc>>,
    /// `x`
    pub signature_expiration: Option<DateTime<Utc>>,
}

impl<'a> Header<'a> {
    /// Parses a whole `DKIM-Signature` header field.
    ///
    /// The text includes the `DKIM-Signature:` prefix and excludes the final
    /// line ending. Unknown tags are ignored; duplicate tags are an error.
    pub fn parse(whole_header: &'a str) -> Result<Self, String> {
        let (header_name, s) = whole_header
            .split_once(':')
            .ok_or_else(|| "DKIM header didn't have :".to_owned())?;
        let offset = header_name.len() + 1;

        let mut version = None::<u32>;
        let mut algorithm = None::<Algorithm>;
        let mut signature = None::<(Vec<u8>, Range<usize>)>;
        let mut body_hash = None::<Vec<u8>>;
        let mut canonicalisation = None::<Canonicalisation>;
        let mut sdid = None::<Cow<'a, str>>;
        let mut signed_headers = None::<Vec<Cow<'a, str>>>;
        let mut body_length = None::<u64>;
        let mut dns_txt = None::<bool>;
        let mut selector = None::<Cow<'a, str>>;
        let mut signature_timestamp = None::<DateTime<Utc>>;
        let mut signature_expiration = None::<DateTime<Utc>>;

        for (k, v, v_range) in split_kv_pairs(s) {
            match k {
                "v" => set_opt(
                    k,
                    &mut version,
                    v.parse().map_err(|_| format!("unparsable v={v}"))?,
                )?,
                "a" => set_opt(k, &mut algorithm, Algorithm::parse(v)?)?,
                "b" => set_opt(
                    k,
                    &mut signature,
                    (
                        decode_base64(v),
                        v_range.start + offset..v_range.end + offset,
                    ),
                )?,
                "bh" => set_opt(k, &mut body_hash, decode_base64(v))?,
                "c" => set_opt(
                    k,
                    &mut canonicalisation,
                    Canonicalisation::parse(v)?,
                )?,
                "d" => set_opt(k, &mut sdid, Cow::Borrowed(v))?,
                "h" => set_opt(
                    k,
                    &mut signed_headers,
                    split_colon_list(v).map(Cow::Borrowed).collect(),
                )?,
                "l" => set_opt(
                    k,
                    &mut body_length,
                    v.parse().map_err(|_| format!("unparsable l={v}"))?,
                )?,
                "q" => set_opt(
                    k,
                    &mut dns_txt,
                    split_colon_list(v).any(|s| "dns/txt" == s),
                )?,
                "s" => set_opt(k, &mut selector, Cow::Borrowed(v))?,
                "t" => {
                    set_opt(k, &mut signature_timestamp, decode_timestamp(v)?)?
                },
                "x" => {
                    set_opt(k, &mut signature_expiration, decode_timestamp(v)?)?
                },
                _ => {},
            }
        }

        let (signature, signature_range) = signature.ok_or("missing b= tag")?;
        Ok(Self {
            raw: Some(RawHeader {
                text: Cow::Borrowed(whole_header),
                b: signature_range,
            }),
            version: version.ok_or("missing v= tag")?,
            algorithm: algorithm.ok_or("missing a= tag")?,
            signature,
            body_hash: body_hash.ok_or("missing bh= tag")?,
            canonicalisation: canonicalisation.unwrap_or_default(),
            sdid: sdid.ok_or("missing d= tag")?,
            signed_headers: signed_headers.ok_or("missing h= tag")?,
            body_length,
            dns_txt: dns_txt.unwrap_or(true),
            selector: selector.ok_or("missing s= tag")?,
            signature_timestamp,
            signature_expiration,
        })
    }

    /// Returns the header text, formatting it if this header was not parsed.
    ///
    /// Formatted headers put `b=` last, so a header formatted with an empty
    /// signature hashes the same as the finished header.
    pub fn raw(&self) -> Cow<'_, RawHeader<'a>> {
        match self.raw {
            Some(ref raw) => Cow::Borrowed(raw),
            None => Cow::Owned(self.format()),
        }
    }

    fn format(&self) -> RawHeader<'a> {
        let mut tags = vec![
            format!("v={}", self.version),
            format!("a={}", self.algorithm),
            format!("c={}", self.canonicalisation),
            format!("d={}", self.sdid),
            format!("s={}", self.selector),
        ];
        if let Some(t) = self.signature_timestamp {
            tags.push(format!("t={}", t.timestamp()));
        }
        if let Some(x) = self.signature_expiration {
            tags.push(format!("x={}", x.timestamp()));
        }
        if let Some(l) = self.body_length {
            tags.push(format!("l={}", l));
        }
        tags.push(format!("h={}", self.signed_headers.join(":")));
        tags.push(format!("bh={}", base64::encode(&self.body_hash)));

        let mut text = format!("{}:", HEADER_NAME);
        let mut line_len = text.len();
        for tag in tags {
            if line_len + tag.len() + 2 > 78 {
                text.push_str("\r\n");
                line_len = 0;
            }
            text.push(' ');
            text.push_str(&tag);
            text.push(';');
            line_len += tag.len() + 2;
        }

        text.push_str("\r\n b=");
        let b_start = text.len();
        let signature = base64::encode(&self.signature);
        for (ix, chunk) in signature.as_bytes().chunks(72).enumerate() {
            if ix > 0 {
                text.push_str("\r\n ");
            }
            // base64 output is ASCII
            text.extend(chunk.iter().copied().map(char::from));
        }

        RawHeader {
            b: b_start..text.len(),
            text: Cow::Owned(text),
        }
    }
}

impl SignatureAlgorithm {
    fn parse(signature: &str) -> Result<Self, String> {
        match signature {
            "rsa" => Ok(Self::Rsa),
            "ed25519" => Ok(Self::Ed25519),
            s => Err(format!("unknown signature algorithm: {s}")),
        }
    }
}

impl HashAlgorithm {
    fn parse(hash: &str) -> Result<Self, String> {
        match hash {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            h => Err(format!("unknown hash algorithm: {h}")),
        }
    }

    pub fn message_digest(self) -> openssl::hash::MessageDigest {
        match self {
            Self::Sha1 => openssl::hash::MessageDigest::sha1(),
            Self::Sha256 => openssl::hash::MessageDigest::sha256(),
        }
    }
}

impl Algorithm {
    fn parse(s: &str) -> Result<Self, String> {
        let (signature, hash) = s
            .split_once('-')
            .ok_or_else(|| format!("couldn't parse a={s}"))?;

        Ok(Self {
            signature: SignatureAlgorithm::parse(signature)?,
            hash: HashAlgorithm::parse(hash)?,
        })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let signature = match self.signature {
            SignatureAlgorithm::Rsa => "rsa",
            SignatureAlgorithm::Ed25519 => "ed25519",
        };
        let hash = match self.hash {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        };
        write!(f, "{}-{}", signature, hash)
    }
}

/// A DKIM key record published in DNS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxtRecord<'a> {
    /// `v`
    pub version: Cow<'a, str>,
    /// `h`, with unknown algorithms dropped.
    pub acceptable_hash_algorithms: Option<Vec<HashAlgorithm>>,
    /// `k`
    pub key_type: SignatureAlgorithm,
    /// `p`, decoded. Empty if the key was revoked.
    pub public_key: Vec<u8>,
    /// Whether `s` allows email.
    pub is_email: bool,
    /// `t`
    pub flags: TxtFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TxtFlags {
    /// `y`
    pub test: bool,
    /// `s`
    pub strict: bool,
}

impl<'a> TxtRecord<'a> {
    pub fn parse(s: &'a str) -> Result<Self, String> {
        let mut version = None::<Cow<'a, str>>;
        let mut acceptable_hash_algorithms = None::<Vec<HashAlgorithm>>;
        let mut key_type = None::<SignatureAlgorithm>;
        let mut public_key = None::<Vec<u8>>;
        let mut is_email = None::<bool>;
        let mut flags = None::<TxtFlags>;

        for (k, v, _) in split_kv_pairs(s) {
            match k {
                "v" => set_opt(k, &mut version, Cow::Borrowed(v))?,
                "h" => {
                    let mut algorithms = split_colon_list(v)
                        .filter_map(|s| HashAlgorithm::parse(s).ok())
                        .collect::<Vec<_>>();
                    algorithms.sort_unstable();
                    algorithms.dedup();
                    set_opt(k, &mut acceptable_hash_algorithms, algorithms)?;
                },
                "k" => {
                    set_opt(k, &mut key_type, SignatureAlgorithm::parse(v)?)?
                },
                "p" => set_opt(k, &mut public_key, decode_base64(v))?,
                "s" => set_opt(
                    k,
                    &mut is_email,
                    split_colon_list(v).any(|s| "*" == s || "email" == s),
                )?,
                "t" => {
                    let mut parsed = TxtFlags::default();
                    for flag in split_colon_list(v) {
                        match flag {
                            "y" => parsed.test = true,
                            "s" => parsed.strict = true,
                            _ => {},
                        }
                    }
                    set_opt(k, &mut flags, parsed)?;
                },
                _ => {},
            }
        }

        Ok(Self {
            version: version.unwrap_or(Cow::Borrowed("DKIM1")),
            acceptable_hash_algorithms,
            key_type: key_type.unwrap_or(SignatureAlgorithm::Rsa),
            public_key: public_key.ok_or("missing p= tag")?,
            is_email: is_email.unwrap_or(true),
            flags: flags.unwrap_or_default(),
        })
    }
}

/// Splits `s` into `tag=value` pairs as per RFC 6376 § 3.2.
///
/// Keys and values are trimmed but not decoded. The range is that of the
/// value before trimming, relative to `s`.
fn split_kv_pairs(
    s: &str,
) -> impl Iterator<Item = (&str, &str, Range<usize>)> + '_ {
    let mut offset = 0usize;
    s.split(';').filter_map(move |group| {
        let start = offset;
        offset += group.len() + 1;

        let (k, v) = group.split_once('=')?;
        let v_start = start + k.len() + 1;
        Some((
            k.trim_matches(FWS),
            v.trim_matches(FWS),
            v_start..v_start + v.len(),
        ))
    })
}

fn split_colon_list(v: &str) -> impl Iterator<Item = &str> + '_ {
    v.split(':').map(|s| s.trim_matches(FWS))
}

/// Decodes RFC 6376 base64, which may contain folding whitespace.
///
/// Invalid base64 decodes to nothing, which later fails verification.
fn decode_base64(s: &str) -> Vec<u8> {
    let compact = s
        .chars()
        .filter(|c| matches!(c, '0'..='9' | 'a'..='z' | 'A'..='Z' | '+' | '/' | '='))
        .collect::<String>();

    base64::decode_config(
        compact.as_bytes(),
        base64::STANDARD.decode_allow_trailing_bits(true),
    )
    .unwrap_or_default()
}

fn set_opt<T>(k: &str, opt: &mut Option<T>, v: T) -> Result<(), String> {
    if opt.is_some() {
        return Err(format!("duplicate {k}= tag"));
    }

    *opt = Some(v);
    Ok(())
}

/// Parses a DKIM timestamp, clamping it to the range chrono can represent.
fn decode_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let seconds = s
        .parse::<i64>()
        .map_err(|_| format!("unparsable timestamp: {s}"))?
        .clamp(0, MAX_TIMESTAMP);
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .ok_or_else(|| format!("unrepresentable timestamp: {s}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_rfc6376_example() {
        let text = "DKIM-Signature: v=1; a=rsa-sha256; d=example.net; \
                    s=brisbane;\r\n c=simple; q=dns/txt; i=@eng.example.net;\r\n \
                    t=1117574938; x=1118006938;\r\n h=from:to:subject:date;\r\n \
                    bh=MTIzNDU2Nzg5MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTI=;\r\n \
                    b=dzdVyOfAKCdLXdJOc9G2q8LoXSlEniSbav+yuU4zGeeruD00lszZ\r\n \
                    VoG4ZHRNiYzR";
        let header = Header::parse(text).unwrap();

        assert_eq!(1, header.version);
        assert_eq!(
            Algorithm {
                signature: SignatureAlgorithm::Rsa,
                hash: HashAlgorithm::Sha256,
            },
            header.algorithm,
        );
        assert_eq!(Canonicalisation::default(), header.canonicalisation);
        assert_eq!("example.net", header.sdid);
        assert_eq!("brisbane", header.selector);
        assert_eq!(
            vec!["from", "to", "subject", "date"],
            header.signed_headers,
        );
        assert_eq!(b"12345678901234567890123456789012", &header.body_hash[..]);
        assert!(header.dns_txt);
        assert_eq!(
            Some(1117574938),
            header.signature_timestamp.map(|t| t.timestamp()),
        );
        assert_eq!(
            Some(1118006938),
            header.signature_expiration.map(|t| t.timestamp()),
        );
        assert_eq!(None, header.body_length);

        let raw = header.raw();
        assert!(raw.without_signature().ends_with("\r\n b="));
    }

    #[test]
    fn parse_errors() {
        assert!(Header::parse("DKIM-Signature v=1").is_err());
        assert!(Header::parse(
            "DKIM-Signature: v=1; a=rsa-sha256; d=x; s=y; h=from; bh=; b=; v=1"
        )
        .is_err());
        assert!(Header::parse(
            "DKIM-Signature: v=1; a=rsa-md5; d=x; s=y; h=from; bh=; b="
        )
        .is_err());
        assert!(
            Header::parse("DKIM-Signature: v=1; a=rsa-sha256; d=x; s=y; b=")
                .is_err()
        );
    }

    #[test]
    fn format_then_parse() {
        let header = Header {
            raw: None,
            version: 1,
            algorithm: Algorithm {
                signature: SignatureAlgorithm::Ed25519,
                hash: HashAlgorithm::Sha256,
            },
            signature: vec![42; 64],
            body_hash: vec![7; 32],
            canonicalisation: Canonicalisation {
                header: HeaderCanonicalisation::Relaxed,
                body: BodyCanonicalisation::Simple,
            },
            sdid: Cow::Borrowed("a.example.com"),
            signed_headers: vec![
                Cow::Borrowed("From"),
                Cow::Borrowed("To"),
                Cow::Borrowed("Subject"),
            ],
            body_length: Some(100),
            dns_txt: true,
            selector: Cow::Borrowed("selector"),
            signature_timestamp: DateTime::<Utc>::from_timestamp(1_000_000, 0),
            signature_expiration: None,
        };

        let raw = header.raw();
        let reparsed = Header::parse(&raw.text).unwrap();
        assert_eq!(Header { raw: None, ..reparsed }, header);
        assert!(raw.text.lines().all(|line| line.len() <= 80));
    }

    #[test]
    fn parse_txt_records() {
        let record =
            TxtRecord::parse("v=DKIM1; k=ed25519; h=sha256:md5; t=y; p=AAAA")
                .unwrap();
        assert_eq!("DKIM1", record.version);
        assert_eq!(SignatureAlgorithm::Ed25519, record.key_type);
        assert_eq!(
            Some(vec![HashAlgorithm::Sha256]),
            record.acceptable_hash_algorithms,
        );
        assert!(record.flags.test);
        assert!(!record.flags.strict);
        assert_eq!(vec![0u8, 0, 0], record.public_key);

        let revoked = TxtRecord::parse("v=DKIM1; p=").unwrap();
        assert!(revoked.public_key.is_empty());
        assert_eq!(SignatureAlgorithm::Rsa, revoked.key_type);

        assert!(TxtRecord::parse("v=DKIM1; k=rsa").is_err());
    }

    #[test]
    fn timestamps_clamped() {
        assert_eq!(
            MAX_TIMESTAMP,
            decode_timestamp("99999999999999").unwrap().timestamp(),
        );
        assert_eq!(0, decode_timestamp("-5").unwrap().timestamp());
        assert!(decode_timestamp("soon").is_err());
    }
}
