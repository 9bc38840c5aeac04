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

//! DNS access for DKIM key retrieval.
//!
//! Everything that needs DNS takes a `&dyn TxtLookup` so that tests can serve
//! fixed records without touching the network.

use std::io;
use std::time::Duration;

use hickory_resolver::error::ResolveErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("no TXT record found")]
    NotFound,
    #[error("DNS lookup failed: {0}")]
    Transport(String),
}

/// Fetches the TXT records at a DNS name.
pub trait TxtLookup {
    /// Returns each TXT record at `name`, with its character strings
    /// concatenated.
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
}

impl<F> TxtLookup for F
where
    F: Fn(&str) -> Result<Vec<String>, DnsError>,
{
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        self(name)
    }
}

/// A `TxtLookup` backed by the system resolver configuration.
pub struct SystemResolver {
    resolver: hickory_resolver::Resolver,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> io::Result<Self> {
        let (config, mut options) =
            hickory_resolver::system_conf::read_system_conf()?;
        options.timeout = timeout;
        options.attempts = 2;
        let resolver = hickory_resolver::Resolver::new(config, options)?;
        Ok(Self { resolver })
    }
}

impl TxtLookup for SystemResolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        // Always query the absolute name; search domains make no sense for
        // DKIM selectors.
        let fqdn = if name.ends_with('.') {
            name.to_owned()
        } else {
            format!("{name}.")
        };

        match self.resolver.txt_lookup(fqdn.as_str()) {
            Ok(records) => Ok(records
                .iter()
                .map(|txt| {
                    txt.iter()
                        .map(|part| String::from_utf8_lossy(part))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => match *e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    Err(DnsError::NotFound)
                },
                _ => Err(DnsError::Transport(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn closures_are_lookups() {
        let lookup = |name: &str| -> Result<Vec<String>, DnsError> {
            if "sel._domainkey.example.com" == name {
                Ok(vec!["v=DKIM1; p=".to_owned()])
            } else {
                Err(DnsError::NotFound)
            }
        };

        let lookup: &dyn TxtLookup = &lookup;
        assert_eq!(
            Ok(vec!["v=DKIM1; p=".to_owned()]),
            lookup.lookup_txt("sel._domainkey.example.com"),
        );
        assert_eq!(
            Err(DnsError::NotFound),
            lookup.lookup_txt("other._domainkey.example.com"),
        );
    }
}
