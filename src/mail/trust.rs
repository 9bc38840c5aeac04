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

//! Deciding whether the claimed sender of a message actually sent it.

use chrono::prelude::*;
use log::{debug, warn};

use crate::mime::address::EmailAddress;
use crate::mime::dkim;
use crate::support::{
    dns::TxtLookup, error::Error, log_prefix::LogPrefix,
    system_config::DkimConfig,
};

/// Checks that `message` from `sender`, who acts under `delegate`, is
/// authentic enough to act on.
///
/// A sender acting under someone else's delegation must carry a signature
/// from their own domain. Anyone else must carry one from the configured
/// domain, unless they are in that domain and it is exempt.
///
/// `message` must use CRLF line endings.
pub fn check(
    log_prefix: &LogPrefix,
    config: &DkimConfig,
    sender: &EmailAddress,
    delegate: &str,
    message: &[u8],
    dns: &dyn TxtLookup,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    if config.domain.is_empty() {
        return Ok(());
    }

    let required_domain = if sender.to_string() != delegate {
        debug!(
            "{log_prefix} {sender} is delegated by {delegate}; \
             requiring signature from {}",
            sender.domain,
        );
        sender.domain.as_str()
    } else if config.exempt_local_domain && sender.is_in_domain(&config.domain)
    {
        debug!("{log_prefix} Local sender exempt from DKIM");
        return Ok(());
    } else {
        config.domain.as_str()
    };

    let mut transient = None::<String>;
    for verification in dkim::verify(message, dns, now) {
        let matches_domain =
            verification.sdid.eq_ignore_ascii_case(required_domain);
        match verification.result {
            Ok(()) if matches_domain => {
                debug!(
                    "{log_prefix} Valid DKIM signature from {required_domain}"
                );
                return Ok(());
            },
            Ok(()) => warn!(
                "{log_prefix} Valid DKIM signature from {}, \
                 but {required_domain} is required",
                verification.sdid,
            ),
            Err(e) => {
                warn!(
                    "{log_prefix} DKIM signature from {:?} failed: {e}",
                    verification.sdid,
                );
                if matches_domain && e.is_transient() {
                    transient = Some(e.to_string());
                }
            },
        }
    }

    if let Some(transient) = transient {
        warn!("{log_prefix} Rejected for now: {transient}");
        return Err(Error::TempFail(transient));
    }

    warn!(
        "{log_prefix} Rejected: no valid DKIM signature from \
         {required_domain}"
    );
    Err(Error::InvalidMessage)
}
