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

use std::fs;
use std::io::{self, BufRead, Read};
use std::mem;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use super::main::DeliverSubcommand;
use crate::mail::{sender_from_header, Session};
use crate::store::{Connection, Store};
use crate::support::{
    dns::{SystemResolver, TxtLookup},
    error::Error,
    log_prefix::LogPrefix,
    sysexits::*,
    system_config::SystemConfig,
};

pub(super) fn deliver(config: SystemConfig, mut cmd: DeliverSubcommand) {
    let log_prefix = LogPrefix::new("deliver".to_owned());

    let mut store = match Connection::open(&config.store.path, &log_prefix) {
        Ok(store) => store,
        Err(e) => die!(
            EX_UNAVAILABLE,
            "Failed to open '{}': {}",
            config.store.path.display(),
            e
        ),
    };

    let dns = match SystemResolver::new(config.limits.dns_timeout()) {
        Ok(dns) => dns,
        Err(e) => die!(EX_CONFIG, "Failed to set up DNS resolver: {}", e),
    };

    let items = mem::take(&mut cmd.inputs);
    if let Err(e) = run_delivery(
        &config,
        cmd.from.as_deref(),
        items.into_iter(),
        io::stdin().lock(),
        &mut store,
        &dns,
    ) {
        e.exit();
    }
}

fn run_delivery(
    config: &SystemConfig,
    from: Option<&str>,
    items: impl Iterator<Item = PathBuf>,
    mut stdin: impl Read,
    store: &mut dyn Store,
    dns: &dyn TxtLookup,
) -> Result<(), Sysexit> {
    for item in items {
        let message = match read_message(config, &item, &mut stdin) {
            Ok(Some(message)) => message,
            Ok(None) => {
                error!(
                    "{} is larger than {} bytes",
                    item.display(),
                    config.limits.max_message_bytes,
                );
                return Err(EX_DATAERR);
            },
            Err(e) => {
                error!("Unable to read {}: {}", item.display(), e);
                return Err(if io::ErrorKind::NotFound == e.kind() {
                    EX_NOINPUT
                } else {
                    EX_IOERR
                });
            },
        };

        match deliver_single(config, from, &message, store, dns) {
            Ok(()) => info!("Processed {}", item.display()),
            Err(e) if e.is_retryable() => {
                error!("Unable to process {}: {}", item.display(), e);
                return Err(EX_TEMPFAIL);
            },
            // Already logged in detail; the message is consumed.
            Err(e) => warn!("Discarded {}: {}", item.display(), e),
        }
    }

    Ok(())
}

/// Reads the whole of `item`, or `None` if it is too large.
fn read_message(
    config: &SystemConfig,
    item: &Path,
    stdin: &mut impl Read,
) -> io::Result<Option<Vec<u8>>> {
    let reader: Box<dyn BufRead> = if Path::new("-") == item {
        Box::new(io::BufReader::new(stdin))
    } else {
        Box::new(io::BufReader::new(fs::File::open(item)?))
    };

    let max = config.limits.max_message_bytes;
    let mut message = Vec::new();
    reader.take(max.saturating_add(1)).read_to_end(&mut message)?;

    if message.len() as u64 > max {
        Ok(None)
    } else {
        Ok(Some(message))
    }
}

fn deliver_single(
    config: &SystemConfig,
    from: Option<&str>,
    message: &[u8],
    store: &mut dyn Store,
    dns: &dyn TxtLookup,
) -> Result<(), Error> {
    let log_prefix = LogPrefix::new("deliver".to_owned());

    let sender = match from {
        Some(from) => from.to_owned(),
        None => match sender_from_header(message) {
            Some(sender) => sender.to_string(),
            None => {
                warn!("{log_prefix} Rejected: no single From address");
                return Err(Error::InvalidMessage);
            },
        },
    };

    Session::new(config, store, dns, log_prefix).handle(message, &sender)
}
