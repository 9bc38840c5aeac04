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
use itertools::Itertools;
use log::{debug, error, info, warn};

use super::command::Command;
use super::trust;
use crate::mime::address::{parse_address_list, parse_mailbox, EmailAddress};
use crate::mime::body::extract_text;
use crate::mime::encoded_word::decode_unstructured;
use crate::mime::header::{
    first_header_value, header_values, normalise_line_endings, split_message,
    unfold,
};
use crate::store::Store;
use crate::support::{
    dns::TxtLookup, error::Error, log_prefix::LogPrefix,
    system_config::SystemConfig,
};

/// Handles inbound commands against one store.
///
/// A session carries no state between messages; each call to `handle` is
/// independent, and the store only changes if a message is fully accepted.
pub struct Session<'a> {
    config: &'a SystemConfig,
    store: &'a mut dyn Store,
    dns: &'a dyn TxtLookup,
    log_prefix: LogPrefix,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a SystemConfig,
        store: &'a mut dyn Store,
        dns: &'a dyn TxtLookup,
        log_prefix: LogPrefix,
    ) -> Self {
        Self {
            config,
            store,
            dns,
            log_prefix,
        }
    }

    /// Processes one raw message whose sender is asserted to be `sender`.
    ///
    /// Errors for which `is_retryable()` is false mean the message will never
    /// be accepted; the reason is only logged.
    pub fn handle(&mut self, message: &[u8], sender: &str) -> Result<(), Error> {
        self.handle_at(message, sender, Utc::now())
    }

    fn handle_at(
        &mut self,
        message: &[u8],
        sender: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        // Received
        let sender = parse_mailbox(sender).ok_or_else(|| {
            warn!("{} Rejected: bad sender address {sender:?}", self.log_prefix);
            Error::InvalidMessage
        })?;
        let sender_str = sender.to_string();
        self.log_prefix.set_sender(sender_str.clone());

        let message = normalise_line_endings(message);
        let (header_block, _) = split_message(&message);
        if let Some(message_id) = first_header_value(header_block, "Message-ID")
        {
            self.log_prefix.set_message_id(message_id);
        }

        let delegate = if self.config.dkim.delegate {
            self.store.get_delegate(&sender_str).map_err(|e| {
                error!("{} Failed to look up delegate: {e}", self.log_prefix);
                e
            })?
        } else {
            sender_str.clone()
        };

        trust::check(
            &self.log_prefix,
            &self.config.dkim,
            &sender,
            &delegate,
            &message,
            self.dns,
            now,
        )?;
        debug!("{} Trust checked", self.log_prefix);

        let body = extract_text(&message).map_err(|e| {
            warn!("{} Rejected: no usable body", self.log_prefix);
            e
        })?;
        debug!("{} Body extracted", self.log_prefix);

        let subject = first_header_value(header_block, "Subject")
            .map(|s| decode_unstructured(&s))
            .unwrap_or_default();
        let command = Command::classify(&subject).ok_or_else(|| {
            warn!(
                "{} Rejected: unrecognised command {subject:?}",
                self.log_prefix,
            );
            Error::InvalidMessage
        })?;
        let updates =
            command.plan(&self.log_prefix, &sender_str, &delegate, &body)?;
        debug!("{} Dispatching {command:?}", self.log_prefix);

        if let Err(e) = self.store.apply(&updates) {
            error!("{} Failed to apply {command:?}: {e}", self.log_prefix);
            return Err(e);
        }

        for update in &updates {
            info!("{} Applied {update}", self.log_prefix);
        }

        Ok(())
    }
}

/// Extracts the sole `From` address of `message`, for adapters which don't
/// have an envelope sender.
///
/// Returns `None` if there is not exactly one `From` header holding exactly
/// one address.
pub fn sender_from_header(message: &[u8]) -> Option<EmailAddress> {
    let (header_block, _) = split_message(message);
    let value = header_values(header_block, "From").exactly_one().ok()?;
    let value = unfold(&String::from_utf8_lossy(value)).trim().to_owned();
    parse_address_list(value.as_bytes())?
        .into_iter()
        .exactly_one()
        .ok()
}
