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

//! Interpretation of the subject line as a command.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::mime::address::find_addresses;
use crate::mime::body::{first_line, strip_signature};
use crate::store::{model::normalize, Alias, Location, Update};
use crate::support::{error::Error, log_prefix::LogPrefix};

/// How many `Re:`, `Fwd:`, etc. prefixes are stripped before giving up.
const MAX_PREFIXES: usize = 8;

lazy_static! {
    static ref BORROW: Regex = Regex::new(r"(?i)^Borrowed[ +](.*)$").unwrap();
    static ref ALIAS: Regex = Regex::new(r"(?i)^Alias\b[ +]*(.*)$").unwrap();
    static ref PREFIX: Regex = Regex::new(r"^\w*:\s*").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `Borrowed <tool>`: the sender now has `tool`. The first line of the
    /// body says where it is.
    Borrow { tool: String },
    /// `Alias [<addresses>]`: the first line of the body becomes the
    /// sender's display name. Any addresses in the subject are delegated to
    /// the sender.
    Alias { delegates: Option<String> },
}

impl Command {
    /// Determines which command `subject` holds, if any.
    pub fn classify(subject: &str) -> Option<Self> {
        let mut subject = subject.trim();
        for _ in 0..=MAX_PREFIXES {
            if let Some(captures) = BORROW.captures(subject) {
                return Some(Self::Borrow {
                    tool: captures[1].trim().to_owned(),
                });
            }

            if let Some(captures) = ALIAS.captures(subject) {
                return Some(Self::Alias {
                    delegates: normalize(Some(&captures[1])),
                });
            }

            let prefix = PREFIX.find(subject)?;
            subject = subject[prefix.end()..].trim_start();
        }

        None
    }

    /// Works out what this command, received from the authenticated
    /// `sender` with the given `body`, should change.
    ///
    /// `delegate` is the address `sender` acts under. New delegations are
    /// only created when the sender is not itself a delegate, so delegations
    /// never chain.
    pub fn plan(
        &self,
        log_prefix: &LogPrefix,
        sender: &str,
        delegate: &str,
        body: &str,
    ) -> Result<Vec<Update>, Error> {
        let text = first_line(strip_signature(body));

        match *self {
            Self::Borrow { ref tool } => {
                if tool.is_empty() {
                    warn!("{log_prefix} Rejected: no tool named");
                    return Err(Error::InvalidMessage);
                }

                Ok(vec![Update::Location(Location {
                    tool: tool.clone(),
                    last_seen_by: sender.to_owned(),
                    comment: normalize(Some(text)),
                })])
            },

            Self::Alias { ref delegates } => {
                if text.is_empty() {
                    warn!("{log_prefix} Rejected: alias has no text");
                    return Err(Error::InvalidMessage);
                }

                let mut updates = vec![Update::Alias(Alias {
                    email: sender.to_owned(),
                    alias: text.to_owned(),
                    delegated_email: None,
                })];

                match *delegates {
                    Some(ref delegates) if sender == delegate => {
                        for address in find_addresses(delegates) {
                            let address = address.to_string();
                            if address == sender {
                                continue;
                            }

                            updates.push(Update::Alias(Alias {
                                email: address,
                                alias: text.to_owned(),
                                delegated_email: Some(sender.to_owned()),
                            }));
                        }
                    },
                    Some(_) => {
                        warn!(
                            "{log_prefix} Ignoring delegation requested by \
                             {sender}, which is itself delegated by {delegate}"
                        );
                    },
                    None => {},
                }

                Ok(updates)
            },
        }
    }
}
