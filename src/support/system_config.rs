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

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The system-wide configuration for Tooltracker.
///
/// This is stored in a file named `tooltracker.toml`, which is typically
/// under `/etc/tooltracker` or `/usr/local/etc/tooltracker`.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct SystemConfig {
    /// Where the tracker state lives.
    #[serde(default)]
    pub store: StoreConfig,

    /// Controls how much the sender of a command is trusted.
    #[serde(default)]
    pub dkim: DkimConfig,

    /// Resource limits applied before and during handling of a message.
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path to the SQLite database. It is created on first use.
    #[serde(default = "StoreConfig::default_path")]
    pub path: PathBuf,
}

impl StoreConfig {
    fn default_path() -> PathBuf {
        "tooltracker.sqlite".into()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DkimConfig {
    /// The domain whose DKIM signature commands must carry.
    ///
    /// If empty, no DKIM checking is done at all and every message is
    /// trusted. This is only appropriate where the mail transport already
    /// guarantees the sender.
    #[serde(default)]
    pub domain: String,

    /// If true, senders are resolved through the delegation table.
    ///
    /// A user at `domain` can send "Alias other@elsewhere.example" to make
    /// mail from `other@elsewhere.example` acceptable; that mail must then be
    /// DKIM-signed by its own domain instead.
    #[serde(default)]
    pub delegate: bool,

    /// If true, mail whose sender is at `domain` itself is accepted without a
    /// DKIM signature.
    ///
    /// Use this when the local MTA only hands over local mail it has already
    /// authenticated (e.g. via SASL). Delegation lookups still happen for
    /// such mail, so the transport becomes the trust boundary for creating
    /// delegations too.
    #[serde(default)]
    pub exempt_local_domain: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Messages larger than this are rejected before being parsed.
    #[serde(default = "LimitsConfig::default_max_message_bytes")]
    pub max_message_bytes: u64,

    /// How long to wait for each DNS query when fetching DKIM keys.
    #[serde(default = "LimitsConfig::default_dns_timeout_secs")]
    pub dns_timeout_secs: u64,
}

impl LimitsConfig {
    fn default_max_message_bytes() -> u64 {
        1024 * 1024
    }

    fn default_dns_timeout_secs() -> u64 {
        10
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: Self::default_max_message_bytes(),
            dns_timeout_secs: Self::default_dns_timeout_secs(),
        }
    }
}
