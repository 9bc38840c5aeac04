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

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use log::warn;
use rusqlite::OptionalExtension as _;

use super::model::*;
use super::tags::TagFilter;
use super::Store;
use crate::support::{error::Error, log_prefix::LogPrefix};

/// A connection to the tracker database.
pub struct Connection {
    cxn: rusqlite::Connection,
}

static MIGRATIONS: &[&str] = &[include_str!("tooltracker.v1.sql")];

impl Connection {
    pub fn open(path: &Path, log_prefix: &LogPrefix) -> Result<Self, Error> {
        let cxn = rusqlite::Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        if let Err(e) = set_group_writable(path) {
            warn!(
                "{log_prefix} Can't make {} group writable: {e}",
                path.display(),
            );
        }

        Self::init(cxn, log_prefix)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, Error> {
        let cxn = rusqlite::Connection::open_in_memory()?;
        Self::init(cxn, &LogPrefix::new("test".to_owned()))
    }

    fn init(
        mut cxn: rusqlite::Connection,
        log_prefix: &LogPrefix,
    ) -> Result<Self, Error> {
        cxn.pragma_update(None, "foreign_keys", true)?;
        cxn.pragma_update(None, "journal_mode", "WAL")?;
        cxn.busy_timeout(Duration::from_secs(10))?;

        super::db_migrations::apply_migrations(
            log_prefix,
            &mut cxn,
            "tooltracker",
            MIGRATIONS,
        )?;

        Ok(Self { cxn })
    }

    /// Creates or replaces the metadata for `tool`, including its full set
    /// of tags.
    pub fn update_tool(&mut self, tool: &Tool) -> Result<(), Error> {
        let name = tool.name.trim();
        let tags = tool
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>();

        let txn = self.cxn.transaction()?;
        txn.execute(
            "INSERT INTO `tool` (`name`, `description`, `image`) \
             VALUES (?, ?, ?) \
             ON CONFLICT (`name`) DO UPDATE SET \
             `description` = excluded.`description`, \
             `image` = excluded.`image`",
            (
                name,
                normalize(tool.description.as_deref()),
                tool.image.as_deref(),
            ),
        )?;
        txn.execute("DELETE FROM `tag` WHERE `tool` = ?", (name,))?;
        {
            let mut insert = txn.prepare_cached(
                "INSERT INTO `tag` (`tag`, `tool`) VALUES (?, ?)",
            )?;
            for tag in tags {
                insert.execute((tag, name))?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_tool(&mut self, name: &str) -> Result<Option<Tool>, Error> {
        self.cxn
            .prepare_cached(
                "SELECT `name`, `description`, `image`, \
                 (SELECT group_concat(`tag`.`tag`, ' ') FROM `tag` \
                  WHERE `tag`.`tool` = `tool`.`name`) AS `tags` \
                 FROM `tool` WHERE `name` = ?",
            )?
            .query_row((name.trim(),), from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Returns the tracker view, ordered by tool name.
    ///
    /// If `filter` is given, only tools it admits are included. Tags are
    /// only consulted for filtering; the tags of each item are always
    /// complete.
    pub fn get_items(
        &mut self,
        filter: Option<&TagFilter>,
    ) -> Result<Vec<Item>, Error> {
        let (condition, args) = filter
            .and_then(TagFilter::sql_filter)
            .map(|(sql, args)| (format!("WHERE {sql}"), args))
            .unwrap_or_default();

        let sql = format!(
            "SELECT `tracker`.`tool`, `tracker`.`last_seen_by`, \
             `tracker`.`comment`, `tool`.`description`, `alias`.`alias`, \
             (SELECT group_concat(`tag`.`tag`, ' ') FROM `tag` \
              WHERE `tag`.`tool` = `tracker`.`tool`) AS `tags` \
             FROM `tracker` \
             LEFT JOIN `tool` ON `tool`.`name` = `tracker`.`tool` \
             LEFT JOIN `alias` ON `alias`.`email` = `tracker`.`last_seen_by` \
             {condition} \
             ORDER BY `tracker`.`tool`",
        );

        let mut stmt = self.cxn.prepare(&sql)?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(args), from_row)?
            .collect::<Result<Vec<Item>, _>>()?;
        Ok(items)
    }

    pub fn get_alias(&mut self, email: &str) -> Result<Option<Alias>, Error> {
        self.cxn
            .prepare_cached(
                "SELECT `email`, `alias`, `delegated_email` \
                 FROM `alias` WHERE `email` = ?",
            )?
            .query_row((email.trim(),), from_row)
            .optional()
            .map_err(Into::into)
    }

    pub fn get_location(
        &mut self,
        tool: &str,
    ) -> Result<Option<Location>, Error> {
        self.cxn
            .prepare_cached(
                "SELECT `tool`, `last_seen_by`, `comment` \
                 FROM `tracker` WHERE `tool` = ?",
            )?
            .query_row((tool.trim(),), from_row)
            .optional()
            .map_err(Into::into)
    }
}

impl Store for Connection {
    fn get_delegate(&mut self, email: &str) -> Result<String, Error> {
        let email = email.trim();
        let delegate = self
            .cxn
            .prepare_cached(
                "SELECT `delegated_email` FROM `alias` WHERE `email` = ?",
            )?
            .query_row((email,), from_single::<Option<String>>)
            .optional()?
            .flatten();
        Ok(delegate.unwrap_or_else(|| email.to_owned()))
    }

    fn apply(&mut self, updates: &[Update]) -> Result<(), Error> {
        let txn = self.cxn.transaction()?;
        for update in updates {
            match *update {
                Update::Location(ref location) => {
                    upsert_location(&txn, location)?
                },
                Update::Alias(ref alias) => upsert_alias(&txn, alias)?,
            }
        }
        txn.commit()?;
        Ok(())
    }
}

fn upsert_location(
    cxn: &rusqlite::Connection,
    location: &Location,
) -> Result<(), Error> {
    cxn.prepare_cached(
        "INSERT INTO `tracker` (`tool`, `last_seen_by`, `comment`) \
         VALUES (?, ?, ?) \
         ON CONFLICT (`tool`) DO UPDATE SET \
         `last_seen_by` = excluded.`last_seen_by`, \
         `comment` = excluded.`comment`",
    )?
    .execute((
        location.tool.trim(),
        location.last_seen_by.trim(),
        normalize(location.comment.as_deref()),
    ))?;
    Ok(())
}

fn upsert_alias(cxn: &rusqlite::Connection, alias: &Alias) -> Result<(), Error> {
    cxn.prepare_cached(
        "INSERT INTO `alias` (`email`, `alias`, `delegated_email`) \
         VALUES (?, ?, ?) \
         ON CONFLICT (`email`) DO UPDATE SET \
         `alias` = excluded.`alias`, \
         `delegated_email` = \
           coalesce(excluded.`delegated_email`, `delegated_email`)",
    )?
    .execute((
        alias.email.trim(),
        alias.alias.trim(),
        normalize(alias.delegated_email.as_deref()),
    ))?;
    Ok(())
}

// The MDA usually runs as a different user than whoever administers the
// tools.
fn set_group_writable(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o660))
}
