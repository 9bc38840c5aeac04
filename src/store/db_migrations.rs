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
use log::info;

use crate::support::{error::Error, log_prefix::LogPrefix};

/// Brings the schema of `cxn` up to date with `migrations`.
///
/// Migration `n` (1-based) is `migrations[n - 1]`. All pending migrations are
/// applied in a single exclusive transaction, so concurrent openers either
/// see the old schema or the new one.
pub fn apply_migrations(
    log_prefix: &LogPrefix,
    cxn: &mut rusqlite::Connection,
    db_name: &str,
    migrations: &[&str],
) -> Result<(), Error> {
    let latest_version = migrations.len();

    if Ok(Some(latest_version))
        == cxn.query_row(
            "SELECT MAX(`version`) FROM `migration`",
            (),
            |row| row.get::<_, Option<usize>>(0),
        )
    {
        return Ok(());
    }

    let txn = cxn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Exclusive)?;
    txn.execute(
        "CREATE TABLE IF NOT EXISTS `migration` (\
         `version` INTEGER NOT NULL PRIMARY KEY, \
         `applied_at` INTEGER NOT NULL\
         ) STRICT",
        (),
    )?;

    let current_version = txn
        .query_row("SELECT MAX(`version`) FROM `migration`", (), |row| {
            row.get::<_, Option<usize>>(0)
        })?
        .unwrap_or(0);

    for (version, migration) in migrations
        .iter()
        .copied()
        .enumerate()
        .map(|(ix, migration)| (ix + 1, migration))
        .skip(current_version)
    {
        info!("{log_prefix} Applying #{version} migration to {db_name} DB");
        txn.execute_batch(migration)?;
        txn.execute(
            "INSERT INTO `migration` (`version`, `applied_at`) \
             VALUES (?, ?)",
            (version, Utc::now().timestamp()),
        )?;
    }

    txn.commit()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    static MIGRATIONS: &[&str] = &[
        "CREATE TABLE `a` (`x` INTEGER NOT NULL) STRICT;",
        "CREATE TABLE `b` (`y` INTEGER NOT NULL) STRICT;",
    ];

    fn versions(cxn: &rusqlite::Connection) -> Vec<usize> {
        let mut stmt = cxn
            .prepare("SELECT `version` FROM `migration` ORDER BY `version`")
            .unwrap();
        let rows = stmt.query_map((), |row| row.get(0)).unwrap();
        rows.collect::<Result<Vec<usize>, _>>().unwrap()
    }

    #[test]
    fn migrations_applied_incrementally() {
        crate::init_test_log();
        let log_prefix = LogPrefix::new("test".to_owned());
        let mut cxn = rusqlite::Connection::open_in_memory().unwrap();

        apply_migrations(&log_prefix, &mut cxn, "test", &MIGRATIONS[..1])
            .unwrap();
        assert_eq!(vec![1], versions(&cxn));

        apply_migrations(&log_prefix, &mut cxn, "test", MIGRATIONS).unwrap();
        assert_eq!(vec![1, 2], versions(&cxn));
        cxn.execute("INSERT INTO `b` (`y`) VALUES (1)", ()).unwrap();

        // Already up to date; nothing re-run.
        apply_migrations(&log_prefix, &mut cxn, "test", MIGRATIONS).unwrap();
        assert_eq!(vec![1, 2], versions(&cxn));
    }
}
