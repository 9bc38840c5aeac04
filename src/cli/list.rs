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

use std::io::{self, Write};

use super::main::ListSubcommand;
use crate::store::{tags::TagFilter, Connection, Item};
use crate::support::{
    log_prefix::LogPrefix, sysexits::*, system_config::SystemConfig,
};

pub(super) fn list(config: SystemConfig, cmd: ListSubcommand) {
    let log_prefix = LogPrefix::new("list".to_owned());
    let mut store = match Connection::open(&config.store.path, &log_prefix) {
        Ok(store) => store,
        Err(e) => die!(
            EX_UNAVAILABLE,
            "Failed to open '{}': {}",
            config.store.path.display(),
            e
        ),
    };

    let filter = filter_for(&cmd);
    let items = match store.get_items(Some(&filter)) {
        Ok(items) => items,
        Err(e) => die!(EX_SOFTWARE, "Failed to list tools: {}", e),
    };

    let stdout = io::stdout();
    if let Err(e) = write_table(&mut stdout.lock(), &items) {
        die!(EX_IOERR, "Failed to write output: {}", e);
    }
}

fn filter_for(cmd: &ListSubcommand) -> TagFilter {
    if !cmd.tags.is_empty() {
        TagFilter::parse(&cmd.tags.join(" "))
    } else if cmd.all {
        TagFilter::empty()
    } else {
        TagFilter::default()
    }
}

const HEADINGS: [&str; 4] = ["TOOL", "LAST SEEN BY", "COMMENT", "TAGS"];

fn write_table(out: &mut impl Write, items: &[Item]) -> io::Result<()> {
    let rows = items
        .iter()
        .map(|item| {
            [
                item.location.tool.clone(),
                item.seen_by_display().to_owned(),
                item.location.comment.clone().unwrap_or_default(),
                item.tags.join(" "),
            ]
        })
        .collect::<Vec<_>>();

    let mut widths = HEADINGS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    write_row(out, &widths, &HEADINGS)?;
    for row in &rows {
        write_row(out, &widths, row)?;
    }

    Ok(())
}

fn write_row(
    out: &mut impl Write,
    widths: &[usize; 4],
    cells: &[impl AsRef<str>; 4],
) -> io::Result<()> {
    let mut line = String::new();
    for (ix, (&width, cell)) in widths.iter().zip(cells).enumerate() {
        let cell = cell.as_ref();
        if ix > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        for _ in cell.chars().count()..width {
            line.push(' ');
        }
    }

    writeln!(out, "{}", line.trim_end())
}
