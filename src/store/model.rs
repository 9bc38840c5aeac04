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

//! Rows of the tracker database and the views built from them.

use std::fmt;

/// Who last had a tool, and what they said about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub tool: String,
    pub last_seen_by: String,
    pub comment: Option<String>,
}

/// A display name for a sender, and who it was delegated by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alias {
    pub email: String,
    pub alias: String,
    /// The address whose authority this one acts under.
    ///
    /// Once set, this survives updates which do not specify a new value.
    pub delegated_email: Option<String>,
}

/// Administrative metadata about a tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub image: Option<Vec<u8>>,
    /// Sorted and deduplicated.
    pub tags: Vec<String>,
}

/// A row of the tracker view: a location with whatever else is known about
/// the tool and the person who has it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub location: Location,
    pub description: Option<String>,
    pub alias: Option<String>,
    /// Sorted.
    pub tags: Vec<String>,
}

impl Item {
    /// The name to show for whoever last had the tool.
    pub fn seen_by_display(&self) -> &str {
        self.alias
            .as_deref()
            .unwrap_or(&self.location.last_seen_by)
    }
}

/// One write produced by a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    Location(Location),
    Alias(Alias),
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Location(ref l) => write!(
                f,
                "location of {:?} := {:?} ({:?})",
                l.tool, l.last_seen_by, l.comment,
            ),
            Self::Alias(ref a) => write!(
                f,
                "alias of {:?} := {:?} (delegated by {:?})",
                a.email, a.alias, a.delegated_email,
            ),
        }
    }
}

pub(super) trait FromRow: Sized {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

pub(super) fn from_row<T: FromRow>(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<T> {
    T::from_row(row)
}

pub(super) fn from_single<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<T> {
    row.get(0)
}

/// Splits the output of `group_concat(..., ' ')` into a sorted list.
fn split_tags(tags: Option<String>) -> Vec<String> {
    let mut tags = tags
        .as_deref()
        .unwrap_or("")
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect::<Vec<_>>();
    tags.sort();
    tags.dedup();
    tags
}

impl FromRow for Location {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tool: row.get("tool")?,
            last_seen_by: row.get("last_seen_by")?,
            comment: row.get("comment")?,
        })
    }
}

impl FromRow for Alias {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            email: row.get("email")?,
            alias: row.get("alias")?,
            delegated_email: row.get("delegated_email")?,
        })
    }
}

impl FromRow for Tool {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get("name")?,
            description: row.get("description")?,
            image: row.get("image")?,
            tags: split_tags(row.get("tags")?),
        })
    }
}

impl FromRow for Item {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            location: Location::from_row(row)?,
            description: row.get("description")?,
            alias: row.get("alias")?,
            tags: split_tags(row.get("tags")?),
        })
    }
}

/// Trims `s`, mapping the empty string to `None`.
pub fn normalize(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_strings() {
        assert_eq!(None, normalize(None));
        assert_eq!(None, normalize(Some("")));
        assert_eq!(None, normalize(Some(" \t\r\n")));
        assert_eq!(Some("On desk".to_owned()), normalize(Some(" On desk\n")));
    }

    #[test]
    fn tag_splitting() {
        assert!(split_tags(None).is_empty());
        assert!(split_tags(Some(String::new())).is_empty());
        assert_eq!(
            vec!["a".to_owned(), "b".to_owned()],
            split_tags(Some("b a b".to_owned())),
        );
    }

    #[test]
    fn item_display_name() {
        let mut item = Item {
            location: Location {
                tool: "Drill".to_owned(),
                last_seen_by: "user1@a.example.com".to_owned(),
                comment: None,
            },
            description: None,
            alias: None,
            tags: vec![],
        };
        assert_eq!("user1@a.example.com", item.seen_by_display());
        item.alias = Some("Bob".to_owned());
        assert_eq!("Bob", item.seen_by_display());
    }
}
