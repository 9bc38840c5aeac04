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

//! The tag filter grammar used to narrow down the tracker view.
//!
//! A filter is a whitespace (or anything else) separated list of tags, each
//! optionally prefixed: `-tag` excludes tools carrying `tag`, `+tag` requires
//! it, and a bare `tag` admits tools carrying it. For example,
//! `"drill +cordless -hidden"`.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use rusqlite::types::Value;

lazy_static! {
    static ref TAG: regex::Regex =
        regex::Regex::new("[+-]?[a-zA-Z][a-zA-Z0-9_]*").unwrap();
}

/// The tag every default view excludes.
pub const HIDDEN: &str = "hidden";

/// How a tag participates in a filter.
///
/// Ordered by precedence: when the same tag appears more than once, the
/// smallest wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TagType {
    /// `-tag`: tools with the tag are excluded.
    Not,
    /// `+tag`: tools must have the tag.
    All,
    /// `tag`: tools with any such tag are included.
    Any,
}

impl TagType {
    fn prefix(self) -> &'static str {
        match self {
            Self::Not => "-",
            Self::All => "+",
            Self::Any => "",
        }
    }
}

/// Splits a single tag token into its name and type.
pub fn parse_tag(token: &str) -> (&str, TagType) {
    if let Some(name) = token.strip_prefix('-') {
        (name, TagType::Not)
    } else if let Some(name) = token.strip_prefix('+') {
        (name, TagType::All)
    } else {
        (token, TagType::Any)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagFilter {
    tags: BTreeMap<String, TagType>,
}

impl Default for TagFilter {
    fn default() -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(HIDDEN.to_owned(), TagType::Not);
        Self { tags }
    }
}

impl TagFilter {
    /// A filter which admits everything.
    pub fn empty() -> Self {
        Self {
            tags: BTreeMap::new(),
        }
    }

    /// Extracts every tag token from `query`.
    ///
    /// Anything which isn't a tag token is ignored, so `"foo+bar -baz"` and
    /// `"foo, +bar; -baz"` are the same filter.
    pub fn parse(query: &str) -> Self {
        let mut this = Self::empty();
        for token in TAG.find_iter(query) {
            let (name, typ) = parse_tag(token.as_str());
            this.tags
                .entry(name.to_owned())
                .and_modify(|old| *old = (*old).min(typ))
                .or_insert(typ);
        }
        this
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<TagType> {
        self.tags.get(name).copied()
    }

    /// Returns the query string for this filter with `token` set,
    /// overriding any existing type for the same tag.
    pub fn with_tag(&self, token: &str) -> String {
        let (name, typ) = parse_tag(token);
        let mut tags = self.tags.clone();
        tags.insert(name.to_owned(), typ);
        Self { tags }.to_string()
    }

    /// Returns the query string for this filter with `token` removed.
    ///
    /// The tag is only removed if present with the same type; `-x` does not
    /// remove `+x`.
    pub fn without_tag(&self, token: &str) -> String {
        let (name, typ) = parse_tag(token);
        let mut tags = self.tags.clone();
        if Some(&typ) == tags.get(name) {
            tags.remove(name);
        }
        Self { tags }.to_string()
    }

    /// Builds a condition on `tracker.tool` implementing this filter,
    /// together with its positional parameters.
    ///
    /// Returns `None` if the filter has no tags.
    pub fn sql_filter(&self) -> Option<(String, Vec<Value>)> {
        let mut any_args = Vec::<Value>::new();
        let mut all_args = Vec::<Value>::new();
        let mut not_args = Vec::<Value>::new();

        for (name, &typ) in &self.tags {
            let name = Value::Text(name.clone());
            match typ {
                TagType::Not => not_args.push(name),
                TagType::All => {
                    all_args.push(name.clone());
                    any_args.push(name);
                },
                TagType::Any => any_args.push(name),
            }
        }

        fn match_table(n: usize) -> String {
            format!(
                "SELECT `tag`.`tool` FROM `tag` WHERE `tag`.`tag` IN ({})",
                vec!["?"; n].join(","),
            )
        }

        let mut filter = String::new();
        let mut args = Vec::<Value>::new();
        let mut sep = "";

        if !any_args.is_empty() {
            filter.push_str(&format!(
                "{sep}`tracker`.`tool` IN ({})",
                match_table(any_args.len()),
            ));
            sep = " AND ";
            args.extend(any_args);
        }

        if !all_args.is_empty() {
            let n = all_args.len();
            filter.push_str(&format!(
                "{sep}`tracker`.`tool` IN ({} \
                 GROUP BY `tag`.`tool` HAVING count(`tag`.`tag`) = ?)",
                match_table(n),
            ));
            sep = " AND ";
            args.extend(all_args);
            args.push(Value::Integer(n as i64));
        }

        if !not_args.is_empty() {
            filter.push_str(&format!(
                "{sep}`tracker`.`tool` NOT IN ({})",
                match_table(not_args.len()),
            ));
            args.extend(not_args);
        }

        if filter.is_empty() {
            None
        } else {
            Some((filter, args))
        }
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ix, (name, typ)) in self.tags.iter().enumerate() {
            if ix > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}{}", typ.prefix(), name)?;
        }
        Ok(())
    }
}

/// Whether `name` can be used as a tag.
pub fn is_valid_tag_name(name: &str) -> bool {
    TAG.find(name)
        .map_or(false, |m| m.range() == (0..name.len()))
        && !name.starts_with(['+', '-'])
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parse_tags() {
        assert_eq!(("foo", TagType::Any), parse_tag("foo"));
        assert_eq!(("foo", TagType::All), parse_tag("+foo"));
        assert_eq!(("foo", TagType::Not), parse_tag("-foo"));
    }

    #[test]
    fn parse_filters() {
        let filter = TagFilter::parse("foo+bar -baz");
        assert_eq!(Some(TagType::Any), filter.get("foo"));
        assert_eq!(Some(TagType::All), filter.get("bar"));
        assert_eq!(Some(TagType::Not), filter.get("baz"));
        assert_eq!("+bar -baz foo", filter.to_string());

        assert_eq!(filter, TagFilter::parse("foo, +bar; -baz ?!"));
        assert!(TagFilter::parse("").is_empty());
        assert!(TagFilter::parse("123 _ +").is_empty());
    }

    #[test]
    fn precedence() {
        assert_eq!("-x", TagFilter::parse("x +x -x").to_string());
        assert_eq!("-x", TagFilter::parse("-x x").to_string());
        assert_eq!("+x", TagFilter::parse("x +x").to_string());
        assert_eq!("+x", TagFilter::parse("+x x").to_string());
    }

    #[test]
    fn default_hides_hidden() {
        let filter = TagFilter::default();
        assert_eq!(Some(TagType::Not), filter.get(HIDDEN));
        assert_eq!("-hidden", filter.to_string());
    }

    #[test]
    fn add_and_remove() {
        let filter = TagFilter::parse("-hidden foo");
        assert_eq!("foo -hidden", filter.to_string());
        assert_eq!("+foo -hidden", filter.with_tag("+foo"));
        assert_eq!("bar foo -hidden", filter.with_tag("bar"));
        assert_eq!("foo hidden", filter.with_tag("hidden"));
        assert_eq!("-hidden", filter.without_tag("foo"));
        assert_eq!("foo -hidden", filter.without_tag("+foo"));
        assert_eq!("foo", filter.without_tag("-hidden"));
        assert_eq!("foo -hidden", filter.without_tag("nonexistent"));
    }

    #[test]
    fn sql_filter_shape() {
        assert_eq!(None, TagFilter::empty().sql_filter());

        let (sql, args) =
            TagFilter::parse("-tag1 +tag2 tag3").sql_filter().unwrap();
        assert_eq!(
            "`tracker`.`tool` IN (SELECT `tag`.`tool` FROM `tag` \
             WHERE `tag`.`tag` IN (?,?)) \
             AND `tracker`.`tool` IN (SELECT `tag`.`tool` FROM `tag` \
             WHERE `tag`.`tag` IN (?) \
             GROUP BY `tag`.`tool` HAVING count(`tag`.`tag`) = ?) \
             AND `tracker`.`tool` NOT IN (SELECT `tag`.`tool` FROM `tag` \
             WHERE `tag`.`tag` IN (?))",
            sql,
        );
        assert_eq!(
            vec![
                Value::Text("tag2".to_owned()),
                Value::Text("tag3".to_owned()),
                Value::Text("tag2".to_owned()),
                Value::Integer(1),
                Value::Text("tag1".to_owned()),
            ],
            args,
        );

        let (sql, args) = TagFilter::default().sql_filter().unwrap();
        assert_eq!(
            "`tracker`.`tool` NOT IN (SELECT `tag`.`tool` FROM `tag` \
             WHERE `tag`.`tag` IN (?))",
            sql,
        );
        assert_eq!(vec![Value::Text("hidden".to_owned())], args);
    }

    #[test]
    fn tag_names() {
        assert!(is_valid_tag_name("cordless"));
        assert!(is_valid_tag_name("Bit_set2"));
        assert!(!is_valid_tag_name(""));
        assert!(!is_valid_tag_name("+cordless"));
        assert!(!is_valid_tag_name("2nd"));
        assert!(!is_valid_tag_name("two words"));
    }

    proptest! {
        #[test]
        fn display_then_parse_is_stable(query in "[-+a-z ]{0,40}") {
            let filter = TagFilter::parse(&query);
            prop_assert_eq!(&filter, &TagFilter::parse(&filter.to_string()));
        }
    }
}
