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

use std::fmt;
use std::sync::{Arc, Mutex};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    adapter: String,
    sender: Option<String>,
    message_id: Option<String>,
}

impl LogPrefix {
    pub fn new(adapter: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                adapter,
                sender: None,
                message_id: None,
            })),
        }
    }

    pub fn set_sender(&self, sender: String) {
        self.inner.lock().unwrap().sender = Some(sanitise(sender));
    }

    pub fn set_message_id(&self, message_id: String) {
        self.inner.lock().unwrap().message_id = Some(sanitise(message_id));
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        write!(f, "{}", inner.adapter)?;
        match (&inner.sender, &inner.message_id) {
            (None, None) => Ok(()),
            (Some(sender), None) => write!(f, "[{sender}]"),
            (None, Some(id)) => write!(f, "[id={id}]"),
            (Some(sender), Some(id)) => write!(f, "[{sender} id={id}]"),
        }
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_formatting() {
        let prefix = LogPrefix::new("deliver".to_owned());
        assert_eq!("deliver", prefix.to_string());

        let clone = prefix.clone();
        clone.set_sender("user1@a.example.com\r\n".to_owned());
        assert_eq!("deliver[user1@a.example.com]", prefix.to_string());

        prefix.set_message_id("<1234@a.example.com>".to_owned());
        assert_eq!(
            "deliver[user1@a.example.com id=<1234@a.example.com>]",
            clone.to_string(),
        );
    }

    #[test]
    fn sanitise_truncates() {
        let prefix = LogPrefix::new("deliver".to_owned());
        prefix.set_sender("x".repeat(100));
        assert_eq!(format!("deliver[{}]", "x".repeat(64)), prefix.to_string());
    }
}
