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

//! Persistent tracker state.

pub mod db;
mod db_migrations;
pub mod model;
pub mod tags;

pub use db::Connection;
pub use model::{Alias, Item, Location, Tool, Update};

use crate::support::error::Error;

/// The operations the mail pipeline needs from persistent storage.
pub trait Store {
    /// Returns the address which `email` was delegated by, or `email` itself
    /// if there is no delegation.
    fn get_delegate(&mut self, email: &str) -> Result<String, Error>;

    /// Applies all of `updates` in a single transaction.
    fn apply(&mut self, updates: &[Update]) -> Result<(), Error>;

    /// Sets the location of `location.tool`, replacing any previous one.
    fn update_location(&mut self, location: &Location) -> Result<(), Error> {
        self.apply(&[Update::Location(location.clone())])
    }

    /// Sets the alias of `alias.email`.
    ///
    /// An absent `delegated_email` leaves any existing delegation in place.
    fn update_alias(&mut self, alias: &Alias) -> Result<(), Error> {
        self.apply(&[Update::Alias(alias.clone())])
    }
}
