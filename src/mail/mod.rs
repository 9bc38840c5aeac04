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

//! Turning inbound mail into changes to the tracker.
//!
//! Every adapter feeds messages through [`Session::handle`], which checks
//! that the sender is who they claim to be, extracts the command, and applies
//! it to the store.

pub mod command;
pub mod session;
pub mod trust;

pub use session::{sender_from_header, Session};
