/*
 * This file is part of Anillo OS
 * Copyright (C) 2023 Anillo OS Developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Lesser General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use core::fmt;

/// Why an interrupt-management request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqError {
	/// The line number is outside the descriptor table.
	InvalidLine,
	/// The line already has a handler that won't share it.
	Busy,
	/// Nothing registered on the line matches the device token.
	NotFound,
	/// The line is already served by a different controller.
	AlreadyBound,
	/// A shared registration was attempted without a device token.
	InvalidArgument,
	/// The affinity mask names no processor, or one we don't support.
	InvalidAffinity,
}

impl fmt::Display for IrqError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidLine => write!(f, "interrupt line out of range"),
			Self::Busy => write!(f, "interrupt line is busy"),
			Self::NotFound => write!(f, "no matching handler on this line"),
			Self::AlreadyBound => write!(f, "line is already bound to another controller"),
			Self::InvalidArgument => write!(f, "shared handlers need a device token"),
			Self::InvalidAffinity => write!(f, "invalid processor affinity"),
		}
	}
}
