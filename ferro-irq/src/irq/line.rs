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

use super::IrqError;
use crate::NR_IRQS;

static_assertions::const_assert!(NR_IRQS <= u16::MAX as usize);

/// An interrupt line number that is known to be inside the descriptor table.
///
/// Everything that indexes the table takes a `Line`, so a bad number is rejected once, at the API
/// boundary, instead of at every array access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Line(u16);

impl Line {
	pub const fn new(index: usize) -> Result<Self, IrqError> {
		if index < NR_IRQS {
			Ok(Self(index as u16))
		} else {
			Err(IrqError::InvalidLine)
		}
	}

	pub const fn index(self) -> usize {
		self.0 as usize
	}

	/// Every line in the table, in ascending order.
	pub fn all() -> impl DoubleEndedIterator<Item = Line> + ExactSizeIterator {
		(0..NR_IRQS as u16).map(Line)
	}
}

impl TryFrom<usize> for Line {
	type Error = IrqError;

	fn try_from(index: usize) -> Result<Self, Self::Error> {
		Self::new(index)
	}
}

impl From<Line> for usize {
	fn from(line: Line) -> Self {
		line.index()
	}
}

impl fmt::Display for Line {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_lines_past_the_table() {
		assert_eq!(Line::new(NR_IRQS - 1).map(Line::index), Ok(NR_IRQS - 1));
		assert_eq!(Line::new(NR_IRQS), Err(IrqError::InvalidLine));
		assert_eq!(Line::try_from(usize::MAX), Err(IrqError::InvalidLine));
	}

	#[test]
	fn all_covers_the_table() {
		assert_eq!(Line::all().len(), NR_IRQS);
		assert_eq!(Line::all().next_back().map(usize::from), Some(NR_IRQS - 1));
	}

	#[test]
	fn display_honors_width_and_alignment() {
		let line = Line::new(7).unwrap();
		assert_eq!(std::format!("{:>3}|{:<3}|{}", line, line, line), "  7|7  |7");
	}
}
