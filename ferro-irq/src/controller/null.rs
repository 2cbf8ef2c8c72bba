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

use super::InterruptController;
use crate::irq::Line;

/// The controller every line starts out with: nothing is ever pending and every operation does nothing.
pub struct NoController {
	name: &'static str,
}

pub static NO_CONTROLLER: NoController = NoController { name: "none" };

impl InterruptController for NoController {
	fn name(&self) -> &'static str {
		self.name
	}

	fn startup(&self, _line: Line) -> bool {
		false
	}

	fn shutdown(&self, _line: Line) {}

	fn enable(&self, _line: Line) {}

	fn disable(&self, _line: Line) {}

	fn ack(&self, _line: Line) {}

	fn end(&self, _line: Line) {}
}
