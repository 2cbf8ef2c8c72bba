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

use bitflags::bitflags;

bitflags! {
	/// Per-line state kept by the interrupt core.
	pub struct IrqStatus: u32 {
		/// Some processor is running the line's handlers right now.
		const IN_PROGRESS = 1 << 0;
		/// The line has been disabled, either by a driver or because nothing handles it.
		const DISABLED = 1 << 1;
		/// An assertion arrived that nobody has serviced yet.
		const PENDING = 1 << 2;
		/// A synthetic replay of a pending assertion has been started.
		const REPLAY = 1 << 3;
		/// The line is taking part in autodetection.
		const AUTODETECT = 1 << 4;
		/// Autodetection is still waiting for the line to fire.
		const WAITING = 1 << 5;
		/// The line is level-triggered.
		const LEVEL = 1 << 6;
		/// The core masked the line at its controller (nested disable or spurious assertion).
		const MASKED = 1 << 7;
	}
}
