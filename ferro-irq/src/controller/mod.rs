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

//! The contract between the generic interrupt core and interrupt-controller hardware.
//!
//! A controller driver implements [`InterruptController`] once and binds the resulting object to every
//! line it serves with [`IrqTable::bind_controller`](crate::irq::IrqTable::bind_controller). From then on
//! the core is the only caller of its operations; drivers never mask or acknowledge lines directly.

pub mod i8259;
pub mod imask;
mod null;
pub mod openpic;

pub use null::{NoController, NO_CONTROLLER};

use crate::irq::{CpuMask, Line};

/// The operations a piece of interrupt-controller hardware offers for each of its lines.
///
/// All of them may be called from interrupt context with local interrupts disabled. They must not
/// allocate, block, or call back into the interrupt core.
///
/// Controllers are compared by address, so an implementation must not be a zero-sized type.
pub trait InterruptController: Sync {
	/// A short name for listings, e.g. `XT-PIC`.
	fn name(&self) -> &'static str;

	/// Arms the line when its first handler is installed.
	///
	/// Returns whether the hardware already has an interrupt latched for it.
	fn startup(&self, line: Line) -> bool;

	/// Disarms the line once its last handler is gone.
	fn shutdown(&self, line: Line);

	fn enable(&self, line: Line);
	fn disable(&self, line: Line);

	/// Acknowledges an assertion before its handlers run.
	fn ack(&self, line: Line);

	/// Re-arms the line after its handlers have run.
	fn end(&self, line: Line);

	/// Routes the line to the given processors; controllers that can't do that ignore it.
	fn set_affinity(&self, _line: Line, _mask: CpuMask) {}
}

/// Whether both references point at the same controller object.
pub fn same_controller(a: &dyn InterruptController, b: &dyn InterruptController) -> bool {
	core::ptr::eq(
		a as *const dyn InterruptController as *const u8,
		b as *const dyn InterruptController as *const u8,
	)
}
