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

use core::arch::asm;

pub use super::common::InterruptState;

/// DAIF.I; set means IRQs are masked.
const DAIF_IRQ_MASK: u64 = 1 << 7;

/// Disables interrupts unconditionally.
pub fn disable_interrupts() {
	// SAFETY: masking IRQs only affects the current processor and can't break any compiler assumptions.
	unsafe {
		asm!("msr daifset, #2", "isb", options(nomem, nostack));
	}
}

/// Enables interrupts unconditionally.
///
/// # Safety
///
/// This operation is unsafe because it allows interrupt code to run, which may violate safety rules such as aliasing if care is not taken.
pub unsafe fn enable_interrupts() {
	asm!("msr daifclr, #2", options(nomem, nostack));
}

fn read_daif() -> u64 {
	let daif: u64;

	// SAFETY: reading DAIF has no side effects.
	unsafe {
		asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack, preserves_flags));
	}

	daif
}

pub fn interrupts_enabled() -> bool {
	(read_daif() & DAIF_IRQ_MASK) == 0
}

/// Saves the current interrupt state, disables interrupts, and then returns the saved interrupt state.
pub fn disable_and_save_interrupts() -> InterruptState {
	let enabled = interrupts_enabled();
	disable_interrupts();
	InterruptState(enabled)
}

/// Enables interrupts if they were previously enabled.
///
/// # Safety
///
/// This operation is unsafe for the same reason [`enable_interrupts()`] is unsafe.
pub unsafe fn restore_interrupts(interrupt_state: InterruptState) {
	if interrupt_state.0 {
		enable_interrupts();
	}
}

/// Records `index` as the logical index of the processor we're running on (kept in TPIDR_EL1).
///
/// # Safety
///
/// Must be called once per processor during bring-up, before it takes any interrupt, with an index no
/// other processor uses. Nothing else may use TPIDR_EL1.
pub unsafe fn set_current_cpu(index: usize) {
	assert!(index < crate::MAX_CPUS, "processor index {} is beyond the {} we support", index, crate::MAX_CPUS);
	asm!("msr tpidr_el1, {}", in(reg) index as u64, options(nomem, nostack, preserves_flags));
}

/// The logical index of the processor we're running on, as recorded by [`set_current_cpu()`].
pub fn current_cpu() -> usize {
	let index: u64;

	// SAFETY: reading TPIDR_EL1 has no side effects.
	unsafe {
		asm!("mrs {}, tpidr_el1", out(reg) index, options(nomem, nostack, preserves_flags));
	}

	index as usize
}
