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

//! A software model of the local interrupt flag for builds that don't run on bare metal.
//!
//! Nothing here touches real hardware: "disabling interrupts" just flips a flag, and the current
//! processor index is whatever was last set (0 to begin with). Under the unit tests each thread gets its
//! own flag and index, so every test thread behaves like a processor of its own.

pub use super::common::InterruptState;

#[cfg(not(test))]
mod flag {
	use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

	static ENABLED: AtomicBool = AtomicBool::new(true);
	static CPU: AtomicUsize = AtomicUsize::new(0);

	pub(super) fn get() -> bool {
		ENABLED.load(Ordering::Relaxed)
	}

	pub(super) fn set(enabled: bool) {
		ENABLED.store(enabled, Ordering::Relaxed);
	}

	pub(super) fn cpu() -> usize {
		CPU.load(Ordering::Relaxed)
	}

	pub(super) fn set_cpu(index: usize) {
		CPU.store(index, Ordering::Relaxed);
	}
}


/// Disables interrupts unconditionally.
pub fn disable_interrupts() {
	flag::set(false);
}

/// Enables interrupts unconditionally.
///
/// # Safety
///
/// Kept unsafe so that callers are written the same way as for the bare-metal back-ends.
pub unsafe fn enable_interrupts() {
	flag::set(true);
}

pub fn interrupts_enabled() -> bool {
	flag::get()
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
/// See [`enable_interrupts()`].
pub unsafe fn restore_interrupts(interrupt_state: InterruptState) {
	if interrupt_state.0 {
		enable_interrupts();
	}
}

/// Records `index` as the logical index of the processor we're running on.
///
/// # Safety
///
/// Kept unsafe to match the bare-metal back-ends.
pub unsafe fn set_current_cpu(index: usize) {
	assert!(index < crate::MAX_CPUS, "processor index {} is beyond the {} we support", index, crate::MAX_CPUS);
	flag::set_cpu(index);
}

pub fn current_cpu() -> usize {
	flag::cpu()
}

#[cfg(test)]
mod tests {
	use std::thread;

	use super::*;
	use crate::MAX_CPUS;

	#[test]
	fn each_thread_has_its_own_processor_index() {
		unsafe { set_current_cpu(MAX_CPUS - 1) };
		let other = thread::spawn(current_cpu).join().unwrap();
		assert_eq!(other, 0);
		assert_eq!(current_cpu(), MAX_CPUS - 1);
	}

	#[test]
	#[should_panic(expected = "beyond")]
	fn indexes_past_the_supported_processors_are_refused() {
		unsafe { set_current_cpu(MAX_CPUS) };
	}
}
