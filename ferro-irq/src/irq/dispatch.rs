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

//! Delivering an assertion to the handlers of its line.
//!
//! A line is either idle, or *in progress* on exactly one processor. An assertion that arrives while the
//! line is in progress (on any processor) only marks it *pending*; the processor that owns the line then
//! walks the chain once more before letting go, so the handlers of one line never run concurrently with
//! themselves and no assertion is lost.

use log::{debug, error, warn};

use super::{action::ActionChain, descriptor::DescriptorGuard, ActionFlags, IrqDescriptor, IrqStatus, IrqTable, Line};
use crate::interrupts;

impl IrqTable {
	/// Services an assertion of `line` on processor `cpu`.
	///
	/// This is what the architecture's trap code calls once it knows which line fired. It must be entered with
	/// local interrupts disabled and never blocks. `cpu` is the logical index of the processor we're on,
	/// i.e. [`interrupts::current_cpu`].
	pub fn handle_irq(&self, cpu: usize, line: usize) {
		debug_assert_eq!(cpu, interrupts::current_cpu(), "interrupt reported for another processor");
		let interrupt_state = interrupts::disable_and_save_interrupts();
		self.irq_enter(cpu);

		match Line::new(line) {
			Ok(line) => self.dispatch(cpu, line),
			Err(_) => {
				let total = self.note_spurious();
				error!("interrupt on line {} which is outside the table ({} spurious so far)", line, total);
			},
		}

		self.irq_exit(cpu);
		// SAFETY: we restore the state the trap code handed us
		unsafe { interrupts::restore_interrupts(interrupt_state) };
	}

	fn dispatch(&self, cpu: usize, line: Line) {
		let descriptor = self.descriptor(line);
		descriptor.record_assertion(cpu);

		let mut guard = descriptor.lock();
		let controller = guard.controller;
		controller.ack(line);

		// a real assertion supersedes any replay, and tells autodetection this line is alive
		let mut status = guard.status - (IrqStatus::REPLAY | IrqStatus::WAITING);
		status.insert(IrqStatus::PENDING);

		if guard.actions().is_empty() {
			status.remove(IrqStatus::PENDING);
			if status.contains(IrqStatus::AUTODETECT) {
				guard.status = status;
				guard.end_if_unmasked();
				return;
			}

			status.insert(IrqStatus::DISABLED | IrqStatus::MASKED);
			guard.status = status;
			controller.disable(line);
			drop(guard);

			let total = self.note_spurious();
			warn!(
				"spurious interrupt on line {} ({}); masked it, {} spurious so far",
				line,
				controller.name(),
				total
			);
			return;
		}

		if status.intersects(IrqStatus::DISABLED | IrqStatus::IN_PROGRESS) {
			// leave it pending for whoever unmasks the line, or for the processor already servicing it
			guard.status = status;
			return;
		}

		status.remove(IrqStatus::PENDING);
		status.insert(IrqStatus::IN_PROGRESS);
		guard.status = status;
		self.service(descriptor, guard);
	}

	/// Runs the chain of a line whose `REPLAY` bit the caller just set, as if it had fired on this processor.
	///
	/// There is no physical assertion behind a replay, so the controller is not acknowledged.
	pub(crate) fn replay(&self, line: Line) {
		let interrupt_state = interrupts::disable_and_save_interrupts();
		let cpu = interrupts::current_cpu();
		self.irq_enter(cpu);

		let descriptor = self.descriptor(line);
		let mut guard = descriptor.lock();
		let status = guard.status;
		if status.contains(IrqStatus::REPLAY)
			&& !status.intersects(IrqStatus::DISABLED | IrqStatus::IN_PROGRESS)
			&& !guard.actions().is_empty()
		{
			debug!("replaying pending interrupt on line {}", line);
			guard.status.remove(IrqStatus::PENDING);
			guard.status.insert(IrqStatus::IN_PROGRESS);
			self.service(descriptor, guard);
		} else {
			// whoever got in first (a real assertion, or a new disable) takes care of the pending bit
			guard.status.remove(IrqStatus::REPLAY);
			if guard.actions().is_empty() {
				guard.status.remove(IrqStatus::PENDING);
			}
		}

		self.irq_exit(cpu);
		// SAFETY: we restore the caller's state
		unsafe { interrupts::restore_interrupts(interrupt_state) };
	}

	/// Runs the chain until no new assertion is pending, then returns the line to idle.
	///
	/// `guard` must have `IN_PROGRESS` freshly set by the caller.
	fn service(&self, descriptor: &IrqDescriptor, guard: DescriptorGuard<'_>) {
		let line = descriptor.line();
		drop(guard);

		loop {
			// SAFETY: we set IN_PROGRESS, and only clear it below, after we're done with the chain
			self.run_chain(line, unsafe { descriptor.actions_in_flight() });

			let mut guard = descriptor.lock();
			let status = guard.status;
			if status.contains(IrqStatus::PENDING) && !status.contains(IrqStatus::DISABLED) {
				// it fired again while we were busy; the edge that caused that is gone, so go round once more
				guard.status.remove(IrqStatus::PENDING);
				continue;
			}

			guard.status.remove(IrqStatus::IN_PROGRESS | IrqStatus::REPLAY);
			guard.end_if_unmasked();
			return;
		}
	}

	fn run_chain(&self, line: Line, chain: &ActionChain) {
		let fast = chain
			.first()
			.map_or(true, |action| action.flags().contains(ActionFlags::FAST));
		if !fast {
			// SAFETY: this line is IN_PROGRESS, so another assertion of it only sets PENDING; other lines may nest
			//         on top of us, which is what non-fast handlers ask for.
			unsafe { interrupts::enable_interrupts() };
		}

		let mut seen = ActionFlags::empty();
		for action in chain.iter() {
			seen |= action.flags();
			action.invoke(line);
		}

		if seen.contains(ActionFlags::SAMPLE_RANDOM) {
			if let Some(sink) = self.entropy_sink() {
				sink.add_interrupt_randomness(line);
			}
		}

		interrupts::disable_interrupts();
	}
}
