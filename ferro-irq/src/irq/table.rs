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

//! The interrupt descriptor table.

use alloc::{boxed::Box, vec::Vec};
use core::{
	ops::Range,
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use log::{debug, warn};
use spin::Once;

use super::{cpu::CpuStat, CpuMask, IrqDescriptor, IrqError, IrqStatus, Line};
use crate::{
	controller::{same_controller, InterruptController, NO_CONTROLLER},
	sync::{Lock, SpinLock},
	MAX_CPUS, NR_IRQS,
};

/// Somewhere to send interrupt timing from lines flagged [`SAMPLE_RANDOM`](super::ActionFlags::SAMPLE_RANDOM).
pub trait EntropySink: Sync {
	fn add_interrupt_randomness(&self, line: Line);
}

/// One descriptor per line, plus the bookkeeping shared by all of them.
///
/// The kernel uses a single table for its whole lifetime (see [`init_table`]); separate tables are only
/// useful for testing.
pub struct IrqTable {
	descriptors: Box<[IrqDescriptor]>,
	cpus: [CpuStat; MAX_CPUS],
	spurious: AtomicU64,
	entropy: SpinLock<Option<&'static dyn EntropySink>>,
	pub(crate) probing: AtomicBool,
}

impl IrqTable {
	/// Creates a table where every line is disabled, has no handlers and is served by [`NO_CONTROLLER`].
	pub fn new() -> Self {
		let descriptors: Vec<IrqDescriptor> = Line::all().map(IrqDescriptor::new).collect();
		Self {
			descriptors: descriptors.into_boxed_slice(),
			cpus: core::array::from_fn(|_| CpuStat::new()),
			spurious: AtomicU64::new(0),
			entropy: SpinLock::new(None),
			probing: AtomicBool::new(false),
		}
	}

	pub fn descriptor(&self, line: Line) -> &IrqDescriptor {
		// the table always has NR_IRQS entries, and Line is always below that
		&self.descriptors[line.index()]
	}

	/// Every descriptor, in line order.
	pub fn descriptors(&self) -> impl ExactSizeIterator<Item = &IrqDescriptor> {
		self.descriptors.iter()
	}

	/// Looks up a raw line number.
	pub fn get(&self, line: usize) -> Result<&IrqDescriptor, IrqError> {
		Ok(self.descriptor(Line::new(line)?))
	}

	/// Makes `controller` responsible for `line`.
	///
	/// Binding the controller that is already there is fine; replacing a different one is not. The line is
	/// left exactly as it was otherwise; in particular it is not enabled.
	pub fn bind_controller(&self, line: usize, controller: &'static dyn InterruptController) -> Result<(), IrqError> {
		let descriptor = self.get(line)?;
		let mut guard = descriptor.lock();
		let current = guard.controller;
		if !same_controller(current, &NO_CONTROLLER) && !same_controller(current, controller) {
			return Err(IrqError::AlreadyBound);
		}
		guard.controller = controller;
		drop(guard);

		debug!("line {} bound to {}", line, controller.name());
		Ok(())
	}

	/// Binds every line in `lines`, stopping at the first one that is bound elsewhere.
	pub fn bind_controller_range(
		&self,
		lines: Range<usize>,
		controller: &'static dyn InterruptController,
	) -> Result<(), IrqError> {
		if lines.end > NR_IRQS {
			return Err(IrqError::InvalidLine);
		}
		for line in lines {
			self.bind_controller(line, controller)?;
		}
		Ok(())
	}

	pub fn controller(&self, line: usize) -> Result<&'static dyn InterruptController, IrqError> {
		Ok(self.get(line)?.controller())
	}

	pub fn status(&self, line: usize) -> Result<IrqStatus, IrqError> {
		Ok(self.get(line)?.status())
	}

	pub fn depth(&self, line: usize) -> Result<u32, IrqError> {
		Ok(self.get(line)?.depth())
	}

	pub fn affinity(&self, line: usize) -> Result<CpuMask, IrqError> {
		Ok(self.get(line)?.affinity())
	}

	/// Names of the actions on `line`, in registration order.
	pub fn action_names(&self, line: usize) -> Result<Vec<&'static str>, IrqError> {
		let mut names = Vec::new();
		self.get(line)?.for_each_action(|action| names.push(action.name()));
		Ok(names)
	}

	/// Marks the line as level- or edge-triggered.
	pub fn set_level_triggered(&self, line: usize, level: bool) -> Result<(), IrqError> {
		let mut guard = self.get(line)?.lock();
		guard.status.set(IrqStatus::LEVEL, level);
		Ok(())
	}

	/// Assertions that found no handler (or arrived on a line outside the table).
	pub fn spurious_count(&self) -> u64 {
		self.spurious.load(Ordering::Relaxed)
	}

	pub(crate) fn note_spurious(&self) -> u64 {
		self.spurious.fetch_add(1, Ordering::Relaxed) + 1
	}

	pub fn set_entropy_sink(&self, sink: &'static dyn EntropySink) {
		*self.entropy.lock() = Some(sink);
	}

	pub(crate) fn entropy_sink(&self) -> Option<&'static dyn EntropySink> {
		*self.entropy.lock()
	}

	pub(crate) fn cpu_stat(&self, cpu: usize) -> &CpuStat {
		assert!(cpu < MAX_CPUS, "processor {} is beyond the {} we support", cpu, MAX_CPUS);
		&self.cpus[cpu]
	}

	/// How many interrupt contexts `cpu` is currently nested in.
	pub fn interrupt_nesting(&self, cpu: usize) -> usize {
		self.cpu_stat(cpu).nesting()
	}

	/// Whether `cpu` is currently servicing an interrupt; deferred work must not run if so.
	pub fn in_interrupt(&self, cpu: usize) -> bool {
		self.interrupt_nesting(cpu) > 0
	}

	/// Marks entry into interrupt context on `cpu`. Trap code that services interrupts without going through
	/// [`handle_irq`](Self::handle_irq) (e.g. inter-processor interrupts) brackets its work with this and
	/// [`irq_exit`](Self::irq_exit).
	pub fn irq_enter(&self, cpu: usize) {
		self.cpu_stat(cpu).enter();
	}

	pub fn irq_exit(&self, cpu: usize) {
		self.cpu_stat(cpu).exit();
	}
}

impl Default for IrqTable {
	fn default() -> Self {
		Self::new()
	}
}

static IRQ_TABLE: Once<IrqTable> = Once::new();

/// Sets up the kernel's interrupt table. Must be called once, before interrupts are enabled on any processor.
pub fn init_table() -> &'static IrqTable {
	if let Some(table) = IRQ_TABLE.get() {
		warn!("interrupt table initialized twice; keeping the existing one");
		return table;
	}
	IRQ_TABLE.call_once(IrqTable::new)
}

/// The kernel's interrupt table.
///
/// # Panics
///
/// If [`init_table`] hasn't run yet; nothing interrupt-related can work before that.
pub fn irq_table() -> &'static IrqTable {
	IRQ_TABLE.get().expect("interrupt table used before init_table()")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::RecordingController;

	#[test]
	fn starts_disabled_and_unbound() {
		let table = IrqTable::new();
		for line in [0, 17, NR_IRQS - 1] {
			assert_eq!(table.status(line).unwrap(), IrqStatus::DISABLED);
			assert_eq!(table.depth(line).unwrap(), 0);
			assert_eq!(table.controller(line).unwrap().name(), "none");
			assert!(table.action_names(line).unwrap().is_empty());
		}
		assert_eq!(table.status(NR_IRQS), Err(IrqError::InvalidLine));
		assert_eq!(table.spurious_count(), 0);
	}

	#[test]
	fn binding_is_idempotent_but_exclusive() {
		let table = IrqTable::new();
		let first = RecordingController::leak("first");
		let second = RecordingController::leak("second");

		table.bind_controller(4, first).unwrap();
		table.bind_controller(4, first).unwrap();
		assert_eq!(table.bind_controller(4, second), Err(IrqError::AlreadyBound));
		assert_eq!(table.bind_controller(4, &NO_CONTROLLER), Err(IrqError::AlreadyBound));
		assert_eq!(table.controller(4).unwrap().name(), "first");
		assert_eq!(table.bind_controller(NR_IRQS, first), Err(IrqError::InvalidLine));

		// binding does nothing to the hardware
		assert!(first.calls().is_empty());
		assert_eq!(table.status(4).unwrap(), IrqStatus::DISABLED);
	}

	#[test]
	fn range_binding_checks_the_whole_range_first() {
		let table = IrqTable::new();
		let pic = RecordingController::leak("pic");
		assert_eq!(table.bind_controller_range(NR_IRQS - 2..NR_IRQS + 1, pic), Err(IrqError::InvalidLine));
		assert_eq!(table.controller(NR_IRQS - 2).unwrap().name(), "none");

		table.bind_controller_range(0..16, pic).unwrap();
		assert_eq!(table.controller(15).unwrap().name(), "pic");
		assert_eq!(table.controller(16).unwrap().name(), "none");
	}

	#[test]
	fn level_flag_is_recorded() {
		let table = IrqTable::new();
		table.set_level_triggered(10, true).unwrap();
		assert!(table.status(10).unwrap().contains(IrqStatus::LEVEL));
		table.set_level_triggered(10, false).unwrap();
		assert!(!table.status(10).unwrap().contains(IrqStatus::LEVEL));
	}

	#[test]
	fn nesting_is_tracked_per_cpu() {
		let table = IrqTable::new();
		table.irq_enter(1);
		assert!(table.in_interrupt(1));
		assert!(!table.in_interrupt(0));
		table.irq_exit(1);
		assert!(!table.in_interrupt(1));
	}

	#[test]
	#[should_panic(expected = "beyond")]
	fn unknown_cpu_is_fatal() {
		IrqTable::new().irq_enter(MAX_CPUS);
	}

	#[test]
	fn global_table_is_created_once() {
		let table = init_table();
		assert!(core::ptr::eq(table, irq_table()));
		assert!(core::ptr::eq(init_table(), table));
	}
}
