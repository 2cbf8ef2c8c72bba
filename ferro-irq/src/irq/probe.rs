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

//! Finding out which line a device is wired to by making it fire.
//!
//! A driver that doesn't know its line calls [`IrqTable::probe_irq_on`], pokes its device so that it
//! raises an interrupt, and then asks [`Probe::probe_irq_off`] which of the unclaimed lines fired in the
//! meantime.

use core::{sync::atomic::Ordering, time::Duration};

use log::debug;

use super::{descriptor::DescriptorGuard, IrqError, IrqStatus, IrqTable, Line};
use crate::controller::{same_controller, NO_CONTROLLER};

/// How long to let interrupts that were already stuck on a freshly started line come in.
const SETTLE_DELAY: Duration = Duration::from_millis(20);

/// How long to watch the armed lines for stray assertions before handing them to the driver.
const STRAY_DELAY: Duration = Duration::from_millis(100);

/// What [`Probe::probe_irq_off`] saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeResult {
	/// No candidate line fired.
	NotFound,
	Found(Line),
	/// More than one candidate fired; this is the lowest of them.
	Multiple(Line),
}

/// An autodetection in progress. Only one can exist per table at a time.
///
/// Dropping it without calling [`probe_irq_off`](Self::probe_irq_off) or [`probe_irq_mask`](Self::probe_irq_mask)
/// abandons the probe and shuts every armed line down again.
#[must_use = "dropping a probe immediately ends it"]
pub struct Probe<'a> {
	table: &'a IrqTable,
	candidates: u32,
	finished: bool,
}

impl IrqTable {
	/// Arms every unclaimed line so that a device can be made to fire on it.
	///
	/// `wait` is called twice to let time pass (the core has no clock of its own): once to let interrupts
	/// that were already stuck on the lines come in, and once to weed out lines that fire on their own.
	/// Line 0 is never probed, and neither are lines that no controller serves.
	pub fn probe_irq_on(&self, mut wait: impl FnMut(Duration)) -> Result<Probe<'_>, IrqError> {
		if self
			.probing
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return Err(IrqError::Busy);
		}

		for line in Line::all().skip(1).rev() {
			let guard = self.descriptor(line).lock();
			if probeable(&guard) {
				guard.controller.startup(line);
			}
		}
		wait(SETTLE_DELAY);

		for line in Line::all().skip(1).rev() {
			let mut guard = self.descriptor(line).lock();
			if probeable(&guard) {
				guard.status.insert(IrqStatus::AUTODETECT | IrqStatus::WAITING);
				if guard.controller.startup(line) {
					guard.status.insert(IrqStatus::PENDING);
				}
			}
		}
		wait(STRAY_DELAY);

		let mut candidates = 0u32;
		for line in Line::all() {
			let mut guard = self.descriptor(line).lock();
			if !guard.status.contains(IrqStatus::AUTODETECT) {
				continue;
			}
			if !guard.status.contains(IrqStatus::WAITING) {
				// fired all by itself; useless for telling devices apart
				stop_probing(line, &mut guard);
			} else if line.index() < 32 {
				candidates |= 1 << line.index();
			}
		}

		debug!("probing for interrupts on candidate lines {:#010x}", candidates);
		Ok(Probe {
			table: self,
			candidates,
			finished: false,
		})
	}
}

impl<'a> Probe<'a> {
	/// The lines below 32 that were armed and quiet when the probe started.
	pub fn candidates(&self) -> u32 {
		self.candidates
	}

	/// Ends the probe and reports which line fired.
	pub fn probe_irq_off(mut self) -> ProbeResult {
		self.finish().0
	}

	/// Ends the probe and reports which of the candidate lines fired, as a bitmask.
	pub fn probe_irq_mask(mut self) -> u32 {
		self.finish().1 & self.candidates
	}

	fn finish(&mut self) -> (ProbeResult, u32) {
		let mut found = None;
		let mut count = 0usize;
		let mut mask = 0u32;

		for line in Line::all() {
			let mut guard = self.table.descriptor(line).lock();
			if !guard.status.contains(IrqStatus::AUTODETECT) {
				continue;
			}
			if !guard.status.contains(IrqStatus::WAITING) {
				found.get_or_insert(line);
				count += 1;
				if line.index() < 32 {
					mask |= 1 << line.index();
				}
			}
			stop_probing(line, &mut guard);
		}

		self.finished = true;
		self.table.probing.store(false, Ordering::Release);

		let result = match found {
			None => ProbeResult::NotFound,
			Some(line) if count == 1 => ProbeResult::Found(line),
			Some(line) => ProbeResult::Multiple(line),
		};
		debug!("probe finished: {:?}", result);
		(result, mask)
	}
}

impl<'a> Drop for Probe<'a> {
	fn drop(&mut self) {
		if !self.finished {
			self.finish();
		}
	}
}

fn probeable(guard: &DescriptorGuard<'_>) -> bool {
	guard.actions().is_empty() && !same_controller(guard.controller, &NO_CONTROLLER)
}

fn stop_probing(line: Line, guard: &mut DescriptorGuard<'_>) {
	guard
		.status
		.remove(IrqStatus::AUTODETECT | IrqStatus::WAITING | IrqStatus::PENDING);
	guard.controller.shutdown(line);
}

#[cfg(test)]
mod tests {
	use std::{vec, vec::Vec};

	use super::*;
	use crate::{
		irq::ActionFlags,
		testing::{booted_table, counting_handler, new_token, Call},
	};

	fn line(index: usize) -> Line {
		Line::new(index).unwrap()
	}

	#[test]
	fn finds_the_line_that_fired() {
		let (table, pic) = booted_table();
		let mut delays = Vec::new();
		let probe = table.probe_irq_on(|delay| delays.push(delay)).unwrap();
		assert_eq!(delays, vec![SETTLE_DELAY, STRAY_DELAY]);
		// every line the test controller serves except line 0
		assert_eq!(probe.candidates(), 0xfffe);
		assert!(table.status(7).unwrap().contains(IrqStatus::AUTODETECT | IrqStatus::WAITING));

		table.handle_irq(0, 7);
		assert!(!table.status(7).unwrap().contains(IrqStatus::WAITING));
		assert_eq!(table.spurious_count(), 0);

		assert_eq!(probe.probe_irq_off(), ProbeResult::Found(line(7)));
		assert!(!table.status(7).unwrap().contains(IrqStatus::AUTODETECT));
		assert_eq!(
			pic.calls_for(7),
			vec![Call::Startup(7), Call::Startup(7), Call::Ack(7), Call::Shutdown(7)]
		);
	}

	#[test]
	fn reports_silence_and_ambiguity() {
		let (table, _) = booted_table();
		let probe = table.probe_irq_on(|_| {}).unwrap();
		assert_eq!(probe.probe_irq_off(), ProbeResult::NotFound);

		let probe = table.probe_irq_on(|_| {}).unwrap();
		table.handle_irq(0, 11);
		table.handle_irq(0, 3);
		assert_eq!(probe.probe_irq_off(), ProbeResult::Multiple(line(3)));
	}

	#[test]
	fn claimed_and_stray_lines_are_not_candidates() {
		let (table, _) = booted_table();
		table.request_irq(4, counting_handler, ActionFlags::empty(), "kbd", new_token()).unwrap();

		let mut waits = 0;
		let probe = table
			.probe_irq_on(|_| {
				waits += 1;
				if waits == 2 {
					table.handle_irq(0, 9);
				}
			})
			.unwrap();
		assert_eq!(probe.candidates(), 0xfffe & !(1 << 4) & !(1 << 9));
		assert!(!table.status(9).unwrap().contains(IrqStatus::AUTODETECT));

		table.handle_irq(0, 5);
		table.handle_irq(0, 12);
		assert_eq!(probe.probe_irq_mask(), (1 << 5) | (1 << 12));
		assert!(table.status(4).unwrap().is_empty());
	}

	#[test]
	fn only_one_probe_at_a_time() {
		let (table, _) = booted_table();
		let probe = table.probe_irq_on(|_| {}).unwrap();
		assert!(matches!(table.probe_irq_on(|_| {}), Err(IrqError::Busy)));

		// abandoning a probe cleans up after it
		drop(probe);
		assert!(!table.status(2).unwrap().contains(IrqStatus::AUTODETECT));
		assert!(table.probe_irq_on(|_| {}).is_ok());
	}
}
