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

use alloc::vec::Vec;
use core::fmt;

use super::{Action, IrqStatus, IrqTable};
use crate::MAX_CPUS;

/// Width of the controller column, trigger suffix included.
const CONTROLLER_WIDTH: usize = 14;

impl IrqTable {
	/// Writes a table of every line that has handlers, in the format of Linux's `/proc/interrupts`.
	///
	/// Only the first `online_cpus` processors get a column. The controller column carries the line's
	/// trigger mode (`-edge` or `-level`). Each line is copied out under its lock and written afterwards,
	/// so `out` is never called with a descriptor locked.
	pub fn show_interrupts(&self, out: &mut dyn fmt::Write, online_cpus: usize) -> fmt::Result {
		let cpus = online_cpus.clamp(1, MAX_CPUS);

		write!(out, "           ")?;
		for cpu in 0..cpus {
			write!(out, "CPU{:<7} ", cpu)?;
		}
		writeln!(out)?;

		let mut names = Vec::new();
		for descriptor in self.descriptors() {
			names.clear();
			let (controller, status) = {
				let guard = descriptor.lock();
				names.extend(guard.actions().iter().map(Action::name));
				(guard.controller.name(), guard.status)
			};
			if names.is_empty() {
				continue;
			}

			let trigger = if status.contains(IrqStatus::LEVEL) { "level" } else { "edge" };
			let width = CONTROLLER_WIDTH.saturating_sub(trigger.len() + 1);

			write!(out, "{:>3}: ", descriptor.line())?;
			for cpu in 0..cpus {
				write!(out, "{:>10} ", descriptor.count_on(cpu))?;
			}
			write!(out, " {:>width$}-{}  {}", controller, trigger, names[0], width = width)?;
			for name in &names[1..] {
				write!(out, ", {}", name)?;
			}
			writeln!(out)?;
		}

		writeln!(out, "ERR: {:>10}", self.spurious_count())
	}
}

#[cfg(test)]
mod tests {
	use std::string::String;

	use crate::{
		interrupts,
		irq::ActionFlags,
		testing::{booted_table, counting_handler, new_token},
	};

	#[test]
	fn lists_claimed_lines_only() {
		let (table, _) = booted_table();
		table.request_irq(1, counting_handler, ActionFlags::empty(), "i8042", new_token()).unwrap();
		table.request_irq(10, counting_handler, ActionFlags::SHARED, "eth0", new_token()).unwrap();
		table.request_irq(10, counting_handler, ActionFlags::SHARED, "usb", new_token()).unwrap();
		table.set_level_triggered(10, true).unwrap();

		table.handle_irq(0, 1);
		table.handle_irq(0, 1);
		unsafe { interrupts::set_current_cpu(1) };
		table.handle_irq(1, 10);
		unsafe { interrupts::set_current_cpu(0) };
		table.handle_irq(0, 6);

		let mut listing = String::new();
		table.show_interrupts(&mut listing, 2).unwrap();
		assert_eq!(
			listing,
			concat!(
				"           CPU0       CPU1       \n",
				"  1:          2          0   test-pic-edge  i8042\n",
				" 10:          0          1  test-pic-level  eth0, usb\n",
				"ERR:          1\n",
			)
		);
	}
}
