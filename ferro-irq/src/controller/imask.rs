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

//! Priority-mask ("IMASK") interrupt control.
//!
//! Some processors have no discrete controller at all: the status register carries a 4-bit interrupt
//! priority level, and any source at or below that level is held off. Line `n` of this controller has
//! priority `15 - n`, so masking a line means raising the level until that line is held off, which also
//! holds off every line numbered above it.
//!
//! The bitmap of enabled lines is the source of truth; the level written to hardware is always
//! recomputed from it as `15 - (lowest masked line)`.

use log::info;

use super::InterruptController;
use crate::{
	irq::{IrqError, IrqTable, Line},
	sync::{Lock, SpinLock},
	NR_IRQS,
};

/// Lines 0-14 map onto priorities 15-1; priority 0 means "never delivered".
pub const IMASK_LINES: usize = 15;

const HIGHEST_LEVEL: u8 = 15;

/// Where the interrupt priority level lives, e.g. the IMASK field of the status register.
pub trait PriorityRegister: Sync {
	fn set_priority_level(&self, level: u8);
}

struct ImaskState {
	/// Bit `n` set means line `first_line + n` is enabled.
	enabled: u16,
	level: u8,
}

pub struct Imask<R> {
	register: R,
	first_line: usize,
	state: SpinLock<ImaskState>,
}

impl<R: PriorityRegister> Imask<R> {
	pub const fn new(register: R, first_line: usize) -> Self {
		Self {
			register,
			first_line,
			state: SpinLock::new(ImaskState {
				enabled: 0,
				level: HIGHEST_LEVEL,
			}),
		}
	}

	/// Holds off every line and binds `first_line..first_line + IMASK_LINES` to this controller.
	///
	/// A range that runs off the end of the table is refused with [`IrqError::InvalidLine`] before the priority
	/// register is written.
	pub fn init(&'static self, table: &IrqTable) -> Result<(), IrqError>
	where
		R: 'static,
	{
		let end = self
			.first_line
			.checked_add(IMASK_LINES)
			.filter(|&end| end <= NR_IRQS)
			.ok_or(IrqError::InvalidLine)?;

		{
			let mut state = self.state.lock();
			state.enabled = 0;
			self.write_level(&mut state);
		}
		table.bind_controller_range(self.first_line..end, self)?;
		info!("IMASK priority control on lines {}..{}", self.first_line, end);
		Ok(())
	}

	/// The level most recently written to the priority register.
	pub fn level(&self) -> u8 {
		self.state.lock().level
	}

	fn bit(&self, line: Line) -> Option<u16> {
		let offset = line.index().checked_sub(self.first_line)?;
		(offset < IMASK_LINES).then(|| 1 << offset)
	}

	fn write_level(&self, state: &mut ImaskState) {
		let lowest_masked = (!state.enabled).trailing_zeros().min(IMASK_LINES as u32) as u8;
		state.level = HIGHEST_LEVEL - lowest_masked;
		self.register.set_priority_level(state.level);
	}

	fn update(&self, line: Line, enabled: bool) {
		let Some(bit) = self.bit(line) else { return };
		let mut state = self.state.lock();
		if enabled {
			state.enabled |= bit;
		} else {
			state.enabled &= !bit;
		}
		self.write_level(&mut state);
	}
}

impl<R: PriorityRegister> InterruptController for Imask<R> {
	fn name(&self) -> &'static str {
		"IMASK"
	}

	fn startup(&self, line: Line) -> bool {
		self.enable(line);
		false
	}

	fn shutdown(&self, line: Line) {
		self.disable(line);
	}

	fn enable(&self, line: Line) {
		self.update(line, true);
	}

	fn disable(&self, line: Line) {
		self.update(line, false);
	}

	fn ack(&self, line: Line) {
		self.disable(line);
	}

	fn end(&self, line: Line) {
		self.enable(line);
	}
}

#[cfg(test)]
mod tests {
	use std::{boxed::Box, sync::Mutex, vec, vec::Vec};

	use super::*;
	use crate::{
		irq::ActionFlags,
		testing::{counting_handler, hits, new_token},
	};

	#[derive(Default)]
	struct RecordingLevel {
		levels: Mutex<Vec<u8>>,
	}

	impl PriorityRegister for RecordingLevel {
		fn set_priority_level(&self, level: u8) {
			self.levels.lock().unwrap().push(level);
		}
	}

	fn booted(first_line: usize) -> (&'static Imask<RecordingLevel>, &'static IrqTable) {
		let imask: &'static Imask<RecordingLevel> = Box::leak(Box::new(Imask::new(RecordingLevel::default(), first_line)));
		let table: &'static IrqTable = Box::leak(Box::new(IrqTable::new()));
		imask.init(table).unwrap();
		(imask, table)
	}

	fn line(index: usize) -> Line {
		Line::new(index).unwrap()
	}

	#[test]
	fn level_follows_the_lowest_masked_line() {
		let (imask, _) = booted(0);
		assert_eq!(imask.level(), 15);

		imask.enable(line(0));
		imask.enable(line(1));
		assert_eq!(imask.level(), 13);

		// line 3 can't get through while line 2 is still masked
		imask.enable(line(3));
		assert_eq!(imask.level(), 13);

		imask.enable(line(2));
		assert_eq!(imask.level(), 11);

		imask.disable(line(0));
		assert_eq!(imask.level(), 15);
		assert_eq!(*imask.register.levels.lock().unwrap(), vec![15, 14, 13, 13, 11, 15]);
	}

	#[test]
	fn all_lines_enabled_opens_every_priority() {
		let (imask, _) = booted(0);
		for index in 0..IMASK_LINES {
			imask.enable(line(index));
		}
		assert_eq!(imask.level(), 0);
	}

	#[test]
	fn lines_are_relative_to_the_first_bound_line() {
		let (imask, table) = booted(32);
		assert_eq!(table.controller(32).unwrap().name(), "IMASK");
		assert_eq!(table.controller(46).unwrap().name(), "IMASK");
		assert_eq!(table.controller(47).unwrap().name(), "none");

		imask.enable(line(32));
		assert_eq!(imask.level(), 14);

		imask.enable(line(5));
		assert_eq!(imask.level(), 14);
	}

	#[test]
	fn init_refuses_lines_past_the_table() {
		let table: &'static IrqTable = Box::leak(Box::new(IrqTable::new()));
		for first_line in [usize::MAX - 3, NR_IRQS - 1] {
			let imask: &'static Imask<RecordingLevel> =
				Box::leak(Box::new(Imask::new(RecordingLevel::default(), first_line)));
			assert_eq!(imask.init(table), Err(IrqError::InvalidLine));
			assert!(imask.register.levels.lock().unwrap().is_empty());
		}
		assert_eq!(table.controller(NR_IRQS - 1).unwrap().name(), "none");
	}

	#[test]
	fn dispatch_masks_during_service_and_reopens_after() {
		let (imask, table) = booted(0);
		let token = new_token();
		table.request_irq(4, counting_handler, ActionFlags::empty(), "serial", token).unwrap();
		// lines 0-3 are still masked, so nothing gets through yet
		assert_eq!(imask.level(), 15);

		for index in 0..4 {
			imask.enable(line(index));
		}
		assert_eq!(imask.level(), 10);

		table.handle_irq(0, 4);
		assert_eq!(hits(token), 1);
		assert_eq!(imask.level(), 10);

		table.free_irq(4, token).unwrap();
		assert_eq!(imask.level(), 11);
	}
}
