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

//! The classic PC pair of 8259A programmable interrupt controllers.
//!
//! The master serves lines 0-7 and the slave serves lines 8-15; the slave's output is wired into the
//! master's line 2. The mask registers can't be read back reliably, so the controller keeps the
//! authoritative copy of the 16-bit mask and always writes whole bytes.

use log::info;

use super::InterruptController;
use crate::{
	io::PortIo,
	irq::{Action, ActionFlags, DeviceToken, IrqError, IrqTable, Line},
	sync::{Lock, SpinLock},
};

pub const I8259_LINES: usize = 16;

/// The master line the slave is cascaded into.
pub const CASCADE_LINE: usize = 2;

static_assertions::const_assert!(I8259_LINES <= crate::NR_IRQS);

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xa0;
const SLAVE_DATA: u16 = 0xa1;

/// ICW1: edge triggered, cascade mode, ICW4 follows.
const ICW1_INIT: u8 = 0x11;
/// ICW3 for the master: which of its inputs has a slave attached.
const ICW3_MASTER: u8 = 1 << CASCADE_LINE;
/// ICW3 for the slave: which master input it is attached to.
const ICW3_SLAVE: u8 = CASCADE_LINE as u8;
/// ICW4: 8086 mode, normal EOI.
const ICW4_8086: u8 = 0x01;

/// OCW2 "specific EOI"; the low three bits select the input.
const SPECIFIC_EOI: u8 = 0x60;

const ALL_MASKED: u16 = 0xffff;

pub struct I8259<P> {
	ports: P,
	vector_base: u8,

	/// Bit `n` set means line `n` is masked. The low byte mirrors the master, the high byte the slave.
	cached_mask: SpinLock<u16>,
}

fn pin(line: Line) -> Option<usize> {
	let index = line.index();
	(index < I8259_LINES).then_some(index)
}

fn cascade_interrupt(_line: Line, _dev: DeviceToken) {}

impl<P: PortIo> I8259<P> {
	/// Creates the controller pair; lines 0-15 will be delivered as vectors `vector_base..vector_base + 16`.
	pub const fn new(ports: P, vector_base: u8) -> Self {
		Self {
			ports,
			vector_base,
			cached_mask: SpinLock::new(ALL_MASKED),
		}
	}

	/// The current software copy of the mask (bit set = masked).
	pub fn cached_mask(&self) -> u16 {
		*self.cached_mask.lock()
	}

	/// Programs both chips, masks every line, binds lines 0-15 to this controller and reserves the cascade line.
	pub fn init(&'static self, table: &IrqTable) -> Result<(), IrqError>
	where
		P: 'static,
	{
		{
			let mut mask = self.cached_mask.lock();
			*mask = ALL_MASKED;
			self.ports.write_u8(MASTER_DATA, 0xff);
			self.ports.write_u8(SLAVE_DATA, 0xff);

			self.ports.write_u8(MASTER_COMMAND, ICW1_INIT);
			self.ports.write_u8(MASTER_DATA, self.vector_base);
			self.ports.write_u8(MASTER_DATA, ICW3_MASTER);
			self.ports.write_u8(MASTER_DATA, ICW4_8086);

			self.ports.write_u8(SLAVE_COMMAND, ICW1_INIT);
			self.ports.write_u8(SLAVE_DATA, self.vector_base.wrapping_add(8));
			self.ports.write_u8(SLAVE_DATA, ICW3_SLAVE);
			self.ports.write_u8(SLAVE_DATA, ICW4_8086);

			// initialization clobbers the mask registers
			self.ports.write_u8(MASTER_DATA, *mask as u8);
			self.ports.write_u8(SLAVE_DATA, (*mask >> 8) as u8);
		}

		table.bind_controller_range(0..I8259_LINES, self)?;
		table.setup_irq(
			CASCADE_LINE,
			Action::boxed(cascade_interrupt, ActionFlags::STATIC, "cascade", DeviceToken::NONE),
		)?;

		info!(
			"8259 pair initialized: lines 0-{} at vectors {:#x}-{:#x}",
			I8259_LINES - 1,
			self.vector_base,
			self.vector_base.wrapping_add(I8259_LINES as u8 - 1)
		);
		Ok(())
	}

	/// Writes the byte of `mask` that belongs to the chip serving `pin`.
	fn write_mask(&self, pin: usize, mask: u16) {
		if pin >= 8 {
			self.ports.write_u8(SLAVE_DATA, (mask >> 8) as u8);
		} else {
			self.ports.write_u8(MASTER_DATA, mask as u8);
		}
	}

	fn update_mask(&self, line: Line, masked: bool) {
		let Some(pin) = pin(line) else { return };
		let mut mask = self.cached_mask.lock();
		if masked {
			*mask |= 1 << pin;
		} else {
			*mask &= !(1 << pin);
		}
		self.write_mask(pin, *mask);
	}
}

impl<P: PortIo> InterruptController for I8259<P> {
	fn name(&self) -> &'static str {
		"XT-PIC"
	}

	/// The 8259 has no way to report a latched request without delivering it.
	fn startup(&self, line: Line) -> bool {
		self.enable(line);
		false
	}

	fn shutdown(&self, line: Line) {
		self.disable(line);
	}

	fn enable(&self, line: Line) {
		self.update_mask(line, false);
	}

	fn disable(&self, line: Line) {
		self.update_mask(line, true);
	}

	fn ack(&self, line: Line) {
		let Some(pin) = pin(line) else { return };

		// mask and EOI under one lock hold so nobody can unmask the line between the two
		let mut mask = self.cached_mask.lock();
		*mask |= 1 << pin;
		self.write_mask(pin, *mask);

		if pin >= 8 {
			self.ports.write_u8(SLAVE_COMMAND, SPECIFIC_EOI | (pin - 8) as u8);
			// without this the master keeps the cascade input in service and lines 8-15 go quiet for good
			self.ports.write_u8(MASTER_COMMAND, SPECIFIC_EOI | CASCADE_LINE as u8);
		} else {
			self.ports.write_u8(MASTER_COMMAND, SPECIFIC_EOI | pin as u8);
		}
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
		controller::same_controller,
		irq::IrqStatus,
		testing::{counting_handler, hits, new_token},
	};

	#[derive(Default)]
	struct RecordingPorts {
		writes: Mutex<Vec<(u16, u8)>>,
	}

	impl RecordingPorts {
		fn take(&self) -> Vec<(u16, u8)> {
			core::mem::take(&mut *self.writes.lock().unwrap())
		}
	}

	impl PortIo for RecordingPorts {
		fn read_u8(&self, _port: u16) -> u8 {
			0
		}

		fn write_u8(&self, port: u16, value: u8) {
			self.writes.lock().unwrap().push((port, value));
		}
	}

	fn booted() -> (&'static I8259<RecordingPorts>, &'static IrqTable) {
		let pic: &'static I8259<RecordingPorts> = Box::leak(Box::new(I8259::new(RecordingPorts::default(), 0x20)));
		let table: &'static IrqTable = Box::leak(Box::new(IrqTable::new()));
		pic.init(table).unwrap();
		pic.ports.take();
		(pic, table)
	}

	fn line(index: usize) -> Line {
		Line::new(index).unwrap()
	}

	#[test]
	fn init_masks_everything_then_programs_both_chips() {
		let pic: &'static I8259<RecordingPorts> = Box::leak(Box::new(I8259::new(RecordingPorts::default(), 0x20)));
		let table: &'static IrqTable = Box::leak(Box::new(IrqTable::new()));
		pic.init(table).unwrap();

		let writes = pic.ports.take();
		assert_eq!(
			&writes[..12],
			&[
				(MASTER_DATA, 0xff),
				(SLAVE_DATA, 0xff),
				(MASTER_COMMAND, 0x11),
				(MASTER_DATA, 0x20),
				(MASTER_DATA, 0x04),
				(MASTER_DATA, 0x01),
				(SLAVE_COMMAND, 0x11),
				(SLAVE_DATA, 0x28),
				(SLAVE_DATA, 0x02),
				(SLAVE_DATA, 0x01),
				(MASTER_DATA, 0xff),
				(SLAVE_DATA, 0xff),
			]
		);
		// installing the cascade action starts line 2 up
		assert_eq!(&writes[12..], &[(MASTER_DATA, 0xfb)]);
		assert_eq!(pic.cached_mask(), 0xfffb);

		for index in 0..I8259_LINES {
			assert!(same_controller(table.controller(index).unwrap(), pic));
		}
		assert_eq!(table.controller(I8259_LINES).unwrap().name(), "none");
	}

	#[test]
	fn cascade_line_is_reserved() {
		let (_, table) = booted();
		assert_eq!(table.action_names(CASCADE_LINE).unwrap(), vec!["cascade"]);

		let token = new_token();
		assert_eq!(
			table.request_irq(CASCADE_LINE, counting_handler, ActionFlags::empty(), "late", token),
			Err(IrqError::Busy)
		);
		assert_eq!(
			table.request_irq(CASCADE_LINE, counting_handler, ActionFlags::SHARED, "late", token),
			Err(IrqError::Busy)
		);
		assert_eq!(table.free_irq(CASCADE_LINE, DeviceToken::NONE), Err(IrqError::NotFound));
	}

	#[test]
	fn enable_and_disable_write_whole_bytes() {
		let (pic, _) = booted();

		pic.enable(line(1));
		pic.enable(line(12));
		assert_eq!(pic.ports.take(), vec![(MASTER_DATA, 0xf9), (SLAVE_DATA, 0xef)]);

		pic.disable(line(1));
		pic.disable(line(12));
		assert_eq!(pic.ports.take(), vec![(MASTER_DATA, 0xfb), (SLAVE_DATA, 0xff)]);
		assert_eq!(pic.cached_mask(), 0xfffb);
	}

	#[test]
	fn master_ack_masks_then_sends_specific_eoi() {
		let (pic, _) = booted();
		pic.enable(line(3));
		pic.ports.take();

		pic.ack(line(3));
		assert_eq!(pic.ports.take(), vec![(MASTER_DATA, 0xfb), (MASTER_COMMAND, 0x63)]);
	}

	#[test]
	fn slave_ack_also_acknowledges_the_cascade() {
		let (pic, _) = booted();
		pic.enable(line(9));
		pic.ports.take();

		pic.ack(line(9));
		assert_eq!(
			pic.ports.take(),
			vec![(SLAVE_DATA, 0xff), (SLAVE_COMMAND, 0x61), (MASTER_COMMAND, 0x62)]
		);
		assert_ne!(pic.cached_mask() & (1 << 9), 0);

		pic.end(line(9));
		assert_eq!(pic.ports.take(), vec![(SLAVE_DATA, 0xfd)]);
	}

	#[test]
	fn lines_outside_the_pair_are_ignored() {
		let (pic, _) = booted();
		pic.enable(line(16));
		pic.ack(line(40));
		assert!(pic.ports.take().is_empty());
	}

	#[test]
	fn full_dispatch_cycle_on_a_slave_line() {
		let (pic, table) = booted();
		let token = new_token();
		table.request_irq(11, counting_handler, ActionFlags::empty(), "nic", token).unwrap();
		assert_eq!(pic.ports.take(), vec![(SLAVE_DATA, 0xf7)]);

		table.handle_irq(0, 11);
		assert_eq!(hits(token), 1);
		assert_eq!(
			pic.ports.take(),
			vec![
				(SLAVE_DATA, 0xff),
				(SLAVE_COMMAND, 0x63),
				(MASTER_COMMAND, 0x62),
				(SLAVE_DATA, 0xf7),
			]
		);
		assert!(table.status(11).unwrap().is_empty());
	}

	#[test]
	fn disabled_line_stays_masked_after_dispatch() {
		let (pic, table) = booted();
		let token = new_token();
		table.request_irq(5, counting_handler, ActionFlags::empty(), "sound", token).unwrap();
		table.disable_irq(5).unwrap();
		pic.ports.take();

		table.handle_irq(0, 5);
		assert_eq!(hits(token), 0);
		assert_eq!(pic.ports.take(), vec![(MASTER_DATA, 0xfb), (MASTER_COMMAND, 0x65)]);
		assert!(table.status(5).unwrap().contains(IrqStatus::PENDING));

		// unmasking replays the assertion that was held back
		table.enable_irq(5).unwrap();
		assert_eq!(hits(token), 1);
		assert_eq!(pic.cached_mask() & (1 << 5), 0);
	}
}
