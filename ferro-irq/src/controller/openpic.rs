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

//! OpenPIC (MPIC) style distributed interrupt controller.
//!
//! Each source has a vector/priority register carrying a mask bit and an "activity" bit, plus a
//! destination register naming the processors it may be delivered to. End-of-interrupt is signalled
//! through a per-processor register.

use core::hint::spin_loop;

use log::{info, warn};

use super::InterruptController;
use crate::{
	interrupts,
	io::Mmio,
	irq::{CpuMask, IrqError, IrqTable, Line},
	NR_IRQS,
};

const SOURCE_BASE: usize = 0x1_0000;
const SOURCE_STRIDE: usize = 0x20;
const SOURCE_VECTOR_PRIORITY: usize = 0x00;
const SOURCE_DESTINATION: usize = 0x10;

const CPU_BASE: usize = 0x2_0000;
const CPU_STRIDE: usize = 0x1000;
const CPU_EOI: usize = 0xb0;

const VPR_MASK: u32 = 1 << 31;
const VPR_ACTIVITY: u32 = 1 << 30;
const VPR_PRIORITY_SHIFT: u32 = 16;
const VPR_VECTOR: u32 = 0xff;

const DEFAULT_PRIORITY: u32 = 8;

/// Destination registers only have room for this many processors.
pub const OPENPIC_MAX_CPUS: usize = 32;

/// How many times we re-read a vector/priority register waiting for a mask change to land.
const MASK_SYNC_ATTEMPTS: usize = 1000;

pub struct OpenPic<M> {
	regs: M,
	first_line: usize,
	sources: usize,
	vector_base: u8,
}

impl<M: Mmio> OpenPic<M> {
	/// Source `n` is served as line `first_line + n` and delivered as vector `vector_base + n`.
	pub const fn new(regs: M, first_line: usize, sources: usize, vector_base: u8) -> Self {
		Self {
			regs,
			first_line,
			sources,
			vector_base,
		}
	}

	/// Masks every source, points them all at processor 0 and binds their lines to this controller.
	///
	/// Fails with [`IrqError::InvalidLine`], before touching any register, if the sources don't all fit in the
	/// table.
	pub fn init(&'static self, table: &IrqTable) -> Result<(), IrqError>
	where
		M: 'static,
	{
		let end = self
			.first_line
			.checked_add(self.sources)
			.filter(|&end| end <= NR_IRQS)
			.ok_or(IrqError::InvalidLine)?;

		for source in 0..self.sources {
			let vector = (self.vector_base as u32 + source as u32) & VPR_VECTOR;
			self.regs.write_u32(
				Self::source_register(source, SOURCE_VECTOR_PRIORITY),
				VPR_MASK | (DEFAULT_PRIORITY << VPR_PRIORITY_SHIFT) | vector,
			);
			self.regs.write_u32(Self::source_register(source, SOURCE_DESTINATION), 1);
		}
		table.bind_controller_range(self.first_line..end, self)?;
		info!("OpenPIC: {} sources on lines {}..{}", self.sources, self.first_line, end);
		Ok(())
	}

	fn source_register(source: usize, register: usize) -> usize {
		SOURCE_BASE + source * SOURCE_STRIDE + register
	}

	fn source(&self, line: Line) -> Option<usize> {
		let source = line.index().checked_sub(self.first_line)?;
		(source < self.sources).then_some(source)
	}

	fn set_masked(&self, source: usize, masked: bool) {
		let register = Self::source_register(source, SOURCE_VECTOR_PRIORITY);
		let current = self.regs.read_u32(register);
		let wanted = if masked { current | VPR_MASK } else { current & !VPR_MASK };
		self.regs.write_u32(register, wanted);

		// the write may be posted; make sure it reached the controller before we report the line as (un)masked
		for _ in 0..MASK_SYNC_ATTEMPTS {
			if (self.regs.read_u32(register) & VPR_MASK != 0) == masked {
				return;
			}
			spin_loop();
		}
		warn!("OpenPIC: source {} did not latch its mask change", source);
	}

	/// Signals end-of-interrupt through the register block of the processor we're on. Processor blocks are
	/// numbered by logical processor index.
	fn eoi(&self) {
		let cpu = interrupts::current_cpu();
		if cpu >= OPENPIC_MAX_CPUS {
			warn!("OpenPIC: processor {} has no EOI register", cpu);
			return;
		}
		self.regs.write_u32(CPU_BASE + cpu * CPU_STRIDE + CPU_EOI, 0);
	}
}

impl<M: Mmio> InterruptController for OpenPic<M> {
	fn name(&self) -> &'static str {
		"OpenPIC"
	}

	fn startup(&self, line: Line) -> bool {
		let Some(source) = self.source(line) else { return false };
		self.set_masked(source, false);
		self.regs.read_u32(Self::source_register(source, SOURCE_VECTOR_PRIORITY)) & VPR_ACTIVITY != 0
	}

	fn shutdown(&self, line: Line) {
		self.disable(line);
	}

	fn enable(&self, line: Line) {
		if let Some(source) = self.source(line) {
			self.set_masked(source, false);
		}
	}

	fn disable(&self, line: Line) {
		if let Some(source) = self.source(line) {
			self.set_masked(source, true);
		}
	}

	fn ack(&self, line: Line) {
		self.disable(line);
		self.eoi();
	}

	fn end(&self, line: Line) {
		self.enable(line);
	}

	fn set_affinity(&self, line: Line, mask: CpuMask) {
		let Some(source) = self.source(line) else { return };
		let destination = (mask.bits() & ((1u64 << OPENPIC_MAX_CPUS) - 1)) as u32;
		if destination == 0 {
			warn!("OpenPIC: affinity {:?} for line {} names no processor we can route to", mask, line);
			return;
		}
		self.regs.write_u32(Self::source_register(source, SOURCE_DESTINATION), destination);
	}
}
