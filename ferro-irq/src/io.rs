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

//! Register access for interrupt controllers.
//!
//! Controllers never poke hardware directly; they go through one of these seams. On real hardware the seam
//! is a thin wrapper around port instructions or volatile memory accesses, and the unit tests substitute
//! recording fakes.

use core::ptr::{read_volatile, write_volatile};

/// Byte-wide access to the x86 I/O port space.
pub trait PortIo: Sync {
	fn read_u8(&self, port: u16) -> u8;
	fn write_u8(&self, port: u16, value: u8);
}

/// Direct port I/O using `in`/`out`.
#[cfg(target_arch = "x86_64")]
pub struct X86Ports {
	_private: (),
}

#[cfg(target_arch = "x86_64")]
impl X86Ports {
	/// # Safety
	///
	/// The caller must be running at a privilege level that allows port I/O, and must make sure that the
	/// ports it hands to a controller are not touched by anyone else.
	pub const unsafe fn new() -> Self {
		Self { _private: () }
	}
}

#[cfg(target_arch = "x86_64")]
impl PortIo for X86Ports {
	fn read_u8(&self, port: u16) -> u8 {
		let value: u8;
		// SAFETY: X86Ports can only be constructed by code that promised port I/O is allowed.
		unsafe {
			core::arch::asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
		}
		value
	}

	fn write_u8(&self, port: u16, value: u8) {
		// SAFETY: same as read_u8
		unsafe {
			core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
		}
	}
}

/// 32-bit access to a block of memory-mapped registers, addressed by byte offset.
pub trait Mmio: Sync {
	fn read_u32(&self, offset: usize) -> u32;
	fn write_u32(&self, offset: usize, value: u32);
}

/// A memory-mapped register block at a fixed virtual address.
pub struct MmioRegion {
	base: usize,
}

impl MmioRegion {
	/// # Safety
	///
	/// `base` must be the virtual address of a mapped, uncached register block that is large enough for
	/// every offset the owning controller uses, and nothing else may access it.
	pub const unsafe fn new(base: usize) -> Self {
		Self { base }
	}
}

impl Mmio for MmioRegion {
	fn read_u32(&self, offset: usize) -> u32 {
		// SAFETY: MmioRegion::new's contract guarantees the address is a valid register.
		unsafe { read_volatile((self.base + offset) as *const u32) }
	}

	fn write_u32(&self, offset: usize, value: u32) {
		// SAFETY: same as read_u32
		unsafe { write_volatile((self.base + offset) as *mut u32, value) }
	}
}
