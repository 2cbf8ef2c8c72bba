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

use core::{
	fmt,
	sync::atomic::{AtomicUsize, Ordering},
};

use crate::MAX_CPUS;

static_assertions::const_assert!(MAX_CPUS > 0 && MAX_CPUS <= 64);

/// A set of processors, e.g. the ones a line may be delivered to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuMask(u64);

impl CpuMask {
	pub const fn empty() -> Self {
		Self(0)
	}

	/// Every processor we support.
	pub const fn all() -> Self {
		Self(u64::MAX >> (64 - MAX_CPUS))
	}

	/// Just `cpu`; empty if `cpu` doesn't fit in a mask at all.
	pub const fn single(cpu: usize) -> Self {
		if cpu < 64 {
			Self(1 << cpu)
		} else {
			Self(0)
		}
	}

	pub const fn from_bits(bits: u64) -> Self {
		Self(bits)
	}

	pub const fn bits(self) -> u64 {
		self.0
	}

	pub const fn is_empty(self) -> bool {
		self.0 == 0
	}

	pub const fn contains(self, cpu: usize) -> bool {
		cpu < 64 && (self.0 & (1 << cpu)) != 0
	}

	/// Whether every processor in the mask is one we support.
	pub const fn is_supported(self) -> bool {
		(self.0 & !Self::all().0) == 0
	}

	pub fn iter(self) -> impl Iterator<Item = usize> {
		(0..64).filter(move |&cpu| self.contains(cpu))
	}
}

impl fmt::Debug for CpuMask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CpuMask({:#x})", self.0)
	}
}

/// Per-processor interrupt bookkeeping.
///
/// Each processor only ever changes its own counter, and does so with single atomic operations, so
/// there is no shared lock for every interrupt entry to contend on.
pub(crate) struct CpuStat {
	nesting: AtomicUsize,
}

impl CpuStat {
	pub(crate) const fn new() -> Self {
		Self {
			nesting: AtomicUsize::new(0),
		}
	}

	pub(crate) fn enter(&self) {
		self.nesting.fetch_add(1, Ordering::AcqRel);
	}

	pub(crate) fn exit(&self) {
		let previous = self.nesting.fetch_sub(1, Ordering::AcqRel);
		assert!(previous > 0, "interrupt exit without a matching entry");
	}

	pub(crate) fn nesting(&self) -> usize {
		self.nesting.load(Ordering::Acquire)
	}
}
