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

//! Interrupt management for the ferro kernel.
//!
//! The crate sits between interrupt-controller hardware and device drivers:
//!
//!   * [`controller`] defines what a controller driver must provide, plus drivers for an 8259 pair, a
//!     priority-level mask register and an OpenPIC;
//!   * [`irq`] keeps a descriptor per line, lets drivers register and remove handlers and mask lines, and
//!     delivers each assertion to the right handlers;
//!   * [`sync`] and [`interrupts`] are the interrupt-safe spin lock and local interrupt control everything
//!     else is built on.

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod controller;
pub mod interrupts;
pub mod io;
pub mod irq;
pub mod sync;

#[cfg(test)]
mod testing;

/// How many interrupt lines the descriptor table has.
pub const NR_IRQS: usize = 256;

/// How many processors the per-processor bookkeeping has room for.
pub const MAX_CPUS: usize = 64;

static_assertions::const_assert!(NR_IRQS > controller::i8259::I8259_LINES);

pub use irq::{
	disable_irq, disable_irq_nosync, enable_irq, free_irq, handle_irq, init_table, irq_table, probe_irq_on,
	request_irq, set_irq_affinity, setup_irq, synchronize_irq, IrqError,
};
