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

//! Control over the local processor's interrupt flag.
//!
//! This is the CPU-level switch underneath the line-level masking done by [`crate::irq`]: it decides
//! whether *any* interrupt can be taken on this processor right now.
//!
//! It also keeps track of which processor code is running on. Hardware processor IDs can be sparse, so
//! bring-up code gives every processor a dense logical index below [`MAX_CPUS`](crate::MAX_CPUS) with
//! [`set_current_cpu`], and [`current_cpu`] hands that index back. It is the same index the trap code
//! must pass to [`IrqTable::handle_irq`](crate::irq::IrqTable::handle_irq).
//!
//! # Safety
//!
//! Great care must be taken with interrupt code, as it can be executed at any time.
//!
//! For example: it's very important for interrupt handlers not to access data that isn't protected by a lock.
//! Such data may already be in-use by the code that was just interrupted; if so, accessing it in the interrupt
//! handler would violate Rust's aliasing rules.

mod common;

pub use common::InterruptState;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use x86_64 as arch;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod aarch64;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
use aarch64 as arch;

// builds that run on top of an OS (e.g. the unit tests) get a software model of the flag
#[cfg(not(target_os = "none"))]
mod hosted;
#[cfg(not(target_os = "none"))]
use hosted as arch;

#[cfg(all(target_os = "none", not(any(target_arch = "x86_64", target_arch = "aarch64"))))]
compile_error!("no local interrupt control for this architecture; spin locks would not mask anything");

pub use arch::*;
