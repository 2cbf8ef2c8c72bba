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

//! The generic interrupt core.
//!
//! Every line has an [`IrqDescriptor`] in the [`IrqTable`], holding its status, its disable depth, the
//! [`InterruptController`](crate::controller::InterruptController) that serves it and the chain of
//! [`Action`]s registered on it. Drivers go through the registration functions below; the architecture's
//! trap code calls [`handle_irq`] once per assertion.
//!
//! The free functions operate on the kernel's table (see [`init_table`]). The same operations exist as
//! methods on [`IrqTable`].

mod action;
mod cpu;
mod descriptor;
mod dispatch;
mod error;
mod line;
mod manage;
mod probe;
mod show;
mod status;
mod table;

use alloc::boxed::Box;
use core::time::Duration;

pub use action::{Action, ActionFlags, DeviceToken, HandlerFn};
pub use cpu::CpuMask;
pub use descriptor::IrqDescriptor;
pub use error::IrqError;
pub use line::Line;
pub use probe::{Probe, ProbeResult};
pub use status::IrqStatus;
pub use table::{init_table, irq_table, EntropySink, IrqTable};

use crate::controller::InterruptController;

pub fn request_irq(
	line: usize,
	handler: HandlerFn,
	flags: ActionFlags,
	name: &'static str,
	dev: DeviceToken,
) -> Result<(), IrqError> {
	irq_table().request_irq(line, handler, flags, name, dev)
}

pub fn setup_irq(line: usize, action: Box<Action>) -> Result<(), IrqError> {
	irq_table().setup_irq(line, action)
}

pub fn free_irq(line: usize, dev: DeviceToken) -> Result<(), IrqError> {
	irq_table().free_irq(line, dev)
}

pub fn disable_irq_nosync(line: usize) -> Result<(), IrqError> {
	irq_table().disable_irq_nosync(line)
}

pub fn disable_irq(line: usize) -> Result<(), IrqError> {
	irq_table().disable_irq(line)
}

pub fn enable_irq(line: usize) -> Result<(), IrqError> {
	irq_table().enable_irq(line)
}

pub fn synchronize_irq(line: usize) -> Result<(), IrqError> {
	irq_table().synchronize_irq(line)
}

pub fn set_irq_affinity(line: usize, mask: CpuMask) -> Result<(), IrqError> {
	irq_table().set_irq_affinity(line, mask)
}

pub fn bind_controller(line: usize, controller: &'static dyn InterruptController) -> Result<(), IrqError> {
	irq_table().bind_controller(line, controller)
}

/// Entry point for the architecture's trap code; see [`IrqTable::handle_irq`].
pub fn handle_irq(cpu: usize, line: usize) {
	irq_table().handle_irq(cpu, line)
}

pub fn probe_irq_on(wait: impl FnMut(Duration)) -> Result<Probe<'static>, IrqError> {
	irq_table().probe_irq_on(wait)
}
