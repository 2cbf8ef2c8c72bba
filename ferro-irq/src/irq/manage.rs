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

//! Installing and removing handlers, and masking lines on behalf of drivers.

use alloc::boxed::Box;

use log::{debug, error};

use super::{Action, ActionFlags, CpuMask, DeviceToken, HandlerFn, IrqError, IrqStatus, IrqTable, Line};

impl IrqTable {
	/// Registers `handler` for `line`.
	///
	/// The first handler on a line starts it up at its controller (and unmasks it, unless a driver already
	/// disabled the line). Later handlers are appended to the chain, which requires every handler on the line,
	/// old and new, to have asked for [`SHARED`](ActionFlags::SHARED).
	pub fn request_irq(
		&self,
		line: usize,
		handler: HandlerFn,
		flags: ActionFlags,
		name: &'static str,
		dev: DeviceToken,
	) -> Result<(), IrqError> {
		Line::new(line)?;
		if flags.contains(ActionFlags::SHARED) && dev.is_none() {
			// there would be no way to pick this handler out again in free_irq
			return Err(IrqError::InvalidArgument);
		}
		self.setup_irq(line, Action::boxed(handler, flags, name, dev))
	}

	/// Installs a pre-built action.
	///
	/// This is what controller drivers use for their own permanent actions (e.g. the 8259 cascade), which are
	/// marked [`STATIC`](ActionFlags::STATIC) and may have no device token.
	pub fn setup_irq(&self, line: usize, action: Box<Action>) -> Result<(), IrqError> {
		let line = Line::new(line)?;
		let descriptor = self.descriptor(line);
		let name = action.name();

		let mut guard = descriptor.lock_quiesced();
		if !guard.actions().accepts(&action) {
			return Err(IrqError::Busy);
		}

		let first = guard.actions().is_empty();
		guard.actions_mut().push_back(action);

		let mut replay = false;
		if first {
			let controller = guard.controller;
			guard
				.status
				.remove(IrqStatus::AUTODETECT | IrqStatus::WAITING | IrqStatus::PENDING | IrqStatus::REPLAY);

			let latched = controller.startup(line);
			if guard.depth > 0 {
				// a driver disabled the line before anyone claimed it; that still counts
				controller.disable(line);
				guard.status.insert(IrqStatus::DISABLED | IrqStatus::MASKED);
			} else {
				guard.status.remove(IrqStatus::DISABLED | IrqStatus::MASKED);
			}

			if latched {
				guard.status.insert(IrqStatus::PENDING);
				if guard.depth == 0 {
					guard.status.insert(IrqStatus::REPLAY);
					replay = true;
				}
			}
		}
		drop(guard);

		debug!("installed {} on line {}{}", name, line, if first { "" } else { " (shared)" });

		if replay {
			self.replay(line);
		}
		Ok(())
	}

	/// Removes the handler that was registered on `line` with `dev`.
	///
	/// Waits for any processor currently running the line's handlers to finish first, so once this returns the
	/// handler is not running anywhere and won't be called again. It must therefore not be called from one of
	/// the line's own handlers.
	pub fn free_irq(&self, line: usize, dev: DeviceToken) -> Result<(), IrqError> {
		let line = Line::new(line)?;
		let descriptor = self.descriptor(line);

		let mut guard = descriptor.lock_quiesced();
		let action = guard.actions_mut().remove(dev).ok_or(IrqError::NotFound)?;

		if guard.actions().is_empty() {
			guard.status.insert(IrqStatus::DISABLED);
			guard.status.remove(IrqStatus::PENDING | IrqStatus::REPLAY);
			guard.controller.shutdown(line);
		}
		drop(guard);

		debug!("removed {} from line {}", action.name(), line);
		Ok(())
	}

	/// Masks `line` without waiting for handlers that are already running to finish.
	///
	/// Disables nest: the line stays masked until [`enable_irq`](Self::enable_irq) has been called once for
	/// every disable. Safe to call from interrupt context, including from the line's own handler.
	pub fn disable_irq_nosync(&self, line: usize) -> Result<(), IrqError> {
		let line = Line::new(line)?;
		let mut guard = self.descriptor(line).lock();

		if guard.depth == 0 {
			guard.status.insert(IrqStatus::DISABLED | IrqStatus::MASKED);
			guard.controller.disable(line);
		}
		let Some(depth) = guard.depth.checked_add(1) else {
			drop(guard);
			panic!("disable depth of line {} overflowed", line);
		};
		guard.depth = depth;
		Ok(())
	}

	/// Masks `line` and waits until no processor is running its handlers.
	///
	/// Calling this from one of the line's own handlers deadlocks; use
	/// [`disable_irq_nosync`](Self::disable_irq_nosync) there.
	pub fn disable_irq(&self, line: usize) -> Result<(), IrqError> {
		self.disable_irq_nosync(line)?;
		self.synchronize_irq(line)
	}

	/// Undoes one [`disable_irq`](Self::disable_irq).
	///
	/// When the last disable is undone, the line is unmasked and an assertion that arrived while it was masked
	/// is delivered right away.
	///
	/// # Panics
	///
	/// If the line isn't disabled; that means some driver lost track of its disables, and carrying on would
	/// leave the line masked or unmasked behind another driver's back.
	pub fn enable_irq(&self, line: usize) -> Result<(), IrqError> {
		let line = Line::new(line)?;
		let mut guard = self.descriptor(line).lock();

		let depth = guard.depth;
		match depth {
			0 => {
				drop(guard);
				error!("unbalanced enable for line {}", line);
				panic!("unbalanced enable_irq({})", line);
			},
			1 => {
				guard.depth = 0;
				guard.status.remove(IrqStatus::DISABLED | IrqStatus::MASKED);

				let status = guard.status;
				let replay = status.contains(IrqStatus::PENDING)
					&& !status.contains(IrqStatus::REPLAY)
					&& !guard.actions().is_empty();
				if replay {
					guard.status.insert(IrqStatus::REPLAY);
				}

				guard.controller.enable(line);
				drop(guard);

				if replay {
					self.replay(line);
				}
			},
			_ => guard.depth -= 1,
		}
		Ok(())
	}

	/// Waits until no processor is running the handlers of `line`.
	///
	/// Handlers that start after this returns are not waited for.
	pub fn synchronize_irq(&self, line: usize) -> Result<(), IrqError> {
		self.get(line)?.wait_idle();
		Ok(())
	}

	/// Restricts delivery of `line` to the processors in `mask`.
	pub fn set_irq_affinity(&self, line: usize, mask: CpuMask) -> Result<(), IrqError> {
		let line = Line::new(line)?;
		if mask.is_empty() || !mask.is_supported() {
			return Err(IrqError::InvalidAffinity);
		}

		let mut guard = self.descriptor(line).lock();
		guard.affinity = mask;
		guard.controller.set_affinity(line, mask);
		Ok(())
	}
}
