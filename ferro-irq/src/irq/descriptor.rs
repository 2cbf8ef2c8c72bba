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

//! Per-line state.
//!
//! # Locking
//!
//! The descriptor lock covers the status bits, the disable depth, the controller binding and the action
//! chain. The chain additionally follows one rule that lets the dispatcher walk it *without* the lock
//! (handlers must be able to run with the lock released):
//!
//!   * the chain is only modified while holding the lock **and** while `IN_PROGRESS` is clear;
//!   * the dispatcher only walks it unlocked while it owns `IN_PROGRESS`, which it sets under the lock.
//!
//! Code that wants to modify the chain therefore waits for the line to go idle (see
//! [`IrqDescriptor::lock_quiesced`]). That wait never finishes if it is started from one of the line's own
//! handlers, so handlers must not register or free handlers on their own line.

use core::{
	cell::UnsafeCell,
	hint::spin_loop,
	ops::{Deref, DerefMut},
	sync::atomic::{AtomicU64, Ordering},
};

use super::{action::ActionChain, Action, CpuMask, IrqStatus, Line};
use crate::{
	controller::{InterruptController, NO_CONTROLLER},
	sync::{Lock, SpinLock, SpinLockGuard},
	MAX_CPUS,
};

pub(crate) struct DescriptorState {
	pub(crate) status: IrqStatus,
	pub(crate) depth: u32,
	pub(crate) controller: &'static dyn InterruptController,
	pub(crate) affinity: CpuMask,
}

pub struct IrqDescriptor {
	line: Line,
	state: SpinLock<DescriptorState>,
	actions: UnsafeCell<ActionChain>,
	counts: [AtomicU64; MAX_CPUS],
}

// SAFETY: the action chain is only reached through DescriptorGuard or IrqDescriptor::actions_in_flight, which
//         together implement the locking rule described in the module documentation. Everything else is
//         either behind the spin lock or atomic.
unsafe impl Sync for IrqDescriptor {}
unsafe impl Send for IrqDescriptor {}

impl IrqDescriptor {
	pub(crate) fn new(line: Line) -> Self {
		Self {
			line,
			state: SpinLock::new(DescriptorState {
				status: IrqStatus::DISABLED,
				depth: 0,
				controller: &NO_CONTROLLER,
				affinity: CpuMask::all(),
			}),
			actions: UnsafeCell::new(ActionChain::new()),
			counts: core::array::from_fn(|_| AtomicU64::new(0)),
		}
	}

	pub fn line(&self) -> Line {
		self.line
	}

	pub fn status(&self) -> IrqStatus {
		self.lock().status
	}

	pub fn depth(&self) -> u32 {
		self.lock().depth
	}

	pub fn controller(&self) -> &'static dyn InterruptController {
		self.lock().controller
	}

	pub fn affinity(&self) -> CpuMask {
		self.lock().affinity
	}

	pub fn has_actions(&self) -> bool {
		!self.lock().actions().is_empty()
	}

	/// Calls `f` for every action on the line, in registration order, with the descriptor locked.
	pub fn for_each_action(&self, mut f: impl FnMut(&Action)) {
		let guard = self.lock();
		for action in guard.actions().iter() {
			f(action);
		}
	}

	/// How many times the line has fired on `cpu`.
	pub fn count_on(&self, cpu: usize) -> u64 {
		self.counts.get(cpu).map_or(0, |count| count.load(Ordering::Relaxed))
	}

	/// How many times the line has fired, summed over all processors.
	pub fn count(&self) -> u64 {
		self.counts.iter().map(|count| count.load(Ordering::Relaxed)).sum()
	}

	pub(crate) fn record_assertion(&self, cpu: usize) {
		self.counts[cpu].fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn lock(&self) -> DescriptorGuard<'_> {
		DescriptorGuard {
			descriptor: self,
			state: self.state.lock(),
		}
	}

	/// Locks the descriptor once no processor is running the line's handlers.
	///
	/// The lock is dropped between attempts so that the dispatcher can get in to finish up.
	pub(crate) fn lock_quiesced(&self) -> DescriptorGuard<'_> {
		loop {
			let guard = self.lock();
			if !guard.status.contains(IrqStatus::IN_PROGRESS) {
				return guard;
			}
			drop(guard);

			while self.state.is_locked() {
				spin_loop();
			}
			spin_loop();
		}
	}

	/// Spins until no processor is running the line's handlers.
	pub(crate) fn wait_idle(&self) {
		drop(self.lock_quiesced());
	}

	/// The chain, as seen by the processor that owns `IN_PROGRESS`.
	///
	/// # Safety
	///
	/// The caller must have set `IN_PROGRESS` itself (under the lock) and must not clear it while the returned
	/// reference is alive.
	pub(crate) unsafe fn actions_in_flight(&self) -> &ActionChain {
		&*self.actions.get()
	}
}

/// The descriptor lock, together with access to the action chain it protects.
pub(crate) struct DescriptorGuard<'a> {
	descriptor: &'a IrqDescriptor,
	state: SpinLockGuard<'a, DescriptorState>,
}

impl<'a> DescriptorGuard<'a> {
	pub(crate) fn actions(&self) -> &ActionChain {
		// SAFETY: we hold the lock, so nobody can be modifying the chain; an unlocked dispatcher may be walking
		//         it concurrently, but that's a read as well.
		unsafe { &*self.descriptor.actions.get() }
	}

	/// # Panics
	///
	/// If the line is in progress; use [`IrqDescriptor::lock_quiesced`] to get a guard that can modify the chain.
	pub(crate) fn actions_mut(&mut self) -> &mut ActionChain {
		assert!(
			!self.state.status.contains(IrqStatus::IN_PROGRESS),
			"action chain of line {} modified while its handlers are running",
			self.descriptor.line
		);
		// SAFETY: we hold the lock and IN_PROGRESS is clear, so no dispatcher is walking the chain and none can
		//         start until we unlock. `&mut self` rules out other references handed out by this guard.
		unsafe { &mut *self.descriptor.actions.get() }
	}

	/// Re-arms the line at its controller unless something still wants it masked or in service.
	pub(crate) fn end_if_unmasked(&self) {
		if !self.state.status.intersects(IrqStatus::DISABLED | IrqStatus::IN_PROGRESS) {
			self.state.controller.end(self.descriptor.line);
		}
	}
}

impl<'a> Deref for DescriptorGuard<'a> {
	type Target = DescriptorState;

	fn deref(&self) -> &Self::Target {
		&self.state
	}
}

impl<'a> DerefMut for DescriptorGuard<'a> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.state
	}
}
