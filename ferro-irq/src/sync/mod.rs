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

//! Locks that can be taken both from normal kernel code and from interrupt handlers.
//!
//! Every lock in the interrupt subsystem is a [`SpinLock`]: descriptor state, the cached mask of each
//! controller, the entropy sink slot. None of them ever sleep, and all of them mask local interrupts
//! for as long as they are held so that an interrupt arriving on the same processor can never spin on
//! a lock its own CPU already owns.

use core::{
	cell::UnsafeCell,
	hint::spin_loop,
	marker::PhantomData,
	ops::{Deref, DerefMut},
	sync::atomic::{AtomicBool, Ordering},
};

use crate::interrupts::{self, restore_interrupts, InterruptState};

/// A guard that keeps its lock held until it is dropped.
///
/// Guards must not be sent to other processors: releasing the lock restores the local interrupt state
/// that was saved when it was acquired.
#[allow(drop_bounds)]
pub trait LockGuard<'a, T: ?Sized + 'a>: Drop + Deref<Target = T> + DerefMut {}

pub trait Lock<T: ?Sized> {
	type Guard<'a>: LockGuard<'a, T>
	where
		Self: 'a,
		T: 'a;

	fn lock<'a, 'b>(&'a self) -> Self::Guard<'b>
	where
		'a: 'b;
	fn try_lock<'a, 'b>(&'a self) -> Option<Self::Guard<'b>>
	where
		'a: 'b;
}

/// An interrupt-safe spin lock.
pub struct SpinLock<T: ?Sized> {
	state: AtomicBool,
	data: UnsafeCell<T>,
}

pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
	lock: &'a SpinLock<T>,
	interrupt_state: InterruptState,

	// keeps the guard on the processor that saved `interrupt_state`
	_not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> Drop for SpinLockGuard<'a, T> {
	fn drop(&mut self) {
		self.lock.state.store(false, Ordering::Release);

		// SAFETY: we only restore whatever state was in place before we took the lock; if interrupts were
		//         enabled back then, the code that enabled them already accepted that handlers may run.
		unsafe { restore_interrupts(self.interrupt_state) };
	}
}

impl<'a, T: ?Sized> Deref for SpinLockGuard<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		// SAFETY: the guard only exists while the lock is held, so nobody else can touch the data.
		unsafe { &*self.lock.data.get() }
	}
}

impl<'a, T: ?Sized> DerefMut for SpinLockGuard<'a, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		// SAFETY: same as the Deref::deref implementation
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<'a, T: ?Sized> LockGuard<'a, T> for SpinLockGuard<'a, T> {}

// SAFETY: sharing a guard only hands out shared references to the protected data.
unsafe impl<'a, T: ?Sized + Sync> Sync for SpinLockGuard<'a, T> {}

impl<T> SpinLock<T> {
	pub const fn new(data: T) -> Self {
		Self {
			data: UnsafeCell::new(data),
			state: AtomicBool::new(false),
		}
	}
}

impl<T: ?Sized> SpinLock<T> {
	/// Whether some processor currently holds the lock. Only useful as a hint.
	pub fn is_locked(&self) -> bool {
		self.state.load(Ordering::Relaxed)
	}

	fn try_acquire(&self) -> bool {
		self.state
			.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_ok()
	}
}

impl<T: ?Sized> Lock<T> for SpinLock<T> {
	type Guard<'a> = SpinLockGuard<'a, T> where Self: 'a, T: 'a;

	fn lock<'a, 'b>(&'a self) -> Self::Guard<'b>
	where
		'a: 'b,
	{
		loop {
			let interrupt_state = interrupts::disable_and_save_interrupts();

			if self.try_acquire() {
				return SpinLockGuard {
					lock: self,
					interrupt_state,
					_not_send: PhantomData,
				};
			}

			// SAFETY: nothing was borrowed while interrupts were off, so letting pending interrupts in while
			//         we wait for the holder cannot violate any invariant.
			unsafe { restore_interrupts(interrupt_state) };

			while self.is_locked() {
				spin_loop();
			}
		}
	}

	fn try_lock<'a, 'b>(&'a self) -> Option<Self::Guard<'b>>
	where
		'a: 'b,
	{
		let interrupt_state = interrupts::disable_and_save_interrupts();
		if self.try_acquire() {
			Some(SpinLockGuard {
				lock: self,
				interrupt_state,
				_not_send: PhantomData,
			})
		} else {
			// SAFETY: see Lock::lock
			unsafe { restore_interrupts(interrupt_state) };
			None
		}
	}
}

// SAFETY: spin locks are locks, so sharing them between threads is safe.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T: Default> Default for SpinLock<T> {
	fn default() -> Self {
		Self::new(Default::default())
	}
}
