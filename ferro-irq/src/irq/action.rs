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

//! Handlers registered on a line, and the per-line chain that holds them.

use alloc::boxed::Box;
use core::fmt;

use bitflags::bitflags;
use intrusive_collections::{intrusive_adapter, LinkedList, LinkedListAtomicLink};

use super::Line;

bitflags! {
	pub struct ActionFlags: u32 {
		/// The handler is willing to share its line; every action on a line must say so.
		const SHARED = 1 << 0;
		/// Run the chain with local interrupts kept off (only looked at on the first action of a chain).
		const FAST = 1 << 1;
		/// Assertion timing on this line is fed to the entropy pool.
		const SAMPLE_RANDOM = 1 << 2;
		/// The action is part of the kernel image's setup and is never removed by `free_irq`.
		const STATIC = 1 << 3;
	}
}

/// Opaque value identifying the device behind an action.
///
/// It is handed back to the handler on every call and is how `free_irq` finds the action to remove on a
/// shared line. Drivers typically use the address of their device state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken(usize);

impl DeviceToken {
	pub const NONE: Self = Self(0);

	pub const fn new(value: usize) -> Self {
		Self(value)
	}

	pub const fn value(self) -> usize {
		self.0
	}

	pub const fn is_none(self) -> bool {
		self.0 == 0
	}
}

impl fmt::Debug for DeviceToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DeviceToken({:#x})", self.0)
	}
}

/// An interrupt handler. Runs in interrupt context: it must not block, and it must check its own
/// device to find out whether this assertion was meant for it.
pub type HandlerFn = fn(line: Line, dev: DeviceToken);

/// One (handler, device) registration on a line.
pub struct Action {
	link: LinkedListAtomicLink,
	handler: HandlerFn,
	flags: ActionFlags,
	name: &'static str,
	dev: DeviceToken,
}

intrusive_adapter!(pub(crate) ActionAdapter = Box<Action>: Action { link: LinkedListAtomicLink });

impl Action {
	pub fn new(handler: HandlerFn, flags: ActionFlags, name: &'static str, dev: DeviceToken) -> Self {
		Self {
			link: LinkedListAtomicLink::new(),
			handler,
			flags,
			name,
			dev,
		}
	}

	pub fn boxed(handler: HandlerFn, flags: ActionFlags, name: &'static str, dev: DeviceToken) -> Box<Self> {
		Box::new(Self::new(handler, flags, name, dev))
	}

	pub fn flags(&self) -> ActionFlags {
		self.flags
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn dev(&self) -> DeviceToken {
		self.dev
	}

	pub fn is_shared(&self) -> bool {
		self.flags.contains(ActionFlags::SHARED)
	}

	pub(crate) fn invoke(&self, line: Line) {
		(self.handler)(line, self.dev);
	}
}

impl fmt::Debug for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Action")
			.field("name", &self.name)
			.field("flags", &self.flags)
			.field("dev", &self.dev)
			.finish()
	}
}

/// The actions of one line, in registration order.
pub(crate) struct ActionChain {
	list: LinkedList<ActionAdapter>,
}

impl ActionChain {
	pub(crate) fn new() -> Self {
		Self {
			list: LinkedList::new(ActionAdapter::new()),
		}
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.list.is_empty()
	}

	pub(crate) fn first(&self) -> Option<&Action> {
		self.list.front().get()
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = &Action> {
		self.list.iter()
	}

	/// Whether `action` may join the chain as it is right now.
	pub(crate) fn accepts(&self, action: &Action) -> bool {
		self.is_empty() || (action.is_shared() && self.iter().all(Action::is_shared))
	}

	pub(crate) fn push_back(&mut self, action: Box<Action>) {
		self.list.push_back(action);
	}

	/// Unlinks the first removable action registered with `dev`.
	pub(crate) fn remove(&mut self, dev: DeviceToken) -> Option<Box<Action>> {
		let mut cursor = self.list.front_mut();
		while let Some(action) = cursor.get() {
			if action.dev == dev && !action.flags.contains(ActionFlags::STATIC) {
				return cursor.remove();
			}
			cursor.move_next();
		}
		None
	}
}
