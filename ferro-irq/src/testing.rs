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

//! Fakes shared by the unit tests.

use std::{
	boxed::Box,
	cell::Cell,
	collections::{BTreeMap, BTreeSet},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
	thread_local,
	vec::Vec,
};

use crate::{
	controller::InterruptController,
	irq::{CpuMask, DeviceToken, IrqTable, Line},
};

/// Lines bound to the controller returned by [`booted_table`].
pub(crate) const TEST_LINES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
	Startup(usize),
	Shutdown(usize),
	Enable(usize),
	Disable(usize),
	Ack(usize),
	End(usize),
	Affinity(usize, u64),
}

impl Call {
	fn line(self) -> usize {
		match self {
			Self::Startup(line)
			| Self::Shutdown(line)
			| Self::Enable(line)
			| Self::Disable(line)
			| Self::Ack(line)
			| Self::End(line)
			| Self::Affinity(line, _) => line,
		}
	}
}

/// A controller that remembers what the core asked of it.
///
/// Lines count as masked until they are started up or enabled. [`latch`](Self::latch) makes the next
/// startup of a line report an interrupt that was already waiting.
pub(crate) struct RecordingController {
	name: &'static str,
	calls: Mutex<Vec<Call>>,
	unmasked: Mutex<BTreeSet<usize>>,
	latched: Mutex<BTreeSet<usize>>,
}

impl RecordingController {
	pub(crate) fn leak(name: &'static str) -> &'static Self {
		Box::leak(Box::new(Self {
			name,
			calls: Mutex::new(Vec::new()),
			unmasked: Mutex::new(BTreeSet::new()),
			latched: Mutex::new(BTreeSet::new()),
		}))
	}

	pub(crate) fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub(crate) fn calls_for(&self, line: usize) -> Vec<Call> {
		self.calls().into_iter().filter(|call| call.line() == line).collect()
	}

	pub(crate) fn clear(&self) {
		self.calls.lock().unwrap().clear();
	}

	pub(crate) fn is_masked(&self, line: usize) -> bool {
		!self.unmasked.lock().unwrap().contains(&line)
	}

	pub(crate) fn latch(&self, line: usize) {
		self.latched.lock().unwrap().insert(line);
	}

	fn record(&self, call: Call) {
		self.calls.lock().unwrap().push(call);
	}

	fn set_masked(&self, line: Line, masked: bool) {
		let mut unmasked = self.unmasked.lock().unwrap();
		if masked {
			unmasked.remove(&line.index());
		} else {
			unmasked.insert(line.index());
		}
	}
}

impl InterruptController for RecordingController {
	fn name(&self) -> &'static str {
		self.name
	}

	fn startup(&self, line: Line) -> bool {
		self.record(Call::Startup(line.index()));
		self.set_masked(line, false);
		self.latched.lock().unwrap().remove(&line.index())
	}

	fn shutdown(&self, line: Line) {
		self.record(Call::Shutdown(line.index()));
		self.set_masked(line, true);
	}

	fn enable(&self, line: Line) {
		self.record(Call::Enable(line.index()));
		self.set_masked(line, false);
	}

	fn disable(&self, line: Line) {
		self.record(Call::Disable(line.index()));
		self.set_masked(line, true);
	}

	fn ack(&self, line: Line) {
		self.record(Call::Ack(line.index()));
	}

	fn end(&self, line: Line) {
		self.record(Call::End(line.index()));
	}

	fn set_affinity(&self, line: Line, mask: CpuMask) {
		self.record(Call::Affinity(line.index(), mask.bits()));
	}
}

/// A private table with lines `0..TEST_LINES` bound to a fresh [`RecordingController`] named `test-pic`.
pub(crate) fn booted_table() -> (&'static IrqTable, &'static RecordingController) {
	let table: &'static IrqTable = Box::leak(Box::new(IrqTable::new()));
	let pic = RecordingController::leak("test-pic");
	table.bind_controller_range(0..TEST_LINES, pic).unwrap();
	(table, pic)
}

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);
static HITS: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());
static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());

/// A device token no other test uses, so hit counts don't leak between tests running in parallel.
pub(crate) fn new_token() -> DeviceToken {
	DeviceToken::new(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

/// Counts a hit for `dev`.
pub(crate) fn counting_handler(_line: Line, dev: DeviceToken) {
	*HITS.lock().unwrap().entry(dev.value()).or_default() += 1;
	ORDER.lock().unwrap().push(dev.value());
}

/// Counts a hit for `dev`, and the first time round asserts the line again on the current table.
pub(crate) fn reasserting_handler(line: Line, dev: DeviceToken) {
	counting_handler(line, dev);
	if hits(dev) == 1 {
		current_table()
			.expect("reasserting handler needs set_current_table()")
			.handle_irq(crate::interrupts::current_cpu(), line.index());
	}
}

pub(crate) fn hits(dev: DeviceToken) -> usize {
	HITS.lock().unwrap().get(&dev.value()).copied().unwrap_or(0)
}

/// The order in which the given tokens' handlers ran.
pub(crate) fn order_of(devs: &[DeviceToken]) -> Vec<usize> {
	ORDER
		.lock()
		.unwrap()
		.iter()
		.copied()
		.filter(|value| devs.iter().any(|dev| dev.value() == *value))
		.collect()
}

thread_local! {
	static CURRENT_TABLE: Cell<Option<&'static IrqTable>> = Cell::new(None);
}

/// Lets handlers on this thread find the table that is calling them.
pub(crate) fn set_current_table(table: &'static IrqTable) {
	CURRENT_TABLE.with(|current| current.set(Some(table)));
}

pub(crate) fn current_table() -> Option<&'static IrqTable> {
	CURRENT_TABLE.with(Cell::get)
}
