// Copyright 2014 Nick Fitzgerald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The root table: cons cells kept alive from outside the cons graph, each
//! with a count of how many independent holders root it.

use std::cmp;

use crate::arena::{Arena, GrowthBudget};
use crate::heap::{HeapError, HeapResult, Storage};
use crate::value::{Cons, ConsPtr, Owner};

/// One rooted cons and the number of holders rooting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootEntry {
    pub cons: ConsPtr,
    pub ref_count: usize,
}

#[derive(Debug, Default)]
pub struct RootTable {
    entries: Vec<RootEntry>,
}

impl RootTable {
    pub fn new() -> RootTable {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of entries the table can hold before it must grow.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn entries(&self) -> &[RootEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> &RootEntry {
        &self.entries[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut RootEntry {
        &mut self.entries[index]
    }

    /// Make sure `additional` more entries can be pushed without reallocating.
    /// A full table grows by at least `step` entries, and the budget is charged
    /// once however many entries are needed. On failure nothing is modified.
    pub fn reserve(&mut self,
                   budget: &mut GrowthBudget,
                   additional: usize,
                   step: usize) -> HeapResult<()> {
        if self.entries.capacity() - self.entries.len() >= additional {
            return Ok(());
        }
        budget.charge(Storage::RootTable)?;
        self.entries.try_reserve_exact(cmp::max(additional, step)).map_err(|_| {
            budget.refund();
            HeapError::OutOfMemory(Storage::RootTable)
        })
    }

    /// Append a new entry with a count of one. Room must already have been
    /// reserved with `reserve`.
    pub fn push(&mut self, cells: &mut Arena<Cons>, cons: ConsPtr) {
        debug_assert!(self.entries.len() < self.entries.capacity());
        let index = self.entries.len();
        self.entries.push(RootEntry {
            cons: cons,
            ref_count: 1,
        });
        cells[cons].owner = Owner::Root(index);
    }

    /// Remove the entry at the given index by swapping the last entry into its
    /// place, and return the removed entry.
    pub fn remove(&mut self, cells: &mut Arena<Cons>, index: usize) -> RootEntry {
        let removed = self.entries.swap_remove(index);
        if let Some(moved) = self.entries.get(index) {
            cells[moved.cons].owner = Owner::Root(index);
        }
        removed
    }
}

// TESTS -----------------------------------------------------------------------
