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

//! The cons partition allocator.
//!
//! Every cons cell that is not a root is referenced from exactly one slot of
//! the partition table, and every unused cons cell is too. The table is cut
//! into five consecutive zones by four boundary indices:
//!
//! ```text
//! 0          black_top    grey_begin    grey_top     white_top       len
//! | black    | gap        | grey        | white      | free          |
//! ```
//!
//! A cons's color is *implied by the index of its slot*, never stored in the
//! cons itself. Moving a cons from one color to a neighbouring color is
//! therefore O(1): swap it with the element sitting at the shared boundary and
//! move the boundary by one. The gap and free zones hold unused cells; the gap
//! is a reserve the black zone grows into, the free zone is where new white
//! conses come from.
//!
//! Each cons records its own slot index (`Owner::Partition(index)`), and every
//! swap keeps that back pointer up to date, so a cons can always be found in
//! the table without a search.

use std::fmt;
use std::ops::Range;

use log::trace;

use crate::arena::{Arena, GrowthBudget};
use crate::heap::{HeapError, HeapResult, Storage};
use crate::value::{Cons, ConsPtr, Owner};

/// The zone a partition slot falls in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    Black,
    Gap,
    Grey,
    White,
    Free,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Zone::Black => "black",
            Zone::Gap   => "gap",
            Zone::Grey  => "grey",
            Zone::White => "white",
            Zone::Free  => "free",
        })
    }
}

/// The partition table and its zone boundaries.
#[derive(Debug, Default)]
pub struct Partition {
    slots: Vec<ConsPtr>,
    black_top: usize,
    grey_begin: usize,
    grey_top: usize,
    white_top: usize,
}

/// ## `Partition` Accessors
impl Partition {
    pub fn new() -> Partition {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The pointer stored in the given slot.
    pub fn get(&self, index: usize) -> ConsPtr {
        self.slots[index]
    }

    /// The four zone boundaries, in table order.
    pub fn boundaries(&self) -> [usize; 4] {
        [self.black_top, self.grey_begin, self.grey_top, self.white_top]
    }

    /// The range of slot indices making up the given zone.
    pub fn range(&self, zone: Zone) -> Range<usize> {
        match zone {
            Zone::Black => 0..self.black_top,
            Zone::Gap   => self.black_top..self.grey_begin,
            Zone::Grey  => self.grey_begin..self.grey_top,
            Zone::White => self.grey_top..self.white_top,
            Zone::Free  => self.white_top..self.slots.len(),
        }
    }

    pub fn count(&self, zone: Zone) -> usize {
        self.range(zone).len()
    }

    /// The zone the given slot index falls in.
    pub fn zone_of(&self, index: usize) -> Zone {
        debug_assert!(index < self.slots.len());
        if index < self.black_top {
            Zone::Black
        } else if index < self.grey_begin {
            Zone::Gap
        } else if index < self.grey_top {
            Zone::Grey
        } else if index < self.white_top {
            Zone::White
        } else {
            Zone::Free
        }
    }

    /// The zone the given cons currently sits in, or `None` if the partition
    /// does not own it.
    pub fn zone_of_cons(&self, cells: &Arena<Cons>, cons: ConsPtr) -> Option<Zone> {
        match cells[cons].owner {
            Owner::Partition(index) => Some(self.zone_of(index)),
            Owner::Root(_)          => None,
        }
    }
}

/// ## `Partition` Growth
impl Partition {
    /// Make room in the table for `additional` more slots, charging the budget
    /// only when the table actually has to reallocate. On failure nothing is
    /// modified.
    pub fn reserve(&mut self,
                   budget: &mut GrowthBudget,
                   additional: usize) -> HeapResult<()> {
        if self.slots.capacity() - self.slots.len() >= additional {
            return Ok(());
        }
        budget.charge(Storage::PartitionTable)?;
        self.slots.try_reserve_exact(additional).map_err(|_| {
            budget.refund();
            HeapError::OutOfMemory(Storage::PartitionTable)
        })
    }

    /// The number of slots the table can hold before it must grow.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Drop any spare capacity, so that the next insertion has to grow the
    /// table.
    #[cfg(test)]
    pub(crate) fn shrink_to_fit(&mut self) {
        self.slots.shrink_to_fit();
    }

    /// Append freshly allocated, unused cells to the free zone. Room must
    /// already have been reserved for them.
    pub fn add_free(&mut self, cells: &mut Arena<Cons>, fresh: Range<usize>) {
        debug_assert!(self.slots.capacity() - self.slots.len() >= fresh.len());
        for index in fresh {
            let cons = ConsPtr::new(index);
            let slot = self.slots.len();
            self.slots.push(cons);
            cells[cons].owner = Owner::Partition(slot);
        }
    }
}

/// ## `Partition` Zone Transitions
impl Partition {
    /// Swap the contents of two slots, keeping both conses' back pointers in
    /// sync.
    fn swap(&mut self, cells: &mut Arena<Cons>, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.slots.swap(a, b);
        cells[self.slots[a]].owner = Owner::Partition(a);
        cells[self.slots[b]].owner = Owner::Partition(b);
    }

    /// Turn the first free cell into the newest white cons and return it, or
    /// `None` when the free zone is empty and the heap must grow first.
    pub fn allocate_white(&mut self) -> Option<ConsPtr> {
        if self.white_top == self.slots.len() {
            return None;
        }
        let cons = self.slots[self.white_top];
        self.white_top += 1;
        Some(cons)
    }

    /// The write barrier. If the given cons is white, move it to the end of
    /// the grey zone and return true. Roots, black and grey conses are left
    /// alone.
    pub fn ensure_not_white(&mut self, cells: &mut Arena<Cons>, cons: ConsPtr) -> bool {
        let index = match cells[cons].owner {
            Owner::Partition(index) => index,
            Owner::Root(_)          => return false,
        };
        if self.zone_of(index) != Zone::White {
            return false;
        }

        let first_white = self.grey_top;
        self.swap(cells, index, first_white);
        self.grey_top += 1;
        trace!("write barrier: cons {} white -> grey", cons.index());
        true
    }

    /// Take the cons in the given slot out of the table entirely (it is about
    /// to be handed to the root table), shrinking whichever zone held it.
    ///
    /// The cons is walked toward the end of the table one boundary at a time
    /// and popped off. Leaving the black zone it lands in the gap; from there,
    /// if there are free cells, the last one takes its place and the gap keeps
    /// its size, otherwise the grey and white zones each slide down by one.
    pub fn detach(&mut self, cells: &mut Arena<Cons>, index: usize) {
        let mut index = index;
        match self.zone_of(index) {
            Zone::Black => {
                let last_black = self.black_top - 1;
                self.swap(cells, index, last_black);
                self.black_top -= 1;
                index = self.black_top;
                self.detach_from_gap(cells, index);
                return;
            },
            Zone::Gap   => {
                self.detach_from_gap(cells, index);
                return;
            },
            Zone::Grey  => {
                let last_grey = self.grey_top - 1;
                self.swap(cells, index, last_grey);
                self.grey_top -= 1;
                index = self.grey_top;
            },
            Zone::White | Zone::Free => { },
        }

        self.detach_from_white(cells, index);
    }

    fn detach_from_gap(&mut self, cells: &mut Arena<Cons>, index: usize) {
        if self.count(Zone::Free) > 0 {
            let last = self.slots.len() - 1;
            self.swap(cells, index, last);
            self.slots.pop();
            return;
        }

        // No free cell to refill the gap with, so shrink the gap from its end
        // and slide the grey zone down over the hole.
        let last_gap = self.grey_begin - 1;
        self.swap(cells, index, last_gap);
        let last_grey = self.grey_top - 1;
        self.swap(cells, last_gap, last_grey);
        self.grey_begin -= 1;
        self.grey_top -= 1;
        let hole = self.grey_top;
        self.detach_from_white(cells, hole);
    }

    fn detach_from_white(&mut self, cells: &mut Arena<Cons>, index: usize) {
        let mut index = index;
        if index < self.white_top {
            let last_white = self.white_top - 1;
            self.swap(cells, index, last_white);
            self.white_top -= 1;
            index = self.white_top;
        }

        let last = self.slots.len() - 1;
        self.swap(cells, index, last);
        self.slots.pop();
    }

    /// Put a cons that is not in the table (one leaving the root table) into
    /// the black zone. Room for one slot must already have been reserved.
    ///
    /// If the gap has a spare cell the cons simply replaces it. Otherwise the
    /// cons enters at the end of the table and is carried down through the
    /// white and grey zones, each of which slides up by one, manufacturing
    /// the one slot of gap the black zone grows into.
    pub fn insert_black(&mut self, cells: &mut Arena<Cons>, cons: ConsPtr) {
        debug_assert!(self.slots.capacity() > self.slots.len());
        let mut index = self.slots.len();
        self.slots.push(cons);
        cells[cons].owner = Owner::Partition(index);

        if self.count(Zone::Gap) == 0 {
            let first_free = self.white_top;
            self.swap(cells, index, first_free);
            self.white_top += 1;
            index = first_free;

            let first_white = self.grey_top;
            self.swap(cells, index, first_white);
            self.grey_top += 1;
            index = first_white;

            let first_grey = self.grey_begin;
            self.swap(cells, index, first_grey);
            self.grey_begin += 1;
            index = first_grey;
        }

        let first_gap = self.black_top;
        self.swap(cells, index, first_gap);
        self.black_top += 1;
    }
}

// TESTS -----------------------------------------------------------------------
