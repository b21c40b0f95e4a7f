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

//! Paged storage for heap objects.
//!
//! An `Arena<T>` hands out storage in fixed-size pages. A page is allocated
//! whole, filled with `T::default()`, and never moves or shrinks once it has
//! been pushed onto the arena's page list, so an `ArenaPtr<T>` (a plain index)
//! stays valid for the lifetime of the arena. All pages are released together
//! when the arena is dropped.
//!
//! Every growth of the heap's storage is charged against a `GrowthBudget`
//! first, which lets an embedder cap memory use and lets tests force the
//! allocation failure paths deterministically.

use std::cmp;
use std::fmt;
use std::hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut, Range};

use log::{debug, warn};

use crate::heap::{HeapError, HeapResult, Storage};

/// An arena from which to allocate `T` objects, one page at a time.
pub struct Arena<T> {
    pages: Vec<Box<[T]>>,
    page_len: usize,
}

impl<T: Default> Arena<T> {
    /// Create a new, empty `Arena` whose pages hold `page_len` objects each.
    pub fn new(page_len: usize) -> Arena<T> {
        assert!(page_len > 0);
        Arena {
            pages: vec!(),
            page_len: page_len,
        }
    }

    /// Allocate one more page and return the range of indices it covers.
    /// Nothing is modified if the allocation fails.
    pub fn grow(&mut self) -> HeapResult<Range<usize>> {
        let mut page: Vec<T> = Vec::new();
        page.try_reserve_exact(self.page_len)
            .map_err(|_| HeapError::OutOfMemory(Storage::Pages))?;
        page.resize_with(self.page_len, Default::default);

        self.pages.try_reserve(1)
            .map_err(|_| HeapError::OutOfMemory(Storage::Pages))?;

        let start = self.capacity();
        self.pages.push(page.into_boxed_slice());
        debug!("arena grew to {} pages ({} objects)",
               self.pages.len(), self.capacity());
        Ok(start..self.capacity())
    }
}

impl<T> Arena<T> {
    /// The number of objects held by each page.
    pub fn page_len(&self) -> usize {
        self.page_len
    }

    /// The number of pages allocated so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The total number of objects this arena can hold without growing.
    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_len
    }

    /// Iterate over a pointer to every object in the arena, in index order.
    pub fn ptrs(&self) -> impl Iterator<Item = ArenaPtr<T>> {
        (0..self.capacity()).map(ArenaPtr::new)
    }
}

impl<T> Index<ArenaPtr<T>> for Arena<T> {
    type Output = T;

    fn index(&self, ptr: ArenaPtr<T>) -> &T {
        &self.pages[ptr.index / self.page_len][ptr.index % self.page_len]
    }
}

impl<T> IndexMut<ArenaPtr<T>> for Arena<T> {
    fn index_mut(&mut self, ptr: ArenaPtr<T>) -> &mut T {
        &mut self.pages[ptr.index / self.page_len][ptr.index % self.page_len]
    }
}

/// A pointer to a `T` instance in an arena.
pub struct ArenaPtr<T> {
    index: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> ArenaPtr<T> {
    /// Create a new `ArenaPtr` to the object at the given index. **Not**
    /// publicly exposed; pointers only come out of the heap.
    pub(crate) fn new(index: usize) -> ArenaPtr<T> {
        ArenaPtr {
            index: index,
            marker: PhantomData,
        }
    }

    /// The index of the referent within its arena.
    pub fn index(&self) -> usize {
        self.index
    }
}

// XXX: We have to implement these by hand because `#[derive(..)]` would
// require `T` to implement them as well, despite the fact that we only ever
// copy and compare the index, never a `T`.
impl<T> Clone for ArenaPtr<T> {
    fn clone(&self) -> ArenaPtr<T> {
        *self
    }
}

impl<T> Copy for ArenaPtr<T> { }

impl<T> cmp::PartialEq for ArenaPtr<T> {
    /// Note that `PartialEq` implements pointer object identity, not structural
    /// comparison.
    fn eq(&self, other: &ArenaPtr<T>) -> bool {
        self.index == other.index
    }
}

impl<T> cmp::Eq for ArenaPtr<T> { }

impl<T> hash::Hash for ArenaPtr<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for ArenaPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ArenaPtr({})", self.index)
    }
}

/// A cap on how many more times the heap may grow its storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrowthBudget {
    remaining: Option<usize>,
}

impl GrowthBudget {
    /// Create a budget allowing `limit` more growths, or any number of them
    /// when `limit` is `None`.
    pub fn new(limit: Option<usize>) -> GrowthBudget {
        GrowthBudget { remaining: limit }
    }

    /// The number of growths still allowed, if limited.
    pub fn remaining(&self) -> Option<usize> {
        self.remaining
    }

    /// Spend one growth of the given storage, or fail if the budget is
    /// exhausted.
    pub fn charge(&mut self, storage: Storage) -> HeapResult<()> {
        match self.remaining {
            None                  => Ok(()),
            Some(0)               => {
                warn!("refusing to grow the {}: growth budget exhausted", storage);
                Err(HeapError::OutOfMemory(storage))
            },
            Some(ref mut n)       => {
                *n -= 1;
                Ok(())
            },
        }
    }

    /// Give back one growth charged for an allocation that did not happen.
    pub fn refund(&mut self) {
        if let Some(ref mut n) = self.remaining {
            *n += 1;
        }
    }
}

// TESTS -----------------------------------------------------------------------
