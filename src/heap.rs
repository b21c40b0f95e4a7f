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

//! The `heap` module provides memory management for the runtime.
//!
//! ## Two Kinds of Heap Values
//!
//! Cells that are not atoms refer to one of two kinds of heap storage, and the
//! two are managed by different schemes.
//!
//! *Plain heap objects* (symbols, strings, exceptions, lambda forms, and any
//! user registered object type) are reference counted. Every `Cell::Object`
//! holds one counted reference. Copying a cell adds a reference; unsetting it
//! drops one; when the last reference is dropped the type's destructor runs
//! and the payload is freed. Plain objects never point at each other through
//! the heap, so counting is all they need.
//!
//! *Cons cells* form the pointer graph, and counting alone cannot manage a
//! graph with cycles. Conses are instead allocated from pages of cons storage
//! (see the `arena` module) and sorted by color into zones of the partition
//! table (see the `partition` module):
//!
//! * **white** conses are not known to be reachable. Every new cons starts
//!   white.
//! * **grey** conses are reachable, but may still point into white.
//! * **black** conses are reachable and never point into white.
//!
//! Colors are implied by the index range a cons sits in, so every change of
//! color is an O(1) swap at a zone boundary.
//!
//! ### Roots
//!
//! A cons that is referenced from outside the cons graph, for example by a
//! variable in the evaluator, is a *root*. Roots are taken out of the
//! partition table entirely and kept in a separate root table together with a
//! count of how many holders are rooting them: rooting an existing root bumps
//! its count instead of adding a second entry. When the count drops back to
//! zero the cons is moved into the black zone.
//!
//! ### The Write Barrier
//!
//! The whole scheme exists to keep one invariant:
//!
//! > A black cons, or a root, never holds a car or cdr that is a white cons.
//!
//! Whenever a black cons or a root is about to acquire a cons child, the child
//! is passed through `ensure_not_white` first, which moves it from white to
//! grey if necessary. Grey conses may still point at white ones.
//!
//! ### No Sweep Phase
//!
//! This layer only *maintains* the invariant. It never scans from the roots
//! to advance grey conses to black, and it never reclaims white conses: a cons
//! cell, once handed out, stays allocated until the whole `Heap` is dropped.
//! A collection cycle (drain the grey zone, then reuse the white zone) would
//! have to be built on top of these primitives.
//!
//! ## Ownership Operations
//!
//! The `copy`, `copy_as_root`, `unset` and `unset_root` family of methods is
//! where the two schemes meet:
//!
//! * `copy` duplicates a cell. Plain objects gain a reference; a cons is
//!   copied by value and gains nothing.
//! * `copy_as_root` does the same, except that a cons source is rooted (or has
//!   its root count bumped) so that the destination keeps it alive on its own.
//! * `unset` releases a plain object reference and resets the cell to nil. It
//!   never changes which zone a cons is in.
//! * `unset_root` additionally releases one root reference held by a cons
//!   cell.
//!
//! ## Failure
//!
//! The only thing that can go wrong here is running out of storage, either
//! for real or because the configured growth budget is spent. Every operation
//! that may need to grow storage reserves what it needs *before* it modifies
//! anything, so a failed operation leaves every zone boundary, reference count
//! and root count as it was, and any output cell it could not fill is nil.

use std::any::Any;
use std::cmp;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::mem;

use bit_vec::BitVec;
use log::{debug, trace, warn};
use thiserror::Error;

use crate::arena::{Arena, GrowthBudget};
use crate::partition::{Partition, Zone};
use crate::roots::RootTable;
use crate::types::{Destructor, Exception, Printer, TypeInfo, TypeKind,
                   TypeRegistry, TypeTag};
use crate::value::{Cell, Cons, ConsPtr, ObjectRef, Owner};

/// The storage whose growth failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    /// The pages cons cells are allocated from.
    Pages,
    /// The table of non-root cons pointers and its zones.
    PartitionTable,
    /// The table of rooted conses and their counts.
    RootTable,
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Storage::Pages          => "cons pages",
            Storage::PartitionTable => "partition table",
            Storage::RootTable      => "root table",
        })
    }
}

/// Everything that can go wrong in the memory layer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("out of memory growing the {0}")]
    OutOfMemory(Storage),
    #[error("no {0} type tags left to register")]
    TypeTagsExhausted(TypeKind),
    #[error("type tag {0} is not a registered {1} type")]
    UnknownType(TypeTag, TypeKind),
    #[error("cons cell is not a root")]
    NotRooted,
    #[error("{0} target cells for {1} source cells")]
    LengthMismatch(usize, usize),
}

/// Either a `T`, or the `HeapError` that prevented producing one.
pub type HeapResult<T> = Result<T, HeapError>;

/// The default number of cons cells in each page.
pub const DEFAULT_PAGE_LEN: usize = 1 << 10;

/// Tunable parameters for creating a `Heap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// How many cons cells each page holds. The root table also grows in steps
    /// of this many entries.
    pub page_len: usize,
    /// How many times the heap may grow any of its storage before reporting
    /// `HeapError::OutOfMemory`. `None` means no limit.
    pub growth_limit: Option<usize>,
}

impl Default for HeapConfig {
    fn default() -> HeapConfig {
        HeapConfig {
            page_len: DEFAULT_PAGE_LEN,
            growth_limit: None,
        }
    }
}

/// The color of a cons cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Root,
    Black,
    Grey,
    White,
    /// An allocated page cell that has not been handed out yet.
    Unused,
}

/// A snapshot of zone sizes, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub black: usize,
    pub gap: usize,
    pub grey: usize,
    pub white: usize,
    pub free: usize,
    pub roots: usize,
    pub root_capacity: usize,
    pub pages: usize,
    pub cons_capacity: usize,
}

/// The runtime's memory: the type registry, the symbol table, the cons pages,
/// the partition table and the root table. One `Heap` is one virtual machine's
/// worth of state, and it is passed explicitly to everything that allocates.
pub struct Heap {
    types: TypeRegistry,
    symbol_table: HashMap<String, Cell>,
    cons_cells: Arena<Cons>,
    partition: Partition,
    roots: RootTable,
    budget: GrowthBudget,
}

/// ## `Heap` Constructors
impl Heap {
    /// Create a new `Heap` with the default configuration.
    pub fn new() -> HeapResult<Heap> {
        Heap::with_config(HeapConfig::default())
    }

    /// Create a new `Heap` with the given configuration. The first page of
    /// cons cells is allocated up front.
    pub fn with_config(config: HeapConfig) -> HeapResult<Heap> {
        let mut heap = Heap {
            types: TypeRegistry::new(),
            symbol_table: HashMap::new(),
            cons_cells: Arena::new(cmp::max(config.page_len, 1)),
            partition: Partition::new(),
            roots: RootTable::new(),
            budget: GrowthBudget::new(config.growth_limit),
        };
        heap.grow()?;
        Ok(heap)
    }
}

/// ## `Heap` Type Registry Methods
impl Heap {
    /// Register a new plain heap object type. Its destructor, if any, runs
    /// when the last reference to an object of the type is released.
    pub fn register_object_type(&mut self,
                                name: &str,
                                destructor: Option<Destructor>,
                                printer: Option<Printer>) -> HeapResult<TypeTag> {
        self.types.register_object_type(name, destructor, printer)
    }

    /// Register a new cons-derived type.
    pub fn register_cons_type(&mut self, name: &str) -> HeapResult<TypeTag> {
        self.types.register_cons_type(name)
    }

    pub fn type_info(&self, tag: TypeTag) -> Option<&TypeInfo> {
        self.types.get(tag).map(|info| &**info)
    }
}

/// ## `Heap` Object Allocation Methods
impl Heap {
    /// Allocate a plain heap object of the given registered type. The new
    /// cell holds the object's only reference.
    pub fn make_object<T: Any>(&mut self, tag: TypeTag, payload: T) -> HeapResult<Cell> {
        let ty = self.types.expect_kind(tag, TypeKind::Object)?.clone();
        Ok(Cell::Object(ObjectRef::new(ty, Box::new(payload))))
    }

    /// Create a new string object.
    pub fn new_string(&mut self, str: &str) -> Cell {
        let ty = self.types.builtin(TypeTag::STRING);
        Cell::Object(ObjectRef::new(ty, Box::new(str.to_string())))
    }

    /// Create a new exception object carrying the given message.
    pub fn new_exception(&mut self, message: &str) -> Cell {
        let ty = self.types.builtin(TypeTag::EXCEPTION);
        let payload = Exception { message: message.to_string() };
        Cell::Object(ObjectRef::new(ty, Box::new(payload)))
    }

    /// Ensure that there is an interned symbol extant for the given name and
    /// return a new reference to it.
    pub fn intern(&mut self, name: &str) -> Cell {
        if let Some(sym) = self.symbol_table.get(name) {
            return sym.clone();
        }

        let ty = self.types.builtin(TypeTag::SYMBOL);
        let sym = Cell::Object(ObjectRef::new(ty, Box::new(name.to_string())));
        self.symbol_table.insert(name.to_string(), sym.clone());
        sym
    }
}

/// ## `Heap` Cons Allocation Methods
impl Heap {
    /// Allocate a new white cons cell whose car and cdr are nil.
    pub fn make_cons(&mut self) -> HeapResult<Cell> {
        self.make_cons_with(&Cell::Nil, &Cell::Nil)
    }

    /// Allocate a new white cons cell holding copies of the given car and cdr.
    pub fn make_cons_with(&mut self, car: &Cell, cdr: &Cell) -> HeapResult<Cell> {
        self.make_tagged_cons(TypeTag::CONS, car, cdr)
    }

    /// Allocate a new rooted cons cell whose car and cdr are nil.
    pub fn make_cons_root(&mut self) -> HeapResult<Cell> {
        self.make_cons_root_with(&Cell::Nil, &Cell::Nil)
    }

    /// Allocate a new rooted cons cell holding copies of the given car and
    /// cdr. Cons children are pulled out of the white zone.
    pub fn make_cons_root_with(&mut self, car: &Cell, cdr: &Cell) -> HeapResult<Cell> {
        self.make_tagged_cons_root(TypeTag::CONS, car, cdr)
    }

    /// Like `make_cons_with`, for a cons-derived type such as
    /// `TypeTag::LAMBDA_CONS` or one from `register_cons_type`.
    pub fn make_tagged_cons(&mut self,
                            tag: TypeTag,
                            car: &Cell,
                            cdr: &Cell) -> HeapResult<Cell> {
        self.types.expect_kind(tag, TypeKind::Cons)?;
        let cons = self.allocate_white(car, cdr)?;
        Ok(Cell::Cons(tag, cons))
    }

    /// Like `make_cons_root_with`, for a cons-derived type.
    pub fn make_tagged_cons_root(&mut self,
                                 tag: TypeTag,
                                 car: &Cell,
                                 cdr: &Cell) -> HeapResult<Cell> {
        self.types.expect_kind(tag, TypeKind::Cons)?;
        let page_len = self.cons_cells.page_len();
        self.roots.reserve(&mut self.budget, 1, page_len)?;
        let cons = self.allocate_white(car, cdr)?;
        self.cons_root(cons)?;
        Ok(Cell::Cons(tag, cons))
    }

    /// Take the next free cell, growing by a page if there is none, and make
    /// it the newest white cons.
    fn allocate_white(&mut self, car: &Cell, cdr: &Cell) -> HeapResult<ConsPtr> {
        let cons = match self.partition.allocate_white() {
            Some(cons) => cons,
            None       => {
                self.grow()?;
                self.partition.allocate_white()
                    .ok_or(HeapError::OutOfMemory(Storage::Pages))?
            },
        };

        let cell = &mut self.cons_cells[cons];
        cell.car = car.clone();
        cell.cdr = cdr.clone();
        Ok(cons)
    }

    /// Allocate one more page of cons cells and add them to the free zone.
    fn grow(&mut self) -> HeapResult<()> {
        self.budget.charge(Storage::Pages)?;
        let page_len = self.cons_cells.page_len();
        let fresh = self.partition.reserve(&mut self.budget, page_len)
            .and_then(|_| self.cons_cells.grow());
        match fresh {
            Ok(fresh) => {
                self.partition.add_free(&mut self.cons_cells, fresh);
                Ok(())
            },
            Err(e) => {
                self.budget.refund();
                Err(e)
            },
        }
    }
}

/// ## `Heap` Accessors
impl Heap {
    /// Get the cons cell the given pointer refers to.
    pub fn cons(&self, cons: ConsPtr) -> &Cons {
        &self.cons_cells[cons]
    }

    /// Get the car of the given cons cell.
    pub fn car(&self, cons: ConsPtr) -> &Cell {
        &self.cons_cells[cons].car
    }

    /// Get the cdr of the given cons cell.
    pub fn cdr(&self, cons: ConsPtr) -> &Cell {
        &self.cons_cells[cons].cdr
    }

    /// Get the current color of the given cons cell.
    pub fn color(&self, cons: ConsPtr) -> Color {
        match self.partition.zone_of_cons(&self.cons_cells, cons) {
            None                          => Color::Root,
            Some(Zone::Black)             => Color::Black,
            Some(Zone::Grey)              => Color::Grey,
            Some(Zone::White)             => Color::White,
            Some(Zone::Gap | Zone::Free)  => Color::Unused,
        }
    }

    /// Return true if the given cons must never point into the white zone.
    fn is_black_or_root(&self, cons: ConsPtr) -> bool {
        matches!(self.color(cons), Color::Root | Color::Black)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            black: self.partition.count(Zone::Black),
            gap: self.partition.count(Zone::Gap),
            grey: self.partition.count(Zone::Grey),
            white: self.partition.count(Zone::White),
            free: self.partition.count(Zone::Free),
            roots: self.roots.len(),
            root_capacity: self.roots.capacity(),
            pages: self.cons_cells.page_count(),
            cons_capacity: self.cons_cells.capacity(),
        }
    }

    /// The number of storage growths still allowed, if limited.
    pub fn growth_limit(&self) -> Option<usize> {
        self.budget.remaining()
    }

    /// Replace the growth budget. `None` lifts the limit.
    pub fn set_growth_limit(&mut self, limit: Option<usize>) {
        self.budget = GrowthBudget::new(limit);
    }
}

/// ## `Heap` Root Table Methods
impl Heap {
    /// Make the given cons a root, or if it already is one, add one more root
    /// reference to it.
    ///
    /// A new root's cons children are pulled out of the white zone, and the
    /// cons itself leaves whichever zone it was in. If the root table cannot
    /// grow, nothing is changed.
    pub fn cons_root(&mut self, cons: ConsPtr) -> HeapResult<()> {
        if let Owner::Root(index) = self.cons_cells[cons].owner {
            let entry = self.roots.get_mut(index);
            entry.ref_count += 1;
            trace!("cons {} root count -> {}", cons.index(), entry.ref_count);
            return Ok(());
        }

        let page_len = self.cons_cells.page_len();
        self.roots.reserve(&mut self.budget, 1, page_len)?;

        self.barrier_children(cons);

        // The barrier may have moved the cons itself if it is its own child,
        // so look its slot up again.
        if let Owner::Partition(index) = self.cons_cells[cons].owner {
            self.partition.detach(&mut self.cons_cells, index);
        }
        self.roots.push(&mut self.cons_cells, cons);
        trace!("cons {} rooted ({} roots)", cons.index(), self.roots.len());
        Ok(())
    }

    /// Drop one root reference to the given cons. When the last one is gone
    /// the cons moves into the black zone.
    ///
    /// If the black zone cannot make room, the root count is restored and the
    /// cons stays a root. Rooting a cons always leaves its partition slot
    /// reserved, so this only happens if that spare capacity was given up.
    pub fn cons_unroot(&mut self, cons: ConsPtr) -> HeapResult<()> {
        let index = match self.cons_cells[cons].owner {
            Owner::Root(index)     => index,
            Owner::Partition(_)    => return Err(HeapError::NotRooted),
        };

        let entry = self.roots.get_mut(index);
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            trace!("cons {} root count -> {}", cons.index(), entry.ref_count);
            return Ok(());
        }

        if let Err(e) = self.partition.reserve(&mut self.budget, 1) {
            self.roots.get_mut(index).ref_count += 1;
            warn!("could not unroot cons {}: {}", cons.index(), e);
            return Err(e);
        }

        self.roots.remove(&mut self.cons_cells, index);
        self.partition.insert_black(&mut self.cons_cells, cons);
        trace!("cons {} unrooted into black ({} roots)", cons.index(), self.roots.len());
        Ok(())
    }

    /// The number of root references held on the given cell: zero unless it
    /// is a rooted cons.
    pub fn root_refcount(&self, cell: &Cell) -> usize {
        match cell.to_cons().map(|cons| self.cons_cells[cons].owner) {
            Some(Owner::Root(index)) => self.roots.get(index).ref_count,
            _                        => 0,
        }
    }

    /// The write barrier. If the cell is a white cons, move it to grey. Call
    /// this before storing a cons where a black cons or a root can reach it.
    /// Returns true if the cons was moved.
    pub fn ensure_not_white(&mut self, cell: &Cell) -> bool {
        match cell.to_cons() {
            Some(cons) => self.partition.ensure_not_white(&mut self.cons_cells, cons),
            None       => false,
        }
    }

    fn barrier_children(&mut self, cons: ConsPtr) {
        let children = [self.cons_cells[cons].car.to_cons(),
                        self.cons_cells[cons].cdr.to_cons()];
        for child in children.into_iter().flatten() {
            self.partition.ensure_not_white(&mut self.cons_cells, child);
        }
    }
}

/// ## `Heap` Ownership Methods
impl Heap {
    /// Copy `source` into `target`, adding a reference if it is a plain heap
    /// object. A cons is copied as a bare pointer; use `copy_as_root` when the
    /// target must keep it alive. Whatever `target` held before is released as
    /// by `unset`.
    pub fn copy(&mut self, target: &mut Cell, source: &Cell) {
        *target = source.clone();
    }

    /// Like `copy`, but a cons source gains a root reference. On failure
    /// `target` is nil and nothing else has changed.
    pub fn copy_as_root(&mut self, target: &mut Cell, source: &Cell) -> HeapResult<()> {
        if let Cell::Cons(_, cons) = *source {
            if let Err(e) = self.cons_root(cons) {
                *target = Cell::Nil;
                return Err(e);
            }
        }
        *target = source.clone();
        Ok(())
    }

    /// `copy` each source into the target at the same position. Nothing is
    /// copied unless there are exactly as many targets as sources.
    pub fn copy_n(&mut self, targets: &mut [Cell], sources: &[Cell]) -> HeapResult<()> {
        check_lengths(targets, sources)?;
        for (target, source) in targets.iter_mut().zip(sources.iter()) {
            self.copy(target, source);
        }
        Ok(())
    }

    /// `copy_as_root` each source into the target at the same position, all or
    /// nothing. Root table entries for every cons that is not yet a root are
    /// reserved up front, so on failure nothing changes except that every
    /// target is left nil. Mismatched lengths are refused without touching the
    /// targets.
    pub fn copy_n_as_root(&mut self, targets: &mut [Cell], sources: &[Cell]) -> HeapResult<()> {
        check_lengths(targets, sources)?;

        let mut new_roots = HashSet::new();
        for source in sources.iter() {
            if let Cell::Cons(_, cons) = *source {
                if !self.cons_cells[cons].is_root() {
                    new_roots.insert(cons);
                }
            }
        }
        let page_len = self.cons_cells.page_len();
        if let Err(e) = self.roots.reserve(&mut self.budget, new_roots.len(), page_len) {
            self.unset_n(targets);
            return Err(e);
        }

        for i in 0..targets.len() {
            if let Err(e) = self.copy_as_root(&mut targets[i], &sources[i]) {
                for done in targets[..i].iter_mut().rev() {
                    if let Err(undo) = self.unset_root(done) {
                        warn!("could not roll back a root copy: {}", undo);
                        *done = Cell::Nil;
                    }
                }
                for rest in targets[i..].iter_mut() {
                    *rest = Cell::Nil;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Release the reference `target` holds, if it is a plain heap object, and
    /// reset it to nil. A cons is simply forgotten; its zone does not change.
    pub fn unset(&mut self, target: &mut Cell) {
        drop(mem::take(target));
    }

    /// Like `unset`, but if `target` is a rooted cons, one of its root
    /// references is released. If that fails, `target` is left untouched.
    pub fn unset_root(&mut self, target: &mut Cell) -> HeapResult<()> {
        if let Cell::Cons(_, cons) = *target {
            if self.cons_cells[cons].is_root() {
                self.cons_unroot(cons)?;
            }
        }
        self.unset(target);
        Ok(())
    }

    /// `unset` every target.
    pub fn unset_n(&mut self, targets: &mut [Cell]) {
        for target in targets.iter_mut() {
            self.unset(target);
        }
    }

    /// `unset_root` every target, stopping at the first failure. Targets
    /// before the failing one are nil; it and the rest are untouched.
    pub fn unset_root_n(&mut self, targets: &mut [Cell]) -> HeapResult<()> {
        for target in targets.iter_mut() {
            self.unset_root(target)?;
        }
        Ok(())
    }

    /// Replace the car and/or cdr of the given cons. The replaced values are
    /// released as by `unset`, the new ones are copied in as by `copy`, and if
    /// the cons is black or a root, new cons children are pulled out of the
    /// white zone first.
    pub fn set_car_cdr(&mut self, cons: ConsPtr, car: Option<&Cell>, cdr: Option<&Cell>) {
        let guarded = self.is_black_or_root(cons);

        if let Some(car) = car {
            if guarded {
                self.ensure_not_white(car);
            }
            self.cons_cells[cons].car = car.clone();
        }

        if let Some(cdr) = cdr {
            if guarded {
                self.ensure_not_white(cdr);
            }
            self.cons_cells[cons].cdr = cdr.clone();
        }
    }
}

fn check_lengths(targets: &[Cell], sources: &[Cell]) -> HeapResult<()> {
    if targets.len() != sources.len() {
        return Err(HeapError::LengthMismatch(targets.len(), sources.len()));
    }
    Ok(())
}

/// ## `Heap` Invariant Checking
impl Heap {
    /// Check every structural invariant of the cons partition and the root
    /// table, returning a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let capacity = self.cons_cells.capacity();
        let mut seen = BitVec::from_elem(capacity, false);
        let mut mark_seen = |cons: ConsPtr| -> Result<(), String> {
            match seen.get(cons.index()) {
                None        => Err(format!("{:?} is outside the arena", cons)),
                Some(true)  => Err(format!("{:?} is owned twice", cons)),
                Some(false) => {
                    seen.set(cons.index(), true);
                    Ok(())
                },
            }
        };

        let [black_top, grey_begin, grey_top, white_top] = self.partition.boundaries();
        if !(black_top <= grey_begin
             && grey_begin <= grey_top
             && grey_top <= white_top
             && white_top <= self.partition.len()) {
            return Err(format!("zone boundaries out of order: {:?} (table len {})",
                               self.partition.boundaries(), self.partition.len()));
        }

        for index in 0..self.partition.len() {
            let cons = self.partition.get(index);
            mark_seen(cons)?;

            if self.cons_cells[cons].owner != Owner::Partition(index) {
                return Err(format!("{:?} in partition slot {} records owner {:?}",
                                   cons, index, self.cons_cells[cons].owner));
            }

            match self.partition.zone_of(index) {
                Zone::Black            => self.check_no_white_children(cons)?,
                Zone::Gap | Zone::Free => {
                    let cell = &self.cons_cells[cons];
                    if !cell.car.is_nil() || !cell.cdr.is_nil() {
                        return Err(format!("unused {:?} holds values", cons));
                    }
                },
                Zone::Grey | Zone::White => { },
            }
        }

        for (index, entry) in self.roots.entries().iter().enumerate() {
            mark_seen(entry.cons)?;

            if self.cons_cells[entry.cons].owner != Owner::Root(index) {
                return Err(format!("{:?} in root slot {} records owner {:?}",
                                   entry.cons, index, self.cons_cells[entry.cons].owner));
            }
            if entry.ref_count == 0 {
                return Err(format!("root {:?} has a zero count", entry.cons));
            }
            self.check_no_white_children(entry.cons)?;
        }

        if !seen.all() {
            return Err("some cons cells are owned by neither table".to_string());
        }
        Ok(())
    }

    fn check_no_white_children(&self, cons: ConsPtr) -> Result<(), String> {
        let cell = &self.cons_cells[cons];
        for child in [cell.car.to_cons(), cell.cdr.to_cons()].into_iter().flatten() {
            if self.color(child) == Color::White {
                return Err(format!("{:?} ({:?}) points at white {:?}",
                                   cons, self.color(cons), child));
            }
        }
        Ok(())
    }
}

impl Drop for Heap {
    /// Release every car and cdr held by every cons before the pages
    /// themselves go away, so plain objects reachable only from conses are
    /// destroyed.
    fn drop(&mut self) {
        debug!("tearing down heap: {} pages, {} roots, {} interned symbols",
               self.cons_cells.page_count(), self.roots.len(), self.symbol_table.len());
        for index in 0..self.cons_cells.capacity() {
            let cell = &mut self.cons_cells[ConsPtr::new(index)];
            drop(mem::take(&mut cell.car));
            drop(mem::take(&mut cell.cdr));
        }
        self.symbol_table.clear();
    }
}

// TESTS -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell as Flag;
    use std::rc::Rc;

    use super::*;

    fn new_heap() -> Heap {
        Heap::new().ok().expect("Should be able to create a heap.")
    }

    fn small_heap(page_len: usize) -> Heap {
        Heap::with_config(HeapConfig { page_len: page_len, growth_limit: None })
            .ok()
            .expect("Should be able to create a heap.")
    }

    fn cons_of(cell: &Cell) -> ConsPtr {
        cell.to_cons().expect("Should be a cons")
    }

    fn counting_type(heap: &mut Heap, name: &str) -> (TypeTag, Rc<Flag<usize>>) {
        let count = Rc::new(Flag::new(0));
        let hook = count.clone();
        let tag = heap.register_object_type(
            name,
            Some(Box::new(move |_: &mut dyn Any| hook.set(hook.get() + 1))),
            None).ok().expect("Should be able to register a type.");
        (tag, count)
    }

    #[test]
    fn test_new_heap_is_empty() {
        let heap = new_heap();
        let stats = heap.stats();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.free, DEFAULT_PAGE_LEN);
        assert_eq!(stats.black + stats.grey + stats.white + stats.roots, 0);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_make_cons_is_white() {
        let heap = &mut new_heap();
        let before = heap.stats();

        let c = heap.make_cons().ok().expect("Should be able to make a cons.");

        let after = heap.stats();
        assert_eq!(after.white, before.white + 1);
        assert_eq!(after.black, before.black);
        assert_eq!(after.grey, before.grey);
        assert_eq!(after.roots, before.roots);
        assert_eq!(heap.color(cons_of(&c)), Color::White);
        assert!(heap.car(cons_of(&c)).is_nil());
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_root_counts() {
        let heap = &mut new_heap();
        let before = heap.stats();

        let mut root = heap.make_cons_root_with(&Cell::Nil, &Cell::Nil).unwrap();
        let cons = cons_of(&root);
        assert_eq!(heap.stats().roots, before.roots + 1);
        assert_eq!(heap.root_refcount(&root), 1);

        let mut second = Cell::Nil;
        let zones = heap.stats();
        heap.copy_as_root(&mut second, &root).unwrap();
        assert_eq!(heap.root_refcount(&root), 2);
        assert_eq!(heap.stats(), zones);

        heap.unset_root(&mut second).unwrap();
        assert!(second.is_nil());
        assert_eq!(heap.root_refcount(&root), 1);
        assert_eq!(heap.stats(), zones);

        heap.cons_unroot(cons).unwrap();
        assert_eq!(heap.root_refcount(&root), 0);
        assert_eq!(heap.color(cons), Color::Black);
        assert_eq!(heap.stats().roots, before.roots);
        assert_eq!(heap.stats().black, before.black + 1);
        assert!(heap.check_invariants().is_ok());

        // The cell still refers to the now black cons; unset_root on a
        // non-root cons just forgets it.
        heap.unset_root(&mut root).unwrap();
        assert!(root.is_nil());
        assert_eq!(heap.color(cons), Color::Black);
    }

    #[test]
    fn test_rooting_pulls_children_out_of_white() {
        let heap = &mut new_heap();
        let a = heap.make_cons().unwrap();
        let b = heap.make_cons().unwrap();
        let pair = heap.make_cons_with(&a, &b).unwrap();
        let before = heap.stats();

        heap.cons_root(cons_of(&pair)).unwrap();

        let after = heap.stats();
        assert_eq!(after.roots, before.roots + 1);
        assert_eq!(after.grey, before.grey + 2);
        assert_eq!(after.white, before.white - 3);
        assert_eq!(heap.color(cons_of(&a)), Color::Grey);
        assert_eq!(heap.color(cons_of(&b)), Color::Grey);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_rooting_with_shared_child() {
        let heap = &mut new_heap();
        let a = heap.make_cons().unwrap();
        let pair = heap.make_cons_root_with(&a, &a).unwrap();
        assert_eq!(heap.color(cons_of(&a)), Color::Grey);
        assert_eq!(heap.stats().grey, 1);
        assert_eq!(heap.root_refcount(&pair), 1);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_rooting_self_referential_cons() {
        let heap = &mut new_heap();
        let c = heap.make_cons().unwrap();
        let cons = cons_of(&c);
        heap.set_car_cdr(cons, Some(&c), Some(&c));
        assert_eq!(heap.color(cons), Color::White);

        heap.cons_root(cons).unwrap();
        assert_eq!(heap.color(cons), Color::Root);
        assert_eq!(heap.stats().grey, 0);
        assert_eq!(heap.stats().white, 0);
        assert!(heap.check_invariants().is_ok());

        heap.cons_unroot(cons).unwrap();
        assert_eq!(heap.color(cons), Color::Black);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_destructor_runs_once_at_zero() {
        let heap = &mut new_heap();
        let (tag_a, count_a) = counting_type(heap, "a");
        let (tag_b, count_b) = counting_type(heap, "b");

        let mut a = heap.make_object(tag_a, 1u8).unwrap();
        let mut b = heap.make_object(tag_b, "bee").unwrap();
        assert_eq!(a.tag(), tag_a);

        let mut copy = Cell::Nil;
        heap.copy(&mut copy, &a);
        assert_eq!(a.to_object().unwrap().ref_count(), 2);
        heap.unset(&mut copy);
        assert!(copy.is_nil());
        assert_eq!(a.to_object().unwrap().ref_count(), 1);
        assert_eq!(count_a.get(), 0);

        heap.copy(&mut copy, &a);
        heap.unset(&mut a);
        assert_eq!(count_a.get(), 0);
        heap.unset(&mut copy);
        assert_eq!(count_a.get(), 1);

        heap.unset(&mut b);
        assert_eq!(count_b.get(), 1);
        assert_eq!(count_a.get(), 1);
    }

    #[test]
    fn test_make_object_rejects_wrong_tags() {
        let heap = &mut new_heap();
        assert_eq!(heap.make_object(TypeTag::CONS, 1).err(),
                   Some(HeapError::UnknownType(TypeTag::CONS, TypeKind::Object)));
        assert_eq!(heap.make_tagged_cons(TypeTag::STRING, &Cell::Nil, &Cell::Nil).err(),
                   Some(HeapError::UnknownType(TypeTag::STRING, TypeKind::Cons)));
    }

    #[test]
    fn test_custom_cons_type() {
        let heap = &mut new_heap();
        let tag = heap.register_cons_type("closure").unwrap();
        let c = heap.make_tagged_cons_root(tag, &Cell::new_integer(1), &Cell::Nil).unwrap();
        assert_eq!(c.tag(), tag);
        assert_eq!(heap.type_info(tag).unwrap().name(), "closure");
        assert_eq!(heap.root_refcount(&c), 1);

        let lambda = heap.make_tagged_cons(TypeTag::LAMBDA_CONS, &Cell::Nil, &Cell::Nil).unwrap();
        assert_eq!(lambda.tag(), TypeTag::LAMBDA_CONS);
        assert_eq!(heap.color(cons_of(&lambda)), Color::White);
    }

    #[test]
    fn test_root_failure_changes_nothing() {
        let heap = &mut new_heap();
        let a = heap.make_cons().unwrap();
        let b = heap.make_cons().unwrap();
        let pair = heap.make_cons_with(&a, &b).unwrap();
        let before = heap.stats();
        let boundaries = heap.partition.boundaries();

        heap.set_growth_limit(Some(0));
        assert_eq!(heap.cons_root(cons_of(&pair)),
                   Err(HeapError::OutOfMemory(Storage::RootTable)));

        assert_eq!(heap.stats(), before);
        assert_eq!(heap.partition.boundaries(), boundaries);
        assert_eq!(heap.root_refcount(&pair), 0);
        assert_eq!(heap.color(cons_of(&pair)), Color::White);
        assert_eq!(heap.color(cons_of(&a)), Color::White);
        assert!(heap.check_invariants().is_ok());

        let mut target = Cell::new_integer(7);
        assert!(heap.copy_as_root(&mut target, &pair).is_err());
        assert!(target.is_nil());

        assert!(heap.make_cons_root().is_err());
        assert_eq!(heap.stats(), before);

        heap.set_growth_limit(None);
        assert!(heap.cons_root(cons_of(&pair)).is_ok());
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_copy_n_as_root_is_all_or_nothing() {
        let heap = &mut small_heap(4);
        let obj = heap.new_string("one");
        let obj2 = heap.new_string("two");

        // Fill the root table to capacity so that one more distinct root
        // needs it to grow.
        let mut held = vec!();
        while heap.stats().roots < heap.stats().root_capacity || held.is_empty() {
            held.push(heap.make_cons_root().unwrap());
        }
        let rooted = held[0].clone();
        let fresh = heap.make_cons().unwrap();

        let sources = [Cell::Nil, obj.clone(), rooted.clone(), fresh.clone(), obj2.clone()];
        let mut targets = vec![Cell::Nil; 5];
        let before = heap.stats();

        heap.set_growth_limit(Some(0));
        assert_eq!(heap.copy_n_as_root(&mut targets, &sources),
                   Err(HeapError::OutOfMemory(Storage::RootTable)));

        assert!(targets.iter().all(|t| t.is_nil()));
        assert_eq!(obj.to_object().unwrap().ref_count(), 2);
        assert_eq!(obj2.to_object().unwrap().ref_count(), 2);
        assert_eq!(heap.root_refcount(&rooted), 1);
        assert_eq!(heap.root_refcount(&fresh), 0);
        assert_eq!(heap.color(cons_of(&fresh)), Color::White);
        assert_eq!(heap.stats(), before);
        assert_eq!(sources[2], rooted);
        assert!(heap.check_invariants().is_ok());

        heap.set_growth_limit(None);
        heap.copy_n_as_root(&mut targets, &sources).unwrap();
        assert_eq!(targets[..], sources[..]);
        assert_eq!(heap.root_refcount(&rooted), 2);
        assert_eq!(heap.root_refcount(&fresh), 1);
        assert_eq!(obj.to_object().unwrap().ref_count(), 3);

        heap.unset_root_n(&mut targets).unwrap();
        assert!(targets.iter().all(|t| t.is_nil()));
        assert_eq!(heap.root_refcount(&rooted), 1);
        assert_eq!(heap.color(cons_of(&fresh)), Color::Black);
        assert_eq!(obj.to_object().unwrap().ref_count(), 2);
        assert!(heap.check_invariants().is_ok());
    }

    /// Root conses until the root table has exactly one free entry left.
    fn leave_one_root_entry(heap: &mut Heap) -> Vec<Cell> {
        let mut held = vec!();
        while held.is_empty() || heap.stats().roots + 1 < heap.stats().root_capacity {
            held.push(heap.make_cons_root().unwrap());
        }
        assert_eq!(heap.stats().roots + 1, heap.stats().root_capacity);
        held
    }

    #[test]
    fn test_copy_n_as_root_failure_leaves_zones_alone() {
        let heap = &mut small_heap(4);
        let _held = leave_one_root_entry(heap);

        let child = heap.make_cons().unwrap();
        let a = heap.make_cons_with(&child, &Cell::Nil).unwrap();
        let b = heap.make_cons().unwrap();
        let sources = [a.clone(), b.clone()];
        let mut targets = vec![Cell::Nil; 2];
        let before = heap.stats();

        heap.set_growth_limit(Some(0));
        assert_eq!(heap.copy_n_as_root(&mut targets, &sources),
                   Err(HeapError::OutOfMemory(Storage::RootTable)));

        assert!(targets.iter().all(|t| t.is_nil()));
        assert_eq!(heap.stats(), before);
        assert_eq!(heap.color(cons_of(&a)), Color::White);
        assert_eq!(heap.color(cons_of(&b)), Color::White);
        assert_eq!(heap.color(cons_of(&child)), Color::White);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_copy_n_as_root_counts_each_new_root_once() {
        let heap = &mut small_heap(4);
        let _held = leave_one_root_entry(heap);

        let child = heap.make_cons().unwrap();
        let a = heap.make_cons_with(&child, &Cell::Nil).unwrap();
        let sources = [a.clone(), Cell::new_integer(1), a.clone()];
        let mut targets = vec![Cell::Nil; 3];

        heap.set_growth_limit(Some(0));
        heap.copy_n_as_root(&mut targets, &sources).unwrap();

        assert_eq!(targets[..], sources[..]);
        assert_eq!(heap.root_refcount(&a), 2);
        assert_eq!(heap.color(cons_of(&child)), Color::Grey);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_batched_copies_refuse_mismatched_lengths() {
        let heap = &mut new_heap();
        let s = heap.new_string("s");
        let c = heap.make_cons().unwrap();
        let mut targets = vec![Cell::new_integer(7), Cell::new_integer(8)];

        assert_eq!(heap.copy_n(&mut targets, &[s.clone()]),
                   Err(HeapError::LengthMismatch(2, 1)));
        assert_eq!(heap.copy_n_as_root(&mut targets, &[s.clone(), c.clone(), c.clone()]),
                   Err(HeapError::LengthMismatch(2, 3)));

        assert_eq!(targets, vec![Cell::new_integer(7), Cell::new_integer(8)]);
        assert_eq!(s.to_object().unwrap().ref_count(), 1);
        assert_eq!(heap.root_refcount(&c), 0);
        assert_eq!(heap.color(cons_of(&c)), Color::White);
    }

    #[test]
    fn test_copy_as_root_then_unset_root_round_trips() {
        let heap = &mut new_heap();
        let root = heap.make_cons_root().unwrap();
        let obj = heap.intern("sym");
        let int = Cell::new_integer(3);

        for source in [&root, &obj, &int, &Cell::Nil] {
            let before = heap.stats();
            let refcount = heap.root_refcount(source);
            let object_count = source.to_object().map(|o| o.ref_count());

            let mut target = Cell::Nil;
            heap.copy_as_root(&mut target, source).unwrap();
            heap.unset_root(&mut target).unwrap();

            assert_eq!(heap.stats(), before);
            assert_eq!(heap.root_refcount(source), refcount);
            assert_eq!(source.to_object().map(|o| o.ref_count()), object_count);
        }
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_copy_n_and_unset_n() {
        let heap = &mut new_heap();
        let s = heap.new_string("s");
        let c = heap.make_cons().unwrap();
        let sources = [s.clone(), c.clone(), Cell::new_integer(2)];
        let mut targets = vec![Cell::Nil; 3];

        heap.copy_n(&mut targets, &sources).unwrap();
        assert_eq!(targets[..], sources[..]);
        assert_eq!(s.to_object().unwrap().ref_count(), 3);
        assert_eq!(heap.root_refcount(&c), 0);

        heap.unset_n(&mut targets);
        assert!(targets.iter().all(|t| t.is_nil()));
        assert_eq!(s.to_object().unwrap().ref_count(), 2);
        assert_eq!(heap.color(cons_of(&c)), Color::White);
    }

    #[test]
    fn test_unroot_non_root() {
        let heap = &mut new_heap();
        let c = heap.make_cons().unwrap();
        assert_eq!(heap.cons_unroot(cons_of(&c)), Err(HeapError::NotRooted));
        assert_eq!(heap.color(cons_of(&c)), Color::White);
    }

    #[test]
    fn test_set_car_cdr_applies_barrier_to_roots() {
        let heap = &mut new_heap();
        let root = heap.make_cons_root().unwrap();
        let child = heap.make_cons().unwrap();
        let other = heap.make_cons().unwrap();

        heap.set_car_cdr(cons_of(&root), Some(&child), None);
        assert_eq!(heap.color(cons_of(&child)), Color::Grey);
        assert_eq!(heap.car(cons_of(&root)), &child);
        assert!(heap.cdr(cons_of(&root)).is_nil());
        assert!(heap.check_invariants().is_ok());

        // A white holder needs no barrier.
        heap.set_car_cdr(cons_of(&child), None, Some(&other));
        assert_eq!(heap.color(cons_of(&other)), Color::White);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_set_car_cdr_applies_barrier_to_black() {
        let heap = &mut new_heap();
        let mut root = heap.make_cons_root().unwrap();
        let black = cons_of(&root);
        heap.unset_root(&mut root).unwrap();
        assert_eq!(heap.color(black), Color::Black);

        let child = heap.make_cons().unwrap();
        heap.set_car_cdr(black, None, Some(&child));
        assert_eq!(heap.color(cons_of(&child)), Color::Grey);
        assert!(heap.check_invariants().is_ok());

        // Barrier is a no-op the second time.
        let stats = heap.stats();
        assert!(!heap.ensure_not_white(&child));
        assert_eq!(heap.stats(), stats);
    }

    #[test]
    fn test_set_car_cdr_releases_replaced_values() {
        let heap = &mut new_heap();
        let (tag, destroyed) = counting_type(heap, "counted");
        let c = heap.make_cons().unwrap();

        let mut obj = heap.make_object(tag, ()).unwrap();
        heap.set_car_cdr(cons_of(&c), Some(&obj), Some(&obj));
        assert_eq!(obj.to_object().unwrap().ref_count(), 3);
        heap.unset(&mut obj);

        heap.set_car_cdr(cons_of(&c), Some(&Cell::new_integer(1)), None);
        assert_eq!(destroyed.get(), 0);
        heap.set_car_cdr(cons_of(&c), None, Some(&Cell::Nil));
        assert_eq!(destroyed.get(), 1);
        assert_eq!(heap.car(cons_of(&c)), &Cell::new_integer(1));
    }

    #[test]
    fn test_heap_grows_by_pages() {
        let heap = &mut small_heap(2);
        let mut conses = vec!();
        for _ in 0..5 {
            conses.push(heap.make_cons().unwrap());
        }
        let stats = heap.stats();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.white, 5);
        assert_eq!(stats.free, 1);
        assert!(heap.check_invariants().is_ok());

        heap.make_cons().unwrap();
        heap.set_growth_limit(Some(0));
        let before = heap.stats();
        assert_eq!(heap.make_cons(), Err(HeapError::OutOfMemory(Storage::Pages)));
        assert_eq!(heap.stats(), before);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_failed_page_growth_refunds_budget() {
        let heap = &mut small_heap(2);
        heap.make_cons().unwrap();
        heap.make_cons().unwrap();
        assert_eq!(heap.partition.capacity(), heap.partition.len());

        // One growth is enough for the page but not for the partition table.
        heap.set_growth_limit(Some(1));
        let before = heap.stats();
        assert_eq!(heap.make_cons(), Err(HeapError::OutOfMemory(Storage::PartitionTable)));
        assert_eq!(heap.growth_limit(), Some(1));
        assert_eq!(heap.stats(), before);
        assert!(heap.check_invariants().is_ok());

        heap.set_growth_limit(Some(2));
        heap.make_cons().unwrap();
        assert_eq!(heap.stats().pages, 2);
        assert_eq!(heap.growth_limit(), Some(0));
    }

    #[test]
    fn test_unroot_failure_keeps_root() {
        let heap = &mut new_heap();
        let mut root = heap.make_cons_root().unwrap();
        let cons = cons_of(&root);

        heap.partition.shrink_to_fit();
        assert_eq!(heap.partition.capacity(), heap.partition.len());

        heap.set_growth_limit(Some(0));
        assert_eq!(heap.cons_unroot(cons), Err(HeapError::OutOfMemory(Storage::PartitionTable)));
        assert_eq!(heap.root_refcount(&root), 1);
        assert_eq!(heap.color(cons), Color::Root);
        assert!(heap.check_invariants().is_ok());

        assert!(heap.unset_root(&mut root).is_err());
        assert_eq!(root.to_cons(), Some(cons));
        assert_eq!(heap.root_refcount(&root), 1);

        heap.set_growth_limit(None);
        heap.unset_root(&mut root).unwrap();
        assert!(root.is_nil());
        assert_eq!(heap.color(cons), Color::Black);
        assert!(heap.check_invariants().is_ok());
    }

    #[test]
    fn test_growth_limit_on_creation() {
        let config = HeapConfig { page_len: 8, growth_limit: Some(0) };
        assert_eq!(Heap::with_config(config).err(),
                   Some(HeapError::OutOfMemory(Storage::Pages)));
    }

    #[test]
    fn test_many_roots_and_unroots_keep_invariants() {
        let heap = &mut small_heap(3);
        let mut cells: Vec<Cell> = vec!();
        for i in 0..10 {
            let car = if i > 0 { cells[i - 1].clone() } else { Cell::Nil };
            cells.push(heap.make_cons_with(&car, &Cell::new_integer(i as i64)).unwrap());
        }
        assert!(heap.check_invariants().is_ok());

        for cell in cells.iter().step_by(2) {
            heap.cons_root(cons_of(cell)).unwrap();
            assert!(heap.check_invariants().is_ok());
        }
        for cell in cells.iter().step_by(3) {
            heap.cons_root(cons_of(cell)).unwrap();
            assert!(heap.check_invariants().is_ok());
        }
        for cell in cells.iter() {
            while heap.root_refcount(cell) > 0 {
                heap.cons_unroot(cons_of(cell)).unwrap();
                assert!(heap.check_invariants().is_ok());
            }
        }

        let stats = heap.stats();
        assert_eq!(stats.roots, 0);
        assert_eq!(stats.black + stats.grey + stats.white, 10);
        for cell in cells.iter() {
            assert!(heap.color(cons_of(cell)) != Color::Unused);
        }
    }

    #[test]
    fn test_intern() {
        let heap = &mut new_heap();
        let a = heap.intern("lambda");
        let b = heap.intern("lambda");
        let c = heap.intern("quote");
        assert_eq!(a, b);
        assert!(a != c);
        assert_eq!(a.tag(), TypeTag::SYMBOL);
        // The table holds one reference of its own.
        assert_eq!(a.to_object().unwrap().ref_count(), 3);
    }

    #[test]
    fn test_teardown_releases_cons_contents() {
        let (tag, destroyed) = {
            let heap = &mut new_heap();
            let (tag, destroyed) = counting_type(heap, "counted");
            let mut obj = heap.make_object(tag, 0u32).unwrap();
            let mut root = heap.make_cons_root_with(&obj, &Cell::Nil).unwrap();
            let _white = heap.make_cons_with(&Cell::Nil, &obj).unwrap();
            heap.unset(&mut obj);
            heap.unset_root(&mut root).unwrap();
            assert_eq!(destroyed.get(), 0);
            (tag, destroyed)
        };
        assert_eq!(destroyed.get(), 1);
        assert!(tag.is_object());
    }

    #[test]
    fn test_exception_objects() {
        let heap = &mut new_heap();
        let e = heap.new_exception("boom");
        let exception = e.to_object().unwrap().downcast_ref::<Exception>().unwrap();
        assert_eq!(exception.message, "boom");
        assert_eq!(e.tag(), TypeTag::EXCEPTION);
    }
}
