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

//! Cell and cons cell implementation.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::arena::ArenaPtr;
use crate::heap::{Heap, HeapResult};
use crate::types::{TypeInfo, TypeTag};

/// Which table currently holds a cons cell, and at what index. The index must
/// always equal the position of the cons's pointer in that table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    /// Held by the partition table; the zone is implied by the index.
    Partition(usize),
    /// Held by the root table.
    Root(usize),
}

/// A cons cell is a pair of `car` and `cdr` cells, plus the bookkeeping the
/// partition allocator needs to move it between zones in O(1).
#[derive(Debug)]
pub struct Cons {
    pub(crate) owner: Owner,
    pub(crate) car: Cell,
    pub(crate) cdr: Cell,
}

impl Default for Cons {
    /// Do not use this method, instead allocate cons cells on the heap with
    /// `Heap::make_cons` and get back a `Cell`.
    fn default() -> Cons {
        Cons {
            owner: Owner::Partition(0),
            car: Cell::Nil,
            cdr: Cell::Nil,
        }
    }
}

impl Cons {
    pub fn car(&self) -> &Cell {
        &self.car
    }

    pub fn cdr(&self) -> &Cell {
        &self.cdr
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn is_root(&self) -> bool {
        matches!(self.owner, Owner::Root(_))
    }
}

/// A pointer to a cons cell on the heap.
pub type ConsPtr = ArenaPtr<Cons>;

/// A plain heap object: a payload together with the type it was created as.
/// The payload is released, after running the type's destructor, when the
/// last `ObjectRef` to it is dropped.
pub struct HeapObject {
    ty: Rc<TypeInfo>,
    payload: Box<dyn Any>,
}

impl Drop for HeapObject {
    fn drop(&mut self) {
        self.ty.destroy(&mut *self.payload);
    }
}

/// A counted reference to a plain heap object. Cloning it is the `copy`
/// operation; dropping it is `unset`.
#[derive(Clone)]
pub struct ObjectRef(Rc<HeapObject>);

impl ObjectRef {
    pub(crate) fn new(ty: Rc<TypeInfo>, payload: Box<dyn Any>) -> ObjectRef {
        ObjectRef(Rc::new(HeapObject {
            ty: ty,
            payload: payload,
        }))
    }

    pub fn tag(&self) -> TypeTag {
        self.0.ty.tag()
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.0.ty
    }

    /// The number of live references to this object.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn payload(&self) -> &dyn Any {
        &*self.0.payload
    }

    /// Get the payload as a `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.payload.downcast_ref::<T>()
    }
}

impl PartialEq for ObjectRef {
    /// Object identity, not structural comparison.
    fn eq(&self, rhs: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &rhs.0)
    }
}

impl Eq for ObjectRef { }

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectRef({}, {}, rc={})",
               self.0.ty.name(), self.tag(), self.ref_count())
    }
}

/// `Cell` is the fixed-size tagged value every part of the runtime passes
/// around.
///
/// Note that `Eq` and `PartialEq` are object identity, not structural
/// comparison, same as with [`ArenaPtr`](../arena/struct.ArenaPtr.html).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Cell {
    /// The empty list: `()`.
    #[default]
    Nil,

    /// Integers are stored inline.
    Integer(i64),

    /// A reference counted plain heap object.
    Object(ObjectRef),

    /// A pointer into the cons partition, tagged with the cons-derived type it
    /// was created as.
    Cons(TypeTag, ConsPtr),
}

/// # `Cell` Constructors
impl Cell {
    /// Create a new integer cell.
    pub fn new_integer(i: i64) -> Cell {
        Cell::Integer(i)
    }
}

/// # `Cell` Methods
impl Cell {
    /// The tag that determines how this cell's data is interpreted.
    pub fn tag(&self) -> TypeTag {
        match *self {
            Cell::Nil            => TypeTag::NIL,
            Cell::Integer(_)     => TypeTag::INTEGER,
            Cell::Object(ref o)  => o.tag(),
            Cell::Cons(tag, _)   => tag,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(*self, Cell::Nil)
    }

    /// Return true if this cell is a cons, false otherwise.
    pub fn is_cons(&self) -> bool {
        matches!(*self, Cell::Cons(..))
    }

    /// Return true if this cell is an atom, false otherwise.
    pub fn is_atom(&self) -> bool {
        !self.is_cons()
    }

    /// Coerce this cons cell to a `ConsPtr`.
    pub fn to_cons(&self) -> Option<ConsPtr> {
        match *self {
            Cell::Cons(_, p) => Some(p),
            _                => None,
        }
    }

    /// Coerce this object cell to its `ObjectRef`.
    pub fn to_object(&self) -> Option<&ObjectRef> {
        match *self {
            Cell::Object(ref o) => Some(o),
            _                   => None,
        }
    }

    /// Coerce this integer cell to its underlying `i64`.
    pub fn to_integer(&self) -> Option<i64> {
        match *self {
            Cell::Integer(i) => Some(i),
            _                => None,
        }
    }
}

/// A helper utility to create a cons list from the given cells. The conses are
/// freshly allocated and white.
pub fn list(heap: &mut Heap, cells: &[Cell]) -> HeapResult<Cell> {
    let mut tail = Cell::Nil;
    for car in cells.iter().rev() {
        tail = heap.make_cons_with(car, &tail)?;
    }
    Ok(tail)
}

/// Like `list`, but the head of the list is a root, so the whole spine stays
/// out of the white zone until the caller releases it with `unset_root`.
pub fn list_root(heap: &mut Heap, cells: &[Cell]) -> HeapResult<Cell> {
    let mut head = Cell::Nil;
    let spine = list(heap, cells)?;
    heap.copy_as_root(&mut head, &spine)?;
    Ok(head)
}

// TESTS -----------------------------------------------------------------------
