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

//! The type registry.
//!
//! Every cell carries a `TypeTag`. The tag space is a fixed-size table split
//! into three disjoint ranges:
//!
//! * atoms, whose value is the cell itself (`nil`, integers);
//! * plain heap objects, which are reference counted (symbols, strings,
//!   exceptions, lambda forms, and any type registered with
//!   `register_object_type`);
//! * cons-derived types, which live in the cons partition (plain pairs,
//!   lambda conses, and any type registered with `register_cons_type`).
//!
//! Each registered tag maps to a `TypeInfo` carrying the type's name, an
//! optional destructor that runs when the last reference to an object of that
//! type is released, and an optional printer.

use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use crate::heap::{HeapError, HeapResult};

/// The number of entries in a heap's type table.
pub const TYPE_TABLE_LEN: usize = 64;

const ATOM_TAGS: Range<u8> = 0..2;
const OBJECT_TAGS: Range<u8> = 2..32;
const CONS_TAGS: Range<u8> = 32..TYPE_TABLE_LEN as u8;

/// Identifies how a cell's data is interpreted and disposed of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(u8);

impl TypeTag {
    pub const NIL: TypeTag = TypeTag(ATOM_TAGS.start);
    pub const INTEGER: TypeTag = TypeTag(ATOM_TAGS.start + 1);

    pub const OBJECT: TypeTag = TypeTag(OBJECT_TAGS.start);
    pub const EXCEPTION: TypeTag = TypeTag(OBJECT_TAGS.start + 1);
    pub const SYMBOL: TypeTag = TypeTag(OBJECT_TAGS.start + 2);
    pub const STRING: TypeTag = TypeTag(OBJECT_TAGS.start + 3);
    pub const LAMBDA_FORM: TypeTag = TypeTag(OBJECT_TAGS.start + 4);

    pub const CONS: TypeTag = TypeTag(CONS_TAGS.start);
    pub const LAMBDA_CONS: TypeTag = TypeTag(CONS_TAGS.start + 1);

    /// The position of this tag in the type table.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Which range of the tag space this tag belongs to.
    pub fn kind(&self) -> TypeKind {
        if ATOM_TAGS.contains(&self.0) {
            TypeKind::Atom
        } else if OBJECT_TAGS.contains(&self.0) {
            TypeKind::Object
        } else {
            TypeKind::Cons
        }
    }

    pub fn is_object(&self) -> bool {
        self.kind() == TypeKind::Object
    }

    pub fn is_cons(&self) -> bool {
        self.kind() == TypeKind::Cons
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The three disjoint ranges of the tag space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Atom,
    Object,
    Cons,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            TypeKind::Atom   => "atom",
            TypeKind::Object => "object",
            TypeKind::Cons   => "cons",
        })
    }
}

/// Runs when the last reference to an object is released, before its payload
/// is freed.
pub type Destructor = Box<dyn Fn(&mut dyn Any)>;

/// Writes the text representation of an object's payload.
pub type Printer = fn(&dyn Any, &mut dyn fmt::Write) -> fmt::Result;

/// Everything the heap knows about a registered type.
pub struct TypeInfo {
    tag: TypeTag,
    name: String,
    destructor: Option<Destructor>,
    printer: Option<Printer>,
}

impl TypeInfo {
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn printer(&self) -> Option<Printer> {
        self.printer
    }

    /// Run this type's destructor, if it has one, on the given payload.
    pub fn destroy(&self, payload: &mut dyn Any) {
        if let Some(ref destructor) = self.destructor {
            destructor(payload);
        }
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("destructor", &self.destructor.is_some())
            .field("printer", &self.printer.is_some())
            .finish()
    }
}

/// A heap's table of registered types, indexed by tag.
pub struct TypeRegistry {
    table: Vec<Option<Rc<TypeInfo>>>,
    next_object: u8,
    next_cons: u8,
}

impl TypeRegistry {
    /// Create a registry holding only the built-in types.
    pub fn new() -> TypeRegistry {
        let mut registry = TypeRegistry {
            table: (0..TYPE_TABLE_LEN).map(|_| None).collect(),
            next_object: OBJECT_TAGS.start,
            next_cons: CONS_TAGS.start,
        };

        registry.insert(TypeTag::NIL, "nil", None, None);
        registry.insert(TypeTag::INTEGER, "integer", None, None);

        let builtin_objects : [(&str, Option<Printer>); 5] = [
            ("object", None),
            ("exception", Some(print_exception)),
            ("symbol", Some(print_symbol)),
            ("string", Some(print_string)),
            ("lambda-form", None),
        ];
        for (name, printer) in builtin_objects {
            registry.register_object_type(name, None, printer)
                .expect("The object tag range has room for the built-in types");
        }

        for name in ["cons", "lambda-cons"] {
            registry.register_cons_type(name)
                .expect("The cons tag range has room for the built-in types");
        }

        debug_assert!(registry.get(TypeTag::LAMBDA_FORM).is_some());
        debug_assert!(registry.get(TypeTag::LAMBDA_CONS).is_some());
        registry
    }

    /// Register a new plain heap object type and return its tag.
    pub fn register_object_type(&mut self,
                                name: &str,
                                destructor: Option<Destructor>,
                                printer: Option<Printer>) -> HeapResult<TypeTag> {
        if self.next_object == OBJECT_TAGS.end {
            return Err(HeapError::TypeTagsExhausted(TypeKind::Object));
        }
        let tag = TypeTag(self.next_object);
        self.next_object += 1;
        self.insert(tag, name, destructor, printer);
        Ok(tag)
    }

    /// Register a new cons-derived type and return its tag.
    pub fn register_cons_type(&mut self, name: &str) -> HeapResult<TypeTag> {
        if self.next_cons == CONS_TAGS.end {
            return Err(HeapError::TypeTagsExhausted(TypeKind::Cons));
        }
        let tag = TypeTag(self.next_cons);
        self.next_cons += 1;
        self.insert(tag, name, None, None);
        Ok(tag)
    }

    /// Get the `TypeInfo` registered for the given tag.
    pub fn get(&self, tag: TypeTag) -> Option<&Rc<TypeInfo>> {
        self.table[tag.index()].as_ref()
    }

    /// Get the `TypeInfo` of a type every registry is created with.
    pub(crate) fn builtin(&self, tag: TypeTag) -> Rc<TypeInfo> {
        self.get(tag)
            .expect("Built-in types are registered when the registry is created")
            .clone()
    }

    /// Get the `TypeInfo` for the given tag, provided it is registered within
    /// the expected range of the tag space.
    pub fn expect_kind(&self, tag: TypeTag, kind: TypeKind) -> HeapResult<&Rc<TypeInfo>> {
        match self.get(tag) {
            Some(info) if tag.kind() == kind => Ok(info),
            _                                => Err(HeapError::UnknownType(tag, kind)),
        }
    }

    fn insert(&mut self,
              tag: TypeTag,
              name: &str,
              destructor: Option<Destructor>,
              printer: Option<Printer>) {
        self.table[tag.index()] = Some(Rc::new(TypeInfo {
            tag: tag,
            name: name.to_string(),
            destructor: destructor,
            printer: printer,
        }));
    }
}

impl Default for TypeRegistry {
    fn default() -> TypeRegistry {
        TypeRegistry::new()
    }
}

/// The payload of a built-in exception object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exception {
    pub message: String,
}

fn print_symbol(payload: &dyn Any, w: &mut dyn fmt::Write) -> fmt::Result {
    match payload.downcast_ref::<String>() {
        Some(name) => w.write_str(name),
        None       => w.write_str("#<symbol>"),
    }
}

fn print_string(payload: &dyn Any, w: &mut dyn fmt::Write) -> fmt::Result {
    match payload.downcast_ref::<String>() {
        Some(s) => write!(w, "{:?}", s),
        None    => w.write_str("#<string>"),
    }
}

fn print_exception(payload: &dyn Any, w: &mut dyn fmt::Write) -> fmt::Result {
    match payload.downcast_ref::<Exception>() {
        Some(e) => write!(w, "#<exception: {}>", e.message),
        None    => w.write_str("#<exception>"),
    }
}

// TESTS -----------------------------------------------------------------------
