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

//! The memory layer of a small Lisp runtime, in Rust: tagged cells, reference
//! counted heap objects, and cons cells sorted into tri-color zones that a
//! write barrier keeps consistent.
//!
//! Start with [`Heap`](heap/struct.Heap.html); the module documentation of
//! `heap` describes the scheme in full.

pub mod arena;
pub mod heap;
pub mod partition;
pub mod print;
pub mod roots;
pub mod types;
pub mod value;

pub use crate::heap::{Color, Heap, HeapConfig, HeapError, HeapResult, HeapStats};
pub use crate::print::print;
pub use crate::types::{TypeKind, TypeTag};
pub use crate::value::{list, list_root, Cell, ConsPtr, ObjectRef};
