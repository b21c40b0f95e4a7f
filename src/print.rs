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

//! Printing cells' text representations.

use std::fmt;

use crate::heap::Heap;
use crate::value::Cell;

/// Lists longer than this, and nesting deeper than this, are elided with
/// `...`. Cons graphs may be cyclic.
pub const MAX_PRINT_LEN: usize = 1 << 10;

/// Print the given cell's text representation to the given writer.
pub fn print<W: fmt::Write>(heap: &Heap, cell: &Cell, writer: &mut W) -> fmt::Result {
    print_cell(heap, cell, writer, 0)
}

fn print_cell(heap: &Heap, cell: &Cell, writer: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
    match *cell {
        Cell::Nil            => write!(writer, "()"),
        Cell::Integer(i)     => write!(writer, "{}", i),
        Cell::Object(ref o)  => match o.type_info().printer() {
            Some(printer) => printer(o.payload(), writer),
            None          => write!(writer, "#<{}>", o.type_info().name()),
        },
        Cell::Cons(..)       => print_list(heap, cell, writer, depth),
    }
}

fn print_list(heap: &Heap, list: &Cell, writer: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
    if depth >= MAX_PRINT_LEN {
        return write!(writer, "(...)");
    }

    write!(writer, "(")?;
    let mut cursor = list;
    let mut printed = 0;
    while let Some(cons) = cursor.to_cons() {
        if printed == MAX_PRINT_LEN {
            return write!(writer, " ...)");
        }
        if printed > 0 {
            write!(writer, " ")?;
        }
        print_cell(heap, heap.car(cons), writer, depth + 1)?;
        printed += 1;
        cursor = heap.cdr(cons);
    }

    if !cursor.is_nil() {
        write!(writer, " . ")?;
        print_cell(heap, cursor, writer, depth + 1)?;
    }
    write!(writer, ")")
}

/// A `Display` adaptor for a cell, returned by `Heap::display`.
pub struct CellDisplay<'a> {
    heap: &'a Heap,
    cell: &'a Cell,
}

impl<'a> fmt::Display for CellDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        print(self.heap, self.cell, f)
    }
}

impl Heap {
    /// Wrap the given cell so that it can be formatted with `{}`.
    pub fn display<'a>(&'a self, cell: &'a Cell) -> CellDisplay<'a> {
        CellDisplay { heap: self, cell: cell }
    }
}

// TESTS -----------------------------------------------------------------------
