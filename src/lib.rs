// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Spec-driven parser for GSL (Generic Schema Language) records.
//!
//! A GSL record is a brace-structured tree of named fields whose leaves are
//! atomic byte strings or arrays of sub-records. The parser consumes a byte
//! buffer in one forward pass, guided by a caller-supplied table of
//! [`FieldSpec`]s that declares the expected fields and the action to take on
//! each: copy into a buffer, run a callback, re-enter the parser on a
//! sub-record, or validate an unknown tag. No parse tree is materialized and
//! the dispatcher performs no heap allocation; all storage is caller-owned.

use static_assertions::const_assert;

mod array;
mod error;
mod num;
mod parse;
mod spec;

pub use array::parse_array;
pub use error::{ErrorKind, ParseError};
pub use num::parse_size;
pub use parse::parse_task;
pub use spec::{
    Action, AllocFn, AppendFn, FieldSpec, Flavor, ListSpec, ParseFn, Role, RunFn, ValidateFn,
};

/// Size ceiling for field tags, terminal atoms, implied values, and atomic
/// array items.
pub const NAME_SIZE: usize = 512;

/// Conventional capacity for short client buffers. Not enforced by the
/// dispatcher.
pub const SHORT_NAME_SIZE: usize = 64;

const_assert!(SHORT_NAME_SIZE <= NAME_SIZE);
const_assert!(NAME_SIZE > 0);
