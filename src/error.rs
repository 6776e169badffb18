// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use thiserror::Error;

pub(crate) type PResult<T> = Result<T, ParseError>;

/// Bit set on every numeric code carrying a callback-supplied error.
const EXTERNAL_MASK: i32 = 0x7f00_0000;

/// A kind of error from parsing a GSL record.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required closing brace was never seen before end of input.
    #[error("incomplete input")]
    Fail,
    /// A tag, value, or buffer target exceeded its size ceiling.
    #[error("size limit exceeded")]
    Limit,
    /// No spec matched a tag or an implied value, or a record closed with
    /// nothing fired and no default spec to fall back on.
    #[error("no matching spec")]
    NoMatch,
    /// Structural violation: empty tag, mismatched brace, brace inside an
    /// atom, empty terminal value, stray byte in an array body.
    #[error("malformed input")]
    Format,
    /// A non-validator spec fired twice in one record.
    #[error("duplicate field")]
    Exists,
    /// A callback's own error, passed through unchanged.
    #[error("callback error {0}")]
    External(i32),
}

impl ErrorKind {
    /// The numeric wire code for this kind. `0` is reserved for success;
    /// external codes are flagged with the high mask bits.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Fail => 1,
            ErrorKind::Limit => 2,
            ErrorKind::NoMatch => 3,
            ErrorKind::Format => 4,
            ErrorKind::Exists => 5,
            ErrorKind::External(code) => EXTERNAL_MASK | code,
        }
    }

    /// Whether this kind carries a callback-supplied code.
    pub fn is_external(self) -> bool {
        matches!(self, ErrorKind::External(_))
    }
}

/// An error from parsing a GSL record, positioned at the offending byte.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
#[error("{kind} at byte {at}")]
pub struct ParseError {
    pub kind: ErrorKind,
    /// Byte offset of the offending token within the parsed slice. For
    /// `Limit` this is the first byte of the over-limit span; for `Fail` it
    /// is the end of input.
    pub at: usize,
}

impl ParseError {
    #[inline]
    pub fn new(kind: ErrorKind, at: usize) -> Self {
        ParseError { kind, at }
    }

    /// Rebases the offset of an error returned by a nested parse, which is
    /// relative to the slice the callback was handed.
    #[inline]
    pub(crate) fn shift(mut self, base: usize) -> Self {
        self.at += base;
        self
    }
}
