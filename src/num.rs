// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use bstr::ByteSlice;
use log::{debug, warn};

use crate::error::{ErrorKind, PResult};
use crate::parse::{parse_task, preview};
use crate::spec::{Action, FieldSpec};

const ENCODE_BASE: usize = 10;

/// Parses a record whose implied value is a base-10 unsigned size quantity
/// and stores it in `out`.
///
/// Built entirely on the dispatcher: one implied-run spec takes the value
/// bytes. A value not starting with a digit, or carrying trailing junk, is
/// `Format`; overflow of `usize` is `Limit`. The returned count follows the
/// [`parse_task`] convention.
pub fn parse_size(out: &mut usize, rec: &[u8]) -> PResult<usize> {
    debug!("parse size quantity: {:?}", preview(rec).as_bstr());
    let mut run = |val: Option<&[u8]>| -> Result<(), ErrorKind> {
        let Some(val) = val else {
            return Err(ErrorKind::Format);
        };
        *out = digits(val)?;
        Ok(())
    };
    let mut specs = [FieldSpec::implied(Action::Run(&mut run))];
    parse_task(rec, &mut specs)
}

fn digits(val: &[u8]) -> Result<usize, ErrorKind> {
    if !val.first().is_some_and(u8::is_ascii_digit) {
        warn!("size quantity does not start with a digit: {:?}", val.as_bstr());
        return Err(ErrorKind::Format);
    }
    let mut num = 0usize;
    for &byte in val {
        if !byte.is_ascii_digit() {
            warn!("trailing bytes in size quantity: {:?}", val.as_bstr());
            return Err(ErrorKind::Format);
        }
        num = num
            .checked_mul(ENCODE_BASE)
            .and_then(|n| n.checked_add(usize::from(byte - b'0')))
            .ok_or_else(|| {
                warn!("size quantity overflows: {:?}", val.as_bstr());
                ErrorKind::Limit
            })?;
    }
    Ok(num)
}
