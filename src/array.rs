// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use bstr::ByteSlice;
use log::{debug, warn};

use crate::error::{ErrorKind, PResult, ParseError};
use crate::parse::{is_bracket, is_ws, preview};
use crate::spec::{self, Action, FieldSpec, ListSpec};
use crate::NAME_SIZE;

/// Parses one `[…]` body against an item spec.
///
/// `rec` starts at the first byte after the `[`. The spec must carry a list
/// action; its `alloc`, optional `parse`, and `append` hooks define the item
/// protocol (see [`ListSpec`]). On success the returned count is the offset
/// of the `]`, which is left for the caller.
pub fn parse_array(spec: &mut FieldSpec<'_>, rec: &[u8]) -> PResult<usize> {
    spec::check_one(spec)?;
    let Action::List(hooks) = &mut spec.action else {
        warn!("parse_array needs a spec with a list action");
        return Err(ParseError::new(ErrorKind::Format, 0));
    };
    debug!("parse array body: {:?}", preview(rec).as_bstr());
    let end = parse_items(rec, 0, hooks)?;
    spec.completed = true;
    Ok(end)
}

/// The item loop, shared with the record dispatcher's `[` path. Scans from
/// `from` to the closing `]` and returns its offset.
pub(crate) fn parse_items(rec: &[u8], from: usize, hooks: &mut ListSpec<'_>) -> PResult<usize> {
    let mut i = from;
    let mut count = 0usize;
    loop {
        while i < rec.len() && is_ws(rec[i]) {
            i += 1;
        }
        let Some(&byte) = rec.get(i) else {
            warn!("array never closed");
            return Err(ParseError::new(ErrorKind::Format, rec.len()));
        };
        match byte {
            b']' => return Ok(i),
            b'{' | b'(' => {
                let Some(parse) = hooks.parse.as_mut() else {
                    warn!("record item in an atomic array");
                    return Err(ParseError::new(ErrorKind::Format, i));
                };
                (hooks.alloc)(b"", count).map_err(|kind| ParseError::new(kind, i))?;
                let used = parse(&rec[i + 1..]).map_err(|err| err.shift(i + 1))?;
                let end = i + 1 + used;
                match rec.get(end) {
                    None => {
                        warn!("array item never closed");
                        return Err(ParseError::new(ErrorKind::Fail, rec.len()));
                    }
                    Some(&close) if close == record_closer(byte) => {}
                    Some(_) => {
                        warn!("closing brace does not match the item opener");
                        return Err(ParseError::new(ErrorKind::Format, end));
                    }
                }
                if let Some(append) = hooks.append.as_mut() {
                    append().map_err(|kind| ParseError::new(kind, end))?;
                }
                debug!("array item {} appended", count);
                count += 1;
                i = end + 1;
            }
            b'}' | b')' | b'[' => {
                warn!("stray brace in array body");
                return Err(ParseError::new(ErrorKind::Format, i));
            }
            _ => {
                if hooks.parse.is_some() {
                    warn!("stray byte in record array body");
                    return Err(ParseError::new(ErrorKind::Format, i));
                }
                let b = i;
                while i < rec.len() && !is_ws(rec[i]) && !is_bracket(rec[i]) {
                    i += 1;
                }
                let atom = &rec[b..i];
                if atom.len() > NAME_SIZE {
                    warn!("array item too large: {} bytes", atom.len());
                    return Err(ParseError::new(ErrorKind::Limit, b));
                }
                debug!("array item {}: {:?}", count, atom.as_bstr());
                (hooks.alloc)(atom, count).map_err(|kind| ParseError::new(kind, b))?;
                count += 1;
            }
        }
    }
}

#[inline(always)]
fn record_closer(opener: u8) -> u8 {
    if opener == b'(' {
        b')'
    } else {
        b'}'
    }
}
