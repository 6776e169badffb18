// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use bstr::ByteSlice;
use log::{debug, warn};

use crate::array;
use crate::error::{ErrorKind, PResult, ParseError};
use crate::spec::{self, Action, FieldSpec, Flavor, Role};
use crate::NAME_SIZE;

/// Parses one record body against a spec table, firing each matched spec's
/// action in place.
///
/// `rec` starts at the first byte after the record's opening brace, or at the
/// top level for an unenclosed root. On success the returned count is the
/// offset of the closing brace that terminated the record, which is shared
/// with the caller: the caller checks its kind and steps past it. A root that
/// ran to end of input consumes the whole buffer.
///
/// The dispatcher mutates only the `completed` latches of `specs`; re-using a
/// table requires resetting them.
pub fn parse_task(rec: &[u8], specs: &mut [FieldSpec<'_>]) -> PResult<usize> {
    spec::check(specs)?;
    debug!(
        "parse record: {:?} ({} specs)",
        preview(rec).as_bstr(),
        specs.len()
    );
    TaskParser {
        rec,
        specs,
        implied_done: false,
    }
    .run()
}

/// Which record world the current child opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Enclosure {
    Get,
    Set,
}

impl Enclosure {
    #[inline(always)]
    fn from_opener(byte: u8) -> Self {
        if byte == b'(' {
            Enclosure::Set
        } else {
            Enclosure::Get
        }
    }

    #[inline(always)]
    fn opener(self) -> u8 {
        match self {
            Enclosure::Get => b'{',
            Enclosure::Set => b'(',
        }
    }

    #[inline(always)]
    fn closer(self) -> u8 {
        match self {
            Enclosure::Get => b'}',
            Enclosure::Set => b')',
        }
    }

    #[inline(always)]
    fn flavor(self) -> Flavor {
        match self {
            Enclosure::Get => Flavor::GetRecord,
            Enclosure::Set => Flavor::SetRecord,
        }
    }
}

/// Cursor state. `Tag` and `Terminal` carry the kind of the open child;
/// `Terminal` also pins the spec the tag resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    OutOfField,
    Tag(Enclosure),
    Terminal(Enclosure, usize),
}

/// Outcome of resolving a completed tag.
enum Dispatch {
    /// A parse or validate action ran; the cursor moves past the child.
    Consumed(usize),
    /// The spec is terminal; its atom follows.
    Terminal(usize),
}

struct TaskParser<'r, 's, 'f> {
    rec: &'r [u8],
    specs: &'s mut [FieldSpec<'f>],
    /// Set once the record's implied value has fired.
    implied_done: bool,
}

impl TaskParser<'_, '_, '_> {
    fn run(&mut self) -> PResult<usize> {
        let rec = self.rec;
        let mut state = State::OutOfField;
        // Start and end of the pending implied run.
        let mut implied: Option<(usize, usize)> = None;
        // Start and end of the tag or atom being read.
        let (mut b, mut e) = (0usize, 0usize);
        let mut c = 0usize;

        while c < rec.len() {
            let byte = rec[c];
            match state {
                State::OutOfField => match byte {
                    b' ' | b'\t' | b'\n' | b'\r' => {}
                    b'{' | b'(' => {
                        self.flush_implied(&mut implied)?;
                        state = State::Tag(Enclosure::from_opener(byte));
                        b = c + 1;
                        e = b;
                    }
                    b'}' | b')' => {
                        self.flush_implied(&mut implied)?;
                        self.run_default(c)?;
                        return Ok(c);
                    }
                    b'[' => {
                        self.flush_implied(&mut implied)?;
                        c = self.parse_array_field(c)?;
                        continue;
                    }
                    b']' => {
                        warn!("stray ']' at field level");
                        return Err(ParseError::new(ErrorKind::Format, c));
                    }
                    _ => match &mut implied {
                        Some((_, end)) => *end = c + 1,
                        None => implied = Some((c, c + 1)),
                    },
                },
                State::Tag(enc) => match byte {
                    b'-' if e == b => {
                        c = self.skip_comment(enc, c)?;
                        state = State::OutOfField;
                        continue;
                    }
                    b' ' | b'\t' | b'\n' | b'\r' => match self.dispatch(enc, b, e, c)? {
                        Dispatch::Consumed(next) => {
                            c = next;
                            state = State::OutOfField;
                            continue;
                        }
                        Dispatch::Terminal(i) => {
                            state = State::Terminal(enc, i);
                            b = c + 1;
                            e = b;
                        }
                    },
                    b'{' | b'(' => match self.dispatch(enc, b, e, c)? {
                        Dispatch::Consumed(next) => {
                            c = next;
                            state = State::OutOfField;
                            continue;
                        }
                        Dispatch::Terminal(_) => {
                            warn!("terminal value opens a brace");
                            return Err(ParseError::new(ErrorKind::Format, c));
                        }
                    },
                    b'}' | b')' => {
                        if byte != enc.closer() {
                            warn!("closing brace does not match the field opener");
                            return Err(ParseError::new(ErrorKind::Format, c));
                        }
                        match self.dispatch(enc, b, e, c)? {
                            Dispatch::Consumed(next) => {
                                c = next;
                                state = State::OutOfField;
                                continue;
                            }
                            Dispatch::Terminal(_) => {
                                warn!("empty terminal value");
                                return Err(ParseError::new(ErrorKind::Format, c));
                            }
                        }
                    }
                    b'[' | b']' => {
                        warn!("square bracket inside a field tag");
                        return Err(ParseError::new(ErrorKind::Format, c));
                    }
                    _ => e = c + 1,
                },
                State::Terminal(enc, i) => match byte {
                    b' ' | b'\t' | b'\n' | b'\r' => {
                        // Leading whitespace is skipped, interior preserved.
                        if e == b {
                            b = c + 1;
                            e = b;
                        }
                    }
                    b'{' | b'(' | b'[' | b']' => {
                        warn!("brace inside a terminal value");
                        return Err(ParseError::new(ErrorKind::Format, c));
                    }
                    b'}' | b')' => {
                        if byte != enc.closer() {
                            warn!("closing brace does not match the field opener");
                            return Err(ParseError::new(ErrorKind::Format, c));
                        }
                        self.fire_terminal(i, b, e, c)?;
                        state = State::OutOfField;
                    }
                    _ => e = c + 1,
                },
            }
            c += 1;
        }

        match state {
            State::OutOfField => {
                if implied.is_some() {
                    self.flush_implied(&mut implied)?;
                    self.run_default(rec.len())?;
                }
                Ok(rec.len())
            }
            State::Tag(_) | State::Terminal(..) => {
                warn!("input ended inside a field");
                Err(ParseError::new(ErrorKind::Format, rec.len()))
            }
        }
    }

    /// Resolves a completed tag and runs its action. `c` is the tag
    /// terminator; parse and validate callbacks receive the buffer from `c`
    /// onward.
    fn dispatch(&mut self, enc: Enclosure, b: usize, e: usize, c: usize) -> PResult<Dispatch> {
        let rec = self.rec;
        let tag = &rec[b..e];
        if tag.is_empty() {
            warn!("empty field tag");
            return Err(ParseError::new(ErrorKind::Format, b));
        }
        if tag.len() > NAME_SIZE {
            warn!("field tag too large: {} bytes", tag.len());
            return Err(ParseError::new(ErrorKind::Limit, b));
        }
        let Some(i) = spec::find(self.specs, tag, enc.flavor()) else {
            warn!("no spec for tag {:?}", tag.as_bstr());
            return Err(ParseError::new(ErrorKind::NoMatch, b));
        };
        if self.specs[i].completed && self.specs[i].role != Role::Validator {
            warn!("duplicate field {:?}", tag.as_bstr());
            return Err(ParseError::new(ErrorKind::Exists, b));
        }
        debug!("tag {:?} matched spec {}", tag.as_bstr(), i);
        let used = match &mut self.specs[i].action {
            Action::Validate(validate) => {
                validate(tag, &rec[c..]).map_err(|err| err.shift(c))?
            }
            Action::Parse(parse) => parse(&rec[c..]).map_err(|err| err.shift(c))?,
            Action::Buf { .. } | Action::Run(_) => return Ok(Dispatch::Terminal(i)),
            // Array specs never match a record-flavored lookup.
            Action::List(_) => return Err(ParseError::new(ErrorKind::Format, b)),
        };
        let next = self.expect_closer(c + used, enc)?;
        self.specs[i].completed = true;
        Ok(Dispatch::Consumed(next))
    }

    /// Verifies the shared closing brace a child's action stopped at, and
    /// steps past it.
    fn expect_closer(&self, at: usize, enc: Enclosure) -> PResult<usize> {
        match self.rec.get(at) {
            None => {
                warn!("record never closed");
                Err(ParseError::new(ErrorKind::Fail, self.rec.len()))
            }
            Some(&byte) if byte == enc.closer() => Ok(at + 1),
            Some(&byte) => {
                warn!("expected {:?}, found {:?}", enc.closer() as char, byte as char);
                Err(ParseError::new(ErrorKind::Format, at))
            }
        }
    }

    /// Fires the pending implied run, if any.
    fn flush_implied(&mut self, implied: &mut Option<(usize, usize)>) -> PResult<()> {
        let Some((b, e)) = implied.take() else {
            return Ok(());
        };
        let rec = self.rec;
        let val = &rec[b..e];
        debug!("implied value {:?}", val.as_bstr());
        if self.implied_done {
            warn!("second implied value in one record");
            return Err(ParseError::new(ErrorKind::Format, b));
        }
        self.implied_done = true;
        if val.len() > NAME_SIZE {
            warn!("implied value too large: {} bytes", val.len());
            return Err(ParseError::new(ErrorKind::Limit, b));
        }
        let Some(i) = spec::find_implied(self.specs) else {
            warn!("no implied spec for value {:?}", val.as_bstr());
            return Err(ParseError::new(ErrorKind::NoMatch, b));
        };
        if self.specs[i].completed {
            return Err(ParseError::new(ErrorKind::Exists, b));
        }
        self.fire_value(i, val, b)?;
        self.specs[i].completed = true;
        Ok(())
    }

    /// Fires a terminal spec with its atom, `b..e`, ending at the closer `c`.
    fn fire_terminal(&mut self, i: usize, b: usize, e: usize, c: usize) -> PResult<()> {
        let rec = self.rec;
        let val = &rec[b..e];
        if val.is_empty() {
            warn!("empty terminal value");
            return Err(ParseError::new(ErrorKind::Format, c));
        }
        if val.len() > NAME_SIZE {
            warn!("terminal value too large: {} bytes", val.len());
            return Err(ParseError::new(ErrorKind::Limit, b));
        }
        debug!("terminal value {:?}", val.as_bstr());
        self.fire_value(i, val, b)?;
        self.specs[i].completed = true;
        Ok(())
    }

    /// Buffer copy or run callback shared by the implied and terminal paths.
    fn fire_value(&mut self, i: usize, val: &[u8], at: usize) -> PResult<()> {
        match &mut self.specs[i].action {
            Action::Buf { buf, len } => {
                if val.len() > buf.len() {
                    warn!(
                        "value {:?} over buffer capacity {}",
                        val.as_bstr(),
                        buf.len()
                    );
                    return Err(ParseError::new(ErrorKind::Limit, at));
                }
                if **len != 0 {
                    warn!("buffer already holds {} bytes", **len);
                    return Err(ParseError::new(ErrorKind::Exists, at));
                }
                buf[..val.len()].copy_from_slice(val);
                **len = val.len();
                Ok(())
            }
            Action::Run(run) => run(Some(val)).map_err(|kind| ParseError::new(kind, at)),
            // The self-check pins implied and terminal specs to buf or run.
            _ => Err(ParseError::new(ErrorKind::Format, at)),
        }
    }

    /// Runs the default check at the record closer `at`: something
    /// non-selector fired, or the default spec fires, or no match.
    fn run_default(&mut self, at: usize) -> PResult<()> {
        if self.specs.iter().any(|s| s.completed && !s.selector) {
            return Ok(());
        }
        let Some(i) = self.specs.iter().position(|s| s.role == Role::Default) else {
            warn!("nothing matched and no default spec");
            return Err(ParseError::new(ErrorKind::NoMatch, at));
        };
        debug!("running default spec");
        match &mut self.specs[i].action {
            Action::Run(run) => run(None).map_err(|kind| ParseError::new(kind, at)),
            _ => Err(ParseError::new(ErrorKind::Format, at)),
        }
    }

    /// Skips a comment field. `from` is at the `-` that opened it; the
    /// enclosing brace is already open, so the scan starts one deep and ends
    /// past the matching closer of the same kind. Only the single-`-` form
    /// is recognized.
    fn skip_comment(&self, enc: Enclosure, from: usize) -> PResult<usize> {
        let mut depth = 1usize;
        for pos in memchr::memchr2_iter(enc.opener(), enc.closer(), &self.rec[from..]) {
            let i = from + pos;
            if self.rec[i] == enc.opener() {
                depth += 1;
            } else {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
        }
        warn!("comment never closed");
        Err(ParseError::new(ErrorKind::Fail, self.rec.len()))
    }

    /// Parses a `[…]` child: resolves the leading tag against the table's
    /// array specs, then hands the body to the array item loop. `c` is at the
    /// `[`; the returned cursor is past the `]`.
    fn parse_array_field(&mut self, c: usize) -> PResult<usize> {
        let rec = self.rec;
        let b = c + 1;
        let mut t = b;
        while t < rec.len() && !is_ws(rec[t]) && !is_bracket(rec[t]) {
            t += 1;
        }
        let tag = &rec[b..t];
        if tag.is_empty() {
            warn!("empty array tag");
            return Err(ParseError::new(ErrorKind::Format, b));
        }
        if tag.len() > NAME_SIZE {
            warn!("array tag too large: {} bytes", tag.len());
            return Err(ParseError::new(ErrorKind::Limit, b));
        }
        match rec.get(t) {
            None => {
                warn!("array never closed");
                return Err(ParseError::new(ErrorKind::Format, rec.len()));
            }
            Some(&byte) if is_ws(byte) || byte == b'{' || byte == b'(' => {}
            Some(_) => {
                warn!("array tag not separated from its items");
                return Err(ParseError::new(ErrorKind::Format, t));
            }
        }
        let Some(i) = spec::find_array(self.specs, tag) else {
            warn!("no spec for array tag {:?}", tag.as_bstr());
            return Err(ParseError::new(ErrorKind::NoMatch, b));
        };
        if self.specs[i].completed {
            warn!("duplicate array field {:?}", tag.as_bstr());
            return Err(ParseError::new(ErrorKind::Exists, b));
        }
        let Action::List(hooks) = &mut self.specs[i].action else {
            return Err(ParseError::new(ErrorKind::Format, b));
        };
        let end = array::parse_items(rec, t, hooks)?;
        self.specs[i].completed = true;
        Ok(end + 1)
    }
}

#[inline(always)]
pub(crate) fn is_ws(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

#[inline(always)]
pub(crate) fn is_bracket(byte: u8) -> bool {
    matches!(byte, b'{' | b'}' | b'(' | b')' | b'[' | b']')
}

/// A short prefix for diagnostics.
#[inline(always)]
pub(crate) fn preview(rec: &[u8]) -> &[u8] {
    &rec[..rec.len().min(16)]
}
