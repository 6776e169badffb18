// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::fmt::{self, Debug, Formatter};

use bstr::ByteSlice;
use log::warn;

use crate::error::{ErrorKind, PResult, ParseError};

/// Which bracket world a spec matches.
///
/// Record flavors match `{…}` and `(…)` children; array flavors match `[…]`
/// children. The get/set axis of an array spec is not observable from the
/// `[` opener, so array tags resolve against either array flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flavor {
    GetRecord,
    SetRecord,
    GetArray,
    SetArray,
}

impl Flavor {
    #[inline(always)]
    pub fn is_array(self) -> bool {
        matches!(self, Flavor::GetArray | Flavor::SetArray)
    }
}

/// How a spec participates in matching, beyond its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Plain named field.
    Field,
    /// Accepts the record's leading unnamed value. May also carry a name, in
    /// which case it matches as an ordinary field too.
    Implied,
    /// Fires at record end when no non-selector spec has fired. Unnamed.
    Default,
    /// Catch-all for tags no named spec matches. Unnamed, one per flavor.
    Validator,
}

/// Callback fired with a terminal or implied value, or with `None` when the
/// spec fires as the record's default.
pub type RunFn<'a> = dyn FnMut(Option<&[u8]>) -> Result<(), ErrorKind> + 'a;

/// Callback re-entering the parser on a sub-record. Receives the bytes from
/// the child's tag terminator onward and returns the count consumed up to
/// (not including) the child's closing brace.
pub type ParseFn<'a> = dyn FnMut(&[u8]) -> Result<usize, ParseError> + 'a;

/// Like [`ParseFn`], with the unmatched tag prepended.
pub type ValidateFn<'a> = dyn FnMut(&[u8], &[u8]) -> Result<usize, ParseError> + 'a;

/// Creates the array item at the given index. Atomic arrays receive the item
/// bytes; record arrays receive an empty slice.
pub type AllocFn<'a> = dyn FnMut(&[u8], usize) -> Result<(), ErrorKind> + 'a;

/// Finalizes the most recently allocated item after its sub-record parsed.
pub type AppendFn<'a> = dyn FnMut() -> Result<(), ErrorKind> + 'a;

/// The per-item protocol of a `[…]` array.
///
/// The array is *atomic* iff `parse` is absent: its body is then
/// whitespace-separated atoms, each handed to `alloc`. With `parse` present
/// the body is `{…}` sub-records: `alloc` creates the item, `parse` fills it,
/// `append` commits it.
pub struct ListSpec<'a> {
    pub alloc: &'a mut AllocFn<'a>,
    pub parse: Option<&'a mut ParseFn<'a>>,
    pub append: Option<&'a mut AppendFn<'a>>,
}

/// Exactly one action per spec.
pub enum Action<'a> {
    /// Copy the terminal atom into a caller-owned region. Capacity is
    /// `buf.len()`; the length slot must start at zero.
    Buf {
        buf: &'a mut [u8],
        len: &'a mut usize,
    },
    /// Invoke a callback with the atom bytes.
    Run(&'a mut RunFn<'a>),
    /// Re-enter the dispatcher on a sub-record.
    Parse(&'a mut ParseFn<'a>),
    /// Catch-all dispatch carrying the unmatched tag.
    Validate(&'a mut ValidateFn<'a>),
    /// Array item protocol.
    List(ListSpec<'a>),
}

/// One expected construct: a name, a bracket world, a role, and the action
/// to take when the construct is encountered.
///
/// The table is immutable input except for the `completed` latch, which the
/// dispatcher sets when the spec fires. Re-using a table across parse calls
/// requires resetting every latch; a latched spec fails the self-check.
pub struct FieldSpec<'a> {
    pub flavor: Flavor,
    pub name: Option<&'a [u8]>,
    pub role: Role,
    /// Satisfies the parser without suppressing the default.
    pub selector: bool,
    pub action: Action<'a>,
    pub completed: bool,
}

impl<'a> FieldSpec<'a> {
    /// A named field spec.
    pub fn named(name: &'a [u8], flavor: Flavor, action: Action<'a>) -> Self {
        FieldSpec {
            flavor,
            name: Some(name),
            role: Role::Field,
            selector: false,
            action,
            completed: false,
        }
    }

    /// An unnamed spec accepting the record's leading value.
    pub fn implied(action: Action<'a>) -> Self {
        FieldSpec {
            flavor: Flavor::GetRecord,
            name: None,
            role: Role::Implied,
            selector: false,
            action,
            completed: false,
        }
    }

    /// An implied spec that also matches as a named field.
    pub fn named_implied(name: &'a [u8], flavor: Flavor, action: Action<'a>) -> Self {
        FieldSpec {
            flavor,
            name: Some(name),
            role: Role::Implied,
            selector: false,
            action,
            completed: false,
        }
    }

    /// The record's default: fires with `None` when nothing non-selector did.
    pub fn default_run(run: &'a mut RunFn<'a>) -> Self {
        FieldSpec {
            flavor: Flavor::GetRecord,
            name: None,
            role: Role::Default,
            selector: false,
            action: Action::Run(run),
            completed: false,
        }
    }

    /// The catch-all for unmatched tags of one record flavor.
    pub fn validator(flavor: Flavor, validate: &'a mut ValidateFn<'a>) -> Self {
        FieldSpec {
            flavor,
            name: None,
            role: Role::Validator,
            selector: false,
            action: Action::Validate(validate),
            completed: false,
        }
    }

    /// An unnamed item spec, for handing straight to
    /// [`parse_array`](crate::parse_array).
    pub fn item(hooks: ListSpec<'a>) -> Self {
        FieldSpec {
            flavor: Flavor::GetArray,
            name: None,
            role: Role::Field,
            selector: false,
            action: Action::List(hooks),
            completed: false,
        }
    }

}

/// Finds the spec for a tag in the given bracket world: named match first,
/// then the world's validator, if any.
pub(crate) fn find(specs: &[FieldSpec<'_>], tag: &[u8], flavor: Flavor) -> Option<usize> {
    let mut validator = None;
    for (i, spec) in specs.iter().enumerate() {
        if spec.flavor != flavor {
            continue;
        }
        match spec.role {
            Role::Validator => validator = Some(i),
            Role::Field | Role::Implied if spec.name == Some(tag) => return Some(i),
            _ => {}
        }
    }
    validator
}

/// Finds the named array spec for a tag. Array flavors share one namespace
/// and have no validator fallback.
pub(crate) fn find_array(specs: &[FieldSpec<'_>], tag: &[u8]) -> Option<usize> {
    specs
        .iter()
        .position(|spec| spec.flavor.is_array() && spec.role == Role::Field && spec.name == Some(tag))
}

/// Finds the table's implied spec.
pub(crate) fn find_implied(specs: &[FieldSpec<'_>]) -> Option<usize> {
    specs.iter().position(|spec| spec.role == Role::Implied)
}

/// Validates a whole spec table before any input byte is consumed.
/// Violations are programmer errors and surface as `Format` at offset 0.
pub(crate) fn check(specs: &[FieldSpec<'_>]) -> PResult<()> {
    let mut implied = 0usize;
    let mut defaults = 0usize;
    let mut validators = [0usize; 2];
    for spec in specs {
        check_one(spec)?;
        match spec.role {
            Role::Implied => implied += 1,
            Role::Default => defaults += 1,
            Role::Validator => validators[(spec.flavor == Flavor::SetRecord) as usize] += 1,
            Role::Field => {}
        }
    }
    if implied > 1 || defaults > 1 || validators.iter().any(|&n| n > 1) {
        warn!("spec table declares a duplicate implied, default, or validator spec");
        return Err(ParseError::new(ErrorKind::Format, 0));
    }
    Ok(())
}

/// Validates a single spec.
pub(crate) fn check_one(spec: &FieldSpec<'_>) -> PResult<()> {
    let bad = |reason: &str| {
        warn!(
            "bad spec {:?}: {}",
            spec.name.unwrap_or_default().as_bstr(),
            reason
        );
        ParseError::new(ErrorKind::Format, 0)
    };

    if spec.completed {
        return Err(bad("completed latch not reset"));
    }
    if spec.name.is_some_and(<[u8]>::is_empty) {
        return Err(bad("empty name"));
    }

    match spec.role {
        Role::Field if spec.flavor.is_array() => {
            // Name may be absent: an unnamed item spec is handed straight to
            // parse_array.
            if !matches!(spec.action, Action::List(_)) {
                return Err(bad("array spec without a list action"));
            }
            if spec.selector {
                return Err(bad("array spec marked selector"));
            }
        }
        Role::Field => {
            if spec.name.is_none() {
                return Err(bad("named field spec without a name"));
            }
            if !matches!(spec.action, Action::Buf { .. } | Action::Run(_) | Action::Parse(_)) {
                return Err(bad("field action must be buf, run, or parse"));
            }
        }
        Role::Implied => {
            if !matches!(spec.action, Action::Buf { .. } | Action::Run(_)) {
                return Err(bad("implied action must be buf or run"));
            }
            if spec.name.is_some() && spec.flavor.is_array() {
                return Err(bad("named implied spec with an array flavor"));
            }
        }
        Role::Default => {
            if spec.name.is_some() || spec.selector {
                return Err(bad("default spec must be unnamed and non-selector"));
            }
            // A default has no bracket world of its own; it keeps the
            // canonical flavor the constructor sets.
            if spec.flavor != Flavor::GetRecord {
                return Err(bad("default spec must use the canonical flavor"));
            }
            if !matches!(spec.action, Action::Run(_)) {
                return Err(bad("default action must be run"));
            }
        }
        Role::Validator => {
            if spec.name.is_some() || spec.selector {
                return Err(bad("validator spec must be unnamed and non-selector"));
            }
            if spec.flavor.is_array() {
                return Err(bad("validator spec with an array flavor"));
            }
            if !matches!(spec.action, Action::Validate(_)) {
                return Err(bad("validator action must be validate"));
            }
        }
    }

    match &spec.action {
        Action::Buf { buf, len } => {
            if buf.is_empty() {
                return Err(bad("buffer with zero capacity"));
            }
            if **len != 0 {
                return Err(bad("buffer length slot not zero"));
            }
        }
        Action::List(hooks) => {
            if hooks.parse.is_some() != hooks.append.is_some() {
                return Err(bad("list parse and append must be paired"));
            }
        }
        _ => {}
    }

    Ok(())
}

impl Debug for Action<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buf { buf, len } => f
                .debug_struct("Buf")
                .field("capacity", &buf.len())
                .field("len", len)
                .finish(),
            Action::Run(_) => f.write_str("Run"),
            Action::Parse(_) => f.write_str("Parse"),
            Action::Validate(_) => f.write_str("Validate"),
            Action::List(hooks) => f
                .debug_struct("List")
                .field("atomic", &hooks.parse.is_none())
                .finish(),
        }
    }
}

impl Debug for FieldSpec<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("flavor", &self.flavor)
            .field("name", &self.name.map(ByteSlice::as_bstr))
            .field("role", &self.role)
            .field("selector", &self.selector)
            .field("action", &self.action)
            .field("completed", &self.completed)
            .finish()
    }
}
