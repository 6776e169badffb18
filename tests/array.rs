// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of gsl-parser-rust, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! End-to-end array dispatch scenarios: `[…]` children inside records, in
//! both the atomic and the record-item shape.

use std::cell::{Cell, RefCell};

use assert_matches::assert_matches;
use gsl_parser::{parse_task, Action, ErrorKind, FieldSpec, Flavor, ListSpec, ParseError};

#[test]
fn atomic_array_allocates_each_item_in_order() {
    let groups = RefCell::new(Vec::new());
    let mut alloc = |atom: &[u8], index: usize| -> Result<(), ErrorKind> {
        groups.borrow_mut().push((atom.to_vec(), index));
        Ok(())
    };
    let mut inner = [FieldSpec::named(
        b"groups",
        Flavor::GetArray,
        Action::List(ListSpec {
            alloc: &mut alloc,
            parse: None,
            append: None,
        }),
    )];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    let rec = b"{user [groups a b c]}";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
    drop(specs);
    assert_eq!(
        groups.into_inner(),
        vec![
            (b"a".to_vec(), 0),
            (b"b".to_vec(), 1),
            (b"c".to_vec(), 2),
        ]
    );
}

#[test]
fn record_array_runs_the_alloc_parse_append_protocol() {
    let pets = RefCell::new(Vec::<Vec<u8>>::new());
    let appended = Cell::new(0usize);
    let mut alloc = |atom: &[u8], _: usize| -> Result<(), ErrorKind> {
        assert!(atom.is_empty());
        pets.borrow_mut().push(Vec::new());
        Ok(())
    };
    let mut parse_item = |rest: &[u8]| -> Result<usize, ParseError> {
        let mut set = |val: Option<&[u8]>| -> Result<(), ErrorKind> {
            *pets.borrow_mut().last_mut().expect("item allocated") =
                val.expect("pet name").to_vec();
            Ok(())
        };
        let mut specs = [FieldSpec::implied(Action::Run(&mut set))];
        parse_task(rest, &mut specs)
    };
    let mut append = || -> Result<(), ErrorKind> {
        appended.set(appended.get() + 1);
        Ok(())
    };
    let mut inner = [FieldSpec::named(
        b"pets",
        Flavor::GetArray,
        Action::List(ListSpec {
            alloc: &mut alloc,
            parse: Some(&mut parse_item),
            append: Some(&mut append),
        }),
    )];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    let rec = b"{user [pets {Tom} {Rex}]}";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
    drop(specs);
    assert_eq!(appended.get(), 2);
    assert_eq!(pets.into_inner(), vec![b"Tom".to_vec(), b"Rex".to_vec()]);
}

#[test]
fn arrays_are_permitted_inside_set_records() {
    let groups = RefCell::new(Vec::new());
    let mut alloc = |atom: &[u8], _: usize| -> Result<(), ErrorKind> {
        groups.borrow_mut().push(atom.to_vec());
        Ok(())
    };
    let mut inner = [FieldSpec::named(
        b"groups",
        Flavor::SetArray,
        Action::List(ListSpec {
            alloc: &mut alloc,
            parse: None,
            append: None,
        }),
    )];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::SetRecord,
        Action::Parse(&mut parse_user),
    )];
    let rec = b"(user [groups wheel adm])";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
    drop(specs);
    assert_eq!(groups.into_inner(), vec![b"wheel".to_vec(), b"adm".to_vec()]);
}

#[test]
fn array_flavors_share_one_namespace() {
    // A set-array spec still matches inside a get record: the `[` opener
    // carries no get/set world of its own.
    let hits = Cell::new(0usize);
    let mut alloc = |_: &[u8], _: usize| -> Result<(), ErrorKind> {
        hits.set(hits.get() + 1);
        Ok(())
    };
    let mut inner = [FieldSpec::named(
        b"groups",
        Flavor::SetArray,
        Action::List(ListSpec {
            alloc: &mut alloc,
            parse: None,
            append: None,
        }),
    )];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    let rec = b"{user [groups a]}";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
    drop(specs);
    assert_eq!(hits.get(), 1);
}

fn sink_table<'a>(alloc: &'a mut gsl_parser::AllocFn<'a>) -> [FieldSpec<'a>; 1] {
    [FieldSpec::named(
        b"groups",
        Flavor::GetArray,
        Action::List(ListSpec {
            alloc,
            parse: None,
            append: None,
        }),
    )]
}

#[test]
fn array_tag_errors_are_detected() {
    let mut alloc = |_: &[u8], _: usize| -> Result<(), ErrorKind> { Ok(()) };
    let mut inner = sink_table(&mut alloc);
    let mut parse_user = |rest: &[u8]| {
        for spec in inner.iter_mut() {
            spec.completed = false;
        }
        parse_task(rest, &mut inner)
    };
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];

    // Tag with no separator before the closing bracket.
    assert_matches!(
        parse_task(b"{user [groups]}", &mut specs),
        Err(e) if e.kind == ErrorKind::Format
    );
    // Empty tag.
    specs[0].completed = false;
    assert_matches!(
        parse_task(b"{user []}", &mut specs),
        Err(e) if e.kind == ErrorKind::Format
    );
    // Unknown tag.
    specs[0].completed = false;
    assert_matches!(
        parse_task(b"{user [grp a]}", &mut specs),
        Err(e) if e.kind == ErrorKind::NoMatch
    );
    // Zero items are fine once the tag is separated.
    specs[0].completed = false;
    let rec = b"{user [groups ]}";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
}

#[test]
fn array_body_errors_are_detected() {
    let mut alloc = |_: &[u8], _: usize| -> Result<(), ErrorKind> { Ok(()) };
    let mut inner = sink_table(&mut alloc);
    let mut parse_user = |rest: &[u8]| {
        for spec in inner.iter_mut() {
            spec.completed = false;
        }
        parse_task(rest, &mut inner)
    };
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];

    // A record item inside an atomic array.
    assert_matches!(
        parse_task(b"{user [groups {a}]}", &mut specs),
        Err(e) if e.kind == ErrorKind::Format
    );
    // End of input before the closing bracket.
    specs[0].completed = false;
    assert_matches!(
        parse_task(b"{user [groups a b", &mut specs),
        Err(e) if e.kind == ErrorKind::Format && e.at == 17
    );
}

#[test]
fn duplicate_array_fields_are_rejected() {
    let mut alloc = |_: &[u8], _: usize| -> Result<(), ErrorKind> { Ok(()) };
    let mut inner = sink_table(&mut alloc);
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    assert_matches!(
        parse_task(b"{user [groups a] [groups b]}", &mut specs),
        Err(e) if e.kind == ErrorKind::Exists
    );
}

#[test]
fn mismatched_item_closer_is_malformed() {
    let pets = RefCell::new(Vec::<Vec<u8>>::new());
    let mut alloc = |_: &[u8], _: usize| -> Result<(), ErrorKind> {
        pets.borrow_mut().push(Vec::new());
        Ok(())
    };
    let mut parse_item = |rest: &[u8]| -> Result<usize, ParseError> {
        let mut set = |val: Option<&[u8]>| -> Result<(), ErrorKind> {
            *pets.borrow_mut().last_mut().expect("item allocated") =
                val.expect("pet name").to_vec();
            Ok(())
        };
        let mut specs = [FieldSpec::implied(Action::Run(&mut set))];
        parse_task(rest, &mut specs)
    };
    let mut append = || -> Result<(), ErrorKind> { Ok(()) };
    let mut inner = [FieldSpec::named(
        b"pets",
        Flavor::GetArray,
        Action::List(ListSpec {
            alloc: &mut alloc,
            parse: Some(&mut parse_item),
            append: Some(&mut append),
        }),
    )];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    assert_matches!(
        parse_task(b"{user [pets {Tom)]}", &mut specs),
        Err(e) if e.kind == ErrorKind::Format
    );
}

#[test]
fn implied_value_fires_before_the_array() {
    let order = RefCell::new(Vec::new());
    let mut set_name = |val: Option<&[u8]>| -> Result<(), ErrorKind> {
        order
            .borrow_mut()
            .push(format!("implied:{}", String::from_utf8_lossy(val.unwrap())));
        Ok(())
    };
    let mut alloc = |atom: &[u8], _: usize| -> Result<(), ErrorKind> {
        order
            .borrow_mut()
            .push(format!("item:{}", String::from_utf8_lossy(atom)));
        Ok(())
    };
    let mut inner = [
        FieldSpec::implied(Action::Run(&mut set_name)),
        FieldSpec::named(
            b"groups",
            Flavor::GetArray,
            Action::List(ListSpec {
                alloc: &mut alloc,
                parse: None,
                append: None,
            }),
        ),
    ];
    let mut parse_user = |rest: &[u8]| parse_task(rest, &mut inner);
    let mut specs = [FieldSpec::named(
        b"user",
        Flavor::GetRecord,
        Action::Parse(&mut parse_user),
    )];
    let rec = b"{user John [groups a b]}";
    assert_eq!(parse_task(rec, &mut specs), Ok(rec.len()));
    drop(specs);
    assert_eq!(order.into_inner(), vec!["implied:John", "item:a", "item:b"]);
}
