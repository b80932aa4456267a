//! Command envelope encoding, opcode classification and numeric parsing.

use labpro_lib::command::{Command, ResponseKind, parse_values};
use labpro_lib::error::LabProError;

#[test]
fn encode_without_args() {
    let command = Command::new(7, &[]);
    assert_eq!(command.encode(), "s{7}\r");
}

#[test]
fn encode_with_args() {
    let command = Command::new(3, &[5, 100, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(command.encode(), "s{3,5,100,0,0,0,0,0,0,0,0}\r");
}

#[test]
fn encode_negative_arg() {
    let command = Command::new(6, &[5, -1]);
    assert_eq!(command.encode(), "s{6,5,-1}\r");
}

#[test]
fn classification_is_fixed_per_opcode() {
    for opcode in [7, 8, 9, 10, 11, 115, 201] {
        assert_eq!(ResponseKind::of(opcode), ResponseKind::NumericVector);
    }
    for opcode in [105, 116, 117] {
        assert_eq!(ResponseKind::of(opcode), ResponseKind::Text);
    }
    for opcode in [0, 1, 3, 5, 6, 12, 104, 118, 1999] {
        assert_eq!(ResponseKind::of(opcode), ResponseKind::None);
    }
}

#[test]
fn command_kind_follows_opcode() {
    assert_eq!(Command::new(7, &[]).kind(), ResponseKind::NumericVector);
    assert_eq!(Command::new(116, &[1]).kind(), ResponseKind::Text);
    assert_eq!(Command::new(0, &[]).kind(), ResponseKind::None);
}

#[test]
fn parse_drops_trailing_empty_token() {
    let values = parse_values("{1.0,2.5,}\r\n").unwrap();
    assert_eq!(values, vec![1.0, 2.5]);
}

#[test]
fn parse_trims_braces_and_whitespace() {
    let values = parse_values("{ 7.1 },{2},{ -3.5 }\r\n").unwrap();
    assert_eq!(values, vec![7.1, 2.0, -3.5]);
}

#[test]
fn parse_empty_response_is_empty_vector() {
    assert_eq!(parse_values("").unwrap(), Vec::<f64>::new());
    assert_eq!(parse_values("{}\r\n").unwrap(), Vec::<f64>::new());
}

#[test]
fn parse_failure_names_the_token() {
    let err = parse_values("{1.0,bogus,3.0}").unwrap_err();
    match err {
        LabProError::Parse { token, .. } => assert_eq!(token, "bogus"),
        other => panic!("expected Parse error, got {other:?}"),
    }
}
