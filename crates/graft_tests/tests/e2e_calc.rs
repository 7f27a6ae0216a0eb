//! E2E Tests: calc
//!
//! Arithmetic, precedence, comparisons, boolean logic, ternaries, and
//! the int/float coercion rules.

mod common;

use common::{evaluate, evaluate_err, get, get_int, get_str};
use graft_tree::Value;

#[test]
fn e2e_calc_precedence() {
    let tree = evaluate(&["x: (( calc 2 + 3 * 4 ))\n"]);
    assert_eq!(get_int(&tree, "x"), 14);
}

#[test]
fn e2e_calc_grouping() {
    let tree = evaluate(&["x: (( calc (2 + 3) * 4 ))\n"]);
    assert_eq!(get_int(&tree, "x"), 20);
}

#[test]
fn e2e_calc_left_associativity() {
    let tree = evaluate(&["x: (( calc 10 - 5 - 2 ))\n"]);
    assert_eq!(get_int(&tree, "x"), 3);
}

#[test]
fn e2e_calc_integer_division_stays_integral_when_exact() {
    let tree = evaluate(&["a: (( calc 10 / 2 ))\nb: (( calc 7 / 2 ))\n"]);
    assert_eq!(get(&tree, "a"), Value::Int(5));
    assert_eq!(get(&tree, "b"), Value::Float(3.5));
}

#[test]
fn e2e_calc_float_widening() {
    let tree = evaluate(&["x: (( calc 1 + 0.5 ))\n"]);
    assert_eq!(get(&tree, "x"), Value::Float(1.5));
}

#[test]
fn e2e_calc_modulo() {
    let tree = evaluate(&["x: (( calc 7 % 3 ))\n"]);
    assert_eq!(get_int(&tree, "x"), 1);
}

#[test]
fn e2e_calc_division_by_zero_fails() {
    let errors = evaluate_err(&["x: (( calc 1 / 0 ))\n"]);
    assert!(errors.to_string().contains("division by zero"));
}

#[test]
fn e2e_calc_references() {
    let tree = evaluate(&["cpus: 4\nworkers: (( calc cpus * 2 + 1 ))\n"]);
    assert_eq!(get_int(&tree, "workers"), 9);
}

#[test]
fn e2e_calc_comparison_and_ternary() {
    let tree = evaluate(&[
        "size: 12\nplan: (( calc size >= 10 ? \"large\" : \"small\" ))\n",
    ]);
    assert_eq!(get_str(&tree, "plan"), "large");
}

#[test]
fn e2e_calc_nested_ternary_right_associative() {
    let tree = evaluate(&["n: 5\nout: (( calc n < 3 ? \"low\" : n < 7 ? \"mid\" : \"high\" ))\n"]);
    assert_eq!(get_str(&tree, "out"), "mid");
}

#[test]
fn e2e_calc_boolean_or_returns_first_truthy() {
    let tree = evaluate(&["a: 0\nb: 7\nx: (( calc a || b ))\n"]);
    assert_eq!(get_int(&tree, "x"), 7);
}

#[test]
fn e2e_calc_boolean_and() {
    let tree = evaluate(&["a: 1\nb: 7\nx: (( calc a && b ))\n"]);
    assert_eq!(get_int(&tree, "x"), 7);
}

#[test]
fn e2e_calc_negation_and_not() {
    let tree = evaluate(&["n: 3\nneg: (( calc -n ))\nflag: (( calc !n ))\n"]);
    assert_eq!(get_int(&tree, "neg"), -3);
    assert_eq!(get(&tree, "flag"), Value::Bool(false));
}

#[test]
fn e2e_calc_equality_across_int_and_float() {
    let tree = evaluate(&["x: (( calc 2 == 2.0 ))\ny: (( calc 2 != 3 ))\n"]);
    assert_eq!(get(&tree, "x"), Value::Bool(true));
    assert_eq!(get(&tree, "y"), Value::Bool(true));
}

#[test]
fn e2e_calc_quoted_expression_string() {
    let tree = evaluate(&["x: (( calc \"2 + 3 * 4\" ))\n"]);
    assert_eq!(get_int(&tree, "x"), 14);
}

#[test]
fn e2e_calc_string_arithmetic_fails() {
    let errors = evaluate_err(&["s: text\nx: (( calc s + 1 ))\n"]);
    assert!(errors.to_string().contains("$.x"));
}

#[test]
fn e2e_calc_depends_on_other_operators() {
    let tree = evaluate(&["a: (( calc 2 * 3 ))\nb: (( calc a + 1 ))\n"]);
    assert_eq!(get_int(&tree, "b"), 7);
}
