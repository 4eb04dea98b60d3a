//! Property-based tests for the reader and the engine.

#![expect(clippy::unwrap_used)] // test code OK

use proptest::prelude::*;
use purple::ast::Value;
use purple::{Interpreter, read};

// ============================================================================
// Strategies for generating test inputs
// ============================================================================

/// Strategy for symbols that can never read as numbers, booleans or pragmas
fn arb_symbol() -> impl Strategy<Value = Value> {
    "[a-z][a-z0-9?!*<>=-]{0,8}".prop_map(Value::symbol)
}

/// Strategy for string contents, including characters that need escaping
fn arb_string() -> impl Strategy<Value = Value> {
    "[a-zA-Z0-9 \"\\\\\n\t]{0,12}".prop_map(Value::string)
}

/// Strategy for arbitrary data built from integers, booleans, strings,
/// symbols and nested lists
fn arb_datum() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::number),
        any::<bool>().prop_map(Value::boolean),
        arb_string(),
        arb_symbol(),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Value::list)
    })
}

fn eval_one(interp: &mut Interpreter, text: &str) -> Value {
    interp.eval_str(text).unwrap().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn printed_data_reads_back(datum in arb_datum()) {
        let text = datum.to_string();
        let forms = read(&text).unwrap();
        prop_assert_eq!(forms.len(), 1);
        prop_assert_eq!(&forms[0], &datum);
    }

    #[test]
    fn quote_returns_its_operand(datum in arb_datum()) {
        let mut interp = Interpreter::new();
        prop_assert_eq!(eval_one(&mut interp, &format!("(quote {datum})")), datum.clone());
        prop_assert_eq!(eval_one(&mut interp, &format!("'{datum}")), datum);
    }

    #[test]
    fn integer_arithmetic_agrees_with_rust(a in -100_000i64..100_000, b in -100_000i64..100_000) {
        let mut interp = Interpreter::new();
        prop_assert_eq!(eval_one(&mut interp, &format!("(+ {a} {b})")), Value::number(a + b));
        prop_assert_eq!(eval_one(&mut interp, &format!("(- {a} {b})")), Value::number(a - b));
        prop_assert_eq!(eval_one(&mut interp, &format!("(* {a} {b})")), Value::number(a * b));
        prop_assert_eq!(eval_one(&mut interp, &format!("(< {a} {b})")), Value::boolean(a < b));
        prop_assert_eq!(eval_one(&mut interp, &format!("(= {a} {b})")), Value::boolean(a == b));
    }

    #[test]
    fn exact_division_stays_integral(q in -1000i64..1000, d in 1i64..1000) {
        let mut interp = Interpreter::new();
        let n = q * d;
        prop_assert_eq!(eval_one(&mut interp, &format!("(/ {n} {d})")), Value::number(q));
    }

    #[test]
    fn continuation_reenters_for_every_argument(
        base in -1000i64..1000,
        args in prop::collection::vec(-1000i64..1000, 1..8),
    ) {
        let mut interp = Interpreter::new();
        interp.eval_str("(define k #f)").unwrap();
        let first = eval_one(
            &mut interp,
            &format!("(+ {base} (call/cc (lambda (c) (set! k c) 0)))"),
        );
        prop_assert_eq!(first, Value::number(base));

        for arg in args {
            prop_assert_eq!(eval_one(&mut interp, &format!("(k {arg})")), Value::number(base + arg));
        }
    }
}
