//! Stand-alone term environment scenarios: parse/printback round trips,
//! unification, and copying.

use merak::TermEnv;

#[test]
fn simple_env() {
    let mut env = TermEnv::new();

    let t = env.parse("foo(1,2*3+4+5+ +6-(-7),8).").expect("parse");
    assert_eq!(env.to_string(t), "foo(1, 2*3+4+5+ + 6- - 7, 8)");
}

#[test]
fn named_vars() {
    let mut env = TermEnv::new();

    let t = env.parse("foo(X, B, bar(Y)).").expect("parse");
    assert_eq!(env.to_string(t), "foo(X, B, bar(Y))");
}

#[test]
fn unification() {
    let mut env = TermEnv::new();

    let t1 = env.parse("foo(X, B, bar(Y)).").expect("parse");
    let t2 = env.parse("foo(baz(Q), yes, bar(B)).").expect("parse");

    assert!(env.unify(t1, t2));

    let expected = "foo(baz(Q), yes, bar(Y))";
    assert_eq!(env.to_string(t1), env.to_string(t2));
    assert_eq!(env.to_string(t1), expected);
}

#[test]
fn failed_unification() {
    let mut env = TermEnv::new();

    let t1 = env.parse("foo(X, X, bar(Y)).").expect("parse");
    let t2 = env.parse("foo(baz(Q), yes, bar(B)).").expect("parse");

    let before1 = env.to_string(t1);
    let before2 = env.to_string(t2);

    assert!(!env.unify(t1, t2));

    // The terms render unchanged and no bookkeeping leaks.
    assert_eq!(env.to_string(t1), before1);
    assert_eq!(env.to_string(t2), before2);
    assert_eq!(env.stack_size(), 0);
    assert_eq!(env.trail_size(), 0);
}

#[test]
fn unify_append() {
    let mut env = TermEnv::new();

    let t1 = env.parse("append([1,2,3], [4,5,6], Z).").expect("parse");
    let t2 = env.parse("append([X|Xs], Ys, [X|Zs]).").expect("parse");

    assert!(env.unify(t1, t2));

    let expected = "append([1,2,3], [4,5,6], [1|Zs])";
    assert_eq!(env.to_string(t1), env.to_string(t2));
    assert_eq!(env.to_string(t1), expected);
}

#[test]
fn copy_term() {
    let mut env = TermEnv::new();

    let t1 = env.parse("foo(X, 42, X, bar(Y)).").expect("parse");
    let s1 = env.to_string(t1);
    assert_eq!(s1, "foo(X, 42, X, bar(Y))");

    let t2 = env.copy(t1).expect("copy");
    let s2 = env.to_string(t2);

    // Fresh variables render differently.
    assert_ne!(s2, s1);

    assert!(env.unify(t1, t2));
    assert_eq!(env.to_string(t2), s1);
    assert_eq!(env.to_string(t1), s1);
}

#[test]
fn unify_makes_terms_structurally_equal() {
    let mut env = TermEnv::new();

    let t1 = env.parse("pair(A, g(B)).").expect("parse");
    let t2 = env.parse("pair(f(C), g(1)).").expect("parse");

    assert!(env.unify(t1, t2));
    assert!(env.equal(t1, t2));
}

#[test]
fn compare_is_a_total_order() {
    use std::cmp::Ordering;

    let mut env = TermEnv::new();

    // REF < INT < CON < STR, and a total order within each.
    let terms = [
        env.parse("A.").expect("parse"),
        env.parse("0.").expect("parse"),
        env.parse("7.").expect("parse"),
        env.parse("abc.").expect("parse"),
        env.parse("abd.").expect("parse"),
        env.parse("f(1).").expect("parse"),
        env.parse("f(2).").expect("parse"),
        env.parse("g(0, 0).").expect("parse"),
    ];

    for i in 0..terms.len() {
        assert_eq!(env.compare(terms[i], terms[i]), Ordering::Equal);
        for j in i + 1..terms.len() {
            assert_eq!(env.compare(terms[i], terms[j]), Ordering::Less);
            assert_eq!(env.compare(terms[j], terms[i]), Ordering::Greater);
        }
    }
}
