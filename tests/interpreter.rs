//! Whole-machine scenarios: program loading, proving, backtracking,
//! control constructs, builtins, and the error surface.

use merak::pow::{Observatory, ScanConfig};
use merak::{Machine, MachineError};

fn machine_with(program: &str) -> Machine {
    let mut machine = Machine::new();
    machine.load_program(program).expect("program loads");
    machine
}

fn prove(machine: &mut Machine, query: &str) -> bool {
    let query = machine.parse(query).expect("query parses");
    machine.execute(query).expect("query executes")
}

fn solve(machine: &mut Machine, query: &str) -> Option<String> {
    prove(machine, query).then(|| machine.get_result())
}

#[test]
fn facts_and_recursion() {
    let mut machine = machine_with(
        "append([], Zs, Zs).
         append([X|Xs], Ys, [X|Zs]) :- append(Xs, Ys, Zs).",
    );

    assert_eq!(
        solve(&mut machine, "append([1,2,3], [4,5,6], Q)."),
        Some("Q = [1,2,3,4,5,6]".to_string())
    );

    // Ground queries answer true with no bindings to report.
    assert_eq!(
        solve(&mut machine, "append([1], [2], [1,2])."),
        Some("true".to_string())
    );
    assert!(!prove(&mut machine, "append([1], [2], [2,1])."));
}

#[test]
fn backtracking_enumerates_solutions() {
    let mut machine = machine_with("p(1). p(2). p(3).");

    assert_eq!(solve(&mut machine, "p(X)."), Some("X = 1".to_string()));
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "X = 2");
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "X = 3");
    assert!(!machine.next().expect("next"));

    // Exhausted backtracking leaves the machine pristine.
    assert_eq!(machine.env().trail_size(), 0);
    assert_eq!(machine.stack_size(), 0);
}

#[test]
fn append_splits_on_backtracking() {
    let mut machine = machine_with(
        "append([], Zs, Zs).
         append([X|Xs], Ys, [X|Zs]) :- append(Xs, Ys, Zs).",
    );

    assert_eq!(
        solve(&mut machine, "append(A, B, [1,2])."),
        Some("A = [], B = [1,2]".to_string())
    );
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "A = [1], B = [2]");
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "A = [1,2], B = []");
    assert!(!machine.next().expect("next"));
}

#[test]
fn conjunction_threads_bindings() {
    let mut machine = machine_with("p(1). p(2). q(2). q(3).");

    assert_eq!(
        solve(&mut machine, "p(X), q(X)."),
        Some("X = 2".to_string())
    );
    assert!(!machine.next().expect("next"));
}

#[test]
fn cut_commits_to_the_first_solution() {
    let mut machine = machine_with(
        "p(1). p(2). p(3).
         first(X) :- p(X), !.",
    );

    assert_eq!(solve(&mut machine, "first(X)."), Some("X = 1".to_string()));
    assert!(!machine.next().expect("next"));
}

#[test]
fn disjunction_offers_both_branches() {
    let mut machine = machine_with("q(X) :- (X = a ; X = b).");

    assert_eq!(solve(&mut machine, "q(X)."), Some("X = a".to_string()));
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "X = b");
    assert!(!machine.next().expect("next"));
}

#[test]
fn if_then_else_commits() {
    let mut machine = machine_with(
        "t1(X) :- (a = a -> X = yes ; X = no).
         t2(X) :- (a = b -> X = yes ; X = no).",
    );

    assert_eq!(solve(&mut machine, "t1(X)."), Some("X = yes".to_string()));
    // A committed condition leaves no else alternative behind.
    assert!(!machine.next().expect("next"));

    assert_eq!(solve(&mut machine, "t2(X)."), Some("X = no".to_string()));
    assert!(!machine.next().expect("next"));
}

#[test]
fn bare_if_then_fails_with_its_condition() {
    let mut machine = machine_with(
        "t1(X) :- (a = a -> X = yes).
         t2(X) :- (a = b -> X = yes).",
    );

    assert_eq!(solve(&mut machine, "t1(X)."), Some("X = yes".to_string()));
    assert!(!prove(&mut machine, "t2(X)."));
}

#[test]
fn negation_as_failure() {
    let mut machine = machine_with("p(1). p(2).");

    assert!(prove(&mut machine, "\\+ p(4)."));
    assert!(!prove(&mut machine, "\\+ p(1)."));
    assert!(prove(&mut machine, "\\+ \\+ p(1)."));
    assert!(!prove(&mut machine, "\\+ \\+ p(4)."));

    // Negation never exports bindings.
    let mut machine = machine_with("p(1). p(2).");
    assert_eq!(
        solve(&mut machine, "\\+ \\+ p(X), X = out."),
        Some("X = out".to_string())
    );
}

#[test]
fn arithmetic_evaluation() {
    let mut machine = Machine::new();

    assert_eq!(
        solve(&mut machine, "X is 2+3*4."),
        Some("X = 14".to_string())
    );
    assert_eq!(
        solve(&mut machine, "X is 2*3+4+5-7."),
        Some("X = 8".to_string())
    );
    assert!(prove(&mut machine, "14 is 2+3*4."));
    assert!(!prove(&mut machine, "15 is 2+3*4."));
}

#[test]
fn arithmetic_errors() {
    let mut machine = Machine::new();

    let query = machine.parse("X is Y.").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::NotSufficientlyInstantiated)
    ));

    let query = machine.parse("X is foo.").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::UndefinedFunction(_))
    ));

    let query = machine.parse("X is 1+bar(2).").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::UndefinedFunction(_))
    ));
}

#[test]
fn undefined_predicates_abort() {
    let mut machine = Machine::new();

    let query = machine.parse("nosuch(1).").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::UndefinedPredicate(_))
    ));

    // The machine stays usable after an abort.
    assert!(prove(&mut machine, "true."));
}

#[test]
fn unification_builtins() {
    let mut machine = Machine::new();

    assert_eq!(
        solve(&mut machine, "X = f(Y), Y = 1."),
        Some("X = f(1), Y = 1".to_string())
    );
    assert!(prove(&mut machine, "f(X) \\= g(Y)."));
    assert!(!prove(&mut machine, "f(X) \\= f(Y)."));
}

#[test]
fn equality_and_order_builtins() {
    let mut machine = Machine::new();

    assert!(prove(&mut machine, "f(a) == f(a)."));
    assert!(!prove(&mut machine, "f(a) == f(X)."));
    assert!(prove(&mut machine, "f(a) \\== f(b)."));

    assert!(prove(&mut machine, "1 @< 2."));
    assert!(prove(&mut machine, "abc @< f(1)."));
    assert!(prove(&mut machine, "f(1) @< g(0, 0)."));
    assert!(prove(&mut machine, "2 @=< 2."));
    assert!(prove(&mut machine, "b @> a."));
    assert!(prove(&mut machine, "b @>= b."));

    assert_eq!(
        solve(&mut machine, "compare(O, 1, 2)."),
        Some("O = <".to_string())
    );
    assert_eq!(
        solve(&mut machine, "compare(O, f(a), f(a))."),
        Some("O = =".to_string())
    );
    assert_eq!(
        solve(&mut machine, "compare(O, g(1), f(2))."),
        Some("O = >".to_string())
    );
}

#[test]
fn type_test_builtins() {
    let mut machine = Machine::new();

    assert!(prove(&mut machine, "var(X)."));
    assert!(!prove(&mut machine, "X = 1, var(X)."));
    assert!(prove(&mut machine, "X = 1, nonvar(X)."));
    assert!(prove(&mut machine, "integer(42)."));
    assert!(prove(&mut machine, "number(42)."));
    assert!(prove(&mut machine, "atom(foo)."));
    assert!(!prove(&mut machine, "atom(foo(1))."));
    assert!(prove(&mut machine, "atomic(42)."));
    assert!(prove(&mut machine, "compound(foo(1))."));
    assert!(prove(&mut machine, "callable(foo)."));
    assert!(prove(&mut machine, "callable(foo(1))."));
    assert!(!prove(&mut machine, "callable(42)."));
    assert!(prove(&mut machine, "ground(f(1, g(2)))."));
    assert!(!prove(&mut machine, "ground(f(1, g(X)))."));
}

#[test]
fn functor_and_univ_round_trip() {
    let mut machine = Machine::new();

    assert_eq!(
        solve(&mut machine, "functor(foo(a, b), F, A)."),
        Some("F = foo, A = 2".to_string())
    );
    assert_eq!(
        solve(&mut machine, "functor(foo, F, A)."),
        Some("F = foo, A = 0".to_string())
    );
    assert_eq!(
        solve(&mut machine, "functor(42, F, A)."),
        Some("F = 42, A = 0".to_string())
    );

    // Building then deconstructing yields the original functor and args.
    assert_eq!(
        solve(&mut machine, "functor(T, foo, 2), functor(T, F, A)."),
        Some("T = foo(_, _), F = foo, A = 2".to_string())
    );

    assert_eq!(
        solve(&mut machine, "foo(a, b) =.. L."),
        Some("L = [foo,a,b]".to_string())
    );
    assert_eq!(
        solve(&mut machine, "T =.. [foo, a, b]."),
        Some("T = foo(a, b)".to_string())
    );
    assert_eq!(
        solve(&mut machine, "T =.. [foo, a, b], T =.. L."),
        Some("T = foo(a, b), L = [foo,a,b]".to_string())
    );
}

#[test]
fn copy_term_builtin() {
    let mut machine = Machine::new();

    // The copy unifies with the original.
    assert!(prove(&mut machine, "copy_term(f(X, 42, X), C), C = f(a, 42, a)."));
    // Shared variables stay shared in the copy.
    assert!(!prove(
        &mut machine,
        "copy_term(f(X, X), C), C = f(a, b)."
    ));
}

#[test]
fn optimized_member() {
    let mut machine = Machine::new();

    // Ground cases answer definitively through the fast path.
    assert!(prove(&mut machine, "member(2, [1,2,3])."));
    assert!(!prove(&mut machine, "member(4, [1,2,3])."));

    // Non-ground cases fall through to the library clauses.
    assert_eq!(
        solve(&mut machine, "member(X, [1,2])."),
        Some("X = 1".to_string())
    );
    assert!(machine.next().expect("next"));
    assert_eq!(machine.get_result(), "X = 2");
    assert!(!machine.next().expect("next"));
}

#[test]
fn optimized_sort() {
    let mut machine = Machine::new();

    assert_eq!(
        solve(&mut machine, "sort([3,1,2,1], S)."),
        Some("S = [1,2,3]".to_string())
    );
    assert!(prove(&mut machine, "sort([b,a], [a,b])."));
    assert!(!prove(&mut machine, "sort([b,a], [b,a])."));

    let query = machine.parse("sort(X, S).").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::NotSufficientlyInstantiated)
    ));
}

#[test]
fn result_naming_of_anonymous_variables() {
    let mut machine = machine_with("p(f(A, A, B)).");

    // The repeated fresh variable gets a G_n name, the singleton renders
    // as _.
    assert_eq!(
        solve(&mut machine, "p(X)."),
        Some("X = f(G_0, G_0, _)".to_string())
    );
}

#[test]
fn print_db_keeps_insertion_order() {
    let mut machine = machine_with(
        "p(1).
         q(2) :- p(2).
         p(3).",
    );

    let mut out = Vec::new();
    machine.print_db(&mut out).expect("print_db");
    let text = String::from_utf8(out).expect("utf8");

    // The library clauses installed at startup print first; the loaded
    // program follows in insertion order, clauses grouped per predicate.
    assert!(text.starts_with("member("));
    assert!(text.ends_with("p(1).\np(3).\n\nq(2) :- p(2).\n"));
}

#[test]
fn profiling_tallies_dispatches() {
    let mut machine = machine_with("p(1). p(2).");

    assert!(prove(&mut machine, "profile."));
    assert!(prove(&mut machine, "p(X), p(Y)."));
    assert!(prove(&mut machine, "profile."));

    let mut out = Vec::new();
    machine.print_profile(&mut out).expect("print_profile");
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("p/1"));
}

#[test]
fn load_program_term_requires_a_list() {
    let mut machine = Machine::new();

    let list = machine.parse("[(p(1)), (p(2))].").expect("parse");
    machine.load_program_term(list).expect("loads");
    assert!(prove(&mut machine, "p(2)."));

    let not_a_list = machine.parse("p(1).").expect("parse");
    assert!(matches!(
        machine.load_program_term(not_a_list),
        Err(MachineError::ProgramNotList)
    ));
}

#[test]
fn pow_builtins_drive_the_observatory() {
    let mut machine = Machine::new();

    // pow_init seeds a default observatory.
    assert!(prove(&mut machine, "pow_init(blockseed, 512)."));

    let query = machine.parse("pow_init(X, 512).").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::NotSufficientlyInstantiated)
    ));

    // Install a permissive configuration so the scan terminates promptly.
    let config = ScanConfig {
        num_workers: 2,
        index_delta: 25,
        window: 0.6,
        tolerance: f64::INFINITY,
    };
    machine.set_observatory(Observatory::init(b"blockseed", 4096).with_config(config));

    assert!(prove(
        &mut machine,
        "pow_scan(1, Nonce, Found), integer(Nonce), Found = [_, _, _, _, _, _, _]."
    ));
}

#[test]
fn goals_must_be_callable() {
    let mut machine = Machine::new();

    let query = machine.parse("X.").expect("parse");
    assert!(matches!(
        machine.execute(query),
        Err(MachineError::NotSufficientlyInstantiated)
    ));

    assert!(matches!(
        machine.load_program("p(1) :- 42."),
        Err(MachineError::BadGoal(_))
    ));
}
