//! The canonical builtin set: control flow, ordering and equality,
//! unification, type tests, arithmetic entry, term inspection and
//! construction, profiling, and the proof-of-work entry points.
//!
//! A builtin receives the machine and the dereference-ready argument
//! registers and answers with `Ok(false)` for ordinary failure; aborts
//! travel as errors.

use std::cmp::Ordering;

use super::heap::{Cell, Functor, Tag};
use super::{arith, CutKind, EnvKind, Machine, MachineError, MetaContext, MetaEntry};

pub(crate) type Builtin = fn(&mut Machine, &[Cell]) -> Result<bool, MachineError>;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tribool {
    True,
    False,
    Indeterminate,
}

/// Optimized builtins may answer definitively or fall through to the
/// clause database.
pub(crate) type BuiltinOpt = fn(&mut Machine, &[Cell]) -> Result<Tribool, MachineError>;

pub(crate) fn load_builtins(m: &mut Machine) {
    // Profiling
    m.load_builtin(Functor::new("profile", 0), profile_0);

    // Simple
    m.load_builtin(Functor::new("true", 0), true_0);

    // Control flow
    m.load_builtin(Functor::new(",", 2), operator_comma);
    m.load_builtin(Functor::new("!", 0), operator_cut);
    m.load_builtin(Functor::new("_!", 0), operator_cut_if);
    m.load_builtin(Functor::new(";", 2), operator_disjunction);
    m.load_builtin(Functor::new("->", 2), operator_if_then);

    // Standard order, equality and unification
    m.load_builtin(Functor::new("@<", 2), operator_at_less_than);
    m.load_builtin(Functor::new("@=<", 2), operator_at_equals_less_than);
    m.load_builtin(Functor::new("@>", 2), operator_at_greater_than);
    m.load_builtin(Functor::new("@>=", 2), operator_at_greater_than_equals);
    m.load_builtin(Functor::new("==", 2), operator_equals);
    m.load_builtin(Functor::new("\\==", 2), operator_not_equals);
    m.load_builtin(Functor::new("compare", 3), compare_3);
    m.load_builtin(Functor::new("=", 2), operator_unification);
    m.load_builtin(Functor::new("\\=", 2), operator_cannot_unify);

    // Type tests
    m.load_builtin(Functor::new("var", 1), var_1);
    m.load_builtin(Functor::new("nonvar", 1), nonvar_1);
    m.load_builtin(Functor::new("integer", 1), integer_1);
    m.load_builtin(Functor::new("number", 1), number_1);
    m.load_builtin(Functor::new("atom", 1), atom_1);
    m.load_builtin(Functor::new("atomic", 1), atomic_1);
    m.load_builtin(Functor::new("compound", 1), compound_1);
    m.load_builtin(Functor::new("callable", 1), callable_1);
    m.load_builtin(Functor::new("ground", 1), ground_1);

    // Arithmetics
    m.load_builtin(Functor::new("is", 2), is_2);

    // Analyzing & constructing terms
    m.load_builtin(Functor::new("functor", 3), functor_3);
    m.load_builtin(Functor::new("copy_term", 2), copy_term_2);
    m.load_builtin(Functor::new("=..", 2), operator_deconstruct);

    // Meta
    m.load_builtin(Functor::new("\\+", 1), operator_disprove);

    // Proof of work
    m.load_builtin(Functor::new("pow_init", 2), pow_init_2);
    m.load_builtin(Functor::new("pow_scan", 3), pow_scan_3);
}

pub(crate) fn load_builtins_opt(m: &mut Machine) {
    m.load_builtin_opt(Functor::new("member", 2), member_2);
    m.load_builtin_opt(Functor::new("sort", 2), sort_2);
}

// Profiling -----------------------------------------------------------------

fn profile_0(m: &mut Machine, _args: &[Cell]) -> Result<bool, MachineError> {
    m.profiling_enabled = !m.profiling_enabled;
    Ok(true)
}

// Simple --------------------------------------------------------------------

fn true_0(_m: &mut Machine, _args: &[Cell]) -> Result<bool, MachineError> {
    Ok(true)
}

// Control flow --------------------------------------------------------------

fn operator_comma(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    // Schedule the second goal as the continuation, then run the first.
    m.cp = args[1];
    m.allocate_environment(EnvKind::Base);
    m.cp = args[0];
    Ok(true)
}

fn operator_cut(m: &mut Machine, _args: &[Cell]) -> Result<bool, MachineError> {
    m.cut(CutKind::Clause);
    Ok(true)
}

fn operator_cut_if(m: &mut Machine, _args: &[Cell]) -> Result<bool, MachineError> {
    m.cut(CutKind::Barrier);
    Ok(true)
}

/// Builds `','(Cond, ','('_!', Then))`: prove the condition, commit past the
/// construct's private choice point, then run the then-branch.
fn conditional_body(m: &mut Machine, cond: Cell, then: Cell) -> Cell {
    let cut = Cell::con(m.f_cut_if);
    let committed = m.env.new_term(m.f_comma, &[cut, then]);
    m.env.new_term(m.f_comma, &[cond, committed])
}

fn operator_disjunction(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let lhs = m.env.deref(args[0]);

    if m.env.functor(lhs) == Some(m.f_arrow) {
        // If-then-else: the retry path of the private choice point selects
        // the else branch (argument 1 of the saved ';' term).
        m.b0 = m.b;
        m.allocate_choice_point(Cell::int(1));
        m.allocate_environment(EnvKind::Barrier);
        let cond = m.env.arg(lhs, 0);
        let then = m.env.arg(lhs, 1);
        m.cp = conditional_body(m, cond, then);
    } else {
        m.b0 = m.b;
        m.allocate_choice_point(Cell::int(1));
        m.cp = args[0];
    }

    Ok(true)
}

fn operator_if_then(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    // Bare `Cond -> Then`: no alternative, so the private choice point is
    // born exhausted; failing the condition fails the construct.
    m.b0 = m.b;
    m.allocate_choice_point(Cell::int(0));
    m.allocate_environment(EnvKind::Barrier);
    m.cp = conditional_body(m, args[0], args[1]);
    Ok(true)
}

// Meta ----------------------------------------------------------------------

fn operator_disprove(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let context = m.capture_meta_context();
    m.meta.push(MetaEntry {
        callback: disprove_done,
        context,
    });

    // Barrier for the inner proof; raising the watermark makes every inner
    // binding trailed, so the callback can rewind them all.
    m.top_b = m.b;
    m.top_e = m.e;
    let heap_size = m.env.heap_size();
    m.env.set_hb(heap_size);
    m.allocate_environment(EnvKind::Base);
    m.cp = args[0];

    Ok(true)
}

fn disprove_done(m: &mut Machine, context: MetaContext) -> Result<(), MachineError> {
    let inner_failed = m.top_fail;
    m.top_fail = false;

    m.release_meta_context(context);

    if !inner_failed {
        // The goal is provable, so its negation fails.
        m.top_fail = true;
    }
    Ok(())
}

// Standard order, equality and unification ----------------------------------

fn operator_at_less_than(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.compare(args[0], args[1]) == Ordering::Less)
}

fn operator_at_equals_less_than(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.compare(args[0], args[1]) != Ordering::Greater)
}

fn operator_at_greater_than(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.compare(args[0], args[1]) == Ordering::Greater)
}

fn operator_at_greater_than_equals(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.compare(args[0], args[1]) != Ordering::Less)
}

fn operator_equals(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.equal(args[0], args[1]))
}

fn operator_not_equals(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(!m.env.equal(args[0], args[1]))
}

fn compare_3(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let order = match m.env.compare(args[1], args[2]) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    let order = Cell::con(Functor::new(order, 0));
    Ok(m.env.unify(args[0], order))
}

fn operator_unification(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.unify(args[0], args[1]))
}

fn operator_cannot_unify(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let mark = m.env.trail_size();
    if m.env.unify(args[0], args[1]) {
        m.env.unwind_trail_to(mark);
        Ok(false)
    } else {
        Ok(true)
    }
}

// Type tests ----------------------------------------------------------------

fn var_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.deref(args[0]).tag() == Tag::Ref)
}

fn nonvar_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.deref(args[0]).tag() != Tag::Ref)
}

fn integer_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.deref(args[0]).tag() == Tag::Int)
}

fn number_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    integer_1(m, args)
}

fn atom_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.deref(args[0]).tag() == Tag::Con)
}

fn atomic_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(matches!(m.env.deref(args[0]).tag(), Tag::Con | Tag::Int))
}

fn compound_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.deref(args[0]).tag() == Tag::Str)
}

fn callable_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(matches!(m.env.deref(args[0]).tag(), Tag::Con | Tag::Str))
}

fn ground_1(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    Ok(m.env.is_ground(args[0]))
}

// Arithmetics ---------------------------------------------------------------

fn is_2(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let value = arith::eval(m, args[1])?;
    Ok(m.env.unify(args[0], value))
}

// Analyzing & constructing terms --------------------------------------------

fn functor_3(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let t = m.env.deref(args[0]);

    match t.tag() {
        Tag::Str | Tag::Con => {
            let f = m.env.functor(t).expect("functor of structure or atom");
            let name = Cell::con(Functor {
                name: f.name,
                arity: 0,
            });
            Ok(m.env.unify(args[1], name) && m.env.unify(args[2], Cell::int(i64::from(f.arity))))
        }
        Tag::Int => Ok(m.env.unify(args[1], t) && m.env.unify(args[2], Cell::int(0))),
        Tag::Ref => {
            let name = m.env.deref(args[1]);
            let arity = m.env.deref(args[2]);
            if name.tag() == Tag::Ref || arity.tag() == Tag::Ref {
                return Err(MachineError::NotSufficientlyInstantiated);
            }
            if arity.tag() != Tag::Int || arity.int_value() < 0 {
                return Err(MachineError::ArgumentNotNumber(m.env.to_string(arity)));
            }

            let arity = arity.int_value() as u32;
            if arity == 0 {
                if !matches!(name.tag(), Tag::Con | Tag::Int) {
                    return Err(MachineError::WrongArgType(m.env.to_string(name)));
                }
                return Ok(m.env.unify(t, name));
            }

            if name.tag() != Tag::Con || name.functor().arity != 0 {
                return Err(MachineError::WrongArgType(m.env.to_string(name)));
            }
            let built = m.env.new_str(Functor {
                name: name.functor().name,
                arity,
            });
            Ok(m.env.unify(t, built))
        }
        Tag::Big | Tag::Gbl => Err(MachineError::Unsupported),
    }
}

fn copy_term_2(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    // A copy error is an ordinary failure, never an abort.
    match m.env.copy(args[0]) {
        Ok(copy) => Ok(m.env.unify(args[1], copy)),
        Err(_) => Ok(false),
    }
}

fn operator_deconstruct(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let t = m.env.deref(args[0]);

    match t.tag() {
        Tag::Str => {
            let f = m.env.functor(t).expect("structure has a functor");
            let mut elements = vec![Cell::con(Functor {
                name: f.name,
                arity: 0,
            })];
            for i in 0..f.arity as usize {
                elements.push(m.env.arg(t, i));
            }
            let tail = m.env.empty_list();
            let list = m.env.make_list(&elements, tail);
            Ok(m.env.unify(args[1], list))
        }
        Tag::Con | Tag::Int => {
            let tail = m.env.empty_list();
            let list = m.env.make_list(&[t], tail);
            Ok(m.env.unify(args[1], list))
        }
        Tag::Ref => {
            let Some(elements) = m.env.list_elements(args[1]) else {
                return Err(MachineError::WrongArgType(m.env.to_string(args[1])));
            };
            let Some((&head, rest)) = elements.split_first() else {
                return Err(MachineError::WrongArgType(m.env.to_string(args[1])));
            };

            let head = m.env.deref(head);
            if rest.is_empty() {
                if !matches!(head.tag(), Tag::Con | Tag::Int) {
                    return Err(MachineError::WrongArgType(m.env.to_string(head)));
                }
                return Ok(m.env.unify(t, head));
            }

            if head.tag() != Tag::Con || head.functor().arity != 0 {
                return Err(MachineError::WrongArgType(m.env.to_string(head)));
            }
            let f = Functor {
                name: head.functor().name,
                arity: rest.len() as u32,
            };
            let built = m.env.new_term(f, rest);
            Ok(m.env.unify(t, built))
        }
        Tag::Big | Tag::Gbl => Err(MachineError::Unsupported),
    }
}

// Optimized builtins --------------------------------------------------------

/// Definitive membership when both sides are ground; everything else falls
/// through to the library clauses.
fn member_2(m: &mut Machine, args: &[Cell]) -> Result<Tribool, MachineError> {
    let Some(elements) = m.env.list_elements(args[1]) else {
        return Ok(Tribool::Indeterminate);
    };
    if !m.env.is_ground(args[0]) || elements.iter().any(|&e| !m.env.is_ground(e)) {
        return Ok(Tribool::Indeterminate);
    }

    let found = elements.iter().any(|&e| m.env.equal(args[0], e));
    Ok(if found { Tribool::True } else { Tribool::False })
}

/// Sorts a proper list by standard order, dropping duplicates.
fn sort_2(m: &mut Machine, args: &[Cell]) -> Result<Tribool, MachineError> {
    let list = m.env.deref(args[0]);
    if list.tag() == Tag::Ref {
        return Err(MachineError::NotSufficientlyInstantiated);
    }
    let Some(mut elements) = m.env.list_elements(list) else {
        return Err(MachineError::WrongArgType(m.env.to_string(list)));
    };

    elements.sort_by(|&a, &b| m.env.compare(a, b));
    elements.dedup_by(|a, b| m.env.equal(*a, *b));

    let tail = m.env.empty_list();
    let sorted = m.env.make_list(&elements, tail);
    Ok(if m.env.unify(args[1], sorted) {
        Tribool::True
    } else {
        Tribool::False
    })
}

// Proof of work -------------------------------------------------------------

/// Scale factor turning projected-star plane coordinates into integers the
/// term model can carry.
const PLANE_SCALE: f64 = 1_000_000.0;

fn pow_init_2(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let message = m.env.deref(args[0]);
    let num_stars = m.env.deref(args[1]);

    if message.tag() == Tag::Ref || num_stars.tag() == Tag::Ref {
        return Err(MachineError::NotSufficientlyInstantiated);
    }
    if message.tag() != Tag::Con || message.functor().arity != 0 {
        return Err(MachineError::WrongArgType(m.env.to_string(message)));
    }
    if num_stars.tag() != Tag::Int || num_stars.int_value() <= 0 {
        return Err(MachineError::ArgumentNotNumber(m.env.to_string(num_stars)));
    }

    let name = message.functor().name.name();
    m.observatory = Some(crate::pow::Observatory::init(
        name.as_bytes(),
        num_stars.int_value() as usize,
    ));
    Ok(true)
}

fn pow_scan_3(m: &mut Machine, args: &[Cell]) -> Result<bool, MachineError> {
    let proof_num = m.env.deref(args[0]);
    if proof_num.tag() == Tag::Ref {
        return Err(MachineError::NotSufficientlyInstantiated);
    }
    if proof_num.tag() != Tag::Int || proof_num.int_value() < 0 {
        return Err(MachineError::ArgumentNotNumber(m.env.to_string(proof_num)));
    }

    let observatory = m.observatory.as_ref().ok_or_else(|| {
        MachineError::WrongArgType("pow_scan/3 before pow_init/2".to_string())
    })?;

    let Some(proof) = observatory.scan(proof_num.int_value() as u64) else {
        return Ok(false);
    };

    let star_functor = Functor::new("star", 3);
    let mut stars = Vec::with_capacity(proof.stars.len());
    for star in &proof.stars {
        let id = Cell::int(i64::from(star.id));
        let u = Cell::int((star.u * PLANE_SCALE) as i64);
        let v = Cell::int((star.v * PLANE_SCALE) as i64);
        stars.push(m.env.new_term(star_functor, &[id, u, v]));
    }
    let tail = m.env.empty_list();
    let found = m.env.make_list(&stars, tail);

    Ok(m.env.unify(args[1], Cell::int(proof.nonce as i64)) && m.env.unify(args[2], found))
}
