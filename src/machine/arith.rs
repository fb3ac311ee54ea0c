//! Arithmetic evaluation over term trees.
//!
//! `eval` walks the expression with an explicit work stack of
//! `(term, visited)` pairs: the first visit of a structure pushes a functor
//! marker plus its arguments, the revisit pops the evaluated arguments and
//! applies the function registered for `(name, arity)`.

use super::heap::{Cell, Functor, Tag};
use super::{Machine, MachineError};

pub(crate) type ArithFn = fn(&mut Machine, &[Cell]) -> Result<Cell, MachineError>;

pub(crate) fn load_fns(m: &mut Machine) {
    m.load_arith(Functor::new("+", 2), plus_2);
    m.load_arith(Functor::new("-", 2), minus_2);
    m.load_arith(Functor::new("*", 2), times_2);
}

fn plus_2(_m: &mut Machine, args: &[Cell]) -> Result<Cell, MachineError> {
    Ok(Cell::int(args[0].int_value().wrapping_add(args[1].int_value())))
}

fn minus_2(_m: &mut Machine, args: &[Cell]) -> Result<Cell, MachineError> {
    Ok(Cell::int(args[0].int_value().wrapping_sub(args[1].int_value())))
}

fn times_2(_m: &mut Machine, args: &[Cell]) -> Result<Cell, MachineError> {
    Ok(Cell::int(args[0].int_value().wrapping_mul(args[1].int_value())))
}

pub(crate) fn eval(m: &mut Machine, expr: Cell) -> Result<Cell, MachineError> {
    let mut stack: Vec<(Cell, bool)> = vec![(expr, false)];
    let mut values: Vec<Cell> = Vec::new();

    while let Some((t, visited)) = stack.pop() {
        let t = m.env.deref(t);

        if t.tag() == Tag::Int {
            values.push(t);
            continue;
        }

        match t.tag() {
            Tag::Con | Tag::Str => {
                if visited {
                    // t is the functor marker; its arguments sit evaluated
                    // on the value stack.
                    let f = t.functor();
                    let function = m.arith.get(&f).copied().ok_or_else(|| {
                        MachineError::UndefinedFunction(f.to_string())
                    })?;
                    let offset = values.len() - f.arity as usize;
                    let result = {
                        let args: Vec<Cell> = values[offset..].to_vec();
                        function(m, &args)?
                    };
                    values.truncate(offset);
                    values.push(result);
                } else {
                    let f = m.env.functor(t).expect("constant or structure");
                    stack.push((Cell::con(f), true));
                    for i in (0..f.arity as usize).rev() {
                        stack.push((m.env.arg(t, i), false));
                    }
                }
            }
            Tag::Ref => return Err(MachineError::NotSufficientlyInstantiated),
            Tag::Big | Tag::Gbl => return Err(MachineError::Unsupported),
            Tag::Int => unreachable!("handled above"),
        }
    }

    Ok(values.pop().expect("evaluation yields one value"))
}
