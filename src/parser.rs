//! Reader for Prolog-style term syntax.
//!
//! The grammar is combinator-built and hard-codes the standard operator
//! levels from [`crate::ops`]. Parsing yields a small AST which is then
//! lowered into heap cells; variables sharing a name within one term lower
//! to the same REF cell, and the REF -> name mapping is recorded in the term
//! environment for printback.

use chumsky::prelude::*;

use crate::machine::{Cell, Functor, MachineError, TermEnv};

type ParseError = Simple<char>;

#[derive(Debug, Clone)]
enum Ast {
    Var(String),
    Void,
    Atom(String),
    Int(i64),
    Struct(String, Vec<Ast>),
}

fn ident_char(c: &char) -> bool {
    c.is_alphanumeric() || *c == '_'
}

fn atom_name() -> impl Parser<char, String, Error = ParseError> + Clone {
    filter(|c: &char| c.is_lowercase())
        .chain(filter(ident_char).repeated())
        .collect::<String>()
        .labelled("atom")
}

/// Right-folds `items` into a chain of binary `op` structures, matching xfy
/// associativity.
fn rfold(op: &str, mut items: Vec<Ast>) -> Ast {
    let mut folded = items.pop().expect("separated_by yields at least one item");
    while let Some(item) = items.pop() {
        folded = Ast::Struct(op.to_string(), vec![item, folded]);
    }
    folded
}

fn infix_many(
    term: impl Parser<char, Ast, Error = ParseError> + 'static,
    operators: impl Parser<char, &'static str, Error = ParseError> + 'static,
) -> impl Parser<char, Ast, Error = ParseError> {
    let term = term.boxed();

    term.clone()
        .then(operators.padded().then(term).repeated())
        .foldl(|lhs, (op, rhs)| Ast::Struct(op.to_string(), vec![lhs, rhs]))
}

fn term_parser() -> impl Parser<char, Ast, Error = ParseError> {
    let mut argument = Recursive::declare();
    let mut full_term = Recursive::declare();

    let integer = text::int(10)
        .try_map(|digits: String, span| {
            digits
                .parse::<i64>()
                .map(Ast::Int)
                .map_err(|_| Simple::custom(span, "integer literal out of range"))
        })
        .labelled("integer");

    let variable = filter(|c: &char| c.is_uppercase())
        .chain(filter(ident_char).repeated())
        .collect::<String>()
        .map(Ast::Var)
        .labelled("variable");

    let void_or_named = just('_')
        .ignore_then(filter(ident_char).repeated().collect::<String>())
        .map(|rest| {
            if rest.is_empty() {
                Ast::Void
            } else {
                Ast::Var(format!("_{rest}"))
            }
        });

    let structure = atom_name()
        .then(
            argument
                .clone()
                .padded()
                .separated_by(just(','))
                .at_least(1)
                .delimited_by(just('('), just(')'))
                .or_not(),
        )
        .map(|(name, args)| match args {
            None => Ast::Atom(name),
            Some(args) => Ast::Struct(name, args),
        })
        .labelled("structure");

    let empty_list = just('[')
        .then(just(']').padded())
        .to(Ast::Atom("[]".to_string()));

    let list = argument
        .clone()
        .padded()
        .separated_by(just(','))
        .at_least(1)
        .then(just('|').ignore_then(argument.clone().padded()).or_not())
        .delimited_by(just('['), just(']'))
        .map(|(items, tail)| {
            let mut list = tail.unwrap_or_else(|| Ast::Atom("[]".to_string()));
            for item in items.into_iter().rev() {
                list = Ast::Struct(".".to_string(), vec![item, list]);
            }
            list
        })
        .labelled("list");

    let cut = just('!').to(Ast::Atom("!".to_string()));

    let parenthesised = full_term
        .clone()
        .padded()
        .delimited_by(just('('), just(')'));

    let primary = choice((
        integer,
        variable,
        void_or_named,
        structure,
        empty_list,
        list,
        cut,
        parenthesised,
    ))
    .padded();

    let level200 = choice((just('-').to("-"), just('+').to("+")))
        .padded()
        .repeated()
        .then(primary)
        .foldr(|op, operand| Ast::Struct(op.to_string(), vec![operand]));

    let level400 = infix_many(level200, choice((just("//").to("//"), just('*').to("*"))));
    let level500 = infix_many(level400, choice((just('+').to("+"), just('-').to("-")))).boxed();

    let comparison_op = choice((
        just("=..").to("=.."),
        just("==").to("=="),
        just("\\==").to("\\=="),
        just("\\=").to("\\="),
        just("@=<").to("@=<"),
        just("@<").to("@<"),
        just("@>=").to("@>="),
        just("@>").to("@>"),
        just("is").to("is"),
        just("=").to("="),
    ));

    let level700 = level500
        .clone()
        .then(comparison_op.padded().then(level500).or_not())
        .map(|(lhs, rest)| match rest {
            None => lhs,
            Some((op, rhs)) => Ast::Struct(op.to_string(), vec![lhs, rhs]),
        });

    let level900 = just("\\+")
        .padded()
        .repeated()
        .then(level700)
        .foldr(|_, goal| Ast::Struct("\\+".to_string(), vec![goal]));

    argument.define(level900.boxed());

    let level1000 = argument
        .clone()
        .separated_by(just(',').padded())
        .at_least(1)
        .map(|items| rfold(",", items));

    let level1050 = level1000
        .separated_by(just("->").padded())
        .at_least(1)
        .map(|items| rfold("->", items));

    let level1100 = level1050
        .separated_by(just(';').padded())
        .at_least(1)
        .map(|items| rfold(";", items))
        .boxed();

    let level1200 = level1100
        .clone()
        .then(just(":-").padded().ignore_then(level1100).or_not())
        .map(|(head, body)| match body {
            None => head,
            Some(body) => Ast::Struct(":-".to_string(), vec![head, body]),
        });

    full_term.define(level1200.boxed());

    full_term
}

fn syntax_error(errors: Vec<ParseError>) -> MachineError {
    let message = errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    MachineError::Syntax(message)
}

/// Lowers an AST into heap cells. Each named variable lowers to one REF cell
/// per term, recorded under its name; voids get a fresh unnamed REF per
/// occurrence.
fn lower(
    env: &mut TermEnv,
    ast: &Ast,
    vars: &mut std::collections::HashMap<String, Cell>,
) -> Cell {
    match ast {
        Ast::Var(name) => {
            if let Some(&cell) = vars.get(name) {
                return cell;
            }
            let cell = env.new_ref();
            env.set_name(cell, arcstr::ArcStr::from(name.as_str()));
            vars.insert(name.clone(), cell);
            cell
        }
        Ast::Void => env.new_ref(),
        Ast::Atom(name) => Cell::con(Functor::new(name, 0)),
        Ast::Int(i) => Cell::int(*i),
        Ast::Struct(name, args) => {
            let cells: Vec<Cell> = args.iter().map(|a| lower(env, a, vars)).collect();
            let f = Functor::new(name, cells.len() as u32);
            env.new_term(f, &cells)
        }
    }
}

/// Parses a single `term.` from source text.
pub(crate) fn parse_term(env: &mut TermEnv, source: &str) -> Result<Cell, MachineError> {
    let ast = term_parser()
        .padded()
        .then_ignore(just('.'))
        .then_ignore(text::whitespace())
        .then_ignore(end())
        .parse(source)
        .map_err(syntax_error)?;

    let mut vars = std::collections::HashMap::new();
    Ok(lower(env, &ast, &mut vars))
}

/// Parses a whole program: a sequence of `clause.` items. Variable scope is
/// per clause.
pub(crate) fn parse_program(env: &mut TermEnv, source: &str) -> Result<Vec<Cell>, MachineError> {
    let asts = term_parser()
        .padded()
        .then_ignore(just('.'))
        .padded()
        .repeated()
        .then_ignore(end())
        .parse(source)
        .map_err(syntax_error)?;

    Ok(asts
        .iter()
        .map(|ast| {
            let mut vars = std::collections::HashMap::new();
            lower(env, ast, &mut vars)
        })
        .collect())
}
