//! Operator-aware term printback.
//!
//! Binary operators below priority 700 print tightly (`2*3+4`), the
//! comparison family and control operators print spaced (`X = 1`,
//! `a :- b`), prefix operators print with a space after the operator
//! (`- 7`), and a space keeps two adjacent operator tokens apart
//! (`5+ + 6`). Structure arguments separate with `", "`, list elements
//! with `","`. Subterms whose operator priority exceeds the context get
//! brackets.
//!
//! Cyclic terms created by rational-tree unification are not detected
//! here; callers printing such terms are on their own.

use crate::machine::{Cell, Tag, TermEnv};
use crate::ops::OpDef;

const SYMBOL_CHARS: &str = "+-*/\\^<>=~:.?@#&;,!|";

fn is_symbol(c: char) -> bool {
    SYMBOL_CHARS.contains(c)
}

struct Emitter<'e> {
    env: &'e TermEnv,
    out: String,
}

impl<'e> Emitter<'e> {
    /// Writes a token, separating it from a preceding operator token when
    /// the two would otherwise lex as one.
    fn token(&mut self, token: &str) {
        if let (Some(last), Some(first)) = (self.out.chars().last(), token.chars().next()) {
            if is_symbol(last) && is_symbol(first) {
                self.out.push(' ');
            }
        }
        self.out.push_str(token);
    }

    fn raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn variable(&mut self, c: Cell) {
        match self.env.name_of(c) {
            Some(name) => self.token(&name),
            None => {
                let unnamed = format!("_{}", c.index());
                self.token(&unnamed);
            }
        }
    }

    fn list(&mut self, c: Cell) {
        self.raw("[");
        let mut c = c;
        let mut first = true;
        loop {
            if !first {
                self.raw(",");
            }
            first = false;
            self.term(self.env.arg(c, 0), 999);

            let tail = self.env.deref(self.env.arg(c, 1));
            if self.env.is_empty_list(tail) {
                break;
            }
            if self.env.is_dotted_pair(tail) {
                c = tail;
                continue;
            }
            self.raw("|");
            self.term(tail, 999);
            break;
        }
        self.raw("]");
    }

    fn infix(&mut self, c: Cell, name: &str, def: OpDef, max: u16) {
        if def.priority > max {
            self.raw("(");
            self.infix(c, name, def, def.priority);
            self.raw(")");
            return;
        }

        self.term(self.env.arg(c, 0), def.left_max());
        if name == "," {
            self.raw(", ");
        } else if def.priority >= 700 {
            self.raw(" ");
            self.token(name);
            self.raw(" ");
        } else {
            self.token(name);
        }
        self.term(self.env.arg(c, 1), def.right_max());
    }

    fn prefix(&mut self, c: Cell, name: &str, def: OpDef, max: u16) {
        if def.priority > max {
            self.raw("(");
            self.prefix(c, name, def, def.priority);
            self.raw(")");
            return;
        }

        self.token(name);
        self.raw(" ");
        self.term(self.env.arg(c, 0), def.right_max());
    }

    fn canonical(&mut self, c: Cell, name: &str, arity: usize) {
        self.token(name);
        self.raw("(");
        for i in 0..arity {
            if i > 0 {
                self.raw(", ");
            }
            self.term(self.env.arg(c, i), 999);
        }
        self.raw(")");
    }

    fn term(&mut self, c: Cell, max: u16) {
        let c = self.env.deref(c);
        match c.tag() {
            Tag::Ref => self.variable(c),
            Tag::Int => {
                let literal = c.int_value().to_string();
                self.token(&literal);
            }
            Tag::Con => {
                let name = c.functor().name.name();
                self.token(&name);
            }
            Tag::Str => {
                let f = self.env.functor(c).expect("structure has a functor");
                let name = f.name.name();

                if self.env.is_dotted_pair(c) {
                    self.list(c);
                } else if f.arity == 2 {
                    match self.env.operators().lookup_infix(f.name) {
                        Some(def) => self.infix(c, &name, def, max),
                        None => self.canonical(c, &name, 2),
                    }
                } else if f.arity == 1 {
                    match self.env.operators().lookup_prefix(f.name) {
                        Some(def) => self.prefix(c, &name, def, max),
                        None => self.canonical(c, &name, 1),
                    }
                } else {
                    self.canonical(c, &name, f.arity as usize);
                }
            }
            Tag::Big | Tag::Gbl => self.token("<unsupported>"),
        }
    }
}

pub(crate) fn emit(env: &TermEnv, c: Cell) -> String {
    let mut emitter = Emitter {
        env,
        out: String::new(),
    };
    emitter.term(c, 1200);
    emitter.out
}
