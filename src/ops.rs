//! The standard operator priority table.
//!
//! The reader's grammar hard-codes these levels; the emitter consults the
//! table to decide bracketing and spacing. User-definable operators are a
//! collaborator concern and do not pass through here.

use std::collections::HashMap;

use crate::atoms::Atom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Xfx,
    Xfy,
    Yfx,
    Fy,
}

#[derive(Debug, Clone, Copy)]
pub struct OpDef {
    pub priority: u16,
    pub op_type: OpType,
}

impl OpDef {
    /// Maximum priority allowed for the left operand.
    pub fn left_max(self) -> u16 {
        match self.op_type {
            OpType::Xfx | OpType::Xfy => self.priority - 1,
            OpType::Yfx => self.priority,
            OpType::Fy => 0,
        }
    }

    /// Maximum priority allowed for the right (or only) operand.
    pub fn right_max(self) -> u16 {
        match self.op_type {
            OpType::Xfx | OpType::Yfx => self.priority - 1,
            OpType::Xfy | OpType::Fy => self.priority,
        }
    }
}

pub struct Operators {
    infix: HashMap<Atom, OpDef>,
    prefix: HashMap<Atom, OpDef>,
}

impl Operators {
    pub fn standard() -> Self {
        let mut ops = Self {
            infix: HashMap::new(),
            prefix: HashMap::new(),
        };

        ops.add_infix(":-", 1200, OpType::Xfx);
        ops.add_infix(";", 1100, OpType::Xfy);
        ops.add_infix("->", 1050, OpType::Xfy);
        ops.add_infix(",", 1000, OpType::Xfy);
        ops.add_prefix("\\+", 900, OpType::Fy);
        for name in ["=", "\\=", "==", "\\==", "@<", "@=<", "@>", "@>=", "is", "=.."] {
            ops.add_infix(name, 700, OpType::Xfx);
        }
        ops.add_infix("+", 500, OpType::Yfx);
        ops.add_infix("-", 500, OpType::Yfx);
        ops.add_infix("*", 400, OpType::Yfx);
        ops.add_infix("//", 400, OpType::Yfx);
        ops.add_prefix("-", 200, OpType::Fy);
        ops.add_prefix("+", 200, OpType::Fy);

        ops
    }

    fn add_infix(&mut self, name: &str, priority: u16, op_type: OpType) {
        self.infix.insert(Atom::new(name), OpDef { priority, op_type });
    }

    fn add_prefix(&mut self, name: &str, priority: u16, op_type: OpType) {
        self.prefix.insert(Atom::new(name), OpDef { priority, op_type });
    }

    pub fn lookup_infix(&self, name: Atom) -> Option<OpDef> {
        self.infix.get(&name).copied()
    }

    pub fn lookup_prefix(&self, name: Atom) -> Option<OpDef> {
        self.prefix.get(&name).copied()
    }
}
