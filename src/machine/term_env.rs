//! The term environment: heap plus trail, auxiliary stacks, watermarks,
//! unification, structural equality, copying and the standard order.

use std::cmp::Ordering;
use std::collections::HashMap;

use arcstr::ArcStr;

use crate::ops::Operators;

use super::heap::{Cell, Functor, Heap, Tag};
use super::MachineError;

pub struct TermEnv {
    heap: Heap,
    trail: Vec<usize>,
    stack: Vec<Cell>,
    temp: Vec<Cell>,
    /// Heap watermark at the most recent choice point. Bindings below this
    /// index must be trailed.
    hb: usize,
    var_names: HashMap<Cell, ArcStr>,
    ops: Operators,
    f_dot: Functor,
    f_empty: Functor,
}

impl TermEnv {
    pub fn new() -> Self {
        Self {
            heap: Heap::new(),
            trail: Vec::new(),
            stack: Vec::new(),
            temp: Vec::new(),
            hb: 0,
            var_names: HashMap::new(),
            ops: Operators::standard(),
            f_dot: Functor::new(".", 2),
            f_empty: Functor::new("[]", 0),
        }
    }

    pub fn heap_size(&self) -> usize {
        self.heap.size()
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn trail_size(&self) -> usize {
        self.trail.len()
    }

    pub(crate) fn hb(&self) -> usize {
        self.hb
    }

    pub(crate) fn set_hb(&mut self, hb: usize) {
        self.hb = hb;
    }

    pub fn operators(&self) -> &Operators {
        &self.ops
    }

    pub fn deref(&self, c: Cell) -> Cell {
        self.heap.deref(c)
    }

    pub fn functor(&self, c: Cell) -> Option<Functor> {
        self.heap.functor(c)
    }

    pub fn is_functor(&self, c: Cell) -> bool {
        matches!(self.deref(c).tag(), Tag::Con | Tag::Str)
    }

    /// Argument `i` of a structure term, after dereferencing the term itself
    /// (but not the argument).
    pub fn arg(&self, c: Cell, i: usize) -> Cell {
        self.heap.arg(self.deref(c), i)
    }

    pub fn new_ref(&mut self) -> Cell {
        self.heap.new_ref()
    }

    pub fn new_str(&mut self, f: Functor) -> Cell {
        self.heap.new_str(f)
    }

    pub fn set_arg(&mut self, str_cell: Cell, i: usize, c: Cell) {
        self.heap.set_arg(str_cell, i, c);
    }

    /// Builds `name(args...)`, or the plain atom when `args` is empty.
    pub fn new_term(&mut self, f: Functor, args: &[Cell]) -> Cell {
        debug_assert_eq!(f.arity as usize, args.len());
        if args.is_empty() {
            return Cell::con(f);
        }
        let s = self.heap.new_str(f);
        for (i, &a) in args.iter().enumerate() {
            self.heap.set_arg(s, i, a);
        }
        s
    }

    pub fn empty_list(&self) -> Cell {
        Cell::con(self.f_empty)
    }

    pub fn is_empty_list(&self, c: Cell) -> bool {
        self.deref(c) == self.empty_list()
    }

    pub fn is_dotted_pair(&self, c: Cell) -> bool {
        let c = self.deref(c);
        c.tag() == Tag::Str && self.heap.functor(c) == Some(self.f_dot)
    }

    pub fn is_list(&self, c: Cell) -> bool {
        let mut c = self.deref(c);
        while self.is_dotted_pair(c) {
            c = self.deref(self.heap.arg(c, 1));
        }
        self.is_empty_list(c)
    }

    /// Elements of a proper list, or `None` when the term is no list or its
    /// tail is unbound.
    pub fn list_elements(&self, c: Cell) -> Option<Vec<Cell>> {
        let mut elements = Vec::new();
        let mut c = self.deref(c);
        while self.is_dotted_pair(c) {
            elements.push(self.heap.arg(c, 0));
            c = self.deref(self.heap.arg(c, 1));
        }
        self.is_empty_list(c).then_some(elements)
    }

    pub fn make_list(&mut self, elements: &[Cell], tail: Cell) -> Cell {
        let mut list = tail;
        for &e in elements.iter().rev() {
            let pair = self.heap.new_str(self.f_dot);
            self.heap.set_arg(pair, 0, e);
            self.heap.set_arg(pair, 1, list);
            list = pair;
        }
        list
    }

    pub fn trim_heap(&mut self, n: usize) {
        self.heap.trim(n);
    }

    pub fn trim_trail(&mut self, n: usize) {
        self.trail.truncate(n);
    }

    fn trail_index(&mut self, index: usize) {
        // Only bindings below the latest choice point's watermark need an
        // entry; anything above is discarded wholesale by trim_heap.
        if index < self.hb {
            self.trail.push(index);
        }
    }

    /// Rewrites the heap cells recorded in trail entries `from..to` back to
    /// unbound.
    pub fn unwind_trail(&mut self, from: usize, to: usize) {
        for i in from..to {
            let index = self.trail[i];
            self.heap.set(index, Cell::reference(index));
        }
    }

    pub(crate) fn unwind_trail_to(&mut self, mark: usize) {
        self.unwind_trail(mark, self.trail.len());
        self.trail.truncate(mark);
    }

    /// Drops trail entries at or above the current watermark; they became
    /// permanent when the choice points covering them went away.
    pub(crate) fn tidy_trail(&mut self, from: usize) {
        let hb = self.hb;
        let mut keep = from;
        for i in from..self.trail.len() {
            let index = self.trail[i];
            if index < hb {
                self.trail[keep] = index;
                keep += 1;
            }
        }
        self.trail.truncate(keep);
    }

    /// Binds REF cell `a` to `b` in place, recording the index when needed.
    fn bind(&mut self, a: Cell, b: Cell) {
        debug_assert_eq!(a.tag(), Tag::Ref);
        let index = a.index();
        self.heap.set(index, b);
        self.trail_index(index);
    }

    pub fn unify(&mut self, a: Cell, b: Cell) -> bool {
        let start_trail = self.trail.len();
        let start_stack = self.stack.len();
        let old_hb = self.hb;
        self.hb = self.heap.size();

        let result = self.unify_helper(a, b);

        if !result {
            self.unwind_trail(start_trail, self.trail.len());
            self.trail.truncate(start_trail);
            self.stack.truncate(start_stack);
        }

        self.hb = old_hb;
        result
    }

    fn unify_helper(&mut self, a: Cell, b: Cell) -> bool {
        let depth = self.stack.len();

        self.stack.push(b);
        self.stack.push(a);

        while self.stack.len() > depth {
            let a_raw = self.stack.pop().expect("unify stack underflow");

            let a = self.deref(a_raw);
            let b_raw = self.stack.pop().expect("unify stack underflow");

            let b = self.deref(b_raw);

            if a == b {
                continue;
            }

            match (a.tag(), b.tag()) {
                (Tag::Ref, Tag::Ref) => {
                    // Binding the higher index to the lower avoids a trail
                    // entry when the higher index is above the watermark.
                    if a.index() < b.index() {
                        self.bind(b, a);
                    } else {
                        self.bind(a, b);
                    }
                }
                (Tag::Ref, _) => self.bind(a, b),
                (_, Tag::Ref) => self.bind(b, a),
                (Tag::Str, Tag::Str) => {
                    let fa = self.heap.get(a.index()).functor();
                    let fb = self.heap.get(b.index()).functor();
                    if fa != fb {
                        self.stack.truncate(depth);
                        return false;
                    }
                    // Pairwise arguments, reversed so argument 0 comes first.
                    for i in (0..fa.arity as usize).rev() {
                        self.stack.push(self.heap.arg(b, i));
                        self.stack.push(self.heap.arg(a, i));
                    }
                }
                // CON/INT with unequal payloads, tag mismatches, and the
                // reserved BIG/GBL tags all fail here.
                _ => {
                    self.stack.truncate(depth);
                    return false;
                }
            }
        }

        true
    }

    /// Structural equality: same traversal as unification but never binds;
    /// unbound REFs are equal by identity only.
    pub fn equal(&mut self, a: Cell, b: Cell) -> bool {
        let depth = self.stack.len();

        self.stack.push(b);
        self.stack.push(a);

        while self.stack.len() > depth {
            let a_raw = self.stack.pop().expect("equal stack underflow");

            let a = self.deref(a_raw);
            let b_raw = self.stack.pop().expect("equal stack underflow");

            let b = self.deref(b_raw);

            if a == b {
                continue;
            }

            if a.tag() != b.tag() || a.tag() != Tag::Str {
                self.stack.truncate(depth);
                return false;
            }

            let fa = self.heap.get(a.index()).functor();
            let fb = self.heap.get(b.index()).functor();
            if fa != fb {
                self.stack.truncate(depth);
                return false;
            }

            for i in (0..fa.arity as usize).rev() {
                self.stack.push(self.heap.arg(b, i));
                self.stack.push(self.heap.arg(a, i));
            }
        }

        true
    }

    /// Standard order of terms: REF < INT < CON < STR; REFs by heap index,
    /// integers by value, constants by name then arity, structures by arity,
    /// then functor name, then arguments left to right.
    pub fn compare(&mut self, a: Cell, b: Cell) -> Ordering {
        fn rank(tag: Tag) -> u8 {
            match tag {
                Tag::Ref => 0,
                Tag::Int => 1,
                Tag::Con => 2,
                Tag::Str => 3,
                Tag::Big | Tag::Gbl => 4,
            }
        }

        let depth = self.stack.len();

        self.stack.push(b);
        self.stack.push(a);

        while self.stack.len() > depth {
            let a_raw = self.stack.pop().expect("compare stack underflow");

            let a = self.deref(a_raw);
            let b_raw = self.stack.pop().expect("compare stack underflow");

            let b = self.deref(b_raw);

            if a == b {
                continue;
            }

            let ordering = match (a.tag(), b.tag()) {
                (Tag::Ref, Tag::Ref) => a.index().cmp(&b.index()),
                (Tag::Int, Tag::Int) => a.int_value().cmp(&b.int_value()),
                (Tag::Con, Tag::Con) => {
                    let fa = a.functor();
                    let fb = b.functor();
                    fa.name
                        .name()
                        .cmp(&fb.name.name())
                        .then(fa.arity.cmp(&fb.arity))
                }
                (Tag::Str, Tag::Str) => {
                    let fa = self.heap.get(a.index()).functor();
                    let fb = self.heap.get(b.index()).functor();
                    let ordering = fa
                        .arity
                        .cmp(&fb.arity)
                        .then_with(|| fa.name.name().cmp(&fb.name.name()));
                    if ordering == Ordering::Equal {
                        for i in (0..fa.arity as usize).rev() {
                            self.stack.push(self.heap.arg(b, i));
                            self.stack.push(self.heap.arg(a, i));
                        }
                        continue;
                    }
                    ordering
                }
                (ta, tb) => rank(ta).cmp(&rank(tb)),
            };

            if ordering != Ordering::Equal {
                self.stack.truncate(depth);
                return ordering;
            }
        }

        Ordering::Equal
    }

    /// Copies a term to a fresh one: each distinct source variable maps to
    /// one fresh variable, so shared-variable structure is preserved.
    pub fn copy(&mut self, c: Cell) -> Result<Cell, MachineError> {
        let mut var_map: HashMap<Cell, Cell> = HashMap::new();
        let depth = self.stack.len();
        let temp_depth = self.temp.len();

        self.stack.push(c);
        self.stack.push(Cell::int(0));

        while self.stack.len() > depth {
            let processed = self.stack.pop().expect("copy stack underflow") == Cell::int(1);
            let c_raw = self.stack.pop().expect("copy stack underflow");

            let c = self.deref(c_raw);

            match c.tag() {
                Tag::Ref => {
                    let v = match var_map.get(&c) {
                        Some(&v) => v,
                        None => {
                            let v = self.heap.new_ref();
                            var_map.insert(c, v);
                            v
                        }
                    };
                    self.temp.push(v);
                }
                Tag::Con | Tag::Int => self.temp.push(c),
                Tag::Str => {
                    let f = self.heap.get(c.index()).functor();
                    let n = f.arity as usize;
                    if processed {
                        // The new arguments sit on temp in order.
                        let newstr = self.heap.new_str(f);
                        for i in (0..n).rev() {
                            let a = self.temp.pop().expect("copy temp underflow");
                            self.heap.set_arg(newstr, i, a);
                        }
                        self.temp.push(newstr);
                    } else {
                        self.stack.push(c);
                        self.stack.push(Cell::int(1));
                        // Arguments pushed in reverse so argument 0 is
                        // processed first.
                        for i in (0..n).rev() {
                            self.stack.push(self.heap.arg(c, i));
                            self.stack.push(Cell::int(0));
                        }
                    }
                }
                Tag::Big | Tag::Gbl => {
                    self.stack.truncate(depth);
                    self.temp.truncate(temp_depth);
                    return Err(MachineError::Unsupported);
                }
            }
        }

        Ok(self.temp.pop().expect("copy produced no result"))
    }

    /// Pre-order walk over the dereferenced subterms of `c`.
    pub fn walk(&self, c: Cell, mut f: impl FnMut(Cell)) {
        let mut stack = vec![c];
        while let Some(c) = stack.pop() {
            let c = self.deref(c);
            f(c);
            if c.tag() == Tag::Str {
                let functor = self.heap.get(c.index()).functor();
                for i in (0..functor.arity as usize).rev() {
                    stack.push(self.heap.arg(c, i));
                }
            }
        }
    }

    pub fn is_ground(&self, c: Cell) -> bool {
        let mut ground = true;
        self.walk(c, |c| {
            if c.tag() == Tag::Ref {
                ground = false;
            }
        });
        ground
    }

    pub fn set_name(&mut self, r: Cell, name: ArcStr) {
        self.var_names.insert(r, name);
    }

    pub fn clear_name(&mut self, r: Cell) {
        self.var_names.remove(&r);
    }

    pub fn has_name(&self, r: Cell) -> bool {
        self.var_names.contains_key(&r)
    }

    pub fn name_of(&self, r: Cell) -> Option<ArcStr> {
        self.var_names.get(&r).cloned()
    }

    /// Parses one `term.` from source text.
    pub fn parse(&mut self, source: &str) -> Result<Cell, MachineError> {
        crate::parser::parse_term(self, source)
    }

    /// Renders a term using the operator table and recorded variable names.
    pub fn to_string(&self, c: Cell) -> String {
        crate::emitter::emit(self, c)
    }
}

impl Default for TermEnv {
    fn default() -> Self {
        Self::new()
    }
}
