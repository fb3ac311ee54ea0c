//! The interpreter core: machine registers, goal dispatch, clause selection
//! under first-argument indexing, environments and choice points on the
//! frame arena, backtracking, cut, and the meta-continuation protocol.

use std::collections::{HashMap, HashSet};
use std::io;
use std::time::{Duration, Instant};

use arcstr::ArcStr;

mod arith;
mod builtins;
mod frames;
mod heap;
mod term_env;

pub use heap::{Cell, Functor, Tag};
pub use term_env::TermEnv;

use frames::{ChoiceFrame, EnvFrame, StackArena};

/// Maximum arity of a dispatched goal; bounds the argument register block.
pub const MAX_ARGS: usize = 32;

const LIBRARY: &str = "
member(X, [X|_]).
member(X, [_|Xs]) :- member(X, Xs).
";

#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    #[error("undefined predicate {0}")]
    UndefinedPredicate(String),
    #[error("undefined arithmetic function {0}")]
    UndefinedFunction(String),
    #[error("argument is not a number: {0}")]
    ArgumentNotNumber(String),
    #[error("arguments are not sufficiently instantiated")]
    NotSufficientlyInstantiated,
    #[error("wrong argument type: {0}")]
    WrongArgType(String),
    #[error("unsupported term type")]
    Unsupported,
    #[error("program is not a list")]
    ProgramNotList,
    #[error("bad clause head: {0}")]
    BadClauseHead(String),
    #[error("goal is not callable: {0}")]
    BadGoal(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("goal has too many arguments: {0}")]
    TooManyArguments(usize),
}

/// Key of the first-argument index: the functor plus the discriminator cell
/// derived from the call's first argument (`None` for an unbound argument).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct FunctorIndex {
    functor: Functor,
    index_arg: Option<Cell>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EnvKind {
    /// Plain continuation frame, as pushed by `,/2`.
    Base,
    /// Clause activation; carries the cut barrier for `!`.
    Clause,
    /// Private barrier pushed by `;/2` and `->/2`; target of `_!`.
    Barrier,
}

#[derive(Clone, Copy)]
enum CutKind {
    Clause,
    Barrier,
}

/// Saved machine state for a meta-continuation (`\+/1`).
#[derive(Clone, Copy)]
struct MetaContext {
    top_b: Option<usize>,
    top_e: Option<usize>,
    b: Option<usize>,
    e: Option<usize>,
    e_is_extended: bool,
    b0: Option<usize>,
    cp: Cell,
    qr: Cell,
    tr: usize,
    h: usize,
    hb: usize,
}

type MetaCallback = fn(&mut Machine, MetaContext) -> Result<(), MachineError>;

#[derive(Clone, Copy)]
struct MetaEntry {
    callback: MetaCallback,
    context: MetaContext,
}

pub struct Machine {
    env: TermEnv,
    stack: StackArena,

    program_db: HashMap<Functor, Vec<Cell>>,
    program_predicates: Vec<Functor>,
    predicate_id: HashMap<FunctorIndex, usize>,
    id_to_predicate: Vec<Vec<Cell>>,

    builtins: HashMap<Functor, builtins::Builtin>,
    builtins_opt: HashMap<Functor, builtins::BuiltinOpt>,
    arith: HashMap<Functor, arith::ArithFn>,

    profiling_enabled: bool,
    profiling: HashMap<Functor, Duration>,
    observatory: Option<crate::pow::Observatory>,

    b: Option<usize>,
    e: Option<usize>,
    e_is_extended: bool,
    top_b: Option<usize>,
    top_e: Option<usize>,
    /// Heap size at `execute` entry; the watermark floor when no choice
    /// point exists.
    base_hb: usize,
    cp: Cell,
    qr: Cell,
    pr: Functor,
    args: [Cell; MAX_ARGS],
    num_of_args: usize,
    b0: Option<usize>,
    top_fail: bool,
    meta: Vec<MetaEntry>,

    query_vars: Vec<(ArcStr, Cell)>,

    f_comma: Functor,
    f_empty: Functor,
    f_implied_by: Functor,
    f_arrow: Functor,
    f_semicolon: Functor,
    f_cut_if: Functor,
    f_disprove: Functor,
}

impl Machine {
    pub fn new() -> Self {
        let env = TermEnv::new();
        let f_empty = Functor::new("[]", 0);

        let mut machine = Self {
            env,
            stack: StackArena::new(),
            program_db: HashMap::new(),
            program_predicates: Vec::new(),
            predicate_id: HashMap::new(),
            // Index id 0 is reserved for the disjunction retry protocol.
            id_to_predicate: vec![Vec::new()],
            builtins: HashMap::new(),
            builtins_opt: HashMap::new(),
            arith: HashMap::new(),
            profiling_enabled: false,
            profiling: HashMap::new(),
            observatory: None,
            b: None,
            e: None,
            e_is_extended: false,
            top_b: None,
            top_e: None,
            base_hb: 0,
            cp: Cell::con(f_empty),
            qr: Cell::con(f_empty),
            pr: Functor::new("", 0),
            args: [Cell::int(0); MAX_ARGS],
            num_of_args: 0,
            b0: None,
            top_fail: false,
            meta: Vec::new(),
            query_vars: Vec::new(),
            f_comma: Functor::new(",", 2),
            f_empty,
            f_implied_by: Functor::new(":-", 2),
            f_arrow: Functor::new("->", 2),
            f_semicolon: Functor::new(";", 2),
            f_cut_if: Functor::new("_!", 0),
            f_disprove: Functor::new("\\+", 1),
        };

        builtins::load_builtins(&mut machine);
        builtins::load_builtins_opt(&mut machine);
        arith::load_fns(&mut machine);

        machine
            .load_program(LIBRARY)
            .expect("builtin library parses");

        machine
    }

    pub fn env(&self) -> &TermEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut TermEnv {
        &mut self.env
    }

    pub fn parse(&mut self, source: &str) -> Result<Cell, MachineError> {
        self.env.parse(source)
    }

    pub fn to_string(&self, c: Cell) -> String {
        self.env.to_string(c)
    }

    /// Installs a pre-configured observatory for the `pow_init`/`pow_scan`
    /// builtins; `pow_init/2` replaces it with a default-configured one.
    pub fn set_observatory(&mut self, observatory: crate::pow::Observatory) {
        self.observatory = Some(observatory);
    }

    /// Combined extent of the live environment and choice-point frames.
    pub fn stack_size(&self) -> usize {
        self.stack_top()
    }

    fn load_builtin(&mut self, f: Functor, builtin: builtins::Builtin) {
        self.builtins.entry(f).or_insert(builtin);
    }

    fn load_builtin_opt(&mut self, f: Functor, builtin: builtins::BuiltinOpt) {
        self.builtins_opt.entry(f).or_insert(builtin);
    }

    fn load_arith(&mut self, f: Functor, function: arith::ArithFn) {
        self.arith.entry(f).or_insert(function);
    }

    // Program loading ------------------------------------------------------

    /// Parses and installs a whole program from source text.
    pub fn load_program(&mut self, source: &str) -> Result<(), MachineError> {
        let clauses = crate::parser::parse_program(&mut self.env, source)?;
        for clause in clauses {
            self.load_clause(clause)?;
        }
        Ok(())
    }

    /// Installs a program given as a list term of clauses.
    pub fn load_program_term(&mut self, list: Cell) -> Result<(), MachineError> {
        let clauses = self
            .env
            .list_elements(list)
            .ok_or(MachineError::ProgramNotList)?;
        for clause in clauses {
            self.load_clause(clause)?;
        }
        Ok(())
    }

    pub fn load_clause(&mut self, clause: Cell) -> Result<(), MachineError> {
        self.syntax_check_clause(clause)?;

        let head = self.clause_head(clause);
        let f = self.env.functor(head).expect("checked head is a functor");

        if !self.program_db.contains_key(&f) {
            self.program_db.insert(f, Vec::new());
            self.program_predicates.push(f);
        }
        self.program_db
            .get_mut(&f)
            .expect("entry just ensured")
            .push(clause);

        // New clauses would otherwise be unreachable through stale
        // memoized clause lists.
        self.invalidate_index(f);

        Ok(())
    }

    fn invalidate_index(&mut self, f: Functor) {
        let stale: Vec<FunctorIndex> = self
            .predicate_id
            .keys()
            .filter(|key| key.functor == f)
            .copied()
            .collect();
        for key in stale {
            if let Some(id) = self.predicate_id.remove(&key) {
                self.id_to_predicate[id].clear();
            }
        }
    }

    fn syntax_check_clause(&self, t: Cell) -> Result<(), MachineError> {
        if self.env.functor(t) == Some(self.f_implied_by) {
            self.syntax_check_head(self.env.arg(t, 0))?;
            self.syntax_check_body(self.env.arg(t, 1))
        } else {
            self.syntax_check_head(t)
        }
    }

    fn syntax_check_head(&self, t: Cell) -> Result<(), MachineError> {
        if !self.env.is_functor(t) {
            return Err(MachineError::BadClauseHead(self.env.to_string(t)));
        }

        let f = self.env.functor(t).expect("functor checked");
        if f == self.f_implied_by
            || f == self.f_semicolon
            || f == self.f_comma
            || f == self.f_arrow
            || f == self.f_disprove
        {
            return Err(MachineError::BadClauseHead(self.env.to_string(t)));
        }

        Ok(())
    }

    fn syntax_check_body(&self, t: Cell) -> Result<(), MachineError> {
        if self.env.is_functor(t) {
            let f = self.env.functor(t).expect("functor checked");
            if f == self.f_arrow || f == self.f_semicolon || f == self.f_comma || f == self.f_disprove
            {
                for i in 0..f.arity as usize {
                    self.syntax_check_body(self.env.arg(t, i))?;
                }
                return Ok(());
            }
        }

        self.syntax_check_goal(t)
    }

    fn syntax_check_goal(&self, t: Cell) -> Result<(), MachineError> {
        if !self.env.is_functor(t) {
            // A variable goal may become callable by the time it runs.
            if self.env.deref(t).tag() == Tag::Ref {
                return Ok(());
            }
            return Err(MachineError::BadGoal(self.env.to_string(t)));
        }
        Ok(())
    }

    // Printing -------------------------------------------------------------

    /// Prints the clause database in insertion order, predicates separated
    /// by a blank line.
    pub fn print_db(&self, out: &mut impl io::Write) -> io::Result<()> {
        let mut first_predicate = true;
        for p in &self.program_predicates {
            let Some(clauses) = self.program_db.get(p) else {
                continue;
            };
            if !first_predicate {
                writeln!(out)?;
            }
            for &clause in clauses {
                writeln!(out, "{}.", self.env.to_string(clause))?;
            }
            first_predicate = false;
        }
        Ok(())
    }

    /// Prints the per-functor time tally collected while `profile/0` was on,
    /// cheapest first.
    pub fn print_profile(&self, out: &mut impl io::Write) -> io::Result<()> {
        let mut entries: Vec<(Functor, Duration)> =
            self.profiling.iter().map(|(&f, &d)| (f, d)).collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));

        for (f, duration) in entries {
            writeln!(out, "{}: {}us", f, duration.as_micros())?;
        }
        Ok(())
    }

    // Execution ------------------------------------------------------------

    fn prepare_execution(&mut self) {
        self.stack.clear();
        self.num_of_args = 0;
        self.args = [Cell::int(0); MAX_ARGS];
        self.top_fail = false;
        self.b = None;
        self.e = None;
        self.e_is_extended = false;
        self.b0 = None;
        self.top_b = None;
        self.top_e = None;
        self.meta.clear();
        self.base_hb = self.env.heap_size();
        self.env.set_hb(self.base_hb);
        self.cp = Cell::con(self.f_empty);
        self.qr = Cell::con(self.f_empty);
    }

    /// Attempts to prove `query`. On success the bindings are observable
    /// through the query term; on failure every binding has been rewound.
    pub fn execute(&mut self, query: Cell) -> Result<bool, MachineError> {
        self.env.trim_trail(0);
        self.prepare_execution();
        self.query_vars.clear();

        // Record the query's variables, in order of first occurrence, for
        // get_result.
        let mut vars = Vec::new();
        self.env.walk(query, |t| {
            if t.tag() == Tag::Ref {
                vars.push(t);
            }
        });
        let mut seen = HashSet::new();
        for var in vars {
            let name = match self.env.name_of(var) {
                Some(name) => name,
                None => ArcStr::from(self.env.to_string(var)),
            };
            if seen.insert(name.clone()) {
                self.query_vars.push((name, var));
            }
        }

        // The toplevel environment: quiescence is reached when the proof
        // unwinds back past it.
        self.qr = query;
        self.allocate_environment(EnvKind::Clause);
        self.cp = query;

        match self.cont() {
            Ok(result) => Ok(result),
            Err(error) => {
                self.recover();
                Err(error)
            }
        }
    }

    /// Requests the next solution by failing into the most recent choice
    /// point.
    pub fn next(&mut self) -> Result<bool, MachineError> {
        self.fail()?;
        if self.top_fail {
            return Ok(false);
        }
        match self.cont() {
            Ok(result) => Ok(result),
            Err(error) => {
                self.recover();
                Err(error)
            }
        }
    }

    /// Restores the pre-execute state after an abort so the machine stays
    /// reusable.
    fn recover(&mut self) {
        self.env.unwind_trail_to(0);
        let heap_mark = self.base_hb;
        self.env.trim_heap(heap_mark);
        self.prepare_execution();
    }

    fn cont(&mut self) -> Result<bool, MachineError> {
        loop {
            if !self.top_fail {
                // Run the current proof to quiescence.
                loop {
                    self.execute_once()?;
                    if self.e == self.top_e || self.top_fail {
                        break;
                    }
                }
            }

            let Some(entry) = self.meta.last().copied() else {
                break;
            };
            // The callback commits, backtracks, or inverts; a failure it
            // leaves behind propagates by ordinary backtracking, possibly
            // up to the next meta barrier.
            (entry.callback)(self, entry.context)?;
            if self.top_fail {
                self.top_fail = false;
                self.fail()?;
            }

            if self.meta.is_empty() && (self.top_fail || self.e == self.top_e) {
                break;
            }
        }

        Ok(!self.top_fail)
    }

    fn execute_once(&mut self) -> Result<(), MachineError> {
        let instruction = self.cp;
        self.cp = Cell::con(self.f_empty);
        self.dispatch(instruction)
    }

    fn dispatch(&mut self, goal: Cell) -> Result<(), MachineError> {
        let goal = self.env.deref(goal);
        self.qr = goal;

        let f = match goal.tag() {
            Tag::Con | Tag::Str => self.env.functor(goal).expect("functor of callable"),
            Tag::Ref => return Err(MachineError::NotSufficientlyInstantiated),
            Tag::Int | Tag::Big | Tag::Gbl => {
                return Err(MachineError::BadGoal(self.env.to_string(goal)))
            }
        };

        if f == self.f_empty {
            // Return from the current body.
            log::trace!("exit");
            self.deallocate_environment();
            return Ok(());
        }

        log::debug!("call {}", self.env.to_string(goal));

        let started = self.profiling_enabled.then(Instant::now);
        let result = self.call_goal(f, goal);
        if let Some(started) = started {
            *self.profiling.entry(f).or_default() += started.elapsed();
        }

        result
    }

    fn call_goal(&mut self, f: Functor, goal: Cell) -> Result<(), MachineError> {
        let arity = f.arity as usize;
        if arity > MAX_ARGS {
            return Err(MachineError::TooManyArguments(arity));
        }

        for i in 0..arity {
            self.args[i] = self.env.arg(goal, i);
        }
        self.num_of_args = arity;

        if let Some(&builtin) = self.builtins.get(&f) {
            let args = self.args;
            if !builtin(self, &args[..arity])? {
                self.fail()?;
            }
            return Ok(());
        }

        if let Some(&builtin) = self.builtins_opt.get(&f) {
            let args = self.args;
            match builtin(self, &args[..arity])? {
                builtins::Tribool::True => return Ok(()),
                builtins::Tribool::False => {
                    self.fail()?;
                    return Ok(());
                }
                builtins::Tribool::Indeterminate => {}
            }
        }

        let first_arg = if arity == 0 {
            self.env.empty_list()
        } else {
            self.args[0]
        };
        let predicate_id = self.matched_predicate_id(f, first_arg);
        self.pr = f;

        if self.id_to_predicate[predicate_id].is_empty() {
            if self
                .program_db
                .get(&f)
                .map_or(true, |clauses| clauses.is_empty())
            {
                return Err(MachineError::UndefinedPredicate(f.to_string()));
            }
            // The index filtered every clause out; the predicate exists, so
            // this is an ordinary failure.
            self.fail()?;
            return Ok(());
        }

        self.b0 = self.b;
        if self.id_to_predicate[predicate_id].len() > 1 {
            // BP starts out exhausted; select_clause packs in the real
            // alternative once a head matches.
            self.allocate_choice_point(Cell::int(0));
        }

        if !self.select_clause(goal, predicate_id, 0)? {
            self.fail()?;
        }
        Ok(())
    }

    fn select_clause(
        &mut self,
        goal: Cell,
        predicate_id: usize,
        from: usize,
    ) -> Result<bool, MachineError> {
        if predicate_id == 0 {
            // Disjunction retry: alternatives are the arguments of the saved
            // ';' term.
            if from > 1 {
                return Ok(false);
            }
            let b = self.b.expect("disjunction retry has its choice point");
            self.stack.set_choice_bp(b, Cell::int(from as i64 + 1));
            self.cp = self.env.arg(self.qr, from);
            return Ok(true);
        }

        let num_clauses = self.id_to_predicate[predicate_id].len();
        let has_choices = num_clauses > 1;

        for i in from..num_clauses {
            let clause = self.id_to_predicate[predicate_id][i];

            let mark = self.env.heap_size();
            // Instantiate the clause with fresh variables.
            let copy = match self.env.copy(clause) {
                Ok(copy) => copy,
                Err(_) => {
                    self.env.trim_heap(mark);
                    continue;
                }
            };
            let head = self.clause_head(copy);
            let body = self.clause_body(copy);

            if self.env.unify(head, goal) {
                if has_choices {
                    let b = self.b.expect("multi-clause dispatch pushed a choice point");
                    let bp = if i + 1 < num_clauses {
                        Cell::int(((predicate_id << 8) | (i + 1)) as i64)
                    } else {
                        Cell::int(0)
                    };
                    self.stack.set_choice_bp(b, bp);
                }

                self.allocate_environment(EnvKind::Clause);
                self.cp = body;
                self.qr = head;
                return Ok(true);
            }

            // Discard the copy.
            self.env.trim_heap(mark);
        }

        Ok(false)
    }

    pub(crate) fn fail(&mut self) -> Result<(), MachineError> {
        loop {
            log::debug!("fail {}", self.env.to_string(self.qr));

            if self.b == self.top_b {
                self.top_fail = true;
                if self.top_b.is_none() && self.meta.is_empty() {
                    // Top-level exhaustion leaves no bindings and no frames.
                    // Inside a meta continuation the callback rewinds to its
                    // own marks instead.
                    self.env.unwind_trail_to(0);
                }
                self.e = self.top_e;
                self.e_is_extended = false;
                return Ok(());
            }

            let b = self.b.expect("b differs from top_b");
            let ch = self.reset_to_choice_point(b);

            let bp = ch.bp.int_value() as usize;
            if bp != 0 {
                let predicate_id = bp >> 8;
                let from = bp & 0xff;
                log::debug!("redo {}", self.env.to_string(self.qr));
                if self.select_clause(self.qr, predicate_id, from)? {
                    return Ok(());
                }
            }

            // This frame is exhausted; try the older one.
            self.b = ch.prev_b;
        }
    }

    // Clause access --------------------------------------------------------

    fn clause_head(&self, clause: Cell) -> Cell {
        if self.env.functor(clause) == Some(self.f_implied_by) {
            self.env.arg(clause, 0)
        } else {
            clause
        }
    }

    fn clause_body(&self, clause: Cell) -> Cell {
        if self.env.functor(clause) == Some(self.f_implied_by) {
            self.env.arg(clause, 1)
        } else {
            Cell::con(self.f_empty)
        }
    }

    /// True when the two cells can be ruled out as unifiable without
    /// binding anything.
    fn definitely_inequal(&self, a: Cell, b: Cell) -> bool {
        let a = self.env.deref(a);
        let b = self.env.deref(b);
        if a.tag() == Tag::Ref || b.tag() == Tag::Ref {
            return false;
        }
        if a.tag() != b.tag() {
            return true;
        }
        match a.tag() {
            Tag::Con | Tag::Int => a != b,
            Tag::Str => self.env.functor(a) != self.env.functor(b),
            _ => false,
        }
    }

    fn compute_matched_predicate(&self, f: Functor, first_arg: Cell) -> Vec<Cell> {
        let Some(clauses) = self.program_db.get(&f) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        for &clause in clauses {
            let head = self.clause_head(clause);
            let head_functor = self.env.functor(head).expect("clause head is a functor");
            if head_functor.arity > 0 {
                let head_first_arg = self.env.arg(head, 0);
                if self.definitely_inequal(head_first_arg, first_arg) {
                    continue;
                }
            }
            matched.push(clause);
        }
        matched
    }

    fn matched_predicate_id(&mut self, f: Functor, first_arg: Cell) -> usize {
        let first_arg = self.env.deref(first_arg);
        let index_arg = match first_arg.tag() {
            Tag::Str => Some(Cell::con(
                self.env.functor(first_arg).expect("structure has a header"),
            )),
            Tag::Con | Tag::Int | Tag::Big | Tag::Gbl => Some(first_arg),
            Tag::Ref => None,
        };

        let key = FunctorIndex {
            functor: f,
            index_arg,
        };

        if let Some(&id) = self.predicate_id.get(&key) {
            return id;
        }

        let id = self.id_to_predicate.len();
        let matched = self.compute_matched_predicate(f, first_arg);
        self.id_to_predicate.push(matched);
        self.predicate_id.insert(key, id);
        id
    }

    // Frames ---------------------------------------------------------------

    fn stack_top(&self) -> usize {
        let e_end = self.e.map_or(0, |e| self.stack.frame_end(e));
        let b_end = self.b.map_or(0, |b| self.stack.frame_end(b));
        e_end.max(b_end)
    }

    fn allocate_environment(&mut self, kind: EnvKind) {
        let at = self.stack_top();
        let extended = kind != EnvKind::Base;
        let frame = EnvFrame {
            prev_e: self.e,
            prev_e_extended: self.e_is_extended,
            cp: self.cp,
            num_y: 0,
            extended,
            barrier: kind == EnvKind::Barrier,
            b0: if extended { self.b0 } else { None },
            qr: self.qr,
            pr: Cell::con(self.pr),
        };
        let at = self.stack.push_env(at, &frame);
        self.e = Some(at);
        self.e_is_extended = extended;
    }

    /// Restores CP and E from the current environment. The frame itself is
    /// reclaimed lazily: allocation tops out past the newest live frame, so
    /// an environment covered by a choice point survives until backtracking
    /// discards that choice point.
    fn deallocate_environment(&mut self) {
        let Some(e) = self.e else {
            return;
        };
        let frame = self.stack.env(e);
        self.cp = frame.cp;
        self.e = frame.prev_e;
        self.e_is_extended = frame.prev_e_extended;
    }

    fn allocate_choice_point(&mut self, bp: Cell) {
        let at = self.stack_top();
        let frame = ChoiceFrame {
            prev_b: self.b,
            prev_e: self.e,
            prev_e_extended: self.e_is_extended,
            cp: self.cp,
            h: self.env.heap_size(),
            tr: self.env.trail_size(),
            b0: self.b0,
            bp,
            pr: Cell::con(self.pr),
            qr: self.qr,
            num_args: self.num_of_args,
        };
        let at = self
            .stack
            .push_choice(at, &frame, &self.args[..self.num_of_args]);
        self.b = Some(at);
        self.env.set_hb(frame.h);
    }

    fn reset_to_choice_point(&mut self, at: usize) -> ChoiceFrame {
        let ch = self.stack.choice(at);

        self.e = ch.prev_e;
        self.e_is_extended = ch.prev_e_extended;
        self.cp = ch.cp;
        self.env.unwind_trail_to(ch.tr);
        self.env.trim_heap(ch.h);
        self.b0 = ch.b0;
        self.env.set_hb(self.env.heap_size());
        self.qr = ch.qr;
        self.pr = ch.pr.functor();
        self.num_of_args = ch.num_args;
        for i in 0..ch.num_args {
            self.args[i] = self.stack.choice_arg(at, i);
        }

        ch
    }

    /// Cut: discards choice points down to the barrier recorded by the
    /// nearest clause activation (`!`) or `;`/`->` barrier (`_!`).
    fn cut(&mut self, kind: CutKind) {
        let want_barrier = matches!(kind, CutKind::Barrier);

        let mut e = self.e;
        let target = loop {
            match e {
                None => break self.top_b,
                Some(at) => {
                    let frame = self.stack.env(at);
                    if frame.extended && frame.barrier == want_barrier {
                        break frame.b0;
                    }
                    e = frame.prev_e;
                }
            }
        };

        self.b = target;
        let (trail_mark, hb) = match target {
            Some(b) => {
                let frame = self.stack.choice(b);
                (frame.tr, frame.h)
            }
            None => (0, self.base_hb),
        };
        self.env.set_hb(hb);
        self.env.tidy_trail(trail_mark);
    }

    // Meta continuations ---------------------------------------------------

    fn capture_meta_context(&self) -> MetaContext {
        MetaContext {
            top_b: self.top_b,
            top_e: self.top_e,
            b: self.b,
            e: self.e,
            e_is_extended: self.e_is_extended,
            b0: self.b0,
            cp: self.cp,
            qr: self.qr,
            tr: self.env.trail_size(),
            h: self.env.heap_size(),
            hb: self.env.hb(),
        }
    }

    fn release_meta_context(&mut self, context: MetaContext) {
        self.meta.pop();
        self.top_b = context.top_b;
        self.top_e = context.top_e;
        self.b = context.b;
        self.e = context.e;
        self.e_is_extended = context.e_is_extended;
        self.b0 = context.b0;
        self.cp = context.cp;
        self.qr = context.qr;
        self.env.unwind_trail_to(context.tr);
        self.env.trim_heap(context.h);
        self.env.set_hb(context.hb);
    }

    // Results --------------------------------------------------------------

    /// Renders the solution as `Var = value, ...`. Unnamed singletons render
    /// as `_`; repeated unnamed variables are numbered `G_0, G_1, ...`.
    pub fn get_result(&mut self) -> String {
        // Count how often each unbound variable occurs across the reported
        // values; the counts drive the _ / G_n naming below.
        let mut occurrences: Vec<(Cell, usize)> = Vec::new();
        for (_, value) in &self.query_vars {
            self.env.walk(*value, |t| {
                if t.tag() == Tag::Ref {
                    match occurrences.iter_mut().find(|(cell, _)| *cell == t) {
                        Some((_, count)) => *count += 1,
                        None => occurrences.push((t, 1)),
                    }
                }
            });
        }

        let mut named_var_count = 0;
        let mut temp_named = Vec::new();
        for &(var, count) in &occurrences {
            if self.env.has_name(var) {
                continue;
            }
            let name = if count == 1 {
                arcstr::literal!("_")
            } else {
                let name = arcstr::format!("G_{named_var_count}");
                named_var_count += 1;
                name
            };
            self.env.set_name(var, name);
            temp_named.push(var);
        }

        let mut out = String::new();
        let mut first = true;
        for (name, value) in &self.query_vars {
            let value_str = self.env.to_string(*value);
            if name.as_str() != value_str {
                if !first {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(" = ");
                out.push_str(&value_str);
                first = false;
            }
        }

        for var in temp_named {
            self.env.clear_name(var);
        }

        if first {
            out.push_str("true");
        }
        out
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Machine, Tag};

    #[test]
    fn index_discriminates_on_first_argument() {
        let mut machine = Machine::new();
        machine
            .load_program("p(a, 1). p(b, 2). p(c, 3).")
            .expect("load");

        let query = machine.parse("p(b, X).").expect("parse");
        assert!(machine.execute(query).expect("execute"));
        assert_eq!(machine.get_result(), "X = 2");

        // A bound first argument admits exactly one clause, so no choice
        // point is left behind.
        assert!(!machine.next().expect("next"));
    }

    #[test]
    fn loading_a_clause_invalidates_the_memoized_index() {
        let mut machine = Machine::new();
        machine.load_program("q(a).").expect("load");

        let query = machine.parse("q(b).").expect("parse");
        assert!(!machine.execute(query).expect("execute"));

        machine.load_program("q(b).").expect("load");
        let query = machine.parse("q(b).").expect("parse");
        assert!(machine.execute(query).expect("execute"));
    }

    #[test]
    fn unbound_first_argument_sees_every_clause() {
        let mut machine = Machine::new();
        machine.load_program("r(a). r(b).").expect("load");

        let query = machine.parse("r(X).").expect("parse");
        assert!(machine.execute(query).expect("execute"));
        assert_eq!(machine.get_result(), "X = a");
        assert!(machine.next().expect("next"));
        assert_eq!(machine.get_result(), "X = b");
        assert!(!machine.next().expect("next"));
    }

    #[test]
    fn failed_query_leaves_no_bindings() {
        let mut machine = Machine::new();
        machine.load_program("s(a).").expect("load");

        let query = machine.parse("s(X), s(b).").expect("parse");
        assert!(!machine.execute(query).expect("execute"));

        assert_eq!(machine.env().trail_size(), 0);
        assert_eq!(machine.stack_size(), 0);
        let x = machine.env().arg(query, 0);
        let x = machine.env().arg(x, 0);
        assert_eq!(machine.env().deref(x).tag(), Tag::Ref);
    }

    #[test]
    fn bad_clause_heads_are_rejected() {
        let mut machine = Machine::new();
        assert!(machine.load_program("(a ; b).").is_err());
        assert!(machine.load_program("(a :- b) :- c.").is_err());
    }
}
