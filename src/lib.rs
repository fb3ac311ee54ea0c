//! merak — the execution core of a logic-programming runtime embedded in a
//! peer-to-peer coin node.
//!
//! Two interlocking subsystems:
//!
//! - The **term runtime and resolution engine**: tagged cells on a growable
//!   heap ([`machine::TermEnv`]), unification and copying with a trail and
//!   heap watermarks, a clause database with first-argument indexing, and a
//!   structure-copying interpreter ([`machine::Machine`]) with WAM-style
//!   environments, choice points, cut and meta-continuations.
//! - The **proof-of-work search** ([`pow`]): a deterministic star galaxy
//!   keyed by a message seed, camera projections, a seven-star dipper
//!   detector, and a worker pool scanning nonces.
//!
//! ```
//! use merak::Machine;
//!
//! let mut machine = Machine::new();
//! machine
//!     .load_program(
//!         "append([], Zs, Zs).
//!          append([X|Xs], Ys, [X|Zs]) :- append(Xs, Ys, Zs).",
//!     )
//!     .unwrap();
//!
//! let query = machine.parse("append([1,2], [3], Q).").unwrap();
//! assert!(machine.execute(query).unwrap());
//! assert_eq!(machine.get_result(), "Q = [1,2,3]");
//! ```

pub mod atoms;
mod emitter;
pub mod machine;
pub mod ops;
mod parser;
pub mod pow;

pub use machine::{Cell, Functor, Machine, MachineError, Tag, TermEnv};
