//! # rewrite-fst
//!
//! A library of finite-state automata and transducers for compiling rewrite rules into
//! deterministic string processors.
//!
//! This library provides functionality to:
//! - Build nondeterministic, symbolic and deterministic automata and combine them algebraically
//! - Determinize and minimize automata
//! - Combine transducers with union, concatenation, closure, composition, product and inversion
//! - Turn rule transducers into obligatory, optional or leftmost-longest rewriters
//! - Compile functional transducers into bimachines and evaluate them in two linear scans
//! - Export any automaton in Graphviz dot format

// Re-export the modules
pub mod bimachine;
pub mod builder;
pub mod dfa;
pub mod fa;
pub mod fst;
pub mod nfa;
pub mod pipeline;
pub mod relation;
pub mod rewriter;
pub mod sfsa;

// Re-export commonly used items for convenience
pub use bimachine::{load_bimachine, Bimachine, BimachineError};
pub use builder::{from_epsilon, from_symbol_set, from_word, from_word_pair};
pub use dfa::Dfsa;
pub use fa::{FaError, Symbol, FA};
pub use fst::{Fst, FstError, RealTimeFst};
pub use nfa::Fsa;
pub use pipeline::{BuildEvent, BuildObserver, LogObserver, Pipeline};
pub use rewriter::RewritePolicy;
pub use sfsa::Sfsa;
