use bitvec::prelude::*;
use color_eyre::eyre::Result;
use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Write;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "ε"),
            Symbol::Char(ch) => write!(f, "{}", ch.escape_debug()),
        }
    }
}

/// Structural errors detected while constructing an automaton or transducer.
#[derive(Debug, PartialEq, Eq)]
pub enum FaError {
    /// A transition, initial or final entry names a state outside `0..num_states`
    UndeclaredState { state: usize, num_states: usize },
    /// The automaton was given no initial state
    MissingInitialState,
    /// A range label whose lower bound is above its upper bound
    InvalidRange(char, char),
    /// A deterministic table with two targets for the same state and symbol
    NonDeterministicTransition {
        state: usize,
        symbol: char,
        first: usize,
        second: usize,
    },
}

impl fmt::Display for FaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaError::UndeclaredState { state, num_states } => write!(
                f,
                "Error: State {} is referenced but only {} states are declared!",
                state, num_states
            ),
            FaError::MissingInitialState => {
                write!(f, "Error: An automaton needs at least one initial state!")
            }
            FaError::InvalidRange(start, end) => write!(
                f,
                "Error: Invalid range label provided: {} - {}",
                start.escape_debug(),
                end.escape_debug()
            ),
            FaError::NonDeterministicTransition {
                state,
                symbol,
                first,
                second,
            } => write!(
                f,
                "Error: State {} has two transitions on {}: to {} and to {}!",
                state,
                symbol.escape_debug(),
                first,
                second
            ),
        }
    }
}

impl std::error::Error for FaError {}

pub(crate) fn check_state(state: usize, num_states: usize) -> Result<(), FaError> {
    if state < num_states {
        Ok(())
    } else {
        Err(FaError::UndeclaredState { state, num_states })
    }
}

/// Build a state set of `num_states` bits with the given members switched on.
pub(crate) fn state_set<I>(num_states: usize, members: I) -> BitVec<u8>
where
    I: IntoIterator<Item = usize>,
{
    let mut set = BitVec::repeat(false, num_states);
    for member in members {
        set.set(member, true);
    }
    set
}

/// True when the two state sets share a member.
pub(crate) fn intersects(first: &BitVec<u8>, second: &BitVec<u8>) -> bool {
    first
        .iter_ones()
        .any(|state| second.get(state).map(|bit| *bit).unwrap_or(false))
}

/// A struct which is a bitvec and its hash stored together to ease fetching the hash of the bitvec
/// quickly instead of calculating it each time.
#[derive(Clone, Debug)]
pub(crate) struct HashedBitVec {
    pub(crate) bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    pub(crate) fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

/// The shape every automaton and transducer shares: numbered states, initial and accepting state
/// sets and labelled edges.
pub trait FA {
    fn get_num_states(&self) -> usize;
    fn get_initial_states(&self) -> Vec<usize>;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    /// Outgoing edges of a state as (label, target) pairs, sorted for stable output
    fn get_state_transitions(&self, state_id: usize) -> Vec<(String, usize)>;

    fn get_num_transitions(&self) -> usize {
        (0..self.get_num_states())
            .map(|state| self.get_state_transitions(state).len())
            .sum()
    }

    /// Render the automaton in Graphviz dot format.
    fn to_dot(&self) -> String {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        let initial: HashSet<usize> = self.get_initial_states().into_iter().collect();
        let accept = self.get_acceptor_states();

        for state in 0..self.get_num_states() {
            let mut label = format!("State {}", state);
            if accept[state] {
                label = format!("Accept\n{}", label);
            }
            if initial.contains(&state) {
                label = format!("Start\n{}", label);
            }
            node_map.insert(state, graph.add_node(label));
        }

        for state in 0..self.get_num_states() {
            for (label, target) in self.get_state_transitions(state) {
                graph.add_edge(node_map[&state], node_map[&target], label);
            }
        }

        Dot::new(&graph).to_string()
    }

    /// Write the dot rendering to `<file_name>.dot`.
    fn save_dot(&self, file_name: &str) -> Result<()> {
        let dot_filename = format!("{}.dot", file_name);
        let mut dot_file = File::create(&dot_filename)?;
        dot_file.write_all(self.to_dot().as_bytes())?;
        log::info!("Automaton saved as {}", dot_filename);
        Ok(())
    }
}
