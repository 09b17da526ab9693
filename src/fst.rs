/* Finite-state transducers. A transition reads one symbol or nothing and writes a string, so a
 * transducer describes a relation between input and output strings. All operations build a new
 * transducer and leave their operands untouched. */

use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::fa::{check_state, FaError, Symbol, FA};
use crate::nfa::Fsa;

#[derive(Debug, PartialEq, Eq)]
pub enum FstError {
    /// An epsilon cycle through the state writes output, so a single input has unboundedly many
    /// outputs
    UnboundedOutput { state: usize },
}

impl fmt::Display for FstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FstError::UnboundedOutput { state } => write!(
                f,
                "Error: State {} lies on an epsilon cycle which writes output!",
                state
            ),
        }
    }
}

impl std::error::Error for FstError {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FstState {
    pub(crate) transitions: HashMap<Symbol, HashSet<(String, usize)>>,
}

#[derive(Debug, Clone)]
pub struct Fst {
    pub(crate) states: Vec<FstState>,
    pub(crate) initial_states: BitVec<u8>,
    pub(crate) accept_states: BitVec<u8>,
    pub(crate) input_alphabet: HashSet<char>,
}

/// Epsilon free form of a transducer. Every transition reads exactly one symbol; the output of
/// the epsilon moves in front of it is folded into its output, and the output of the epsilon
/// moves leading into acceptance is kept per state in `final_outputs`. A state is accepting iff
/// its set of final outputs is non-empty.
#[derive(Debug, Clone)]
pub struct RealTimeFst {
    pub(crate) initial_states: Vec<usize>,
    pub(crate) transitions: Vec<Vec<(char, String, usize)>>,
    pub(crate) final_outputs: Vec<BTreeSet<String>>,
}

impl FA for Fst {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_initial_states(&self) -> Vec<usize> {
        self.initial_states.iter_ones().collect()
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(String, usize)> {
        self.arcs(state_id)
            .into_iter()
            .map(|(input, output, target)| {
                (format!("{}:{}", input, output.escape_debug()), target)
            })
            .collect()
    }
}

impl Fst {
    /// Build a transducer over the states `0..num_states` from `(from, input, output, to)`
    /// transitions.
    pub fn new<I, F, T, S>(num_states: usize, initial: I, finals: F, transitions: T) -> Result<Fst>
    where
        I: IntoIterator<Item = usize>,
        F: IntoIterator<Item = usize>,
        T: IntoIterator<Item = (usize, Symbol, S, usize)>,
        S: Into<String>,
    {
        let mut result = Fst::empty();
        for _ in 0..num_states {
            result.add_state();
        }

        for state in initial {
            check_state(state, num_states).map_err(Report::new)?;
            result.set_initial_state(state);
        }

        if result.initial_states.not_any() {
            return Err(Report::new(FaError::MissingInitialState));
        }

        for state in finals {
            check_state(state, num_states).map_err(Report::new)?;
            result.set_accept_state(state);
        }

        for (from, input, output, to) in transitions {
            check_state(from, num_states).map_err(Report::new)?;
            check_state(to, num_states).map_err(Report::new)?;
            result.add_transition(from, input, output.into(), to);
        }

        Ok(result)
    }

    pub(crate) fn empty() -> Self {
        Fst {
            states: Vec::new(),
            initial_states: BitVec::new(),
            accept_states: BitVec::new(),
            input_alphabet: HashSet::new(),
        }
    }

    pub(crate) fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(FstState::default());
        self.initial_states.push(false);
        self.accept_states.push(false);
        state_id
    }

    pub(crate) fn add_transition(&mut self, from: usize, input: Symbol, output: String, to: usize) {
        if let Symbol::Char(ch) = input {
            self.input_alphabet.insert(ch);
        }
        self.states[from]
            .transitions
            .entry(input)
            .or_default()
            .insert((output, to));
    }

    pub(crate) fn set_initial_state(&mut self, state_id: usize) {
        self.initial_states.set(state_id, true);
    }

    pub(crate) fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
    }

    fn append(&mut self, other: &Fst) -> usize {
        let offset = self.states.len();

        for _ in 0..other.states.len() {
            self.add_state();
        }

        for state in 0..other.states.len() {
            for (input, output, target) in other.arcs(state) {
                self.add_transition(state + offset, input, output.to_string(), target + offset);
            }
        }

        offset
    }

    /// Copy an automaton behind the existing states, relabelling each of its symbols.
    fn append_fsa<L>(&mut self, fsa: &Fsa, relabel: L) -> usize
    where
        L: Fn(Symbol) -> (Symbol, String),
    {
        let offset = self.states.len();

        for _ in 0..fsa.get_num_states() {
            self.add_state();
        }

        for (state, fsa_state) in fsa.get_states().iter().enumerate() {
            for (symbol, targets) in fsa_state.get_transitions() {
                let (input, output) = relabel(*symbol);
                for target in targets {
                    self.add_transition(state + offset, input, output.clone(), target + offset);
                }
            }
        }

        offset
    }

    /// Outgoing transitions of a state as (input, output, target), sorted.
    pub(crate) fn arcs(&self, state: usize) -> Vec<(Symbol, &str, usize)> {
        let mut arcs: Vec<(Symbol, &str, usize)> = self.states[state]
            .transitions
            .iter()
            .flat_map(|(input, targets)| {
                targets
                    .iter()
                    .map(move |(output, target)| (*input, output.as_str(), *target))
            })
            .collect();
        arcs.sort_unstable();
        arcs
    }

    /// Symbols read by the transitions
    pub fn get_input_alphabet(&self) -> &HashSet<char> {
        &self.input_alphabet
    }

    pub fn union(&self, other: &Fst) -> Fst {
        let mut result = Fst::empty();
        let new_start = result.add_state();

        for operand in [self, other] {
            let offset = result.append(operand);
            for initial in operand.initial_states.iter_ones() {
                result.add_transition(new_start, Symbol::Epsilon, String::new(), initial + offset);
            }
            for accept in operand.accept_states.iter_ones() {
                result.set_accept_state(accept + offset);
            }
        }

        result.set_initial_state(new_start);
        result
    }

    pub fn concat(&self, other: &Fst) -> Fst {
        let mut result = Fst::empty();
        let offset1 = result.append(self);
        let offset2 = result.append(other);

        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial + offset1);
        }

        for accept in self.accept_states.iter_ones() {
            for initial in other.initial_states.iter_ones() {
                result.add_transition(
                    accept + offset1,
                    Symbol::Epsilon,
                    String::new(),
                    initial + offset2,
                );
            }
        }

        for accept in other.accept_states.iter_ones() {
            result.set_accept_state(accept + offset2);
        }

        result
    }

    pub fn plus(&self) -> Fst {
        let mut result = self.clone();

        for accept in self.accept_states.iter_ones() {
            for initial in self.initial_states.iter_ones() {
                result.add_transition(accept, Symbol::Epsilon, String::new(), initial);
            }
        }

        result
    }

    pub fn star(&self) -> Fst {
        let plus = self.plus();
        let mut result = Fst::empty();
        let new_start = result.add_state();
        let offset = result.append(&plus);

        for initial in plus.initial_states.iter_ones() {
            result.add_transition(new_start, Symbol::Epsilon, String::new(), initial + offset);
        }
        for accept in plus.accept_states.iter_ones() {
            result.set_accept_state(accept + offset);
        }

        result.set_initial_state(new_start);
        result.set_accept_state(new_start);
        result
    }

    /// Split every output longer than one symbol into a path writing one symbol per transition.
    /// The first transition of the path keeps the input, the others read nothing.
    pub fn expand(&self) -> Fst {
        let mut result = Fst::empty();
        for _ in 0..self.states.len() {
            result.add_state();
        }
        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial);
        }
        for accept in self.accept_states.iter_ones() {
            result.set_accept_state(accept);
        }

        for state in 0..self.states.len() {
            for (input, output, target) in self.arcs(state) {
                let symbols: Vec<char> = output.chars().collect();
                if symbols.len() <= 1 {
                    result.add_transition(state, input, output.to_string(), target);
                    continue;
                }

                let mut from = state;
                let mut label = input;
                for (position, symbol) in symbols.iter().enumerate() {
                    let to = if position + 1 == symbols.len() {
                        target
                    } else {
                        result.add_state()
                    };
                    result.add_transition(from, label, symbol.to_string(), to);
                    from = to;
                    label = Symbol::Epsilon;
                }
            }
        }

        result
    }

    /// The converse relation: outputs become inputs and inputs become outputs.
    pub fn inverse(&self) -> Fst {
        let expanded = self.expand();
        let mut result = Fst::empty();
        for _ in 0..expanded.states.len() {
            result.add_state();
        }
        for initial in expanded.initial_states.iter_ones() {
            result.set_initial_state(initial);
        }
        for accept in expanded.accept_states.iter_ones() {
            result.set_accept_state(accept);
        }

        for state in 0..expanded.states.len() {
            for (input, output, target) in expanded.arcs(state) {
                let new_input = output
                    .chars()
                    .next()
                    .map_or(Symbol::Epsilon, Symbol::Char);
                let new_output = match input {
                    Symbol::Epsilon => String::new(),
                    Symbol::Char(ch) => ch.to_string(),
                };
                result.add_transition(state, new_input, new_output, target);
            }
        }

        result
    }

    /// The automaton of the input strings which have at least one output.
    pub fn domain(&self) -> Fsa {
        let mut result = Fsa::empty();
        for _ in 0..self.states.len() {
            result.add_state();
        }
        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial);
        }
        for accept in self.accept_states.iter_ones() {
            result.set_accept_state(accept);
        }

        for (state, fst_state) in self.states.iter().enumerate() {
            for (input, targets) in &fst_state.transitions {
                for (_, target) in targets {
                    result.add_transition(state, *input, *target);
                }
            }
        }

        result
    }

    /// Keep only the states lying on a path from an initial to an accepting state. A transducer
    /// with an empty relation trims down to a lone initial state.
    pub fn trim(&self) -> Fst {
        let num_states = self.states.len();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); num_states];

        let mut accessible: BitVec<u8> = BitVec::repeat(false, num_states);
        let mut stack: Vec<usize> = self.initial_states.iter_ones().collect();
        for state in &stack {
            accessible.set(*state, true);
        }

        while let Some(state) = stack.pop() {
            for targets in self.states[state].transitions.values() {
                for (_, target) in targets {
                    predecessors[*target].push(state);
                    if !accessible[*target] {
                        accessible.set(*target, true);
                        stack.push(*target);
                    }
                }
            }
        }

        let mut useful: BitVec<u8> = BitVec::repeat(false, num_states);
        let mut stack: Vec<usize> = self
            .accept_states
            .iter_ones()
            .filter(|state| accessible[*state])
            .collect();
        for state in &stack {
            useful.set(*state, true);
        }

        while let Some(state) = stack.pop() {
            for &predecessor in &predecessors[state] {
                if !useful[predecessor] {
                    useful.set(predecessor, true);
                    stack.push(predecessor);
                }
            }
        }

        let mut result = Fst::empty();

        if useful.not_any() {
            let start = result.add_state();
            result.set_initial_state(start);
            return result;
        }

        let mut new_ids: Vec<Option<usize>> = vec![None; num_states];
        for state in useful.iter_ones() {
            new_ids[state] = Some(result.add_state());
        }

        for state in useful.iter_ones() {
            let Some(from) = new_ids[state] else {
                continue;
            };
            if self.initial_states[state] {
                result.set_initial_state(from);
            }
            if self.accept_states[state] {
                result.set_accept_state(from);
            }
            for (input, output, target) in self.arcs(state) {
                if let Some(to) = new_ids[target] {
                    result.add_transition(from, input, output.to_string(), to);
                }
            }
        }

        result
    }

    /// Relational composition: the result maps `x` to `z` whenever `self` maps `x` to some `y`
    /// and `other` maps `y` to `z`.
    ///
    /// The left operand is expanded first so every transition writes at most one symbol. States
    /// of the result are triples `(p, q, filter)`. A left move writing nothing is only allowed
    /// while the filter is 0, a right move reading nothing sets it to 1 and a matched move resets
    /// it, so each interleaving of the two kinds of epsilon moves is built once.
    pub fn compose(&self, other: &Fst) -> Fst {
        let left = self.expand();
        let mut result = Fst::empty();
        let mut triple_ids: HashMap<(usize, usize, u8), usize> = HashMap::new();
        let mut work_list: VecDeque<(usize, usize, u8)> = VecDeque::new();

        let mut intern = |result: &mut Fst,
                          work_list: &mut VecDeque<(usize, usize, u8)>,
                          triple: (usize, usize, u8)|
         -> usize {
            *triple_ids.entry(triple).or_insert_with(|| {
                work_list.push_back(triple);
                result.add_state()
            })
        };

        for p in left.initial_states.iter_ones() {
            for q in other.initial_states.iter_ones() {
                let id = intern(&mut result, &mut work_list, (p, q, 0));
                result.set_initial_state(id);
            }
        }

        let mut from = 0;
        while let Some((p, q, filter)) = work_list.pop_front() {
            let mut moves: Vec<(Symbol, String, (usize, usize, u8))> = Vec::new();
            let right_arcs = other.arcs(q);

            for (input, output, p2) in left.arcs(p) {
                match output.chars().next() {
                    None => {
                        if filter == 0 {
                            moves.push((input, String::new(), (p2, q, 0)));
                        }
                    }
                    Some(middle) => {
                        for (right_input, right_output, q2) in &right_arcs {
                            if *right_input == Symbol::Char(middle) {
                                moves.push((input, right_output.to_string(), (p2, *q2, 0)));
                            }
                        }
                    }
                }
            }

            for (right_input, right_output, q2) in &right_arcs {
                if *right_input == Symbol::Epsilon {
                    moves.push((Symbol::Epsilon, right_output.to_string(), (p, *q2, 1)));
                }
            }

            for (input, output, triple) in moves {
                let to = intern(&mut result, &mut work_list, triple);
                result.add_transition(from, input, output, to);
            }

            if left.accept_states[p] && other.accept_states[q] {
                result.set_accept_state(from);
            }
            from += 1;
        }

        let trimmed = result.trim();
        log::debug!(
            "Composition explored {} states, {} remain after trimming",
            result.get_num_states(),
            trimmed.get_num_states()
        );
        trimmed
    }

    /// Compose from left to right: `self`, then every transducer of `others` in order.
    pub fn compose_all(&self, others: &[&Fst]) -> Fst {
        others
            .iter()
            .fold(self.clone(), |composed, next| composed.compose(next))
    }

    fn check_epsilon_cycles(&self) -> Result<()> {
        let mut graph: DiGraph<usize, bool> = DiGraph::new();
        let nodes: Vec<_> = (0..self.states.len())
            .map(|state| graph.add_node(state))
            .collect();

        for (state, fst_state) in self.states.iter().enumerate() {
            if let Some(targets) = fst_state.transitions.get(&Symbol::Epsilon) {
                for (output, target) in targets {
                    graph.add_edge(nodes[state], nodes[*target], output.is_empty());
                }
            }
        }

        let mut component_of = vec![0; self.states.len()];
        for (component_id, component) in tarjan_scc(&graph).iter().enumerate() {
            for node in component {
                component_of[graph[*node]] = component_id;
            }
        }

        for edge in graph.edge_references() {
            let (source, target) = (graph[edge.source()], graph[edge.target()]);
            if !*edge.weight() && component_of[source] == component_of[target] {
                return Err(Report::new(FstError::UnboundedOutput { state: source }));
            }
        }

        Ok(())
    }

    /// Every state reachable through epsilon moves, paired with the output written on the way.
    fn epsilon_closure_with_outputs(&self, state: usize) -> Vec<(usize, String)> {
        let mut visited: HashSet<(usize, String)> = HashSet::new();
        let mut work_list: VecDeque<(usize, String)> = VecDeque::new();
        let mut closure = Vec::new();

        visited.insert((state, String::new()));
        work_list.push_back((state, String::new()));

        while let Some((current, prefix)) = work_list.pop_front() {
            if let Some(targets) = self.states[current].transitions.get(&Symbol::Epsilon) {
                for (output, target) in targets {
                    let next = (*target, format!("{}{}", prefix, output));
                    if visited.insert(next.clone()) {
                        work_list.push_back(next);
                    }
                }
            }
            closure.push((current, prefix));
        }

        closure
    }

    /// Remove the epsilon moves. Fails when an epsilon cycle writes output, because such a
    /// transducer has no letter-to-string equivalent.
    pub fn to_real_time(&self) -> Result<RealTimeFst> {
        let trimmed = self.trim();
        trimmed.check_epsilon_cycles()?;

        let mut transitions = Vec::with_capacity(trimmed.states.len());
        let mut final_outputs = Vec::with_capacity(trimmed.states.len());

        for state in 0..trimmed.states.len() {
            let mut arcs: BTreeSet<(char, String, usize)> = BTreeSet::new();
            let mut finals: BTreeSet<String> = BTreeSet::new();

            for (reached, prefix) in trimmed.epsilon_closure_with_outputs(state) {
                if trimmed.accept_states[reached] {
                    finals.insert(prefix.clone());
                }
                for (input, output, target) in trimmed.arcs(reached) {
                    if let Symbol::Char(ch) = input {
                        arcs.insert((ch, format!("{}{}", prefix, output), target));
                    }
                }
            }

            transitions.push(arcs.into_iter().collect());
            final_outputs.push(finals);
        }

        Ok(RealTimeFst {
            initial_states: trimmed.initial_states.iter_ones().collect(),
            transitions,
            final_outputs,
        })
    }

    /// All outputs of the relation for `word`. The set is empty when `word` is not in the domain.
    pub fn process(&self, word: &str) -> Result<BTreeSet<String>> {
        Ok(self.to_real_time()?.process(word))
    }
}

impl RealTimeFst {
    pub fn get_num_states(&self) -> usize {
        self.transitions.len()
    }

    pub fn process(&self, word: &str) -> BTreeSet<String> {
        let mut configurations: BTreeSet<(usize, String)> = self
            .initial_states
            .iter()
            .map(|state| (*state, String::new()))
            .collect();

        for symbol in word.chars() {
            let mut next = BTreeSet::new();
            for (state, output) in &configurations {
                for (ch, fragment, target) in &self.transitions[*state] {
                    if *ch == symbol {
                        next.insert((*target, format!("{}{}", output, fragment)));
                    }
                }
            }

            if next.is_empty() {
                return BTreeSet::new();
            }
            configurations = next;
        }

        configurations
            .iter()
            .flat_map(|(state, output)| {
                self.final_outputs[*state]
                    .iter()
                    .map(move |suffix| format!("{}{}", output, suffix))
            })
            .collect()
    }
}

impl Fsa {
    /// The transducer mapping every word of the language to itself.
    pub fn identity(&self) -> Fst {
        let mut result = Fst::empty();
        result.append_fsa(self, |symbol| match symbol {
            Symbol::Epsilon => (Symbol::Epsilon, String::new()),
            Symbol::Char(ch) => (Symbol::Char(ch), ch.to_string()),
        });

        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial);
        }
        for accept in self.accept_states.iter_ones() {
            result.set_accept_state(accept);
        }

        result
    }

    /// The transducer mapping every word of `self` to every word of `output`. The input is read
    /// first writing nothing, then the output is written reading nothing.
    pub fn product(&self, output: &Fsa) -> Fst {
        let mut result = Fst::empty();
        let offset1 = result.append_fsa(self, |symbol| (symbol, String::new()));
        let offset2 = result.append_fsa(output, |symbol| match symbol {
            Symbol::Epsilon => (Symbol::Epsilon, String::new()),
            Symbol::Char(ch) => (Symbol::Epsilon, ch.to_string()),
        });

        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial + offset1);
        }

        for accept in self.accept_states.iter_ones() {
            for initial in output.initial_states.iter_ones() {
                result.add_transition(
                    accept + offset1,
                    Symbol::Epsilon,
                    String::new(),
                    initial + offset2,
                );
            }
        }

        for accept in output.accept_states.iter_ones() {
            result.set_accept_state(accept + offset2);
        }

        result
    }
}
