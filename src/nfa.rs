use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::dfa::Dfsa;
use crate::fa::{check_state, intersects, state_set, FaError, HashedBitVec, Symbol, FA};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FsaState {
    pub(crate) transitions: HashMap<Symbol, HashSet<usize>>,
}

/// Nondeterministic finite-state automaton with single character labels and epsilon moves.
///
/// Every operation builds a new automaton, operands are never modified.
#[derive(Debug, Clone)]
pub struct Fsa {
    pub(crate) states: Vec<FsaState>,
    pub(crate) initial_states: BitVec<u8>,
    pub(crate) accept_states: BitVec<u8>,
    pub(crate) alphabet: HashSet<char>,
}

impl FA for Fsa {
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
        let mut transition_list: Vec<(Symbol, usize)> = Vec::new();
        for (symbol, targets) in &self.states[state_id].transitions {
            for target in targets {
                transition_list.push((*symbol, *target));
            }
        }
        transition_list.sort();
        transition_list
            .into_iter()
            .map(|(symbol, target)| (symbol.to_string(), target))
            .collect()
    }
}

impl FsaState {
    pub fn get_transitions(&self) -> &HashMap<Symbol, HashSet<usize>> {
        &self.transitions
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }
}

impl Fsa {
    /// Build an automaton over the states `0..num_states`. Fails if any listed state is not
    /// declared or if no initial state is given.
    pub fn new<I, F, T>(num_states: usize, initial: I, finals: F, transitions: T) -> Result<Fsa>
    where
        I: IntoIterator<Item = usize>,
        F: IntoIterator<Item = usize>,
        T: IntoIterator<Item = (usize, Symbol, usize)>,
    {
        let mut result = Fsa::empty();
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

        for (from, symbol, to) in transitions {
            check_state(from, num_states).map_err(Report::new)?;
            check_state(to, num_states).map_err(Report::new)?;
            result.add_transition(from, symbol, to);
        }

        Ok(result)
    }

    pub(crate) fn empty() -> Self {
        Fsa {
            states: Vec::new(),
            initial_states: BitVec::new(),
            accept_states: BitVec::new(),
            alphabet: HashSet::new(),
        }
    }

    pub(crate) fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(FsaState::default());
        self.initial_states.push(false);
        self.accept_states.push(false);
        state_id
    }

    pub(crate) fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        if let Symbol::Char(ch) = symbol {
            self.alphabet.insert(ch);
        }
        self.states[from].add_transition(symbol, to);
    }

    pub(crate) fn set_initial_state(&mut self, state_id: usize) {
        self.initial_states.set(state_id, true);
    }

    pub(crate) fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
    }

    /// Copy the states and transitions of `other` behind the existing states and return the
    /// offset added to its ids. Initial and accepting marks are not copied.
    fn append(&mut self, other: &Fsa) -> usize {
        let offset = self.states.len();

        for _ in 0..other.states.len() {
            self.add_state();
        }

        for (id, state) in other.states.iter().enumerate() {
            for (symbol, targets) in &state.transitions {
                for target in targets {
                    self.add_transition(id + offset, *symbol, target + offset);
                }
            }
        }

        offset
    }

    pub fn get_states(&self) -> &[FsaState] {
        &self.states
    }

    /// Symbols appearing on the transitions
    pub fn get_alphabet(&self) -> &HashSet<char> {
        &self.alphabet
    }

    /// All states reachable from `state` through epsilon moves, including `state` itself.
    pub fn epsilon_closure(&self, state: usize) -> HashSet<usize> {
        if state >= self.states.len() {
            return HashSet::new();
        }
        let start = state_set(self.states.len(), [state]);
        self.closure_of(start).bv.iter_ones().collect()
    }

    pub(crate) fn closure_of(&self, states: BitVec<u8>) -> HashedBitVec {
        let mut closure = states.clone();
        let mut stack: Vec<usize> = states.iter_ones().collect();

        while let Some(state) = stack.pop() {
            if let Some(targets) = self.states[state].transitions.get(&Symbol::Epsilon) {
                for &target in targets {
                    if !closure[target] {
                        closure.set(target, true);
                        stack.push(target);
                    }
                }
            }
        }

        HashedBitVec::new(closure)
    }

    // The set of states reached from `states` by one `ch` move, without closing over epsilons
    pub(crate) fn delta(&self, states: &BitVec<u8>, ch: char) -> BitVec<u8> {
        let mut result = BitVec::repeat(false, self.states.len());
        for state in states.iter_ones() {
            if let Some(targets) = self.states[state].transitions.get(&Symbol::Char(ch)) {
                for &target in targets {
                    result.set(target, true);
                }
            }
        }
        result
    }

    pub fn recognize(&self, word: &str) -> bool {
        let mut current = self.closure_of(self.initial_states.clone()).bv;

        for ch in word.chars() {
            let next = self.delta(&current, ch);
            if next.not_any() {
                return false;
            }
            current = self.closure_of(next).bv;
        }

        intersects(&current, &self.accept_states)
    }

    /// Language union through a fresh initial state with epsilon moves into both operands.
    pub fn union(&self, other: &Fsa) -> Fsa {
        let mut result = Fsa::empty();
        let new_start = result.add_state();

        for operand in [self, other] {
            let offset = result.append(operand);
            for initial in operand.initial_states.iter_ones() {
                result.add_transition(new_start, Symbol::Epsilon, initial + offset);
            }
            for accept in operand.accept_states.iter_ones() {
                result.set_accept_state(accept + offset);
            }
        }

        result.set_initial_state(new_start);
        result
    }

    pub fn concat(&self, other: &Fsa) -> Fsa {
        let mut result = Fsa::empty();
        let offset1 = result.append(self);
        let offset2 = result.append(other);

        for initial in self.initial_states.iter_ones() {
            result.set_initial_state(initial + offset1);
        }

        // Accepting the empty word on the right is covered by the epsilon closure of the link
        for accept in self.accept_states.iter_ones() {
            for initial in other.initial_states.iter_ones() {
                result.add_transition(accept + offset1, Symbol::Epsilon, initial + offset2);
            }
        }

        for accept in other.accept_states.iter_ones() {
            result.set_accept_state(accept + offset2);
        }

        result
    }

    pub fn plus(&self) -> Fsa {
        let mut result = self.clone();

        for accept in self.accept_states.iter_ones() {
            for initial in self.initial_states.iter_ones() {
                result.add_transition(accept, Symbol::Epsilon, initial);
            }
        }

        result
    }

    pub fn star(&self) -> Fsa {
        let plus = self.plus();
        let mut result = Fsa::empty();
        let new_start = result.add_state();
        let offset = result.append(&plus);

        for initial in plus.initial_states.iter_ones() {
            result.add_transition(new_start, Symbol::Epsilon, initial + offset);
        }
        for accept in plus.accept_states.iter_ones() {
            result.set_accept_state(accept + offset);
        }

        result.set_initial_state(new_start);
        result.set_accept_state(new_start);
        result
    }

    /// Product construction recognizing the words accepted by both automata. Epsilon moves of
    /// either side are taken alone, symbol moves are taken together.
    pub fn intersect(&self, other: &Fsa) -> Fsa {
        let mut result = Fsa::empty();
        let mut pair_ids: HashMap<(usize, usize), usize> = HashMap::new();
        let mut work_list: VecDeque<(usize, usize)> = VecDeque::new();

        let mut intern = |result: &mut Fsa,
                          work_list: &mut VecDeque<(usize, usize)>,
                          pair: (usize, usize)|
         -> usize {
            *pair_ids.entry(pair).or_insert_with(|| {
                work_list.push_back(pair);
                result.add_state()
            })
        };

        for p in self.initial_states.iter_ones() {
            for q in other.initial_states.iter_ones() {
                let id = intern(&mut result, &mut work_list, (p, q));
                result.set_initial_state(id);
            }
        }

        let mut from = 0;
        while let Some((p, q)) = work_list.pop_front() {
            let mut moves: Vec<(Symbol, (usize, usize))> = Vec::new();

            for (symbol, targets) in &self.states[p].transitions {
                match symbol {
                    Symbol::Epsilon => {
                        for &p2 in targets {
                            moves.push((Symbol::Epsilon, (p2, q)));
                        }
                    }
                    Symbol::Char(_) => {
                        if let Some(other_targets) = other.states[q].transitions.get(symbol) {
                            for &p2 in targets {
                                for &q2 in other_targets {
                                    moves.push((*symbol, (p2, q2)));
                                }
                            }
                        }
                    }
                }
            }

            if let Some(targets) = other.states[q].transitions.get(&Symbol::Epsilon) {
                for &q2 in targets {
                    moves.push((Symbol::Epsilon, (p, q2)));
                }
            }

            // Pairs leave the work list in the order they were numbered
            for (symbol, pair) in moves {
                let to = intern(&mut result, &mut work_list, pair);
                result.add_transition(from, symbol, to);
            }

            if self.accept_states[p] && other.accept_states[q] {
                result.set_accept_state(from);
            }
            from += 1;
        }

        result
    }

    /// Subset construction. The resulting automaton is partial: a set of states without a move
    /// on a symbol has no transition instead of a transition into an empty sink.
    pub fn determinize(&self) -> Dfsa {
        let mut result = Dfsa::empty();

        let mut alphabet: Vec<char> = self.alphabet.iter().copied().collect();
        alphabet.sort_unstable();

        let q0 = self.closure_of(self.initial_states.clone());
        let d0 = result.add_state();
        result.set_start_state(d0);
        if intersects(&q0.bv, &self.accept_states) {
            result.set_accept_state(d0);
        }

        let mut q_list: HashMap<HashedBitVec, usize> = HashMap::new();
        let mut work_list: VecDeque<HashedBitVec> = VecDeque::new();
        q_list.insert(q0.clone(), d0);
        work_list.push_back(q0);

        while let Some(q) = work_list.pop_front() {
            let dq = q_list[&q];

            for ch in &alphabet {
                let end_states = self.delta(&q.bv, *ch);
                if end_states.not_any() {
                    continue;
                }

                let t = self.closure_of(end_states);

                let dt = match q_list.get(&t) {
                    Some(&existing) => existing,
                    None => {
                        let dt = result.add_state();
                        if intersects(&t.bv, &self.accept_states) {
                            result.set_accept_state(dt);
                        }
                        q_list.insert(t.clone(), dt);
                        work_list.push_back(t);
                        dt
                    }
                };

                result.add_transition(dq, *ch, dt);
            }
        }

        log::debug!(
            "Subset construction built {} deterministic states from {} states",
            result.get_num_states(),
            self.get_num_states()
        );

        result
    }
}
