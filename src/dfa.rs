/* Deterministic automata: recognition in both reading directions and minimization by partition
 * refinement. */

use crate::fa::{check_state, FaError, FA};
use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Values;
use std::collections::VecDeque;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfsaState {
    transitions: HashMap<char, usize>,
}

/// Deterministic automaton with a partial transition table. A missing entry means the word is
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dfsa {
    states: Vec<DfsaState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: HashSet<char>,
}

struct LookupTable {
    state_to_set_map: HashMap<usize, usize>,
    set_to_states_map: HashMap<usize, HashSet<usize>>,
}

impl LookupTable {
    fn new() -> Self {
        LookupTable {
            state_to_set_map: HashMap::new(),
            set_to_states_map: HashMap::new(),
        }
    }

    fn insert_state_in_set(&mut self, state: usize, set: usize) {
        if let Some(prev_set_key) = self.state_to_set_map.insert(state, set) {
            if let Some(prev_set) = self.set_to_states_map.get_mut(&prev_set_key) {
                prev_set.remove(&state);
                if prev_set.is_empty() {
                    self.set_to_states_map.remove(&prev_set_key);
                }
            }
        }

        self.set_to_states_map.entry(set).or_default().insert(state);
    }

    fn get_set_of_state(&self, state: &usize) -> Option<&usize> {
        self.state_to_set_map.get(state)
    }

    fn get_num_sets(&self) -> usize {
        self.set_to_states_map.len()
    }

    fn get_sets(&self) -> Values<'_, usize, HashSet<usize>> {
        self.set_to_states_map.values()
    }
}

impl FA for Dfsa {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_initial_states(&self) -> Vec<usize> {
        vec![self.start_state]
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(String, usize)> {
        let mut transition_list: Vec<(char, usize)> = self.states[state_id]
            .transitions
            .iter()
            .map(|(ch, target)| (*ch, *target))
            .collect();
        transition_list.sort();
        transition_list
            .into_iter()
            .map(|(ch, target)| (ch.escape_debug().to_string(), target))
            .collect()
    }
}

impl Dfsa {
    /// Build a deterministic automaton over the states `0..num_states`. Two different targets for
    /// the same state and symbol are rejected.
    pub fn new<F, T>(num_states: usize, start_state: usize, finals: F, transitions: T) -> Result<Dfsa>
    where
        F: IntoIterator<Item = usize>,
        T: IntoIterator<Item = (usize, char, usize)>,
    {
        let mut result = Dfsa::empty();
        for _ in 0..num_states {
            result.add_state();
        }

        check_state(start_state, num_states).map_err(Report::new)?;
        result.set_start_state(start_state);

        for state in finals {
            check_state(state, num_states).map_err(Report::new)?;
            result.set_accept_state(state);
        }

        for (from, symbol, to) in transitions {
            check_state(from, num_states).map_err(Report::new)?;
            check_state(to, num_states).map_err(Report::new)?;

            if let Some(&first) = result.states[from].transitions.get(&symbol) {
                if first != to {
                    let err = FaError::NonDeterministicTransition {
                        state: from,
                        symbol,
                        first,
                        second: to,
                    };
                    return Err(Report::new(err));
                }
            }
            result.add_transition(from, symbol, to);
        }

        Ok(result)
    }

    pub(crate) fn empty() -> Self {
        Dfsa {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: HashSet::new(),
        }
    }

    pub(crate) fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(DfsaState::default());
        self.accept_states.push(false);
        state_id
    }

    pub(crate) fn add_transition(&mut self, from: usize, symbol: char, to: usize) {
        self.alphabet.insert(symbol);
        self.states[from].transitions.insert(symbol, to);
    }

    pub(crate) fn set_start_state(&mut self, state_id: usize) {
        self.start_state = state_id;
    }

    pub(crate) fn set_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, true);
    }

    pub fn get_alphabet(&self) -> &HashSet<char> {
        &self.alphabet
    }

    pub fn get_start_state(&self) -> usize {
        self.start_state
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        self.accept_states.get(state).map(|bit| *bit).unwrap_or(false)
    }

    /// The target of the move from `state` on `symbol`, if there is one.
    pub fn delta(&self, state: usize, symbol: char) -> Option<usize> {
        self.states
            .get(state)
            .and_then(|state| state.transitions.get(&symbol))
            .copied()
    }

    pub fn recognize(&self, word: &str) -> bool {
        let mut current = self.start_state;

        for symbol in word.chars() {
            match self.delta(current, symbol) {
                Some(next) => current = next,
                None => return false,
            }
        }

        self.is_accepting(current)
    }

    /// Run the automaton from left to right and return whether the word is accepted together with
    /// every visited state, starting with the start state. When a move is missing the path stops
    /// at the last state reached and the word is rejected.
    pub fn recognition_path_l_to_r(&self, word: &str) -> (bool, Vec<usize>) {
        self.recognition_path(word.chars())
    }

    /// Like [`Dfsa::recognition_path_l_to_r`] but reading the word from its last symbol to its
    /// first. `path[k]` is the state reached after the last `k` symbols.
    pub fn recognition_path_r_to_l(&self, word: &str) -> (bool, Vec<usize>) {
        self.recognition_path(word.chars().rev())
    }

    fn recognition_path<I>(&self, symbols: I) -> (bool, Vec<usize>)
    where
        I: Iterator<Item = char>,
    {
        let mut current = self.start_state;
        let mut path = vec![current];

        for symbol in symbols {
            match self.delta(current, symbol) {
                Some(next) => {
                    current = next;
                    path.push(current);
                }
                None => return (false, path),
            }
        }

        (self.is_accepting(current), path)
    }

    /// Merge the states which cannot be told apart by any suffix and drop the states which cannot
    /// be reached from the start state.
    pub fn minimize(&self) -> Dfsa {
        let (minimal, _) = self.minimize_within(&accept_partition(self));
        minimal
    }

    /// Like [`Dfsa::minimize`], but two states are only merged when `partition` puts them in the
    /// same class. Class ids run from 0 to the number of classes. Also returns the new id of every
    /// reachable state.
    pub(crate) fn minimize_within(&self, partition: &[usize]) -> (Dfsa, Vec<Option<usize>>) {
        let lookup_table = get_lookup_table(self, partition);

        let mut minimal = Dfsa::empty();
        let mut reorder_map: HashMap<usize, usize> = HashMap::new();
        let mut work_list: VecDeque<usize> = VecDeque::new();

        // Number the sets in breadth first order from the start state
        let start_set = lookup_table.state_to_set_map[&self.start_state];
        reorder_map.insert(start_set, minimal.add_state());
        work_list.push_back(self.start_state);

        let mut symbols: Vec<char> = self.alphabet.iter().copied().collect();
        symbols.sort_unstable();

        while let Some(representative) = work_list.pop_front() {
            let from = reorder_map[&lookup_table.state_to_set_map[&representative]];

            if self.is_accepting(representative) {
                minimal.set_accept_state(from);
            }

            for symbol in &symbols {
                let Some(target) = self.delta(representative, *symbol) else {
                    continue;
                };
                let target_set = lookup_table.state_to_set_map[&target];
                let to = match reorder_map.get(&target_set) {
                    Some(&id) => id,
                    None => {
                        let id = minimal.add_state();
                        reorder_map.insert(target_set, id);
                        work_list.push_back(target);
                        id
                    }
                };
                minimal.add_transition(from, *symbol, to);
            }
        }

        minimal.set_start_state(0);

        let state_map: Vec<Option<usize>> = (0..self.states.len())
            .map(|state| {
                lookup_table
                    .get_set_of_state(&state)
                    .and_then(|set| reorder_map.get(set))
                    .copied()
            })
            .collect();

        log::debug!(
            "Minimization reduced {} states to {}",
            self.get_num_states(),
            minimal.get_num_states()
        );

        (minimal, state_map)
    }
}

// Set 0 holds the non accepting states and set 1 the accepting ones. When one of them is empty the
// other one takes id 0.
fn accept_partition(dfa: &Dfsa) -> Vec<usize> {
    let accept_states = &dfa.accept_states;
    let accept_set = if accept_states.not_any() || accept_states.all() {
        0
    } else {
        1
    };

    (0..dfa.states.len())
        .map(|state| if accept_states[state] { accept_set } else { 0 })
        .collect()
}

fn compare_transitions(
    state1: &DfsaState,
    state2: &DfsaState,
    alphabet: &HashSet<char>,
    lookup_table: &LookupTable,
) -> bool {
    alphabet.iter().all(|c| {
        match (state1.transitions.get(c), state2.transitions.get(c)) {
            (None, None) => true,
            (Some(_), None) | (None, Some(_)) => false,
            (Some(dest1), Some(dest2)) => {
                lookup_table.get_set_of_state(dest1) == lookup_table.get_set_of_state(dest2)
            }
        }
    })
}

fn get_lookup_table(dfa: &Dfsa, partition: &[usize]) -> LookupTable {
    let mut lookup_table = LookupTable::new();
    let mut set_changes: VecDeque<(usize, usize)> = VecDeque::new();

    for (state, set) in partition.iter().enumerate() {
        lookup_table.insert_state_in_set(state, *set);
    }

    let mut next_set = lookup_table.get_num_sets();

    loop {
        let number_of_sets = lookup_table.get_num_sets();
        let sets: Vec<_> = lookup_table.get_sets().cloned().collect();

        for set in sets.iter() {
            if set.len() == 1 {
                continue;
            }

            let member_state_id = set.iter().next().copied().unwrap_or_default();
            let member_state = &dfa.states[member_state_id];

            for state_id in set {
                let state = &dfa.states[*state_id];
                if !compare_transitions(state, member_state, &dfa.alphabet, &lookup_table) {
                    set_changes.push_back((*state_id, next_set));
                }
            }

            if !set_changes.is_empty() {
                next_set += 1;
            }

            while let Some((state, set)) = set_changes.pop_front() {
                lookup_table.insert_state_in_set(state, set);
            }
        }

        if number_of_sets == lookup_table.get_num_sets() {
            break;
        }
    }

    lookup_table
}
