/* Symbolic automaton: transitions carry character ranges instead of single characters, which keeps
 * the graph small over large alphabets. Epsilon closures are computed once, at construction, from
 * the transitive closure of the epsilon relation. */

use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use std::collections::HashSet;
use std::ops::RangeInclusive;

use crate::fa::{check_state, intersects, state_set, FaError, Symbol, FA};
use crate::nfa::Fsa;
use crate::relation::transitive_closure;

/// A transition label: `None` is an epsilon move, `Some(range)` matches every symbol in the range.
pub type RangeLabel = Option<RangeInclusive<char>>;

#[derive(Debug, Clone, Default)]
pub struct SfsaState {
    transitions: Vec<(RangeLabel, usize)>,
}

#[derive(Debug, Clone)]
pub struct Sfsa {
    states: Vec<SfsaState>,
    initial_states: BitVec<u8>,
    accept_states: BitVec<u8>,
    epsilon_closures: Vec<BitVec<u8>>,
}

impl FA for Sfsa {
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
        self.states[state_id]
            .transitions
            .iter()
            .map(|(label, target)| {
                let label = match label {
                    None => Symbol::Epsilon.to_string(),
                    Some(range) if range.start() == range.end() => {
                        range.start().escape_debug().to_string()
                    }
                    Some(range) => format!(
                        "{}-{}",
                        range.start().escape_debug(),
                        range.end().escape_debug()
                    ),
                };
                (label, *target)
            })
            .collect()
    }
}

impl SfsaState {
    pub fn get_transitions(&self) -> &[(RangeLabel, usize)] {
        &self.transitions
    }
}

impl Sfsa {
    pub fn new<I, F, T>(num_states: usize, initial: I, finals: F, transitions: T) -> Result<Sfsa>
    where
        I: IntoIterator<Item = usize>,
        F: IntoIterator<Item = usize>,
        T: IntoIterator<Item = (usize, RangeLabel, usize)>,
    {
        let mut states = vec![SfsaState::default(); num_states];

        let mut initial_states = BitVec::repeat(false, num_states);
        for state in initial {
            check_state(state, num_states).map_err(Report::new)?;
            initial_states.set(state, true);
        }
        if initial_states.not_any() {
            return Err(Report::new(FaError::MissingInitialState));
        }

        let mut accept_states = BitVec::repeat(false, num_states);
        for state in finals {
            check_state(state, num_states).map_err(Report::new)?;
            accept_states.set(state, true);
        }

        let mut epsilon_pairs: HashSet<(usize, usize)> = HashSet::new();
        for (from, label, to) in transitions {
            check_state(from, num_states).map_err(Report::new)?;
            check_state(to, num_states).map_err(Report::new)?;

            match &label {
                None => {
                    epsilon_pairs.insert((from, to));
                }
                Some(range) if range.start() > range.end() => {
                    let err = FaError::InvalidRange(*range.start(), *range.end());
                    return Err(Report::new(err));
                }
                Some(_) => {}
            }
            states[from].transitions.push((label, to));
        }

        // Reflexive part is added by seeding every closure with its own state
        let mut epsilon_closures: Vec<BitVec<u8>> = (0..num_states)
            .map(|state| state_set(num_states, [state]))
            .collect();
        for (from, to) in transitive_closure(&epsilon_pairs) {
            epsilon_closures[from].set(to, true);
        }

        Ok(Sfsa {
            states,
            initial_states,
            accept_states,
            epsilon_closures,
        })
    }

    pub fn get_states(&self) -> &[SfsaState] {
        &self.states
    }

    pub fn epsilon_closure(&self, state: usize) -> HashSet<usize> {
        match self.epsilon_closures.get(state) {
            Some(closure) => closure.iter_ones().collect(),
            None => HashSet::new(),
        }
    }

    fn closure_of(&self, states: &BitVec<u8>) -> BitVec<u8> {
        let mut result = BitVec::repeat(false, self.states.len());
        for state in states.iter_ones() {
            for reachable in self.epsilon_closures[state].iter_ones() {
                result.set(reachable, true);
            }
        }
        result
    }

    pub fn recognize(&self, word: &str) -> bool {
        let mut current = self.closure_of(&self.initial_states);

        for symbol in word.chars() {
            let mut next = BitVec::repeat(false, self.states.len());
            for state in current.iter_ones() {
                for (label, target) in &self.states[state].transitions {
                    if matches!(label, Some(range) if range.contains(&symbol)) {
                        next.set(*target, true);
                    }
                }
            }

            if next.not_any() {
                return false;
            }
            current = self.closure_of(&next);
        }

        intersects(&current, &self.accept_states)
    }

    /// Expand every range over the symbols of a closed alphabet, producing an automaton with single
    /// character labels that accepts the same words over that alphabet.
    pub fn to_fsa(&self, alphabet: &HashSet<char>) -> Fsa {
        let mut symbols: Vec<char> = alphabet.iter().copied().collect();
        symbols.sort_unstable();

        let mut result = Fsa::empty();
        for _ in 0..self.states.len() {
            result.add_state();
        }

        for state in self.initial_states.iter_ones() {
            result.set_initial_state(state);
        }
        for state in self.accept_states.iter_ones() {
            result.set_accept_state(state);
        }

        for (state, sfsa_state) in self.states.iter().enumerate() {
            for (label, target) in &sfsa_state.transitions {
                match label {
                    None => result.add_transition(state, Symbol::Epsilon, *target),
                    Some(range) => {
                        for symbol in symbols.iter().filter(|symbol| range.contains(symbol)) {
                            result.add_transition(state, Symbol::Char(*symbol), *target);
                        }
                    }
                }
            }
        }

        result
    }
}
