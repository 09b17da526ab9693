/* Rewriters turn a rule transducer into a transducer over a closed alphabet which copies the text
 * between matches of the rule and rewrites the matches.
 *
 * The rule domain is determinized and minimized into a matcher. While text is copied, the runs of
 * the matcher started inside the copied region are tracked as a state set (the guard); a copy step
 * which would complete a match is not built. The leftmost-longest policy keeps the guard alive
 * through matches and adds the run of the match itself once it ends, which rules out both an
 * earlier start and a longer match. When several rule paths read the same match, the
 * leftmost-longest policy keeps only the one chosen by the bimachine of the rule, so every input
 * has a single output. */

use bitvec::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::builder::from_symbol_set;
use crate::dfa::Dfsa;
use crate::fa::{intersects, HashedBitVec, Symbol, FA};
use crate::fst::Fst;

/// How matches of a rule are chosen when several decompositions of the input exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewritePolicy {
    /// Copied text never contains a match; overlapping matches stay as alternative outputs
    Obligatory,
    /// Every match may be rewritten or copied
    Optional,
    /// Scanning left to right, the longest match at the first position where one starts
    LeftmostLongest,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum Phase {
    Copy,
    Match {
        rule_state: usize,
        anchor: Option<usize>,
    },
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RewriteState {
    phase: Phase,
    guard: HashedBitVec,
}

// Restrict the rule to one output per input, the one its bimachine settles on
fn single_output(rule: Fst) -> Fst {
    match rule.to_bimachine(rule.get_input_alphabet()) {
        Ok(bimachine) => bimachine.to_fst(),
        Err(error) => {
            log::warn!("Rule keeps all of its outputs: {}", error);
            rule
        }
    }
}

// Advance every run of the matcher by one symbol, dropping the runs without a move
fn step(matcher: &Dfsa, runs: &BitVec<u8>, symbol: char) -> BitVec<u8> {
    let mut result = BitVec::repeat(false, matcher.get_num_states());
    for run in runs.iter_ones() {
        if let Some(target) = matcher.delta(run, symbol) {
            result.set(target, true);
        }
    }
    result
}

impl Fst {
    /// Obligatory rewriter of the rule over `alphabet`.
    pub fn to_rewriter(&self, alphabet: &HashSet<char>) -> Fst {
        self.to_rewriter_with_policy(alphabet, RewritePolicy::Obligatory)
    }

    pub fn to_optional_rewriter(&self, alphabet: &HashSet<char>) -> Fst {
        self.to_rewriter_with_policy(alphabet, RewritePolicy::Optional)
    }

    pub fn to_lml_rewriter(&self, alphabet: &HashSet<char>) -> Fst {
        self.to_rewriter_with_policy(alphabet, RewritePolicy::LeftmostLongest)
    }

    /// Build the rewriter of the rule over `alphabet` under `policy`. Rule pairs with an empty
    /// input are ignored. The result accepts every word over `alphabet`.
    pub fn to_rewriter_with_policy(&self, alphabet: &HashSet<char>, policy: RewritePolicy) -> Fst {
        let rule = from_symbol_set(self.get_input_alphabet().iter().copied())
            .plus()
            .identity()
            .compose(self);
        let leftmost_longest = policy == RewritePolicy::LeftmostLongest;
        let rule = if leftmost_longest {
            single_output(rule)
        } else {
            rule
        };
        let matcher = rule.domain().determinize().minimize();
        let match_start = matcher.get_start_state();
        let match_accepts = matcher.get_acceptor_states();
        let no_runs = HashedBitVec::new(BitVec::repeat(false, matcher.get_num_states()));

        let mut symbols: Vec<char> = alphabet.iter().copied().collect();
        symbols.sort_unstable();

        let mut result = Fst::empty();
        let mut state_ids: HashMap<RewriteState, usize> = HashMap::new();
        let mut work_list: VecDeque<RewriteState> = VecDeque::new();

        let mut intern = |result: &mut Fst,
                          work_list: &mut VecDeque<RewriteState>,
                          state: RewriteState|
         -> usize {
            *state_ids.entry(state.clone()).or_insert_with(|| {
                work_list.push_back(state);
                result.add_state()
            })
        };

        let start = RewriteState {
            phase: Phase::Copy,
            guard: no_runs.clone(),
        };
        let start_id = intern(&mut result, &mut work_list, start);
        result.set_initial_state(start_id);

        let mut from = 0;
        while let Some(current) = work_list.pop_front() {
            let mut moves: Vec<(Symbol, String, RewriteState)> = Vec::new();

            match current.phase {
                Phase::Copy => {
                    result.set_accept_state(from);

                    for &symbol in &symbols {
                        let guard = if policy == RewritePolicy::Optional {
                            no_runs.clone()
                        } else {
                            let mut runs = current.guard.bv.clone();
                            runs.set(match_start, true);
                            let next = step(&matcher, &runs, symbol);
                            if intersects(&next, match_accepts) {
                                continue;
                            }
                            HashedBitVec::new(next)
                        };
                        let next = RewriteState {
                            phase: Phase::Copy,
                            guard,
                        };
                        moves.push((Symbol::Char(symbol), symbol.to_string(), next));
                    }

                    let guard = if leftmost_longest {
                        current.guard.clone()
                    } else {
                        no_runs.clone()
                    };
                    let anchor = leftmost_longest.then_some(match_start);
                    for rule_state in rule.get_initial_states() {
                        let next = RewriteState {
                            phase: Phase::Match { rule_state, anchor },
                            guard: guard.clone(),
                        };
                        moves.push((Symbol::Epsilon, String::new(), next));
                    }
                }
                Phase::Match { rule_state, anchor } => {
                    for (input, output, target) in rule.arcs(rule_state) {
                        let next = match input {
                            Symbol::Epsilon => RewriteState {
                                phase: Phase::Match {
                                    rule_state: target,
                                    anchor,
                                },
                                guard: current.guard.clone(),
                            },
                            Symbol::Char(symbol) if !alphabet.contains(&symbol) => continue,
                            Symbol::Char(symbol) if leftmost_longest => {
                                let Some(anchor) = anchor.and_then(|a| matcher.delta(a, symbol))
                                else {
                                    continue;
                                };
                                let guard = step(&matcher, &current.guard.bv, symbol);
                                if intersects(&guard, match_accepts) {
                                    continue;
                                }
                                RewriteState {
                                    phase: Phase::Match {
                                        rule_state: target,
                                        anchor: Some(anchor),
                                    },
                                    guard: HashedBitVec::new(guard),
                                }
                            }
                            Symbol::Char(_) => RewriteState {
                                phase: Phase::Match {
                                    rule_state: target,
                                    anchor,
                                },
                                guard: current.guard.clone(),
                            },
                        };
                        moves.push((input, output.to_string(), next));
                    }

                    if rule.get_acceptor_states()[rule_state] {
                        let mut guard = current.guard.bv.clone();
                        if let Some(anchor) = anchor {
                            guard.set(anchor, true);
                        }
                        let next = RewriteState {
                            phase: Phase::Copy,
                            guard: HashedBitVec::new(guard),
                        };
                        moves.push((Symbol::Epsilon, String::new(), next));
                    }
                }
            }

            for (input, output, next) in moves {
                let to = intern(&mut result, &mut work_list, next);
                result.add_transition(from, input, output, to);
            }
            from += 1;
        }

        let rewriter = result.trim();
        log::debug!(
            "{:?} rewriter: matcher has {} states, rewriter has {} states",
            policy,
            matcher.get_num_states(),
            rewriter.get_num_states()
        );
        rewriter
    }
}
