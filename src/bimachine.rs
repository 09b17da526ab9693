/* Bimachines: a left to right automaton, a right to left automaton and an output table keyed by
 * (left state, symbol, right state). Together they evaluate a string function in two linear
 * scans without backtracking.
 *
 * The right automaton is the reverse subset construction of the epsilon free transducer: a right
 * state is the set of transducer states from which the suffix read so far can be completed. Its
 * start state is never merged with another state, so right state 0 always stands for the empty
 * suffix. A left state is a choice function which picks, for every right state, one transducer
 * state consistent with the prefix read so far and with that suffix class. Following the choices
 * along a word traces a single successful path, whose outputs fill the table.
 *
 * Once the table is filled the right automaton is minimized. Two right states merge only when
 * they agree on acceptance and on every table entry, and state 0 stays alone. */

use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Write};

use crate::dfa::Dfsa;
use crate::fa::{intersects, state_set, HashedBitVec, Symbol, FA};
use crate::fst::{Fst, RealTimeFst};

#[derive(Debug, PartialEq, Eq)]
pub enum BimachineError {
    /// The word cannot be read past the symbol at `position`
    OutsideDomain { position: usize },
}

impl fmt::Display for BimachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BimachineError::OutsideDomain { position } => write!(
                f,
                "Error: The input leaves the domain of the bimachine at position {}!",
                position
            ),
        }
    }
}

impl std::error::Error for BimachineError {}

/// Output fragments keyed by (left state, symbol, right state)
pub type OutputTable = HashMap<(usize, char, usize), String>;

#[derive(Serialize, Deserialize)]
struct OutputEntry {
    left: usize,
    symbol: char,
    right: usize,
    output: String,
}

fn serialize_output_table<S>(output_table: &OutputTable, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeSeq;

    let mut entries: Vec<_> = output_table.iter().collect();
    entries.sort();

    let mut ser_seq = serializer.serialize_seq(Some(entries.len()))?;

    for ((left, symbol, right), output) in entries {
        let entry = OutputEntry {
            left: *left,
            symbol: *symbol,
            right: *right,
            output: output.clone(),
        };
        ser_seq.serialize_element(&entry)?;
    }
    ser_seq.end()
}

fn deserialize_output_table<'de, D>(deserializer: D) -> Result<OutputTable, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<OutputEntry> = Vec::deserialize(deserializer)?;

    Ok(entries
        .into_iter()
        .map(|entry| ((entry.left, entry.symbol, entry.right), entry.output))
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bimachine {
    left: Dfsa,
    right: Dfsa,
    #[serde(
        serialize_with = "serialize_output_table",
        deserialize_with = "deserialize_output_table"
    )]
    output_table: OutputTable, // (state before the symbol, symbol, state of the suffix after it)
}

impl Bimachine {
    pub fn new(left: Dfsa, right: Dfsa, output_table: OutputTable) -> Self {
        Bimachine {
            left,
            right,
            output_table,
        }
    }

    pub fn get_left(&self) -> &Dfsa {
        &self.left
    }

    pub fn get_right(&self) -> &Dfsa {
        &self.right
    }

    pub fn get_output_table(&self) -> &OutputTable {
        &self.output_table
    }

    /// Evaluate the compiled function on `word`. The empty word maps to the empty string when it
    /// is in the domain.
    pub fn process(&self, word: &str) -> Result<String> {
        let symbols: Vec<char> = word.chars().collect();
        let length = symbols.len();

        let (_, left_path) = self.left.recognition_path_l_to_r(word);
        if left_path.len() <= length {
            let err = BimachineError::OutsideDomain {
                position: left_path.len() - 1,
            };
            return Err(Report::new(err));
        }

        let (accepted, right_path) = self.right.recognition_path_r_to_l(word);
        if right_path.len() <= length {
            let err = BimachineError::OutsideDomain {
                position: length - right_path.len(),
            };
            return Err(Report::new(err));
        }
        if !accepted {
            return Err(Report::new(BimachineError::OutsideDomain { position: 0 }));
        }

        let mut output = String::new();
        for (position, symbol) in symbols.iter().enumerate() {
            let key = (left_path[position], *symbol, right_path[length - 1 - position]);
            match self.output_table.get(&key) {
                Some(fragment) => output.push_str(fragment),
                None => return Err(Report::new(BimachineError::OutsideDomain { position })),
            }
        }

        Ok(output)
    }

    /// The transducer of the same function. A state pairs a left state with the right state of
    /// the suffix still to be read, so every word of the domain has exactly one successful path.
    pub fn to_fst(&self) -> Fst {
        let mut symbols: Vec<char> = self.right.get_alphabet().iter().copied().collect();
        symbols.sort_unstable();

        let mut predecessors: HashMap<(usize, char), Vec<usize>> = HashMap::new();
        for state in 0..self.right.get_num_states() {
            for symbol in &symbols {
                if let Some(target) = self.right.delta(state, *symbol) {
                    predecessors.entry((target, *symbol)).or_default().push(state);
                }
            }
        }

        let empty_suffix = self.right.get_start_state();
        let mut result = Fst::empty();
        let mut pair_ids: HashMap<(usize, usize), usize> = HashMap::new();
        let mut work_list: VecDeque<(usize, usize)> = VecDeque::new();

        let mut intern = |result: &mut Fst,
                          work_list: &mut VecDeque<(usize, usize)>,
                          pair: (usize, usize)|
         -> usize {
            *pair_ids.entry(pair).or_insert_with(|| {
                work_list.push_back(pair);
                let id = result.add_state();
                if pair.1 == empty_suffix {
                    result.set_accept_state(id);
                }
                id
            })
        };

        let left_start = self.left.get_start_state();
        for right_state in 0..self.right.get_num_states() {
            if self.right.is_accepting(right_state) {
                let id = intern(&mut result, &mut work_list, (left_start, right_state));
                result.set_initial_state(id);
            }
        }

        while let Some((left_state, right_state)) = work_list.pop_front() {
            let from = intern(&mut result, &mut work_list, (left_state, right_state));

            for symbol in &symbols {
                let Some(next_left) = self.left.delta(left_state, *symbol) else {
                    continue;
                };
                let Some(suffixes) = predecessors.get(&(right_state, *symbol)) else {
                    continue;
                };
                for suffix in suffixes {
                    let Some(output) = self.output_table.get(&(left_state, *symbol, *suffix)) else {
                        continue;
                    };
                    let to = intern(&mut result, &mut work_list, (next_left, *suffix));
                    result.add_transition(from, Symbol::Char(*symbol), output.clone(), to);
                }
            }
        }

        result.trim()
    }

    pub fn save_bimachine(&self, file_name: &str) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;

        let mut file = File::create(file_name)?;

        writeln!(file, "{}", json_string)?;
        log::info!("Bimachine saved as {}", file_name);
        Ok(())
    }
}

/// Load a bimachine from a saved json file
pub fn load_bimachine(file_name: &str) -> Result<Bimachine> {
    let file = File::open(file_name)?;

    let buf_reader = BufReader::new(file);

    let bimachine: Bimachine = serde_json::from_reader(buf_reader)?;
    Ok(bimachine)
}

// Reverse subset construction. Returns the automaton together with the transducer states of
// every right state.
fn build_right(fst: &RealTimeFst, symbols: &[char]) -> (Dfsa, Vec<BitVec<u8>>) {
    let num_states = fst.get_num_states();

    let mut predecessors: HashMap<(usize, char), Vec<usize>> = HashMap::new();
    for (from, transitions) in fst.transitions.iter().enumerate() {
        for (symbol, _, to) in transitions {
            predecessors.entry((*to, *symbol)).or_default().push(from);
        }
    }

    let initial_states = state_set(num_states, fst.initial_states.iter().copied());
    let final_states = state_set(
        num_states,
        (0..num_states).filter(|state| !fst.final_outputs[*state].is_empty()),
    );

    let mut right = Dfsa::empty();
    let mut state_sets: Vec<BitVec<u8>> = Vec::new();
    let mut set_ids: HashMap<HashedBitVec, usize> = HashMap::new();
    let mut work_list: VecDeque<usize> = VecDeque::new();

    let r0 = right.add_state();
    right.set_start_state(r0);
    if intersects(&final_states, &initial_states) {
        right.set_accept_state(r0);
    }
    state_sets.push(final_states);
    work_list.push_back(r0);

    while let Some(r) = work_list.pop_front() {
        for symbol in symbols {
            let mut previous = BitVec::repeat(false, num_states);
            for state in state_sets[r].iter_ones() {
                if let Some(sources) = predecessors.get(&(state, *symbol)) {
                    for source in sources {
                        previous.set(*source, true);
                    }
                }
            }

            if previous.not_any() {
                continue;
            }

            let key = HashedBitVec::new(previous);
            let target = match set_ids.get(&key) {
                Some(&existing) => existing,
                None => {
                    let id = right.add_state();
                    if intersects(&key.bv, &initial_states) {
                        right.set_accept_state(id);
                    }
                    state_sets.push(key.bv.clone());
                    set_ids.insert(key, id);
                    work_list.push_back(id);
                    id
                }
            };

            right.add_transition(r, *symbol, target);
        }
    }

    (right, state_sets)
}

fn build_left(
    fst: &RealTimeFst,
    symbols: &[char],
    right: &Dfsa,
    state_sets: &[BitVec<u8>],
) -> (Dfsa, OutputTable) {
    let num_right = right.get_num_states();

    let initial_choice: Vec<Option<usize>> = state_sets
        .iter()
        .map(|set| {
            fst.initial_states
                .iter()
                .copied()
                .filter(|state| set[*state])
                .min()
        })
        .collect();

    let mut left = Dfsa::empty();
    let mut output_table: OutputTable = HashMap::new();
    let mut choice_ids: HashMap<Vec<Option<usize>>, usize> = HashMap::new();
    let mut work_list: VecDeque<Vec<Option<usize>>> = VecDeque::new();

    let l0 = left.add_state();
    left.set_start_state(l0);
    left.set_accept_state(l0);
    choice_ids.insert(initial_choice.clone(), l0);
    work_list.push_back(initial_choice);

    while let Some(choice) = work_list.pop_front() {
        let from = choice_ids[&choice];

        for symbol in symbols {
            let mut next_choice: Vec<Option<usize>> = vec![None; num_right];
            let mut fragments: Vec<(usize, String)> = Vec::new();

            for (after, next) in next_choice.iter_mut().enumerate() {
                let Some(before) = right.delta(after, *symbol) else {
                    continue;
                };
                let Some(state) = choice[before] else {
                    continue;
                };

                let best = fst.transitions[state]
                    .iter()
                    .filter(|(ch, _, target)| ch == symbol && state_sets[after][*target])
                    .map(|(_, output, target)| (*target, output))
                    .min();
                let Some((target, output)) = best else {
                    continue;
                };

                let mut fragment = output.clone();
                // Right state 0 is the empty suffix: the word ends after this symbol
                if after == 0 {
                    if let Some(suffix) = fst.final_outputs[target].iter().next() {
                        fragment.push_str(suffix);
                    }
                }

                *next = Some(target);
                fragments.push((after, fragment));
            }

            if fragments.is_empty() {
                continue;
            }

            let to = match choice_ids.get(&next_choice) {
                Some(&existing) => existing,
                None => {
                    let id = left.add_state();
                    left.set_accept_state(id);
                    choice_ids.insert(next_choice.clone(), id);
                    work_list.push_back(next_choice);
                    id
                }
            };

            left.add_transition(from, *symbol, to);
            for (after, fragment) in fragments {
                output_table.insert((from, *symbol, after), fragment);
            }
        }
    }

    (left, output_table)
}

// Merge the right states which agree on acceptance, on their moves and on every table entry. The
// empty suffix state keeps a class of its own.
fn minimize_right(
    right: &Dfsa,
    left: &Dfsa,
    output_table: &OutputTable,
    symbols: &[char],
) -> (Dfsa, OutputTable) {
    let mut class_ids: HashMap<(bool, bool, Vec<Option<&String>>), usize> = HashMap::new();
    let partition: Vec<usize> = (0..right.get_num_states())
        .map(|state| {
            let column: Vec<Option<&String>> = (0..left.get_num_states())
                .flat_map(move |l| {
                    symbols
                        .iter()
                        .map(move |symbol| output_table.get(&(l, *symbol, state)))
                })
                .collect();
            let next = class_ids.len();
            *class_ids
                .entry((state == 0, right.is_accepting(state), column))
                .or_insert(next)
        })
        .collect();

    let (minimal, state_map) = right.minimize_within(&partition);

    let mut minimal_table: OutputTable = HashMap::new();
    for ((l, symbol, state), output) in output_table {
        if let Some(merged) = state_map[*state] {
            minimal_table.insert((*l, *symbol, merged), output.clone());
        }
    }

    (minimal, minimal_table)
}

impl Fst {
    /// Compile the function realized by the transducer over `alphabet` into a bimachine. When the
    /// transducer is not functional the bimachine picks one output per word. Fails when an
    /// epsilon cycle writes output.
    pub fn to_bimachine(&self, alphabet: &HashSet<char>) -> Result<Bimachine> {
        let real_time = self.to_real_time()?;

        let mut symbols: Vec<char> = alphabet.iter().copied().collect();
        symbols.sort_unstable();

        let (right, state_sets) = build_right(&real_time, &symbols);
        let (left, output_table) = build_left(&real_time, &symbols, &right, &state_sets);
        let (right, output_table) = minimize_right(&right, &left, &output_table, &symbols);

        log::debug!(
            "Bimachine built with {} left states, {} right states and {} outputs",
            left.get_num_states(),
            right.get_num_states(),
            output_table.len()
        );

        Ok(Bimachine::new(left, right, output_table))
    }
}

#[cfg(test)]
mod bimachine_tests {
    use super::*;
    use crate::builder::{from_symbol_set, from_word_pair};

    fn alphabet(symbols: &str) -> HashSet<char> {
        symbols.chars().collect()
    }

    // Upper case the last symbol of a word over {a, b}
    fn upper_case_last() -> Fst {
        from_symbol_set(['a', 'b'])
            .star()
            .identity()
            .concat(&from_word_pair("a", "A").union(&from_word_pair("b", "B")))
    }

    #[test]
    fn test_process_needs_right_context() {
        let fst = upper_case_last();
        let bimachine = fst.to_bimachine(&alphabet("ab")).unwrap();

        assert_eq!(bimachine.process("a").unwrap(), "A");
        assert_eq!(bimachine.process("abab").unwrap(), "abaB");
        assert_eq!(bimachine.process("bbba").unwrap(), "bbbA");

        for word in ["ab", "ba", "aaaa", "babab"] {
            let expected = fst.process(word).unwrap();
            assert_eq!(expected.len(), 1);
            assert!(expected.contains(&bimachine.process(word).unwrap()));
        }
    }

    #[test]
    fn test_outside_domain() {
        let bimachine = upper_case_last().to_bimachine(&alphabet("abc")).unwrap();

        // The empty word has no last symbol
        assert!(bimachine.process("").is_err());

        let result = bimachine.process("abc");
        assert!(result.is_err());
        match result.unwrap_err().downcast_ref() {
            Some(BimachineError::OutsideDomain { position: 2 }) => {}
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_lml_pipeline() {
        let symbols = alphabet("abcd");
        let rule1 = from_word_pair("ab", "d")
            .union(&from_word_pair("bc", "d"))
            .expand();
        let rule2 = from_word_pair("cd", "CD");
        let fst = rule1
            .to_lml_rewriter(&symbols)
            .compose(&rule2.to_lml_rewriter(&symbols));
        let bimachine = fst.to_bimachine(&symbols).unwrap();

        assert_eq!(bimachine.process("").unwrap(), "");
        assert_eq!(bimachine.process("abc").unwrap(), "dc");
        assert_eq!(bimachine.process("abcbcabc").unwrap(), "dCDdc");
    }

    #[test]
    fn test_epsilon_output_at_the_end() {
        // a -> a<, then an epsilon move writing '>'
        let fst = Fst::new(
            3,
            [0],
            [2],
            [
                (0, Symbol::Char('a'), "a<", 1),
                (1, Symbol::Char('a'), "a", 1),
                (1, Symbol::Epsilon, ">", 2),
            ],
        )
        .unwrap();
        let bimachine = fst.to_bimachine(&alphabet("a")).unwrap();

        assert_eq!(bimachine.process("a").unwrap(), "a<>");
        assert_eq!(bimachine.process("aaa").unwrap(), "a<aa>");
    }

    #[test]
    fn test_unbounded_output_is_rejected() {
        let fst = Fst::new(1, [0], [0], [(0, Symbol::Epsilon, "x", 0)]).unwrap();
        assert!(fst.to_bimachine(&alphabet("a")).is_err());
    }

    #[test]
    fn test_right_automaton_is_minimal() {
        // Only the empty suffix and the non empty suffixes have to be told apart
        let bimachine = upper_case_last().to_bimachine(&alphabet("ab")).unwrap();
        assert_eq!(bimachine.get_right().get_num_states(), 2);

        let copy = from_symbol_set(['a', 'b']).star().identity();
        let bimachine = copy.to_bimachine(&alphabet("ab")).unwrap();
        assert_eq!(bimachine.get_right().get_num_states(), 2);
        assert_eq!(bimachine.process("").unwrap(), "");
        assert_eq!(bimachine.process("abba").unwrap(), "abba");
    }

    #[test]
    fn test_to_fst_has_one_output_per_word() {
        // Both rules read "ab"
        let rule = from_word_pair("ab", "X").union(&from_word_pair("ab", "Y"));
        assert_eq!(rule.process("ab").unwrap().len(), 2);

        let bimachine = rule.to_bimachine(&alphabet("ab")).unwrap();
        let fst = bimachine.to_fst();
        let outputs = fst.process("ab").unwrap();

        assert_eq!(outputs.len(), 1);
        assert!(outputs.contains(&bimachine.process("ab").unwrap()));
        assert!(fst.process("a").unwrap().is_empty());
        assert!(fst.process("").unwrap().is_empty());
    }

    #[test]
    fn test_to_fst_realizes_the_bimachine() {
        let bimachine = upper_case_last().to_bimachine(&alphabet("ab")).unwrap();
        let fst = bimachine.to_fst();

        for word in ["a", "b", "ab", "bba", "abab"] {
            let outputs = fst.process(word).unwrap();
            assert_eq!(outputs.len(), 1, "{word}");
            assert!(outputs.contains(&bimachine.process(word).unwrap()));
        }
        assert!(fst.process("").unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let bimachine = upper_case_last().to_bimachine(&alphabet("ab")).unwrap();
        let path = std::env::temp_dir().join("rewrite_fst_bimachine_test.json");
        let file_name = path.to_string_lossy().to_string();

        bimachine.save_bimachine(&file_name).unwrap();
        let loaded = load_bimachine(&file_name).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.get_output_table(), bimachine.get_output_table());
        for word in ["a", "ab", "bba"] {
            assert_eq!(
                loaded.process(word).unwrap(),
                bimachine.process(word).unwrap()
            );
        }
    }
}
