//! Small automata and transducers built straight from literals. These are the operands the algebra
//! starts from.

use crate::fa::Symbol;
use crate::fst::Fst;
use crate::nfa::Fsa;

/// Automaton accepting exactly `word`.
pub fn from_word(word: &str) -> Fsa {
    let mut result = Fsa::empty();
    let mut current = result.add_state();
    result.set_initial_state(current);

    for ch in word.chars() {
        let next = result.add_state();
        result.add_transition(current, Symbol::Char(ch), next);
        current = next;
    }

    result.set_accept_state(current);
    result
}

/// Automaton accepting every single symbol of the set. An empty set gives the empty language.
pub fn from_symbol_set<I>(symbols: I) -> Fsa
where
    I: IntoIterator<Item = char>,
{
    let mut result = Fsa::empty();
    let start = result.add_state();
    let end = result.add_state();
    result.set_initial_state(start);
    result.set_accept_state(end);

    for ch in symbols {
        result.add_transition(start, Symbol::Char(ch), end);
    }

    result
}

/// Automaton accepting only the empty word, through a single epsilon move.
pub fn from_epsilon() -> Fsa {
    let mut result = Fsa::empty();
    let start = result.add_state();
    let end = result.add_state();
    result.set_initial_state(start);
    result.set_accept_state(end);
    result.add_transition(start, Symbol::Epsilon, end);
    result
}

/// Transducer mapping `input` to `output`. The output is written by the transition reading the
/// last input symbol, or by a single epsilon move when `input` is empty.
pub fn from_word_pair(input: &str, output: &str) -> Fst {
    let mut result = Fst::empty();
    let mut current = result.add_state();
    result.set_initial_state(current);

    let symbols: Vec<char> = input.chars().collect();
    if symbols.is_empty() {
        let end = result.add_state();
        result.add_transition(current, Symbol::Epsilon, output.to_string(), end);
        result.set_accept_state(end);
        return result;
    }

    for (position, ch) in symbols.iter().enumerate() {
        let next = result.add_state();
        let written = if position + 1 == symbols.len() {
            output.to_string()
        } else {
            String::new()
        };
        result.add_transition(current, Symbol::Char(*ch), written, next);
        current = next;
    }

    result.set_accept_state(current);
    result
}

#[cfg(test)]
mod builder_tests {
    use super::*;
    use crate::fa::FA;
    use std::collections::BTreeSet;

    #[test]
    fn test_from_word() {
        let fsa = from_word("abc");

        assert_eq!(fsa.get_num_states(), 4);
        assert!(fsa.recognize("abc"));
        assert!(!fsa.recognize("ab"));
        assert!(from_word("").recognize(""));
    }

    #[test]
    fn test_from_symbol_set() {
        let fsa = from_symbol_set("xyz".chars());

        for word in ["x", "y", "z"] {
            assert!(fsa.recognize(word));
        }
        assert!(!fsa.recognize(""));
        assert!(!fsa.recognize("xy"));
        assert!(!from_symbol_set([]).recognize(""));
    }

    #[test]
    fn test_from_epsilon() {
        let fsa = from_epsilon();
        assert!(fsa.recognize(""));
        assert!(!fsa.recognize("a"));
    }

    #[test]
    fn test_from_word_pair() {
        let fst = from_word_pair("ab", "xyz");
        assert_eq!(
            fst.process("ab").unwrap(),
            BTreeSet::from(["xyz".to_string()])
        );

        let insertion = from_word_pair("", "q");
        assert_eq!(
            insertion.process("").unwrap(),
            BTreeSet::from(["q".to_string()])
        );
    }
}
