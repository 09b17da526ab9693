mod integration_tests_helper {

    use rewrite_fst::{from_epsilon, from_symbol_set, from_word_pair, Bimachine, Fst, Pipeline};
    use std::collections::{BTreeSet, HashSet};

    pub fn alphabet(symbols: &str) -> HashSet<char> {
        symbols.chars().collect()
    }

    pub fn outputs(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    // ab|bc -> d
    pub fn ab_or_bc() -> Fst {
        from_word_pair("ab", "d").union(&from_word_pair("bc", "d"))
    }

    /// Strip blanks, then put a boundary with the token type after every integer and operator.
    pub fn arithmetic_tokenizer() -> Bimachine {
        let whitespaces = [' ', '\t'];
        let digits = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
        let operators = ['+', '-', '/', '*'];
        let alphabet: HashSet<char> = whitespaces
            .iter()
            .chain(digits.iter())
            .chain(operators.iter())
            .copied()
            .collect();

        let clear_whitespace = from_symbol_set(whitespaces)
            .plus()
            .product(&from_epsilon());

        let integer = from_symbol_set(digits).plus().identity();
        let operator = from_symbol_set(operators).identity();
        let mark_tokens = integer
            .concat(&from_word_pair("", "<INT>\n"))
            .union(&operator.concat(&from_word_pair("", "<OP>\n")));

        let pipeline = Pipeline::new(alphabet)
            .add_stage("clear whitespace", clear_whitespace)
            .add_stage("mark tokens", mark_tokens);

        let bimachine = pipeline.compile();
        assert!(bimachine.is_ok());
        bimachine.unwrap()
    }

    /// Single output of a transducer, asserting that there is exactly one.
    pub fn single_output(fst: &Fst, word: &str) -> String {
        let result = fst.process(word).unwrap();
        assert_eq!(result.len(), 1, "{word} has outputs {result:?}");
        result.into_iter().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod integration_tests {

    use super::integration_tests_helper::*;
    use quickcheck::{quickcheck, QuickCheck, TestResult};
    use rewrite_fst::relation::{compose, transitive_closure};
    use rewrite_fst::{
        from_symbol_set, from_word, from_word_pair, Bimachine, BimachineError, Fsa, Fst,
        RewritePolicy, Sfsa, Symbol,
    };
    use std::collections::{HashMap, HashSet};
    use std::sync::OnceLock;

    #[test]
    fn test_relation_algebra() {
        let r1: HashSet<(i32, i32)> = [(1, 2), (2, 3), (4, 5)].into_iter().collect();
        let r2: HashSet<(i32, i32)> = [(2, 9), (5, 5)].into_iter().collect();

        let composed: HashSet<(i32, i32)> = [(1, 9), (4, 5)].into_iter().collect();
        let closure: HashSet<(i32, i32)> = [(1, 2), (2, 3), (4, 5), (1, 3)].into_iter().collect();

        assert_eq!(compose(&r1, &r2), composed);
        assert_eq!(transitive_closure(&r1), closure);

        let chain: HashSet<(i32, i32)> = [(1, 2), (2, 3), (3, 4), (4, 5)].into_iter().collect();
        assert_eq!(transitive_closure(&chain).len(), 10);
    }

    #[test]
    fn test_optional_rewriter() {
        let rewriter = ab_or_bc().to_optional_rewriter(&alphabet("abcd"));

        assert_eq!(rewriter.process("").unwrap(), outputs(&[""]));
        assert_eq!(rewriter.process("ab").unwrap(), outputs(&["ab", "d"]));
        assert_eq!(
            rewriter.process("abacbca").unwrap(),
            outputs(&["abacbca", "abacda", "dacbca", "dacda"])
        );
    }

    #[test]
    fn test_obligatory_rewriter() {
        let rewriter = ab_or_bc().to_rewriter(&alphabet("abcd"));

        assert_eq!(single_output(&rewriter, ""), "");
        assert_eq!(single_output(&rewriter, "ab"), "d");
        assert_eq!(single_output(&rewriter, "abacbca"), "dacda");
        assert_eq!(rewriter.process("abc").unwrap(), outputs(&["ad", "dc"]));
    }

    #[test]
    fn test_staged_lml_rewriters() {
        let symbols = alphabet("abcd");
        let rule1 = ab_or_bc().expand();
        let rule2 = from_word_pair("cd", "CD");

        let transducer = rule1
            .to_lml_rewriter(&symbols)
            .compose(&rule2.to_lml_rewriter(&symbols));

        assert_eq!(single_output(&transducer, ""), "");
        assert_eq!(single_output(&transducer, "abc"), "dc");
        assert_eq!(single_output(&transducer, "abcbcabc"), "dCDdc");

        let bimachine = transducer.to_bimachine(&symbols).unwrap();
        assert_eq!(bimachine.process("").unwrap(), "");
        assert_eq!(bimachine.process("abc").unwrap(), "dc");
        assert_eq!(bimachine.process("abcbcabc").unwrap(), "dCDdc");
    }

    #[test]
    fn test_lml_rewriter_takes_longest_match() {
        // a+b|aa -> X
        let symbols = alphabet("abcX");
        let rule = Fst::new(
            5,
            [0],
            [2, 4],
            [
                (0, Symbol::Char('a'), "", 1),
                (1, Symbol::Char('a'), "", 1),
                (1, Symbol::Char('b'), "X", 2),
                (0, Symbol::Char('a'), "", 3),
                (3, Symbol::Char('a'), "X", 4),
            ],
        )
        .unwrap();
        let transducer = rule.to_lml_rewriter(&symbols);

        assert_eq!(single_output(&transducer, "aaab"), "X");
        assert_eq!(single_output(&transducer, "aaaa"), "XX");

        let bimachine = transducer.to_bimachine(&symbols).unwrap();
        assert_eq!(bimachine.process("aaab").unwrap(), "X");
        assert_eq!(bimachine.process("aaaa").unwrap(), "XX");
    }

    #[test]
    fn test_lml_rewriter_of_composed_rule() {
        // (a|b)* -> d -> D
        let symbols = alphabet("abcdD");
        let rule = from_word_pair("a", "d")
            .union(&from_word_pair("b", "d"))
            .star()
            .compose(&from_word_pair("d", "D"));
        let transducer = rule.to_lml_rewriter(&symbols);

        assert_eq!(single_output(&transducer, "abababbbcbba"), "DDDDDDDDcDDD");
        assert_eq!(single_output(&transducer, "aaaa"), "DDDD");
        assert_eq!(single_output(&transducer, "cc"), "cc");

        let bimachine = transducer.to_bimachine(&symbols).unwrap();
        assert_eq!(bimachine.process("abababbbcbba").unwrap(), "DDDDDDDDcDDD");
        assert_eq!(bimachine.process("aaaa").unwrap(), "DDDD");
        assert_eq!(bimachine.process("cc").unwrap(), "cc");
    }

    #[test]
    fn test_arithmetic_tokenizer() {
        let tokenizer = arithmetic_tokenizer();

        assert_eq!(
            tokenizer.process("12 + 3").unwrap(),
            "12<INT>\n+<OP>\n3<INT>\n"
        );
        assert_eq!(
            tokenizer.process("7*\t40-1").unwrap(),
            "7<INT>\n*<OP>\n40<INT>\n-<OP>\n1<INT>\n"
        );
        assert_eq!(tokenizer.process("").unwrap(), "");
    }

    #[test]
    fn test_tokenizer_rejects_symbols_outside_alphabet() {
        let tokenizer = arithmetic_tokenizer();
        let result = tokenizer.process("1 + x");

        assert!(result.is_err());
        match result.unwrap_err().downcast_ref() {
            Some(BimachineError::OutsideDomain { position: 4 }) => {}
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_clear_leading_space() {
        // Insert a newline in front, rewrite newline-space to newline, drop the newline again
        let symbols = alphabet("ab \n");
        let insert_newline =
            from_word_pair("", "\n").concat(&from_symbol_set(symbols.iter().copied()).star().identity());
        let clear_space = from_word_pair("\n ", "\n").to_rewriter(&symbols);
        let clear_leading_space =
            insert_newline.compose_all(&[&clear_space, &insert_newline.inverse()]);

        assert_eq!(single_output(&clear_leading_space, " ab"), "ab");
        assert_eq!(single_output(&clear_leading_space, "a b"), "a b");
        assert_eq!(single_output(&clear_leading_space, ""), "");

        let bimachine = clear_leading_space.to_bimachine(&symbols).unwrap();
        assert_eq!(bimachine.process(" ba").unwrap(), "ba");
    }

    #[test]
    fn test_symbolic_automaton_feeds_the_algebra() {
        let lower = Sfsa::new(2, [0], [1], [(0, Some('a'..='z'), 1), (1, Some('a'..='z'), 1)])
            .unwrap();
        let symbols = alphabet("abc1");
        let word = lower.to_fsa(&symbols);
        let rule = word.product(&from_word("W"));
        let rewriter = rule.to_lml_rewriter(&symbols);

        assert_eq!(single_output(&rewriter, "ab1c"), "W1W");
    }

    #[test]
    fn test_determinize_and_minimize_keep_language() {
        let fsa = from_symbol_set(['a', 'b']).star().concat(&from_word("abb"));
        let minimal = fsa.determinize().minimize();

        assert_eq!(minimal.get_alphabet(), fsa.get_alphabet());
        for word in ["abb", "aabb", "babb", "ab", "abba", ""] {
            assert_eq!(minimal.recognize(word), fsa.recognize(word), "{word}");
        }
    }

    #[test]
    fn test_bimachine_table_is_keyed_by_reachable_triples() {
        let symbols = alphabet("abcd");
        let bimachine: Bimachine = ab_or_bc().to_lml_rewriter(&symbols).to_bimachine(&symbols).unwrap();
        let mut per_symbol: HashMap<char, usize> = HashMap::new();

        for (_, symbol, _) in bimachine.get_output_table().keys() {
            *per_symbol.entry(*symbol).or_default() += 1;
        }
        for symbol in symbols {
            assert!(per_symbol.contains_key(&symbol), "{symbol}");
        }
    }

    fn to_word(bytes: &[u8], symbols: &[char]) -> String {
        bytes
            .iter()
            .map(|byte| symbols[*byte as usize % symbols.len()])
            .collect()
    }

    // Up to three literal pairs read from the bytes, each with an input of one or two symbols and
    // an output of at most two
    fn literal_rule(bytes: &[u8], symbols: &[char]) -> Option<Fst> {
        bytes
            .chunks_exact(5)
            .take(3)
            .map(|chunk| {
                let input = to_word(&chunk[1..2 + (chunk[0] % 2) as usize], symbols);
                let output = to_word(&chunk[3..3 + (chunk[2] % 3) as usize], symbols);
                from_word_pair(&input, &output)
            })
            .reduce(|rule, next| rule.union(&next))
    }

    // ab|bc -> d, then cd -> CD, as a transducer and as a bimachine
    fn staged_machines() -> &'static (Fst, Bimachine) {
        static MACHINES: OnceLock<(Fst, Bimachine)> = OnceLock::new();
        MACHINES.get_or_init(|| {
            let symbols = alphabet("abcd");
            let transducer = ab_or_bc()
                .expand()
                .to_lml_rewriter(&symbols)
                .compose(&from_word_pair("cd", "CD").to_lml_rewriter(&symbols));
            let bimachine = transducer.to_bimachine(&symbols).unwrap();
            (transducer, bimachine)
        })
    }

    #[test]
    fn prop_bimachine_matches_transducer() {
        fn prop(bytes: Vec<u8>) -> TestResult {
            if bytes.len() > 24 {
                return TestResult::discard();
            }
            let (transducer, bimachine) = staged_machines();
            let word = to_word(&bytes, &['a', 'b', 'c', 'd']);
            let expected = transducer.process(&word).unwrap();

            match bimachine.process(&word) {
                Ok(output) => {
                    TestResult::from_bool(expected.len() == 1 && expected.contains(&output))
                }
                Err(_) => TestResult::failed(),
            }
        }
        quickcheck(prop as fn(Vec<u8>) -> TestResult);
    }

    #[test]
    fn prop_union_and_intersection_recognize_operands() {
        fn prop(bytes: Vec<u8>) -> bool {
            let symbols = ['a', 'b'];
            let word = to_word(&bytes, &symbols);

            let ends_with_ab = from_symbol_set(symbols).star().concat(&from_word("ab"));
            let even_length: Fsa = from_symbol_set(symbols)
                .concat(&from_symbol_set(symbols))
                .star();

            ends_with_ab.union(&even_length).recognize(&word)
                == (ends_with_ab.recognize(&word) || even_length.recognize(&word))
                && ends_with_ab.intersect(&even_length).recognize(&word)
                    == (ends_with_ab.recognize(&word) && even_length.recognize(&word))
        }
        quickcheck(prop as fn(Vec<u8>) -> bool);
    }

    #[test]
    fn prop_rewriters_map_empty_input_to_empty_output() {
        fn prop(bytes: Vec<u8>) -> TestResult {
            let symbols = ['a', 'b', 'c'];
            let (input, output) = bytes.split_at(bytes.len() / 2);
            let input = to_word(input, &symbols);
            if input.is_empty() || input.len() > 4 || output.len() > 4 {
                return TestResult::discard();
            }
            let output = to_word(output, &symbols);

            let alphabet: HashSet<char> = symbols.iter().copied().collect();
            let rule = from_word_pair(&input, &output);
            let lml = rule.to_lml_rewriter(&alphabet);
            let bimachine = match lml.to_bimachine(&alphabet) {
                Ok(bimachine) => bimachine,
                Err(_) => return TestResult::failed(),
            };

            let empty = outputs(&[""]);
            TestResult::from_bool(
                rule.to_rewriter(&alphabet).process("").ok() == Some(empty.clone())
                    && rule.to_optional_rewriter(&alphabet).process("").ok() == Some(empty)
                    && bimachine.process("").ok() == Some(String::new()),
            )
        }
        quickcheck(prop as fn(Vec<u8>) -> TestResult);
    }

    #[test]
    fn prop_composition_is_associative() {
        fn prop(first: Vec<u8>, second: Vec<u8>, third: Vec<u8>, word: Vec<u8>) -> TestResult {
            let symbols = ['a', 'b'];
            let (Some(a), Some(b), Some(c)) = (
                literal_rule(&first, &symbols),
                literal_rule(&second, &symbols),
                literal_rule(&third, &symbols),
            ) else {
                return TestResult::discard();
            };
            let (a, b, c) = (a.star(), b.star(), c.star());
            let word = to_word(&word[..word.len().min(8)], &symbols);

            let grouped_left = a.compose(&b).compose(&c).process(&word).ok();
            let grouped_right = a.compose(&b.compose(&c)).process(&word).ok();
            let chained = a.compose_all(&[&b, &c]).process(&word).ok();

            TestResult::from_bool(
                grouped_left.is_some() && grouped_left == grouped_right && grouped_left == chained,
            )
        }
        QuickCheck::new()
            .tests(50)
            .quickcheck(prop as fn(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) -> TestResult);
    }

    #[test]
    fn prop_bimachine_matches_random_rewriters() {
        fn prop(rule: Vec<u8>, words: Vec<Vec<u8>>) -> TestResult {
            let symbols = ['a', 'b', 'c'];
            let Some(rule) = literal_rule(&rule, &symbols) else {
                return TestResult::discard();
            };
            let alphabet: HashSet<char> = symbols.iter().copied().collect();
            let words: Vec<String> = std::iter::once(String::new())
                .chain(
                    words
                        .iter()
                        .take(5)
                        .map(|bytes| to_word(&bytes[..bytes.len().min(10)], &symbols)),
                )
                .collect();

            for policy in [
                RewritePolicy::Obligatory,
                RewritePolicy::Optional,
                RewritePolicy::LeftmostLongest,
            ] {
                let rewriter = rule.to_rewriter_with_policy(&alphabet, policy);
                let Ok(bimachine) = rewriter.to_bimachine(&alphabet) else {
                    return TestResult::failed();
                };

                for word in &words {
                    let Ok(expected) = rewriter.process(word) else {
                        return TestResult::failed();
                    };
                    let agrees = match bimachine.process(word) {
                        Ok(output) => expected.contains(&output),
                        Err(_) => expected.is_empty(),
                    };
                    let single = policy != RewritePolicy::LeftmostLongest || expected.len() == 1;
                    if !(agrees && single) {
                        return TestResult::failed();
                    }
                }
            }

            TestResult::passed()
        }
        QuickCheck::new()
            .tests(30)
            .quickcheck(prop as fn(Vec<u8>, Vec<Vec<u8>>) -> TestResult);
    }
}
