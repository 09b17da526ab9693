/* Composition and transitive closure of binary relations. Both are used for epsilon closures of
 * the symbolic automata and are kept generic over the identifier type. */

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Compose two relations: the result holds `(a, c)` whenever some `b` has `(a, b)` in `r1` and
/// `(b, c)` in `r2`.
pub fn compose<T>(r1: &HashSet<(T, T)>, r2: &HashSet<(T, T)>) -> HashSet<(T, T)>
where
    T: Copy + Eq + Hash,
{
    let mut successors: HashMap<T, Vec<T>> = HashMap::new();

    for (from, to) in r2 {
        successors.entry(*from).or_default().push(*to);
    }

    let mut result = HashSet::new();

    for (a, b) in r1 {
        if let Some(targets) = successors.get(b) {
            for c in targets {
                result.insert((*a, *c));
            }
        }
    }

    result
}

/// The smallest relation containing `r` which is closed under composition with itself.
///
/// Computed as a fixed point where only the pairs discovered in the previous round are composed
/// again, so cycles terminate as soon as they stop producing new pairs.
pub fn transitive_closure<T>(r: &HashSet<(T, T)>) -> HashSet<(T, T)>
where
    T: Copy + Eq + Hash,
{
    let mut closure = r.clone();
    let mut frontier = r.clone();

    while !frontier.is_empty() {
        let new_pairs: HashSet<(T, T)> = compose(&frontier, r)
            .into_iter()
            .filter(|pair| !closure.contains(pair))
            .collect();

        closure.extend(new_pairs.iter().copied());
        frontier = new_pairs;
    }

    closure
}

#[cfg(test)]
mod relation_tests {
    use super::*;

    fn relation(pairs: &[(usize, usize)]) -> HashSet<(usize, usize)> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_compose() {
        let r1 = relation(&[(1, 2), (2, 3), (4, 5)]);
        let r2 = relation(&[(2, 9), (5, 5)]);

        assert_eq!(compose(&r1, &r2), relation(&[(1, 9), (4, 5)]));
    }

    #[test]
    fn test_compose_without_common_values() {
        let r1 = relation(&[(2, 1), (3, 3)]);
        let r2 = relation(&[(2, 9), (5, 5)]);

        assert!(compose(&r1, &r2).is_empty());
    }

    #[test]
    fn test_compose_single_match() {
        let r1 = relation(&[(2, 1), (3, 3)]);
        let r2 = relation(&[(1, 9), (5, 5)]);

        assert_eq!(compose(&r1, &r2), relation(&[(2, 9)]));
    }

    #[test]
    fn test_transitive_closure() {
        let r = relation(&[(1, 2), (2, 3), (4, 5)]);

        assert_eq!(
            transitive_closure(&r),
            relation(&[(1, 2), (2, 3), (4, 5), (1, 3)])
        );
    }

    #[test]
    fn test_transitive_closure_of_chain() {
        let r = relation(&[(1, 2), (2, 3), (3, 4), (4, 5)]);

        let expected = relation(&[
            (1, 2),
            (2, 3),
            (3, 4),
            (4, 5),
            (1, 3),
            (2, 4),
            (3, 5),
            (1, 4),
            (2, 5),
            (1, 5),
        ]);

        assert_eq!(transitive_closure(&r), expected);
    }

    #[test]
    fn test_transitive_closure_of_cycle() {
        let r = relation(&[(1, 2), (2, 1)]);

        assert_eq!(
            transitive_closure(&r),
            relation(&[(1, 2), (2, 1), (1, 1), (2, 2)])
        );
    }
}
