//! Longest matching blocks between two line sequences
//!
//! Finds the longest contiguous run both sequences share, then recurses on the unmatched parts left
//! and right of it. No element is treated as junk: IaC files are full of repeated lines (`}`,
//! blank lines) and those must be matched like any other line.
use std::collections::HashMap;
use std::hash::Hash;

/// `a[a..a + size] == b[b..b + size]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

impl Match {
    pub fn new(a: usize, b: usize, size: usize) -> Self {
        Self { a, b, size }
    }
}

/// Non-overlapping matches sorted by position, adjacent runs merged
///
/// The last element is always the zero sized sentinel `Match { a: a.len(), b: b.len(), size: 0 }`.
pub fn matching_blocks<T: Hash + Eq>(a: &[T], b: &[T]) -> Vec<Match> {
    let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
    for (j, item) in b.iter().enumerate() {
        b2j.entry(item).or_default().push(j);
    }

    let mut found = Vec::new();
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let m = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if m.size == 0 {
            continue;
        }

        if alo < m.a && blo < m.b {
            queue.push((alo, m.a, blo, m.b));
        }
        if m.a + m.size < ahi && m.b + m.size < bhi {
            queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
        }
        found.push(m);
    }
    found.sort_by_key(|m| (m.a, m.b));

    let mut blocks: Vec<Match> = Vec::with_capacity(found.len() + 1);
    for m in found {
        if let Some(last) = blocks.last_mut() {
            if last.a + last.size == m.a && last.b + last.size == m.b {
                last.size += m.size;
                continue;
            }
        }
        blocks.push(m);
    }

    blocks.push(Match::new(a.len(), b.len(), 0));
    blocks
}

/// Longest run within `a[alo..ahi]` and `b[blo..bhi]`, earliest in `a` (then `b`) on ties
fn longest_match<T: Hash + Eq>(
    a: &[T],
    b2j: &HashMap<&T, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> Match {
    let mut best = Match::new(alo, blo, 0);

    // length of the run ending at b[j], for the previous and the current element of a
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    let mut next_j2len: HashMap<usize, usize> = HashMap::new();
    for (i, item) in a.iter().enumerate().take(ahi).skip(alo) {
        next_j2len.clear();
        for &j in b2j.get(item).map(Vec::as_slice).unwrap_or_default() {
            if j < blo {
                continue;
            }
            if j >= bhi {
                break;
            }

            let k = j
                .checked_sub(1)
                .and_then(|prev| j2len.get(&prev))
                .copied()
                .unwrap_or(0)
                + 1;
            next_j2len.insert(j, k);

            if k > best.size {
                best = Match::new(i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut j2len, &mut next_j2len);
    }

    best
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_sequences() {
        let a = ["x", "y", "z"];
        assert_eq!(
            matching_blocks(&a, &a),
            vec![Match::new(0, 0, 3), Match::new(3, 3, 0)]
        );
    }

    #[test]
    fn insertion_in_the_middle() {
        let a = ["1", "2", "new", "new2", "3", "4"];
        let b = ["1", "2", "3", "4"];
        assert_eq!(
            matching_blocks(&a, &b),
            vec![Match::new(0, 0, 2), Match::new(4, 2, 2), Match::new(6, 4, 0)]
        );
    }

    #[test]
    fn repeated_lines_are_matched() {
        let a = ["{", "}", "{", "}"];
        let b = ["{", "}", "x", "{", "}"];
        assert_eq!(
            matching_blocks(&a, &b),
            vec![Match::new(0, 0, 2), Match::new(2, 3, 2), Match::new(4, 5, 0)]
        );
    }

    #[test]
    fn nothing_in_common() {
        let a = ["a"];
        let b = ["b"];
        assert_eq!(matching_blocks(&a, &b), vec![Match::new(1, 1, 0)]);
    }

    #[test]
    fn empty_inputs() {
        let empty: [&str; 0] = [];
        assert_eq!(matching_blocks(&empty, &["a"]), vec![Match::new(0, 1, 0)]);
    }

    #[test]
    fn large_file_with_insertion() {
        let b: Vec<String> = (0..3000).map(|i| format!("line {i}")).collect();
        let mut a = b.clone();
        a.splice(1500..1500, (0..10).map(|i| format!("new {i}")));

        assert_eq!(
            matching_blocks(&a, &b),
            vec![Match::new(0, 0, 1500), Match::new(1510, 1500, 1500), Match::new(3010, 3000, 0)]
        );
    }
}
