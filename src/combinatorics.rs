//! Permutation primitives shared by the samplers
//!
//! Rankings are handled in *ordering* representation: `x[pos]` is the item
//! (labelled `1..=m`) placed at position `pos`. The *rank* representation
//! `r[item - 1]` gives the 1-based position of an item instead.

/// Position (0-based) of item `item` in the ordering `x`.
///
/// The item must be present in `x`.
pub fn position_rank(x: &[usize], item: usize) -> usize {
    let mut j = 0;
    while x[j] != item {
        j += 1;
    }
    j
}

/// Position lookup table for an ordering: `table[item]` is the 0-based
/// position of `item`. Index 0 is unused.
pub fn positions(x: &[usize]) -> Vec<usize> {
    let mut table = vec![0; x.len() + 1];
    for (pos, &item) in x.iter().enumerate() {
        table[item] = pos;
    }
    table
}

/// Factorials `[1!, 2!, ..., m!]`.
pub fn tab_factorial(m: usize) -> Vec<u64> {
    let mut tab = Vec::with_capacity(m);
    let mut acc: u64 = 1;
    for i in 1..=m {
        acc = acc.saturating_mul(i as u64);
        tab.push(acc);
    }
    tab
}

/// Lehmer-code index of a permutation of `1..=m`, in `[1, m!]`.
///
/// `tab_factorial` must hold at least `m - 1` entries.
pub fn rank_to_index(rank: &[usize], tab_factorial: &[u64]) -> u64 {
    let m = rank.len();
    let mut remaining: Vec<usize> = (1..=m).collect();
    let mut index: u64 = 0;

    for (j, &item) in rank.iter().enumerate().take(m.saturating_sub(1)) {
        let found = remaining.iter().position(|&r| r == item);
        debug_assert!(found.is_some(), "{item} is not a free item of 1..={m}");
        let smaller = found.unwrap_or(0);
        index += smaller as u64 * tab_factorial[m - j - 2];
        remaining.remove(smaller);
    }

    index + 1
}

/// Indices of a list of permutations.
pub fn ranks_to_indices(ranks: &[Vec<usize>], tab_factorial: &[u64]) -> Vec<u64> {
    ranks
        .iter()
        .map(|rank| rank_to_index(rank, tab_factorial))
        .collect()
}

/// Reverse a ranking in place: `1 2 3 4` becomes `4 3 2 1`.
pub fn inverse_rank(rank: &mut [usize]) {
    rank.reverse();
}

/// Convert an ordering to its rank representation.
pub fn order_to_rank(x: &[usize]) -> Vec<usize> {
    let table = positions(x);
    (1..=x.len()).map(|item| table[item] + 1).collect()
}

/// Sort clusters by the index of their first-dimension reference rank.
///
/// `keys[k]` is the sort key of cluster `k`; `p[dim][k]` and `mu[dim][k]` are
/// permuted along with `proportion` and `keys`, and every label of `z` is
/// rewritten to the new cluster position. Equal keys keep their relative
/// order, so sorting an already sorted set of clusters changes nothing.
///
/// Returns `order`, where `order[k]` is the former index of the cluster now
/// at position `k`.
pub fn sort_clusters(
    keys: &mut [u64],
    proportion: &mut [f64],
    p: &mut [Vec<f64>],
    mu: &mut [Vec<Vec<usize>>],
    z: &mut [usize],
) -> Vec<usize> {
    let g = keys.len();
    let mut order: Vec<usize> = (0..g).collect();

    for i in 1..g {
        let mut j = i;
        while j > 0 && keys[j - 1] > keys[j] {
            keys.swap(j - 1, j);
            proportion.swap(j - 1, j);
            order.swap(j - 1, j);
            for p_dim in p.iter_mut() {
                p_dim.swap(j - 1, j);
            }
            for mu_dim in mu.iter_mut() {
                mu_dim.swap(j - 1, j);
            }
            j -= 1;
        }
    }

    let mut new_label = vec![0; g];
    for (k, &old) in order.iter().enumerate() {
        new_label[old] = k;
    }
    for label in z.iter_mut() {
        *label = new_label[*label];
    }

    order
}
