//! Contiguous block partitioning of rows across workers

use std::ops::Range;

/// Block sizes: `n / w` rows each, plus one extra for the first `n % w` blocks
pub fn block_sizes(n_samples: usize, n_blocks: usize) -> Vec<usize> {
    if n_blocks == 0 {
        return Vec::new();
    }
    let base = n_samples / n_blocks;
    let extra = n_samples % n_blocks;
    (0..n_blocks)
        .map(|i| base + usize::from(i < extra))
        .collect()
}

/// Row ranges matching [`block_sizes`], in worker order
pub fn block_ranges(n_samples: usize, n_blocks: usize) -> Vec<Range<usize>> {
    let mut start = 0;
    block_sizes(n_samples, n_blocks)
        .into_iter()
        .map(|size| {
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_rows_three_workers() {
        assert_eq!(block_sizes(10, 3), vec![4, 3, 3]);

        let ranges = block_ranges(10, 3);
        let mut seen = vec![0usize; 10];
        for range in &ranges {
            for i in range.clone() {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_sizes_differ_by_at_most_one() {
        for n in 0..40 {
            for w in 1..7 {
                let sizes = block_sizes(n, w);
                assert_eq!(sizes.iter().sum::<usize>(), n);
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_fewer_rows_than_workers() {
        assert_eq!(block_sizes(2, 3), vec![1, 1, 0]);
        assert_eq!(block_ranges(2, 3)[2], 2..2);
    }

    #[test]
    fn test_zero_blocks() {
        assert!(block_sizes(5, 0).is_empty());
    }
}
