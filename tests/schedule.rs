#[cfg(test)]
mod tests {
    use megalite::transfer::schedule::chunk_ranges;

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert!(chunk_ranges(0).is_empty());
    }

    #[test]
    fn test_single_byte_file() {
        assert_eq!(chunk_ranges(1), vec![(0, 1)]);
    }

    #[test]
    fn test_opening_chunks_grow_in_128k_steps() {
        let ranges = chunk_ranges(10 * 1_048_576);
        for (i, (_, len)) in ranges.iter().take(8).enumerate() {
            assert_eq!(*len, (i as u64 + 1) * 131_072);
        }
        // Everything after the ramp is a full mebibyte until the tail
        for (_, len) in ranges.iter().skip(8).take(ranges.len() - 9) {
            assert_eq!(*len, 1_048_576);
        }
    }

    #[test]
    fn test_ranges_cover_the_file_exactly() {
        for size in [1u64, 1000, 131_072, 131_073, 1_048_576, 3_670_016, 10_000_000] {
            let ranges = chunk_ranges(size);
            // Starts strictly increase from zero
            assert_eq!(ranges[0].0, 0);
            for pair in ranges.windows(2) {
                assert!(pair[0].0 < pair[1].0);
                // Ranges are contiguous
                assert_eq!(pair[0].0 + pair[0].1, pair[1].0);
            }
            let total: u64 = ranges.iter().map(|(_, len)| len).sum();
            assert_eq!(total, size, "sum of chunk lengths for size {size}");
        }
    }

    #[test]
    fn test_steady_state_starts() {
        // The ramp ends at 3_670_016; chunk i >= 8 starts on a mebibyte grid
        let ranges = chunk_ranges(20_000_000);
        for (i, (start, _)) in ranges.iter().enumerate().skip(8) {
            assert_eq!(*start, 3_670_016 + (i as u64 - 8) * 1_048_576);
        }
    }

    #[test]
    fn test_one_mebibyte_schedule() {
        // 128K + 256K + 384K leave 256K to the end of the mebibyte
        let ranges = chunk_ranges(1_048_576);
        assert_eq!(
            ranges,
            vec![
                (0, 131_072),
                (131_072, 262_144),
                (393_216, 393_216),
                (786_432, 262_144),
            ]
        );
    }
}
