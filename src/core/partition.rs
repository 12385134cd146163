use crate::domain::model::DateInterval;
use chrono::Days;

/// Splits `interval` into contiguous chunks of `chunk_days` days, in
/// chronological order. The last chunk is truncated to the interval's end.
/// `chunk_days == 0` returns the interval unchanged as the only chunk.
pub fn partition(interval: &DateInterval, chunk_days: u32) -> Vec<DateInterval> {
    if chunk_days == 0 {
        return vec![*interval];
    }

    let mut chunks = Vec::new();
    let mut cursor = interval.start();
    while cursor < interval.end() {
        let next = cursor
            .checked_add_days(Days::new(u64::from(chunk_days)))
            .map_or(interval.end(), |d| d.min(interval.end()));
        match DateInterval::new(cursor, next) {
            Ok(chunk) => chunks.push(chunk),
            Err(_) => break,
        }
        cursor = next;
    }

    if chunks.is_empty() {
        chunks.push(*interval);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: &str, end: &str) -> DateInterval {
        DateInterval::parse(start, end).unwrap()
    }

    fn assert_exact_cover(input: &DateInterval, chunks: &[DateInterval], chunk_days: u32) {
        assert_eq!(chunks.first().unwrap().start(), input.start());
        assert_eq!(chunks.last().unwrap().end(), input.end());
        for pair in chunks.windows(2) {
            // contiguous and ordered, hence non-overlapping
            assert_eq!(pair[0].end(), pair[1].start());
        }
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.num_days(), i64::from(chunk_days));
        }
        assert!(chunks.last().unwrap().num_days() <= i64::from(chunk_days));
        let total: i64 = chunks.iter().map(|c| c.num_days()).sum();
        assert_eq!(total, input.num_days());
    }

    #[test]
    fn test_partition_january_in_ten_day_chunks() {
        let input = interval("2024-01-01", "2024-02-01");
        let chunks = partition(&input, 10);

        assert_eq!(
            chunks,
            vec![
                interval("2024-01-01", "2024-01-11"),
                interval("2024-01-11", "2024-01-21"),
                interval("2024-01-21", "2024-01-31"),
                interval("2024-01-31", "2024-02-01"),
            ]
        );
        assert_exact_cover(&input, &chunks, 10);
    }

    #[test]
    fn test_partition_covers_for_many_sizes() {
        let inputs = [
            interval("2024-01-01", "2024-01-02"),
            interval("2023-12-30", "2024-03-02"),
            interval("2020-02-27", "2021-03-01"),
        ];
        for input in &inputs {
            for chunk_days in [1, 2, 3, 7, 10, 30, 31, 365, 10_000] {
                let chunks = partition(input, chunk_days);
                assert!(!chunks.is_empty());
                assert_exact_cover(input, &chunks, chunk_days);
            }
        }
    }

    #[test]
    fn test_zero_chunk_days_disables_partitioning() {
        let input = interval("2024-01-01", "2025-01-01");
        assert_eq!(partition(&input, 0), vec![input]);
    }

    #[test]
    fn test_chunk_larger_than_interval() {
        let input = interval("2024-01-01", "2024-01-05");
        assert_eq!(partition(&input, 30), vec![input]);
    }
}
