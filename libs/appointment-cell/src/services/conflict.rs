use chrono::{DateTime, Utc};

/// Half-open interval intersection: `[a_start, a_end)` against `[b_start, b_end)`.
///
/// Back-to-back slots (one ending exactly when the other starts) do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (at(9, 0), at(9, 50), at(9, 30), at(10, 20)),
            (at(9, 0), at(10, 0), at(10, 0), at(11, 0)),
            (at(9, 0), at(12, 0), at(10, 0), at(11, 0)),
            (at(13, 0), at(14, 0), at(9, 0), at(10, 0)),
        ];

        for (a_s, a_e, b_s, b_e) in cases {
            assert_eq!(
                intervals_overlap(a_s, a_e, b_s, b_e),
                intervals_overlap(b_s, b_e, a_s, a_e)
            );
        }
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(!intervals_overlap(at(10, 0), at(11, 0), at(9, 0), at(10, 0)));
    }
}
