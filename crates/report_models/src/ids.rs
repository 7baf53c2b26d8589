//! Report and measurement identifier generation.

use chrono::Utc;
use rand::Rng;

use crate::TIMESTAMP_FORMAT;

const BASE62: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the random suffix of a report id.
const REPORT_ID_RANDOM_LEN: usize = 50;

fn random_base62(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| BASE62[rng.gen_range(0..BASE62.len())] as char)
        .collect()
}

/// Generate a new report id: `<YYYYMMDDThhmmssZ>_<asn>_<50 base62 chars>`.
///
/// The suffix is drawn from an OS-seeded RNG; at 62^50 a collision within the
/// metadata retention window is not a practical concern.
pub fn new_report_id(probe_asn: &str) -> String {
    format!(
        "{}_{}_{}",
        Utc::now().format(TIMESTAMP_FORMAT),
        probe_asn,
        random_base62(REPORT_ID_RANDOM_LEN),
    )
}

/// Generate a 20-character measurement id, sortable by creation time: 12 hex
/// characters of epoch milliseconds followed by 8 random base62 characters.
pub fn new_measurement_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    format!("{:012x}{}", millis, random_base62(8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn report_id_shape() {
        let id = new_report_id("AS1234");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 16);
        assert_eq!(parts[1], "AS1234");
        assert_eq!(parts[2].len(), 50);
        assert!(parts[2].bytes().all(|b| BASE62.contains(&b)));
    }

    #[test]
    fn report_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(new_report_id("AS1")));
        }
    }

    #[test]
    fn measurement_id_is_20_chars_and_sortable() {
        let a = new_measurement_id();
        assert_eq!(a.len(), 20);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_measurement_id();
        assert!(a[..12] <= b[..12]);
    }
}
