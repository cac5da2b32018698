use chrono::{DateTime, Utc};

/// Run identifier: `run_<YYYYmmdd_HHMMSS>_<short uuid>`, sortable by time.
pub fn new_run_id(at: DateTime<Utc>) -> String {
    format!("run_{}_{}", at.format("%Y%m%d_%H%M%S"), short_id())
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn run_ids_are_timestamped_and_distinct() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).single().expect("timestamp");
        let first = new_run_id(at);
        let second = new_run_id(at);
        assert!(first.starts_with("run_20260304_050607_"));
        assert_eq!(first.len(), "run_20260304_050607_".len() + 8);
        assert_ne!(first, second);
    }
}
