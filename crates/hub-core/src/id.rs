//! Opaque identifiers with a coarse time component for ordering.

use chrono::Utc;
use uuid::Uuid;

/// `prefix-<16 hex chars>-<YYYYMMDDHHMMSS>`.
pub fn new_id(prefix: &str) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    format!("{prefix}-{}-{stamp}", &entropy[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let a = new_id("task");
        let b = new_id("task");
        assert!(a.starts_with("task-"));
        assert_ne!(a, b);
    }

    #[test]
    fn id_has_three_segments() {
        let id = new_id("ctx");
        let segments: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].len(), 16);
        assert_eq!(segments[2].len(), 14);
    }
}
