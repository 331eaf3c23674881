use rand::Rng as _;
use rand::distributions::Alphanumeric;

/// Width of the `text(31)` id columns.
pub const ENTITY_ID_LEN: usize = 31;

/// Generates a fresh row identifier. Ids are opaque; ordering comes from
/// `createdAt` columns, never from the id itself.
pub fn new_entity_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ENTITY_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_fit_the_column_and_are_alphanumeric() {
        let id = new_entity_id();
        assert_eq!(id.len(), ENTITY_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn ids_do_not_collide_in_a_small_sample() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(new_entity_id()));
        }
    }
}
