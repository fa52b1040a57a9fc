//! Persistence and mutation rules for principals, the RBAC graph and reset tokens.
//!
//! Public operations take the pool and open their own transaction; helpers that
//! must run inside a caller's transaction take `&mut SqliteConnection`.

pub mod membership;
pub mod permissions;
pub mod principals;
pub mod reset_tokens;
pub mod roles;

use std::collections::HashSet;

use uuid::Uuid;

/// Drops repeated ids, keeping the first occurrence of each.
pub(crate) fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_ids(&[b, a, b, a]), vec![b, a]);
        assert!(dedup_ids(&[]).is_empty());
    }
}
