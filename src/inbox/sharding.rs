//! Pluggable `(entity_id, type) → shard_index` assignment (§6).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::message::ShardIndex;
use crate::signal::EntityId;

/// Assigns a shard to an entity id. `entity_id` already carries its own
/// `type_url`, so the strategy does not need a separate type parameter.
pub trait ShardingStrategy: Send + Sync {
    fn shard_for(&self, entity_id: &EntityId, of_total: u32) -> ShardIndex;
}

/// `shard_index = H(entity_id, entity_type) mod N` (§4.6 rationale), the
/// default named in §6.
pub struct UniformHash;

impl ShardingStrategy for UniformHash {
    fn shard_for(&self, entity_id: &EntityId, of_total: u32) -> ShardIndex {
        let mut hasher = DefaultHasher::new();
        entity_id.hash(&mut hasher);
        let index = (hasher.finish() % of_total as u64) as u32;
        ShardIndex::new(index, of_total)
    }
}

pub fn uniform_hash() -> Arc<dyn ShardingStrategy> {
    Arc::new(UniformHash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_entity_id_always_lands_on_the_same_shard() {
        let strategy = uniform_hash();
        let id = EntityId::new("calc", b"calc-1".to_vec());
        let first = strategy.shard_for(&id, 8);
        let second = strategy.shard_for(&id, 8);
        assert_eq!(first, second);
        assert!(first.index < 8);
    }
}
