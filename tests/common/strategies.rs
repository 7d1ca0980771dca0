use proptest::prelude::*;
use tasker_batch::models::{EntityId, PartitionKey};

/// Strategy for generating entity ids, duplicates likely
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    "pi-[0-9]{1,3}"
}

/// Strategy for generating id lists, possibly with repeated ids
pub fn entity_ids_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(entity_id_strategy(), 0..200)
}

/// Strategy for generating `(id, deployment)` catalogs with distinct ids
pub fn catalog_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map(entity_id_strategy(), "deployment-[a-c]", 1..40)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Strategy for generating chunk sizes
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=12
}

/// Deterministic deployment of an id; ids ending in `0` are unknown
pub fn deployment_of(id: &EntityId) -> Option<PartitionKey> {
    let last = id.as_str().chars().last()?.to_digit(10)?;
    (last != 0).then(|| PartitionKey::new(format!("deployment-{}", last % 3)))
}
