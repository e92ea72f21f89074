//! The multi-dimensional resource aggregate.
//!
//! [`Resources`] is the running sum of schedulable capacity across all
//! eligible real nodes. Every mutation is all-or-nothing: if any dimension
//! of an [`add`](Resources::add) or [`sub`](Resources::sub) fails, the whole
//! operation is abandoned and the aggregate is left untouched.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::quantity;

/// Capacity map key for CPU.
pub const RESOURCE_CPU: &str = "cpu";
/// Capacity map key for memory.
pub const RESOURCE_MEMORY: &str = "memory";
/// Capacity map key for pod slots.
pub const RESOURCE_PODS: &str = "pods";
/// Capacity map key for ephemeral storage.
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";

/// Aggregated schedulable capacity in canonical units.
///
/// Dimensions are independently additive and never negative. `Clone` yields
/// a fully independent snapshot with no shared ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU in milli-cores.
    pub cpu_millis: u64,
    /// Memory in bytes.
    pub memory_bytes: u64,
    /// Pod slots.
    pub pods: u64,
    /// Ephemeral storage in bytes.
    pub ephemeral_storage_bytes: u64,
}

impl Resources {
    /// Add `delta` dimension-wise.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuantity`] if any dimension would
    /// overflow; in that case no dimension is modified.
    pub fn add(&mut self, delta: &Resources) -> Result<()> {
        let next = Resources {
            cpu_millis: checked_add(RESOURCE_CPU, self.cpu_millis, delta.cpu_millis)?,
            memory_bytes: checked_add(RESOURCE_MEMORY, self.memory_bytes, delta.memory_bytes)?,
            pods: checked_add(RESOURCE_PODS, self.pods, delta.pods)?,
            ephemeral_storage_bytes: checked_add(
                RESOURCE_EPHEMERAL_STORAGE,
                self.ephemeral_storage_bytes,
                delta.ephemeral_storage_bytes,
            )?,
        };
        *self = next;
        Ok(())
    }

    /// Subtract `delta` dimension-wise.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InsufficientCapacity`] if any dimension would go
    /// negative; in that case no dimension is modified.
    pub fn sub(&mut self, delta: &Resources) -> Result<()> {
        let next = Resources {
            cpu_millis: checked_sub(RESOURCE_CPU, self.cpu_millis, delta.cpu_millis)?,
            memory_bytes: checked_sub(RESOURCE_MEMORY, self.memory_bytes, delta.memory_bytes)?,
            pods: checked_sub(RESOURCE_PODS, self.pods, delta.pods)?,
            ephemeral_storage_bytes: checked_sub(
                RESOURCE_EPHEMERAL_STORAGE,
                self.ephemeral_storage_bytes,
                delta.ephemeral_storage_bytes,
            )?,
        };
        *self = next;
        Ok(())
    }

    /// Convert a node capacity quantity map into the aggregate's dimensions.
    ///
    /// Only the four known resource names are consumed; anything else in the
    /// map (extended resources, hugepages) is ignored. Missing entries count
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuantity`] if any consumed quantity
    /// string is malformed.
    pub fn from_capacity(capacity: &BTreeMap<String, Quantity>) -> Result<Self> {
        let get = |key: &str| capacity.get(key).map(|q| q.0.as_str());
        Ok(Self {
            cpu_millis: get(RESOURCE_CPU).map_or(Ok(0), quantity::parse_cpu_millis)?,
            memory_bytes: get(RESOURCE_MEMORY).map_or(Ok(0), quantity::parse_bytes)?,
            pods: get(RESOURCE_PODS).map_or(Ok(0), quantity::parse_count)?,
            ephemeral_storage_bytes: get(RESOURCE_EPHEMERAL_STORAGE)
                .map_or(Ok(0), quantity::parse_bytes)?,
        })
    }

    /// Serialize the aggregate back into a capacity quantity map.
    ///
    /// Uses the same canonical units as [`from_capacity`](Self::from_capacity),
    /// so a convert/serialize round-trip is idempotent.
    #[must_use]
    pub fn to_capacity(&self) -> BTreeMap<String, Quantity> {
        let mut map = BTreeMap::new();
        map.insert(
            RESOURCE_CPU.to_string(),
            Quantity(quantity::format_cpu_millis(self.cpu_millis)),
        );
        map.insert(
            RESOURCE_MEMORY.to_string(),
            Quantity(quantity::format_bytes(self.memory_bytes)),
        );
        map.insert(
            RESOURCE_PODS.to_string(),
            Quantity(quantity::format_count(self.pods)),
        );
        map.insert(
            RESOURCE_EPHEMERAL_STORAGE.to_string(),
            Quantity(quantity::format_bytes(self.ephemeral_storage_bytes)),
        );
        map
    }

    /// Check whether every dimension is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Resources::default()
    }
}

fn checked_add(resource: &'static str, have: u64, delta: u64) -> Result<u64> {
    have.checked_add(delta).ok_or_else(|| CoreError::InvalidQuantity {
        value: resource.to_string(),
        reason: "aggregate overflow".to_string(),
    })
}

fn checked_sub(resource: &'static str, have: u64, delta: u64) -> Result<u64> {
    have.checked_sub(delta).ok_or(CoreError::InsufficientCapacity {
        resource,
        have,
        need: delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(cpu: u64, mem: u64, pods: u64, storage: u64) -> Resources {
        Resources {
            cpu_millis: cpu,
            memory_bytes: mem,
            pods,
            ephemeral_storage_bytes: storage,
        }
    }

    fn capacity(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), Quantity((*v).to_string())))
            .collect()
    }

    #[test]
    fn add_then_sub_restores_original() {
        let a = res(2000, 2 << 30, 110, 10 << 30);
        let b = res(4000, 4 << 30, 110, 20 << 30);

        let mut agg = a.clone();
        agg.add(&b).unwrap();
        agg.sub(&b).unwrap();
        assert_eq!(agg, a);
    }

    #[test]
    fn sub_failure_leaves_every_dimension_unchanged() {
        let mut agg = res(2000, 1024, 10, 0);
        // Memory underflows; cpu and pods alone would succeed.
        let delta = res(1000, 2048, 5, 0);

        let err = agg.sub(&delta).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientCapacity {
                resource: RESOURCE_MEMORY,
                ..
            }
        ));
        assert_eq!(agg, res(2000, 1024, 10, 0));
    }

    #[test]
    fn add_overflow_leaves_aggregate_unchanged() {
        let mut agg = res(u64::MAX - 100, 0, 0, 0);
        let delta = res(200, 1, 1, 1);

        assert!(agg.add(&delta).is_err());
        assert_eq!(agg, res(u64::MAX - 100, 0, 0, 0));
    }

    #[test]
    fn capacity_round_trip_is_idempotent() {
        let map = capacity(&[
            ("cpu", "4"),
            ("memory", "16Gi"),
            ("pods", "110"),
            ("ephemeral-storage", "100Gi"),
        ]);
        let parsed = Resources::from_capacity(&map).unwrap();
        assert_eq!(parsed.cpu_millis, 4000);
        assert_eq!(parsed.memory_bytes, 16 << 30);

        let reparsed = Resources::from_capacity(&parsed.to_capacity()).unwrap();
        assert_eq!(reparsed, parsed);
    }

    #[test]
    fn unknown_resources_are_ignored() {
        let map = capacity(&[("cpu", "1"), ("nvidia.com/gpu", "2")]);
        let parsed = Resources::from_capacity(&map).unwrap();
        assert_eq!(parsed.cpu_millis, 1000);
        assert_eq!(parsed.pods, 0);
    }

    #[test]
    fn missing_entries_count_as_zero() {
        let parsed = Resources::from_capacity(&BTreeMap::new()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn malformed_quantity_is_rejected() {
        let map = capacity(&[("cpu", "lots")]);
        assert!(Resources::from_capacity(&map).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let original = res(2000, 2 << 30, 110, 10 << 30);
        let json = serde_json::to_string(&original).unwrap();
        let back: Resources = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }
}
