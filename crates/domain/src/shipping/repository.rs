//! Shipping configuration storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ShippingMethodId, ShippingRateId, ShippingZoneId};
use tokio::sync::RwLock;

use super::{ShippingMethod, ShippingRate, ShippingZone};
use crate::repository::{RepositoryError, RepositoryResult};

/// Read access to zones, methods and rates, plus inserts for setup.
#[async_trait]
pub trait ShippingRepository: Send + Sync {
    async fn insert_zone(&self, zone: ShippingZone) -> RepositoryResult<ShippingZone>;

    async fn insert_method(&self, method: ShippingMethod) -> RepositoryResult<ShippingMethod>;

    /// Stores a rate. Its zone and method must already exist.
    async fn insert_rate(&self, rate: ShippingRate) -> RepositoryResult<ShippingRate>;

    /// Every stored zone, active or not, in id order.
    async fn zones(&self) -> RepositoryResult<Vec<ShippingZone>>;

    async fn get_method(&self, id: ShippingMethodId) -> RepositoryResult<Option<ShippingMethod>>;

    async fn get_rate(&self, id: ShippingRateId) -> RepositoryResult<Option<ShippingRate>>;

    /// Rates attached to any of the given zones, in id order.
    async fn rates_for_zones(&self, zone_ids: &[ShippingZoneId])
    -> RepositoryResult<Vec<ShippingRate>>;
}

#[derive(Debug, Default)]
struct ShippingTables {
    zones: BTreeMap<ShippingZoneId, ShippingZone>,
    methods: BTreeMap<ShippingMethodId, ShippingMethod>,
    rates: BTreeMap<ShippingRateId, ShippingRate>,
    next_id: i64,
}

impl ShippingTables {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory shipping repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingRepository {
    state: Arc<RwLock<ShippingTables>>,
}

impl InMemoryShippingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShippingRepository for InMemoryShippingRepository {
    async fn insert_zone(&self, mut zone: ShippingZone) -> RepositoryResult<ShippingZone> {
        let mut state = self.state.write().await;
        let id = ShippingZoneId::new(state.next());
        zone.id = Some(id);
        state.zones.insert(id, zone.clone());
        Ok(zone)
    }

    async fn insert_method(&self, mut method: ShippingMethod) -> RepositoryResult<ShippingMethod> {
        let mut state = self.state.write().await;
        let id = ShippingMethodId::new(state.next());
        method.id = Some(id);
        state.methods.insert(id, method.clone());
        Ok(method)
    }

    async fn insert_rate(&self, mut rate: ShippingRate) -> RepositoryResult<ShippingRate> {
        let mut state = self.state.write().await;
        if !state.zones.contains_key(&rate.zone_id()) {
            return Err(RepositoryError::not_found("ShippingZone", rate.zone_id()));
        }
        if !state.methods.contains_key(&rate.method_id()) {
            return Err(RepositoryError::not_found("ShippingMethod", rate.method_id()));
        }
        let id = ShippingRateId::new(state.next());
        rate.assign_id(id);
        state.rates.insert(id, rate.clone());
        Ok(rate)
    }

    async fn zones(&self) -> RepositoryResult<Vec<ShippingZone>> {
        Ok(self.state.read().await.zones.values().cloned().collect())
    }

    async fn get_method(&self, id: ShippingMethodId) -> RepositoryResult<Option<ShippingMethod>> {
        Ok(self.state.read().await.methods.get(&id).cloned())
    }

    async fn get_rate(&self, id: ShippingRateId) -> RepositoryResult<Option<ShippingRate>> {
        Ok(self.state.read().await.rates.get(&id).cloned())
    }

    async fn rates_for_zones(
        &self,
        zone_ids: &[ShippingZoneId],
    ) -> RepositoryResult<Vec<ShippingRate>> {
        let state = self.state.read().await;
        Ok(state
            .rates
            .values()
            .filter(|rate| zone_ids.contains(&rate.zone_id()))
            .cloned()
            .collect())
    }
}
