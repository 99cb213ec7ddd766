//! Order storage contract and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use super::Order;
use crate::aggregate::Aggregate;
use crate::repository::{RepositoryError, RepositoryResult, VersionedTable};

/// Persistence for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order, assigns its id and finalizes its number in the
    /// same unit of work.
    async fn create(&self, order: Order) -> RepositoryResult<Order>;

    async fn get(&self, id: OrderId) -> RepositoryResult<Option<Order>>;

    async fn find_by_number(&self, number: &str) -> RepositoryResult<Option<Order>>;

    /// Saves a loaded order and returns it at its new version.
    async fn save(&self, order: &Order) -> RepositoryResult<Order>;

    /// Stored orders still carrying a provisional number.
    async fn find_provisional(&self, limit: usize) -> RepositoryResult<Vec<Order>>;
}

#[derive(Debug, Default)]
struct OrderTable {
    rows: VersionedTable<Order>,
    fail_on_create: bool,
}

/// In-memory order repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` calls fail with a backend error.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Stores an order with an id but a provisional number, as left behind
    /// by a crash between the insert and the numbering.
    pub async fn insert_unnumbered(&self, mut order: Order) -> RepositoryResult<Order> {
        let mut state = self.state.write().await;
        let id = state.rows.allocate_id();
        order.restore_id(id);
        state.rows.insert(order)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.values().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, mut order: Order) -> RepositoryResult<Order> {
        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(RepositoryError::Backend("order insert failed".to_string()));
        }
        let id = state.rows.allocate_id();
        order.assign_id(id);
        state.rows.insert(order)
    }

    async fn get(&self, id: OrderId) -> RepositoryResult<Option<Order>> {
        Ok(self.state.read().await.rows.get(id).cloned())
    }

    async fn find_by_number(&self, number: &str) -> RepositoryResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .values()
            .find(|o| o.number().as_str() == number)
            .cloned())
    }

    async fn save(&self, order: &Order) -> RepositoryResult<Order> {
        self.state.write().await.rows.save(order)
    }

    async fn find_provisional(&self, limit: usize) -> RepositoryResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .rows
            .values()
            .filter(|o| o.needs_number_repair())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id());
        orders.truncate(limit);
        Ok(orders)
    }
}
