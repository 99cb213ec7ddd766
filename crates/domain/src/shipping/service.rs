//! Rate lookup for an address and order.

use std::sync::Arc;

use common::{ShippingMethodId, ShippingRateId, ShippingZoneId};
use serde::{Deserialize, Serialize};

use super::{Address, ShippingError, ShippingMethod, ShippingRate, ShippingRepository, ShippingZone};
use crate::money::{Money, Weight};

/// A rate together with the method it prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingOption {
    pub rate: ShippingRate,
    pub method: ShippingMethod,
}

/// A priced shipping choice presented to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub rate_id: ShippingRateId,
    pub method_id: ShippingMethodId,
    pub method_name: String,
    pub cost: Money,
}

/// Matches addresses to zones and prices the rates offered there.
#[derive(Clone)]
pub struct ShippingService {
    repository: Arc<dyn ShippingRepository>,
}

impl ShippingService {
    pub fn new(repository: Arc<dyn ShippingRepository>) -> Self {
        Self { repository }
    }

    /// Active zones covering the address.
    #[tracing::instrument(skip(self), fields(country = %address.country))]
    pub async fn zones_matching(&self, address: &Address) -> Result<Vec<ShippingZone>, ShippingError> {
        let zones = self.repository.zones().await?;
        Ok(zones.into_iter().filter(|z| z.matches(address)).collect())
    }

    /// Active rates, with active methods, offered for the address at this order value.
    #[tracing::instrument(skip(self), fields(country = %address.country))]
    pub async fn available_rates(
        &self,
        address: &Address,
        order_value: Money,
    ) -> Result<Vec<ShippingOption>, ShippingError> {
        let zone_ids: Vec<ShippingZoneId> = self
            .zones_matching(address)
            .await?
            .into_iter()
            .filter_map(|z| z.id)
            .collect();
        if zone_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rates = self.repository.rates_for_zones(&zone_ids).await?;
        let mut options = Vec::with_capacity(rates.len());
        for rate in rates {
            if !rate.is_active() || !rate.accepts_order_value(order_value) {
                continue;
            }
            match self.repository.get_method(rate.method_id()).await? {
                Some(method) if method.active => options.push(ShippingOption { rate, method }),
                Some(_) => {}
                None => {
                    tracing::warn!(
                        rate_id = ?rate.id(),
                        method_id = %rate.method_id(),
                        "Shipping rate references a missing method"
                    );
                }
            }
        }
        Ok(options)
    }

    /// Prices every available rate, cheapest first.
    pub async fn quote(
        &self,
        address: &Address,
        order_value: Money,
        weight: Weight,
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        let mut quotes: Vec<ShippingQuote> = self
            .available_rates(address, order_value)
            .await?
            .into_iter()
            .filter_map(|option| {
                let rate_id = option.rate.id()?;
                Some(ShippingQuote {
                    rate_id,
                    method_id: option.rate.method_id(),
                    method_name: option.method.name,
                    cost: option.rate.cost(order_value, weight),
                })
            })
            .collect();
        quotes.sort_by_key(|q| (q.cost, q.rate_id));
        Ok(quotes)
    }

    /// Loads a rate the shopper picked and checks it is offered for the address.
    #[tracing::instrument(skip(self, address))]
    pub async fn select_for_checkout(
        &self,
        address: &Address,
        rate_id: ShippingRateId,
        order_value: Money,
    ) -> Result<ShippingOption, ShippingError> {
        address.validate()?;

        self.repository
            .get_rate(rate_id)
            .await?
            .ok_or(ShippingError::RateNotFound(rate_id))?;

        self.available_rates(address, order_value)
            .await?
            .into_iter()
            .find(|option| option.rate.id() == Some(rate_id))
            .ok_or(ShippingError::RateNotAvailable(rate_id))
    }
}
