//! Folding a guest checkout into a signed-in user's checkout.

use chrono::{DateTime, Utc};

use super::aggregate::checked_line_totals;
use super::{Checkout, CheckoutError};

impl Checkout {
    /// Merges a guest session into this (user-owned) checkout.
    ///
    /// Lines with the same (product, variant) key have their quantities
    /// summed and keep this checkout's captured price; other guest lines are
    /// appended. Addresses, customer details, shipping method and discount
    /// already set here win; missing ones are copied from the guest. Totals
    /// are recomputed afterwards, so a copied shipping method is repriced
    /// against the merged contents.
    ///
    /// Nothing changes when the merged lines would overflow. The guest
    /// checkout is consumed; callers delete its stored row.
    pub fn absorb(&mut self, guest: Checkout, now: DateTime<Utc>) -> Result<(), CheckoutError> {
        self.ensure_mutable("merge", now)?;
        guest.ensure_absorbable()?;

        let mut items = self.items().to_vec();
        for guest_item in guest.items().iter().cloned() {
            match items.iter_mut().find(|line| line.key() == guest_item.key()) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .checked_add(guest_item.quantity)
                        .ok_or(CheckoutError::AmountOverflow)?;
                }
                None => items.push(guest_item),
            }
        }
        checked_line_totals(items.iter().map(|line| (line, line.quantity)))
            .ok_or(CheckoutError::AmountOverflow)?;

        let parts = self.merge_parts_mut();
        *parts.items = items;
        if parts.shipping_address.is_none() {
            *parts.shipping_address = guest.shipping_address().cloned();
        }
        if parts.shipping.is_none() {
            *parts.shipping = guest.shipping().cloned();
        }
        if parts.billing_address.is_none() {
            *parts.billing_address = guest.billing_address().cloned();
        }
        if parts.customer.is_none() {
            *parts.customer = guest.customer().cloned();
        }
        if parts.discount.is_none() {
            *parts.discount = guest.discount().cloned();
        }

        self.finish_merge(now);
        Ok(())
    }

    fn ensure_absorbable(&self) -> Result<(), CheckoutError> {
        if !self.status().can_mutate() {
            return Err(CheckoutError::InvalidStateTransition {
                current_state: self.status(),
                action: "merge",
            });
        }
        Ok(())
    }
}
