//! Cart line items and the rules that keep them consistent with stock.
//!
//! [`CartLines`] holds every line of one cart. The storefront loads it inside
//! a transaction (with the product row locked), asks it for a decision, and
//! persists the returned [`LineChange`] or [`NewLine`]. Two invariants hold for
//! every accepted decision:
//!
//! - every line has a quantity of at least one
//! - the units of a product reserved across the cart never exceed the live
//!   stock read for that decision
//!
//! Adding a product that is already in the cart creates a second line rather
//! than merging, so reservations are always summed per product.

use serde::{Deserialize, Serialize};

use crate::types::{GoodsId, Money, ProductId, Quantity};

/// Reasons a cart decision is refused.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartRuleError {
    /// The line does not belong to this cart.
    #[error("line item {0} not found")]
    LineNotFound(GoodsId),

    /// Nothing left to reserve.
    #[error("product is out of stock")]
    OutOfStock,

    /// The requested quantity is more than the store has.
    #[error("only {available} available")]
    InsufficientStock {
        /// Live stock of the product.
        available: u32,
    },
}

/// The product fields copied onto a line when it is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub title: String,
    pub image: String,
    pub price: Money,
}

/// One line of a cart.
///
/// `name`, `image` and `unit_price` are frozen at add time and intentionally
/// go stale if the product changes later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub goods_id: GoodsId,
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub unit_price: Money,
    pub quantity: Quantity,
}

impl LineItem {
    /// Quantity times the snapshot unit price.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A line to insert, produced by [`CartLines::plan_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub product_id: ProductId,
    pub name: String,
    pub image: String,
    pub unit_price: Money,
    pub quantity: Quantity,
}

/// The effect of a quantity decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    /// Write the new quantity.
    Updated { goods_id: GoodsId, quantity: Quantity },
    /// The guard refused silently; nothing to write.
    Unchanged,
}

/// All lines of one cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartLines {
    lines: Vec<LineItem>,
}

impl CartLines {
    #[must_use]
    pub const fn new(lines: Vec<LineItem>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<LineItem> {
        self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn get(&self, goods_id: GoodsId) -> Option<&LineItem> {
        self.lines.iter().find(|line| line.goods_id == goods_id)
    }

    /// Units of `product_id` reserved across all lines.
    #[must_use]
    pub fn reserved(&self, product_id: ProductId) -> u64 {
        self.lines
            .iter()
            .filter(|line| line.product_id == product_id)
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Total number of units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Sum of quantity times unit price over every line.
    #[must_use]
    pub fn total(&self) -> Money {
        self.lines.iter().map(LineItem::line_total).sum()
    }

    /// Decide whether `product` may be added as a new line of one unit.
    ///
    /// # Errors
    ///
    /// [`CartRuleError::OutOfStock`] if the product has no stock, or the cart
    /// already reserves every available unit.
    pub fn plan_add(&self, product: &ProductSnapshot, stock: u32) -> Result<NewLine, CartRuleError> {
        if stock < 1 || self.reserved(product.id) + 1 > u64::from(stock) {
            return Err(CartRuleError::OutOfStock);
        }

        Ok(NewLine {
            product_id: product.id,
            name: product.title.clone(),
            image: product.image.clone(),
            unit_price: product.price,
            quantity: Quantity::ONE,
        })
    }

    /// Record a line that has been inserted.
    pub fn push(&mut self, line: LineItem) {
        self.lines.push(line);
    }

    /// Add one unit to a line if the product still has an unreserved unit.
    ///
    /// Refusal is silent ([`LineChange::Unchanged`]).
    ///
    /// # Errors
    ///
    /// [`CartRuleError::LineNotFound`] if the line is not in this cart.
    pub fn increase(&mut self, goods_id: GoodsId, stock: u32) -> Result<LineChange, CartRuleError> {
        let product_id = self.line(goods_id)?.product_id;
        if self.reserved(product_id) + 1 > u64::from(stock) {
            return Ok(LineChange::Unchanged);
        }

        let line = self.line_mut(goods_id)?;
        let Some(quantity) = line.quantity.incremented() else {
            return Ok(LineChange::Unchanged);
        };
        line.quantity = quantity;
        Ok(LineChange::Updated { goods_id, quantity })
    }

    /// Remove one unit from a line, never going below one.
    ///
    /// # Errors
    ///
    /// [`CartRuleError::LineNotFound`] if the line is not in this cart.
    pub fn decrease(&mut self, goods_id: GoodsId) -> Result<LineChange, CartRuleError> {
        let line = self.line_mut(goods_id)?;
        let Some(quantity) = line.quantity.decremented() else {
            return Ok(LineChange::Unchanged);
        };
        line.quantity = quantity;
        Ok(LineChange::Updated { goods_id, quantity })
    }

    /// Set a line to exactly `requested` units.
    ///
    /// # Errors
    ///
    /// [`CartRuleError::InsufficientStock`] if the cart's reservation for the
    /// product would exceed `stock`; the line is left unchanged.
    /// [`CartRuleError::LineNotFound`] if the line is not in this cart.
    pub fn set_quantity(
        &mut self,
        goods_id: GoodsId,
        requested: Quantity,
        stock: u32,
    ) -> Result<LineChange, CartRuleError> {
        let line = self.line(goods_id)?;
        let current = line.quantity;
        let others = self.reserved(line.product_id) - u64::from(current.get());
        if others + u64::from(requested.get()) > u64::from(stock) {
            return Err(CartRuleError::InsufficientStock { available: stock });
        }
        if requested == current {
            return Ok(LineChange::Unchanged);
        }

        self.line_mut(goods_id)?.quantity = requested;
        Ok(LineChange::Updated {
            goods_id,
            quantity: requested,
        })
    }

    /// Drop a line.
    ///
    /// # Errors
    ///
    /// [`CartRuleError::LineNotFound`] if the line is not in this cart.
    pub fn remove(&mut self, goods_id: GoodsId) -> Result<LineItem, CartRuleError> {
        let index = self
            .lines
            .iter()
            .position(|line| line.goods_id == goods_id)
            .ok_or(CartRuleError::LineNotFound(goods_id))?;
        Ok(self.lines.remove(index))
    }

    fn line(&self, goods_id: GoodsId) -> Result<&LineItem, CartRuleError> {
        self.get(goods_id)
            .ok_or(CartRuleError::LineNotFound(goods_id))
    }

    fn line_mut(&mut self, goods_id: GoodsId) -> Result<&mut LineItem, CartRuleError> {
        self.lines
            .iter_mut()
            .find(|line| line.goods_id == goods_id)
            .ok_or(CartRuleError::LineNotFound(goods_id))
    }
}
