//! Checkout and order fulfillment.

use crate::base62::encode_padded;
use crate::service::{Actor, ServiceContext};
use crate::validate::{validate_name, validate_phone};
use crate::{
    CartRepository, CoreError, ListResult, Order, OrderLine, OrderQuery, OrderRepository,
    OrderStatus, PaymentMethod, ProductRepository, ShippingInfo,
};

const ORDER_CODE_PREFIX: &str = "ORD";
const ORDER_CODE_WIDTH: usize = 6;
const MAX_NOTE_LEN: usize = 500;

/// Human-readable order code for the n-th order, e.g. `ORD00001A`.
pub fn order_code(n: u64) -> String {
    format!("{}{}", ORDER_CODE_PREFIX, encode_padded(n, ORDER_CODE_WIDTH))
}

/// Flat shipping fee waived once the subtotal reaches a threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_fee: u64,
    /// `0` disables free shipping.
    pub free_shipping_threshold: u64,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            flat_fee: 30_000,
            free_shipping_threshold: 500_000,
        }
    }
}

impl ShippingPolicy {
    pub fn fee_for(&self, subtotal: u64) -> u64 {
        if self.free_shipping_threshold > 0 && subtotal >= self.free_shipping_threshold {
            0
        } else {
            self.flat_fee
        }
    }
}

#[derive(Clone, Debug)]
pub struct CheckoutInput {
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

pub struct OrderService<R: ?Sized> {
    ctx: ServiceContext<R>,
    shipping: ShippingPolicy,
}

impl<R> OrderService<R>
where
    R: OrderRepository + CartRepository + ProductRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>, shipping: ShippingPolicy) -> Self {
        Self { ctx, shipping }
    }

    /// Turn the user's cart into a pending order.
    ///
    /// Stock is taken line by line. If any decrement fails, lines already
    /// taken are put back before the error is returned, and the cart is left
    /// untouched.
    pub fn checkout(&self, user_id: &str, input: CheckoutInput) -> Result<Order, CoreError> {
        let shipping = ShippingInfo {
            recipient: validate_name("recipient", &input.shipping.recipient)?,
            phone: validate_phone(&input.shipping.phone)?,
            address: validate_name("address", &input.shipping.address)?,
        };
        let note = normalize_note(input.note)?;

        let repo = &self.ctx.repo;
        let cart = repo.get_cart(user_id)?.filter(|c| !c.is_empty());
        let cart = cart.ok_or(CoreError::EmptyCart)?;

        let mut lines = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let product = repo
                .get_product(&line.product_id)?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    CoreError::InvalidInput(format!(
                        "product {} is no longer available",
                        line.product_id
                    ))
                })?;
            if line.quantity > product.stock {
                return Err(CoreError::InsufficientStock {
                    product_id: product.id,
                    available: product.stock,
                    requested: line.quantity,
                });
            }
            lines.push(OrderLine {
                unit_price: product.effective_price(),
                product_id: product.id,
                product_name: product.name,
                quantity: line.quantity,
            });
        }

        let subtotal: u64 = lines.iter().map(OrderLine::line_total).sum();
        let shipping_fee = self.shipping.fee_for(subtotal);

        let mut taken: Vec<&OrderLine> = Vec::with_capacity(lines.len());
        for line in &lines {
            if let Err(e) = repo.adjust_stock(&line.product_id, -(line.quantity as i64)) {
                return Err(self.roll_back(taken.iter().copied(), e));
            }
            taken.push(line);
        }

        let number = match repo.next_order_number() {
            Ok(n) => n,
            Err(e) => return Err(self.roll_back(lines.iter(), e)),
        };
        let order = Order {
            id: self.ctx.next_id(),
            code: order_code(number),
            user_id: user_id.to_string(),
            lines,
            shipping,
            payment_method: input.payment_method,
            status: OrderStatus::Pending,
            subtotal,
            shipping_fee,
            total: subtotal.saturating_add(shipping_fee),
            note,
            created_at: self.ctx.now(),
            updated_at: None,
        };
        if let Err(e) = repo.insert_order(order.clone()) {
            return Err(self.roll_back(order.lines.iter(), e));
        }
        repo.clear_cart(user_id)?;
        Ok(order)
    }

    /// Return stock taken by a failed checkout. The checkout error wins
    /// unless some stock could not be put back.
    fn roll_back<'a>(
        &self,
        lines: impl Iterator<Item = &'a OrderLine>,
        cause: CoreError,
    ) -> CoreError {
        match self.restock(lines) {
            Ok(()) => cause,
            Err(e) => CoreError::Repository(format!("{e} after checkout failed: {cause}")),
        }
    }

    /// Put every line back in stock, attempting all of them before failing.
    /// Products deleted since checkout are skipped.
    fn restock<'a>(&self, lines: impl Iterator<Item = &'a OrderLine>) -> Result<(), CoreError> {
        let mut failed = Vec::new();
        for line in lines {
            match self
                .ctx
                .repo
                .adjust_stock(&line.product_id, line.quantity as i64)
            {
                Ok(_) | Err(CoreError::NotFound) => {}
                Err(e) => failed.push(format!("{} x{} ({e})", line.product_id, line.quantity)),
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Repository(format!(
                "stock not restored for {}",
                failed.join(", ")
            )))
        }
    }

    /// Fetch by id or code. Customers only see their own orders.
    pub fn get(&self, actor: &Actor, id_or_code: &str) -> Result<Order, CoreError> {
        let repo = &self.ctx.repo;
        let order = match repo.get_order(id_or_code)? {
            Some(o) => o,
            None => repo
                .get_order_by_code(id_or_code)?
                .ok_or(CoreError::NotFound)?,
        };
        if !actor.is_staff() && order.user_id != actor.user_id {
            // Other customers' orders read as missing.
            return Err(CoreError::NotFound);
        }
        Ok(order)
    }

    pub fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<ListResult<Order>, CoreError> {
        self.ctx.repo.list_orders(&OrderQuery {
            user_id: Some(user_id.to_string()),
            status: None,
            limit,
            offset,
        })
    }

    pub fn list(&self, actor: &Actor, query: &OrderQuery) -> Result<ListResult<Order>, CoreError> {
        if !actor.is_staff() {
            return Err(CoreError::Forbidden);
        }
        self.ctx.repo.list_orders(query)
    }

    /// Move an order along the fulfillment pipeline. Admin only.
    pub fn update_status(
        &self,
        actor: &Actor,
        order_id: &str,
        next: OrderStatus,
    ) -> Result<Order, CoreError> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden);
        }
        let order = self.get(actor, order_id)?;
        self.transition(order, next)
    }

    /// Customer cancellation, allowed while the order is still pending.
    pub fn cancel(&self, actor: &Actor, order_id: &str) -> Result<Order, CoreError> {
        let order = self.get(actor, order_id)?;
        if order.status != OrderStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }
        self.transition(order, OrderStatus::Cancelled)
    }

    fn transition(&self, mut order: Order, next: OrderStatus) -> Result<Order, CoreError> {
        if !order.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: order.status,
                to: next,
            });
        }
        let previous = order.status;
        order.status = next;
        order.updated_at = Some(self.ctx.now());
        if !self.ctx.repo.update_order(&order, previous)? {
            // Someone else moved the order after it was read.
            let current = self
                .ctx
                .repo
                .get_order(&order.id)?
                .map_or(previous, |o| o.status);
            return Err(CoreError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        if next == OrderStatus::Cancelled {
            self.restock(order.lines.iter())?;
        }
        Ok(order)
    }
}

fn normalize_note(note: Option<String>) -> Result<Option<String>, CoreError> {
    let Some(note) = note else { return Ok(None) };
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTE_LEN {
        return Err(CoreError::InvalidInput("note is too long".into()));
    }
    Ok(Some(trimmed.to_string()))
}
