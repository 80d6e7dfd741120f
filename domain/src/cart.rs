//! Per-user cart and wishlist.

use crate::service::ServiceContext;
use crate::{
    Cart, CartLine, CartRepository, CoreError, Product, ProductRepository, WishlistRepository,
};

/// Upper bound on a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// A cart line joined with its current product document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartItemView {
    pub product: Product,
    pub quantity: u32,
    pub line_total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: u64,
    pub item_count: u32,
}

pub struct CartService<R: ?Sized> {
    ctx: ServiceContext<R>,
}

impl<R> CartService<R>
where
    R: CartRepository + ProductRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>) -> Self {
        Self { ctx }
    }

    fn load(&self, user_id: &str) -> Result<Cart, CoreError> {
        Ok(self
            .ctx
            .repo
            .get_cart(user_id)?
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    fn store(&self, mut cart: Cart) -> Result<CartView, CoreError> {
        cart.updated_at = Some(self.ctx.now());
        self.ctx.repo.save_cart(&cart)?;
        self.resolve(&cart)
    }

    /// Join cart lines with products; lines whose product vanished are skipped.
    fn resolve(&self, cart: &Cart) -> Result<CartView, CoreError> {
        let mut items = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            if let Some(product) = self.ctx.repo.get_product(&line.product_id)? {
                let line_total = product
                    .effective_price()
                    .saturating_mul(line.quantity as u64);
                items.push(CartItemView {
                    product,
                    quantity: line.quantity,
                    line_total,
                });
            }
        }
        let subtotal = items.iter().map(|i| i.line_total).sum();
        let item_count = items.iter().map(|i| i.quantity).sum();
        Ok(CartView {
            items,
            subtotal,
            item_count,
        })
    }

    fn purchasable(&self, product_id: &str, quantity: u32) -> Result<Product, CoreError> {
        let product = self
            .ctx
            .repo
            .get_product(product_id)?
            .filter(|p| p.is_active)
            .ok_or(CoreError::NotFound)?;
        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::InvalidInput(format!(
                "at most {} units per product",
                MAX_LINE_QUANTITY
            )));
        }
        if quantity > product.stock {
            return Err(CoreError::InsufficientStock {
                product_id: product.id,
                available: product.stock,
                requested: quantity,
            });
        }
        Ok(product)
    }

    pub fn view(&self, user_id: &str) -> Result<CartView, CoreError> {
        let cart = self.load(user_id)?;
        self.resolve(&cart)
    }

    /// Add `quantity` units, merging with an existing line for the product.
    pub fn add_item(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<CartView, CoreError> {
        if quantity == 0 {
            return Err(CoreError::InvalidInput("quantity must be at least 1".into()));
        }
        let mut cart = self.load(user_id)?;
        let wanted = cart.quantity_of(product_id).saturating_add(quantity);
        self.purchasable(product_id, wanted)?;
        match cart.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = wanted,
            None => cart.lines.push(CartLine {
                product_id: product_id.to_string(),
                quantity,
            }),
        }
        self.store(cart)
    }

    /// Set the quantity of a line; zero removes it.
    pub fn set_quantity(
        &self,
        user_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> Result<CartView, CoreError> {
        if quantity == 0 {
            return self.remove_item(user_id, product_id);
        }
        let mut cart = self.load(user_id)?;
        let line = cart
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or(CoreError::NotFound)?;
        self.purchasable(product_id, quantity)?;
        line.quantity = quantity;
        self.store(cart)
    }

    pub fn remove_item(&self, user_id: &str, product_id: &str) -> Result<CartView, CoreError> {
        let mut cart = self.load(user_id)?;
        let before = cart.lines.len();
        cart.lines.retain(|l| l.product_id != product_id);
        if cart.lines.len() == before {
            return Err(CoreError::NotFound);
        }
        self.store(cart)
    }

    pub fn clear(&self, user_id: &str) -> Result<(), CoreError> {
        self.ctx.repo.clear_cart(user_id)
    }
}

pub struct WishlistService<R: ?Sized> {
    ctx: ServiceContext<R>,
}

impl<R> WishlistService<R>
where
    R: WishlistRepository + ProductRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>) -> Self {
        Self { ctx }
    }

    /// Wishlisted products that still exist, in the order they were added.
    pub fn view(&self, user_id: &str) -> Result<Vec<Product>, CoreError> {
        let list = self.ctx.repo.get_wishlist(user_id)?;
        let mut out = Vec::with_capacity(list.product_ids.len());
        for id in &list.product_ids {
            if let Some(p) = self.ctx.repo.get_product(id)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn add(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        if self.ctx.repo.get_product(product_id)?.is_none() {
            return Err(CoreError::NotFound);
        }
        self.ctx.repo.add_wish(user_id, product_id)
    }

    pub fn remove(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        self.ctx.repo.remove_wish(user_id, product_id)
    }

    /// Flip membership; returns whether the product is now wishlisted.
    pub fn toggle(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        if self.ctx.repo.remove_wish(user_id, product_id)? {
            return Ok(false);
        }
        self.add(user_id, product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryStore;
    use crate::service::fixtures;
    use crate::{ProductRepository, Slug};
    use std::time::UNIX_EPOCH;

    fn product(id: &str, price: u64, stock: u32) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            slug: Slug::new(id).unwrap(),
            description: None,
            brand_id: None,
            category_id: "c1".into(),
            type_slug: None,
            subtype_slug: None,
            price,
            sale_price: None,
            stock,
            sold: 0,
            images: vec![],
            custom_tags: vec![],
            tags: vec![],
            is_active: true,
            created_at: UNIX_EPOCH,
            updated_at: None,
        }
    }

    fn setup() -> (
        CartService<InMemoryStore>,
        WishlistService<InMemoryStore>,
        ServiceContext<InMemoryStore>,
    ) {
        let ctx = fixtures::context();
        ctx.repo.insert_product(product("cream", 100, 5)).unwrap();
        ctx.repo.insert_product(product("toner", 40, 2)).unwrap();
        (
            CartService::new(ctx.clone()),
            WishlistService::new(ctx.clone()),
            ctx,
        )
    }

    #[test]
    fn add_merges_lines_and_totals() {
        let (carts, _, _) = setup();
        carts.add_item("u1", "cream", 1).unwrap();
        carts.add_item("u1", "toner", 2).unwrap();
        let view = carts.add_item("u1", "cream", 2).unwrap();
        assert_eq!(view.items.len(), 2);
        assert_eq!(view.items[0].quantity, 3);
        assert_eq!(view.subtotal, 3 * 100 + 2 * 40);
        assert_eq!(view.item_count, 5);
    }

    #[test]
    fn add_refuses_more_than_stock() {
        let (carts, _, _) = setup();
        carts.add_item("u1", "toner", 2).unwrap();
        let err = carts.add_item("u1", "toner", 1).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            }
        ));
    }

    #[test]
    fn inactive_or_missing_products_cannot_be_added() {
        let (carts, _, ctx) = setup();
        let mut p = ctx.repo.get_product("cream").unwrap().unwrap();
        p.is_active = false;
        ctx.repo.update_product(&p).unwrap();
        assert!(matches!(
            carts.add_item("u1", "cream", 1),
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            carts.add_item("u1", "ghost", 1),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn set_quantity_zero_removes_line() {
        let (carts, _, _) = setup();
        carts.add_item("u1", "cream", 2).unwrap();
        let view = carts.set_quantity("u1", "cream", 4).unwrap();
        assert_eq!(view.items[0].quantity, 4);
        let view = carts.set_quantity("u1", "cream", 0).unwrap();
        assert!(view.items.is_empty());
        assert!(matches!(
            carts.set_quantity("u1", "cream", 1),
            Err(CoreError::NotFound)
        ));
    }

    #[test]
    fn deleted_products_drop_out_of_view() {
        let (carts, _, ctx) = setup();
        carts.add_item("u1", "cream", 1).unwrap();
        carts.add_item("u1", "toner", 1).unwrap();
        ctx.repo.delete_product("toner").unwrap();
        let view = carts.view("u1").unwrap();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.subtotal, 100);
    }

    #[test]
    fn wishlist_toggle_round_trip() {
        let (_, wishes, _) = setup();
        assert!(wishes.toggle("u1", "cream").unwrap());
        assert!(wishes.toggle("u1", "toner").unwrap());
        let names: Vec<String> = wishes.view("u1").unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(names, vec!["cream", "toner"]);
        assert!(!wishes.toggle("u1", "cream").unwrap());
        assert_eq!(wishes.view("u1").unwrap().len(), 1);
        assert!(matches!(wishes.add("u1", "ghost"), Err(CoreError::NotFound)));
    }
}
