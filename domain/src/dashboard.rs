//! Admin dashboard summary.

use crate::service::{Actor, ServiceContext};
use crate::{CoreError, OrderRepository, OrderStatus, Product, ProductRepository, UserRepository};

const LOW_STOCK_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardSummary {
    pub product_count: usize,
    pub user_count: usize,
    pub order_count: usize,
    pub orders_by_status: Vec<(OrderStatus, usize)>,
    /// Sum of totals over delivered orders.
    pub revenue: u64,
    pub low_stock: Vec<Product>,
}

pub struct DashboardService<R: ?Sized> {
    ctx: ServiceContext<R>,
    low_stock_threshold: u32,
}

impl<R> DashboardService<R>
where
    R: ProductRepository + UserRepository + OrderRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>, low_stock_threshold: u32) -> Self {
        Self {
            ctx,
            low_stock_threshold,
        }
    }

    pub fn summary(&self, actor: &Actor) -> Result<DashboardSummary, CoreError> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden);
        }
        let repo = &self.ctx.repo;
        let orders_by_status = repo.count_orders_by_status()?;
        Ok(DashboardSummary {
            product_count: repo.count_products()?,
            user_count: repo.list_users(0, 0)?.total,
            order_count: orders_by_status.iter().map(|(_, n)| n).sum(),
            orders_by_status,
            revenue: repo.delivered_revenue()?,
            low_stock: repo.low_stock(self.low_stock_threshold, LOW_STOCK_LIMIT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures;
    use crate::{Role, Slug, User, UserEmail};
    use std::time::UNIX_EPOCH;

    fn product(id: &str, stock: u32) -> Product {
        Product {
            id: id.to_string(),
            name: id.to_string(),
            slug: Slug::new(id).unwrap(),
            description: None,
            brand_id: None,
            category_id: "c1".into(),
            type_slug: None,
            subtype_slug: None,
            price: 100,
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

    #[test]
    fn summary_counts_and_flags_low_stock() {
        let ctx = fixtures::context();
        ctx.repo.insert_product(product("lipstick", 2)).unwrap();
        ctx.repo.insert_product(product("toner", 50)).unwrap();
        ctx.repo
            .insert_user(User::new(
                "u1".into(),
                "Lan".into(),
                UserEmail::new("lan@mail.com").unwrap(),
                UNIX_EPOCH,
            ))
            .unwrap();
        let dash = DashboardService::new(ctx, 5);

        let summary = dash.summary(&Actor::new("a1", Role::Admin)).unwrap();
        assert_eq!(summary.product_count, 2);
        assert_eq!(summary.user_count, 1);
        assert_eq!(summary.order_count, 0);
        assert_eq!(summary.orders_by_status.len(), OrderStatus::ALL.len());
        assert_eq!(summary.revenue, 0);
        assert_eq!(summary.low_stock.len(), 1);
        assert_eq!(summary.low_stock[0].id, "lipstick");

        assert_eq!(
            dash.summary(&Actor::new("k1", Role::Consultant)),
            Err(CoreError::Forbidden)
        );
    }
}
