use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{
    Brand, BrandRepository, Cart, CartRepository, CategoryRepository, ChatMessage, Conversation,
    ConversationRepository, CoreError, ListResult, Order, OrderQuery, OrderRepository,
    OrderStatus, Product, ProductCategory, ProductQuery, ProductRepository, ProductSort, Slug,
    User, UserEmail, UserRepository, Wishlist, WishlistRepository,
};

/// In-memory implementation of every repository port.
///
/// Each collection sits behind its own mutex; operations that touch a single
/// document (stock adjustment, message append) are atomic.
pub struct InMemoryStore {
    users: Mutex<BTreeMap<String, User>>,
    brands: Mutex<BTreeMap<String, Brand>>,
    categories: Mutex<BTreeMap<String, ProductCategory>>,
    products: Mutex<BTreeMap<String, Product>>,
    carts: Mutex<BTreeMap<String, Cart>>,
    wishlists: Mutex<BTreeMap<String, Vec<String>>>,
    orders: Mutex<BTreeMap<String, Order>>,
    order_counter: Mutex<u64>,
    conversations: Mutex<BTreeMap<String, Conversation>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, CoreError> {
    m.lock()
        .map_err(|_| CoreError::Repository("mutex poisoned".into()))
}

fn page<T>(items: Vec<T>, limit: usize, offset: usize) -> ListResult<T> {
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    ListResult::from_page(page, offset, total)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(BTreeMap::new()),
            brands: Mutex::new(BTreeMap::new()),
            categories: Mutex::new(BTreeMap::new()),
            products: Mutex::new(BTreeMap::new()),
            carts: Mutex::new(BTreeMap::new()),
            wishlists: Mutex::new(BTreeMap::new()),
            orders: Mutex::new(BTreeMap::new()),
            order_counter: Mutex::new(0),
            conversations: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryStore {
    fn get_user(&self, id: &str) -> Result<Option<User>, CoreError> {
        Ok(lock(&self.users)?.get(id).cloned())
    }

    fn get_user_by_email(&self, email: &UserEmail) -> Result<Option<User>, CoreError> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    fn get_user_by_google_sub(&self, sub: &str) -> Result<Option<User>, CoreError> {
        Ok(lock(&self.users)?
            .values()
            .find(|u| u.google_sub.as_deref() == Some(sub))
            .cloned())
    }

    fn insert_user(&self, user: User) -> Result<(), CoreError> {
        let mut users = lock(&self.users)?;
        if users.contains_key(&user.id) || users.values().any(|u| u.email == user.email) {
            return Err(CoreError::AlreadyExists);
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    fn update_user(&self, user: &User) -> Result<(), CoreError> {
        let mut users = lock(&self.users)?;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(CoreError::AlreadyExists);
        }
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn list_users(&self, limit: usize, offset: usize) -> Result<ListResult<User>, CoreError> {
        let mut all: Vec<User> = lock(&self.users)?.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(all, limit, offset))
    }
}

impl BrandRepository for InMemoryStore {
    fn get_brand(&self, id: &str) -> Result<Option<Brand>, CoreError> {
        Ok(lock(&self.brands)?.get(id).cloned())
    }

    fn get_brand_by_slug(&self, slug: &Slug) -> Result<Option<Brand>, CoreError> {
        Ok(lock(&self.brands)?
            .values()
            .find(|b| &b.slug == slug)
            .cloned())
    }

    fn insert_brand(&self, brand: Brand) -> Result<(), CoreError> {
        let mut brands = lock(&self.brands)?;
        if brands.contains_key(&brand.id) || brands.values().any(|b| b.slug == brand.slug) {
            return Err(CoreError::AlreadyExists);
        }
        brands.insert(brand.id.clone(), brand);
        Ok(())
    }

    fn update_brand(&self, brand: &Brand) -> Result<(), CoreError> {
        let mut brands = lock(&self.brands)?;
        if brands
            .values()
            .any(|b| b.id != brand.id && b.slug == brand.slug)
        {
            return Err(CoreError::AlreadyExists);
        }
        match brands.get_mut(&brand.id) {
            Some(slot) => {
                *slot = brand.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn delete_brand(&self, id: &str) -> Result<(), CoreError> {
        lock(&self.brands)?
            .remove(id)
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }

    fn list_brands(&self) -> Result<Vec<Brand>, CoreError> {
        let mut all: Vec<Brand> = lock(&self.brands)?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

impl CategoryRepository for InMemoryStore {
    fn get_category(&self, id: &str) -> Result<Option<ProductCategory>, CoreError> {
        Ok(lock(&self.categories)?.get(id).cloned())
    }

    fn get_category_by_slug(&self, slug: &Slug) -> Result<Option<ProductCategory>, CoreError> {
        Ok(lock(&self.categories)?
            .values()
            .find(|c| &c.slug == slug)
            .cloned())
    }

    fn insert_category(&self, category: ProductCategory) -> Result<(), CoreError> {
        let mut cats = lock(&self.categories)?;
        if cats.contains_key(&category.id) || cats.values().any(|c| c.slug == category.slug) {
            return Err(CoreError::AlreadyExists);
        }
        cats.insert(category.id.clone(), category);
        Ok(())
    }

    fn update_category(&self, category: &ProductCategory) -> Result<(), CoreError> {
        let mut cats = lock(&self.categories)?;
        if cats
            .values()
            .any(|c| c.id != category.id && c.slug == category.slug)
        {
            return Err(CoreError::AlreadyExists);
        }
        match cats.get_mut(&category.id) {
            Some(slot) => {
                *slot = category.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn delete_category(&self, id: &str) -> Result<(), CoreError> {
        lock(&self.categories)?
            .remove(id)
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }

    fn list_categories(&self) -> Result<Vec<ProductCategory>, CoreError> {
        let mut all: Vec<ProductCategory> = lock(&self.categories)?.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

fn sort_products(items: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Newest => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        ProductSort::PriceAsc => items.sort_by_key(|p| p.effective_price()),
        ProductSort::PriceDesc => {
            items.sort_by(|a, b| b.effective_price().cmp(&a.effective_price()))
        }
        ProductSort::BestSelling => items.sort_by(|a, b| b.sold.cmp(&a.sold)),
        ProductSort::Name => items.sort_by(|a, b| a.name.cmp(&b.name)),
    }
}

impl ProductRepository for InMemoryStore {
    fn get_product(&self, id: &str) -> Result<Option<Product>, CoreError> {
        Ok(lock(&self.products)?.get(id).cloned())
    }

    fn get_product_by_slug(&self, slug: &Slug) -> Result<Option<Product>, CoreError> {
        Ok(lock(&self.products)?
            .values()
            .find(|p| &p.slug == slug)
            .cloned())
    }

    fn insert_product(&self, product: Product) -> Result<(), CoreError> {
        let mut products = lock(&self.products)?;
        if products.contains_key(&product.id)
            || products.values().any(|p| p.slug == product.slug)
        {
            return Err(CoreError::AlreadyExists);
        }
        products.insert(product.id.clone(), product);
        Ok(())
    }

    fn update_product(&self, product: &Product) -> Result<(), CoreError> {
        let mut products = lock(&self.products)?;
        if products
            .values()
            .any(|p| p.id != product.id && p.slug == product.slug)
        {
            return Err(CoreError::AlreadyExists);
        }
        match products.get_mut(&product.id) {
            Some(slot) => {
                *slot = Product {
                    stock: slot.stock,
                    sold: slot.sold,
                    ..product.clone()
                };
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn delete_product(&self, id: &str) -> Result<(), CoreError> {
        lock(&self.products)?
            .remove(id)
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }

    fn query_products(&self, query: &ProductQuery) -> Result<ListResult<Product>, CoreError> {
        let mut matching: Vec<Product> = lock(&self.products)?
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        sort_products(&mut matching, query.sort);
        Ok(page(matching, query.limit, query.offset))
    }

    fn count_products(&self) -> Result<usize, CoreError> {
        Ok(lock(&self.products)?.len())
    }

    fn count_products_by_brand(&self, brand_id: &str) -> Result<usize, CoreError> {
        Ok(lock(&self.products)?
            .values()
            .filter(|p| p.brand_id.as_deref() == Some(brand_id))
            .count())
    }

    fn count_products_by_category(
        &self,
        category_id: &str,
        type_slug: Option<&Slug>,
        subtype_slug: Option<&Slug>,
    ) -> Result<usize, CoreError> {
        Ok(lock(&self.products)?
            .values()
            .filter(|p| p.category_id == category_id)
            .filter(|p| type_slug.is_none() || p.type_slug.as_ref() == type_slug)
            .filter(|p| subtype_slug.is_none() || p.subtype_slug.as_ref() == subtype_slug)
            .count())
    }

    fn adjust_stock(&self, id: &str, delta: i64) -> Result<u32, CoreError> {
        let mut products = lock(&self.products)?;
        let product = products.get_mut(id).ok_or(CoreError::NotFound)?;
        let next = product.stock as i64 + delta;
        if next < 0 {
            return Err(CoreError::InsufficientStock {
                product_id: id.to_string(),
                available: product.stock,
                requested: delta.unsigned_abs() as u32,
            });
        }
        product.stock = next.min(u32::MAX as i64) as u32;
        product.sold = (product.sold as i64 - delta).clamp(0, u32::MAX as i64) as u32;
        Ok(product.stock)
    }

    fn set_stock(&self, id: &str, stock: u32) -> Result<(), CoreError> {
        let mut products = lock(&self.products)?;
        products.get_mut(id).ok_or(CoreError::NotFound)?.stock = stock;
        Ok(())
    }

    fn low_stock(&self, threshold: u32, limit: usize) -> Result<Vec<Product>, CoreError> {
        let mut low: Vec<Product> = lock(&self.products)?
            .values()
            .filter(|p| p.is_active && p.stock <= threshold)
            .cloned()
            .collect();
        low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        low.truncate(limit);
        Ok(low)
    }
}

impl CartRepository for InMemoryStore {
    fn get_cart(&self, user_id: &str) -> Result<Option<Cart>, CoreError> {
        Ok(lock(&self.carts)?.get(user_id).cloned())
    }

    fn save_cart(&self, cart: &Cart) -> Result<(), CoreError> {
        lock(&self.carts)?.insert(cart.user_id.clone(), cart.clone());
        Ok(())
    }

    fn clear_cart(&self, user_id: &str) -> Result<(), CoreError> {
        lock(&self.carts)?.remove(user_id);
        Ok(())
    }
}

impl WishlistRepository for InMemoryStore {
    fn get_wishlist(&self, user_id: &str) -> Result<Wishlist, CoreError> {
        let lists = lock(&self.wishlists)?;
        Ok(Wishlist {
            user_id: user_id.to_string(),
            product_ids: lists.get(user_id).cloned().unwrap_or_default(),
        })
    }

    fn add_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        let mut lists = lock(&self.wishlists)?;
        let ids = lists.entry(user_id.to_string()).or_default();
        if ids.iter().any(|p| p == product_id) {
            return Ok(false);
        }
        ids.push(product_id.to_string());
        Ok(true)
    }

    fn remove_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        let mut lists = lock(&self.wishlists)?;
        let Some(ids) = lists.get_mut(user_id) else {
            return Ok(false);
        };
        let before = ids.len();
        ids.retain(|p| p != product_id);
        Ok(ids.len() != before)
    }
}

impl OrderRepository for InMemoryStore {
    fn next_order_number(&self) -> Result<u64, CoreError> {
        let mut counter = lock(&self.order_counter)?;
        *counter = counter.saturating_add(1);
        Ok(*counter)
    }

    fn insert_order(&self, order: Order) -> Result<(), CoreError> {
        let mut orders = lock(&self.orders)?;
        if orders.contains_key(&order.id) || orders.values().any(|o| o.code == order.code) {
            return Err(CoreError::AlreadyExists);
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    fn get_order(&self, id: &str) -> Result<Option<Order>, CoreError> {
        Ok(lock(&self.orders)?.get(id).cloned())
    }

    fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, CoreError> {
        Ok(lock(&self.orders)?
            .values()
            .find(|o| o.code == code)
            .cloned())
    }

    fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<bool, CoreError> {
        let mut orders = lock(&self.orders)?;
        let slot = orders.get_mut(&order.id).ok_or(CoreError::NotFound)?;
        if slot.status != expected {
            return Ok(false);
        }
        slot.status = order.status;
        slot.note = order.note.clone();
        slot.updated_at = order.updated_at;
        Ok(true)
    }

    fn list_orders(&self, query: &OrderQuery) -> Result<ListResult<Order>, CoreError> {
        let mut matching: Vec<Order> = lock(&self.orders)?
            .values()
            .filter(|o| query.user_id.as_ref().map_or(true, |u| u == &o.user_id))
            .filter(|o| query.status.map_or(true, |s| s == o.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(matching, query.limit, query.offset))
    }

    fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, usize)>, CoreError> {
        let orders = lock(&self.orders)?;
        Ok(OrderStatus::ALL
            .iter()
            .map(|s| (*s, orders.values().filter(|o| o.status == *s).count()))
            .collect())
    }

    fn delivered_revenue(&self) -> Result<u64, CoreError> {
        Ok(lock(&self.orders)?
            .values()
            .filter(|o| o.status == OrderStatus::Delivered)
            .map(|o| o.total)
            .sum())
    }
}

impl ConversationRepository for InMemoryStore {
    fn get_conversation(&self, chat_id: &str) -> Result<Option<Conversation>, CoreError> {
        Ok(lock(&self.conversations)?.get(chat_id).cloned())
    }

    fn append_message(
        &self,
        chat_id: &str,
        customer_id: &str,
        message: ChatMessage,
    ) -> Result<Conversation, CoreError> {
        let mut convs = lock(&self.conversations)?;
        let conv = convs
            .entry(chat_id.to_string())
            .or_insert_with(|| Conversation {
                chat_id: chat_id.to_string(),
                customer_id: customer_id.to_string(),
                messages: Vec::new(),
                created_at: message.sent_at,
                updated_at: message.sent_at,
            });
        conv.updated_at = message.sent_at;
        conv.messages.push(message);
        Ok(conv.clone())
    }

    fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, CoreError> {
        let mut all: Vec<Conversation> = lock(&self.conversations)?.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use std::time::{Duration, UNIX_EPOCH};

    fn mk_product(id: &str, stock: u32) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            slug: Slug::new(format!("product-{}", id)).unwrap(),
            description: None,
            brand_id: Some("b1".into()),
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
    fn insert_rejects_duplicate_slug() {
        let store = InMemoryStore::new();
        store.insert_product(mk_product("a", 1)).unwrap();
        let mut dup = mk_product("b", 1);
        dup.slug = Slug::new("product-a").unwrap();
        assert!(matches!(
            store.insert_product(dup),
            Err(CoreError::AlreadyExists)
        ));
    }

    #[test]
    fn adjust_stock_tracks_sold_and_refuses_negative() {
        let store = InMemoryStore::new();
        store.insert_product(mk_product("a", 5)).unwrap();
        assert_eq!(store.adjust_stock("a", -3).unwrap(), 2);
        let err = store.adjust_stock("a", -3).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "a".into(),
                available: 2,
                requested: 3
            }
        );
        assert_eq!(store.adjust_stock("a", 1).unwrap(), 3);
        let p = store.get_product("a").unwrap().unwrap();
        assert_eq!(p.sold, 2);
    }

    #[test]
    fn update_product_leaves_stock_to_the_stock_calls() {
        let store = InMemoryStore::new();
        store.insert_product(mk_product("a", 5)).unwrap();
        let stale = store.get_product("a").unwrap().unwrap();
        store.adjust_stock("a", -2).unwrap();

        let mut edit = stale.clone();
        edit.name = "Renamed".into();
        edit.stock = 99;
        store.update_product(&edit).unwrap();
        let p = store.get_product("a").unwrap().unwrap();
        assert_eq!((p.name.as_str(), p.stock, p.sold), ("Renamed", 3, 2));

        store.set_stock("a", 40).unwrap();
        let p = store.get_product("a").unwrap().unwrap();
        assert_eq!((p.stock, p.sold), (40, 2));
        assert!(matches!(store.set_stock("zz", 1), Err(CoreError::NotFound)));
    }

    #[test]
    fn user_email_is_unique() {
        let store = InMemoryStore::new();
        let email = UserEmail::new("a@example.com").unwrap();
        store
            .insert_user(User::new("u1".into(), "A".into(), email.clone(), UNIX_EPOCH))
            .unwrap();
        let err = store
            .insert_user(User::new("u2".into(), "B".into(), email, UNIX_EPOCH))
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn wishlist_add_is_idempotent() {
        let store = InMemoryStore::new();
        assert!(store.add_wish("u1", "p1").unwrap());
        assert!(!store.add_wish("u1", "p1").unwrap());
        assert!(store.remove_wish("u1", "p1").unwrap());
        assert!(!store.remove_wish("u1", "p1").unwrap());
        assert!(store.get_wishlist("u1").unwrap().product_ids.is_empty());
    }

    #[test]
    fn append_message_creates_then_extends() {
        let store = InMemoryStore::new();
        let msg = |id: &str, secs: u64| ChatMessage {
            id: id.to_string(),
            sender_id: "u1".into(),
            sender_role: Role::Customer,
            text: "hello".into(),
            sent_at: UNIX_EPOCH + Duration::from_secs(secs),
        };
        store.append_message("support_u1", "u1", msg("m1", 1)).unwrap();
        let conv = store.append_message("support_u1", "u1", msg("m2", 2)).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.created_at, UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(conv.updated_at, UNIX_EPOCH + Duration::from_secs(2));
        assert_eq!(store.list_conversations(10).unwrap().len(), 1);
    }

    #[test]
    fn order_counter_is_monotonic() {
        let store = InMemoryStore::new();
        let a = store.next_order_number().unwrap();
        let b = store.next_order_number().unwrap();
        assert!(b > a);
    }
}
