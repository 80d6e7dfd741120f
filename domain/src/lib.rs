//! Domain library for the cosmetics storefront.
//!
//! This crate holds the domain types, ports (traits), services and error
//! definitions. It depends on nothing beyond workspace metadata; keep adapters
//! and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// A URL-safe slug identifying a brand, category, type, subtype or product.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slug(String);

impl Slug {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidSlug("empty".into()));
        }
        if !val
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidSlug("invalid characters".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email address of an account. Always stored lowercased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into().trim().to_lowercase();
        // Lightweight check; full RFC compliance not required here
        if val.is_empty() || !val.contains('@') {
            return Err(CoreError::InvalidUserEmail);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Account role. Consultants and admins are both staff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    Consultant,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Consultant => "consultant",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" | "user" => Some(Role::Customer),
            "consultant" => Some(Role::Consultant),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Consultant | Role::Admin)
    }
}

/// A storefront account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: UserEmail,
    /// bcrypt hash; `None` for accounts created through Google sign-in.
    pub password_hash: Option<String>,
    pub google_sub: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
    /// The single live refresh token. Issuing a new one overwrites it.
    pub refresh_token: Option<String>,
    pub is_blocked: bool,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

impl User {
    pub fn new(id: String, name: String, email: UserEmail, created_at: SystemTime) -> Self {
        Self {
            id,
            name,
            email,
            password_hash: None,
            google_sub: None,
            avatar_url: None,
            role: Role::Customer,
            refresh_token: None,
            is_blocked: false,
            created_at,
            updated_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Brand {
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductSubtype {
    pub id: String,
    pub name: String,
    pub slug: Slug,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductType {
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub subtypes: Vec<ProductSubtype>,
}

impl ProductType {
    pub fn subtype(&self, slug: &Slug) -> Option<&ProductSubtype> {
        self.subtypes.iter().find(|s| &s.slug == slug)
    }
}

/// A category document with its types and subtypes embedded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductCategory {
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub types: Vec<ProductType>,
    pub created_at: SystemTime,
}

impl ProductCategory {
    pub fn product_type(&self, slug: &Slug) -> Option<&ProductType> {
        self.types.iter().find(|t| &t.slug == slug)
    }

    pub fn product_type_mut(&mut self, slug: &Slug) -> Option<&mut ProductType> {
        self.types.iter_mut().find(|t| &t.slug == slug)
    }
}

/// A catalog product. Prices are in the smallest currency unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: Slug,
    pub description: Option<String>,
    pub brand_id: Option<String>,
    pub category_id: String,
    pub type_slug: Option<Slug>,
    pub subtype_slug: Option<Slug>,
    pub price: u64,
    pub sale_price: Option<u64>,
    pub stock: u32,
    /// Units sold through checkout, net of cancellations.
    pub sold: u32,
    pub images: Vec<String>,
    /// Tags entered by staff; kept so derived tags can be rebuilt on edits.
    pub custom_tags: Vec<String>,
    /// Derived search tags, custom tags included.
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

impl Product {
    /// Price charged at checkout: the sale price when it undercuts the list price.
    pub fn effective_price(&self) -> u64 {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }

    pub fn is_on_sale(&self) -> bool {
        self.effective_price() < self.price
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
}

/// Per-user cart document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cart {
    pub user_id: String,
    pub lines: Vec<CartLine>,
    pub updated_at: Option<SystemTime>,
}

impl Cart {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            lines: Vec::new(),
            updated_at: None,
        }
    }

    pub fn quantity_of(&self, product_id: &str) -> u32 {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Wishlist {
    pub user_id: String,
    pub product_ids: Vec<String>,
}

/// Immutable snapshot of a cart line taken at checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: u64,
    pub quantity: u32,
}

impl OrderLine {
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity as u64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingInfo {
    pub recipient: String,
    pub phone: String,
    pub address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMethod {
    CashOnDelivery,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cod",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cod" | "cash_on_delivery" => Some(PaymentMethod::CashOnDelivery),
            "bank_transfer" | "bank" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

/// Fulfillment state of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipping,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "shipping" => Some(OrderStatus::Shipping),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" | "canceled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Shipping)
                | (Shipping, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub code: String,
    pub user_id: String,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub subtotal: u64,
    pub shipping_fee: u64,
    pub total: u64,
    pub note: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: Option<SystemTime>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_role: Role,
    pub text: String,
    pub sent_at: SystemTime,
}

/// One support thread; messages are append-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub chat_id: String,
    pub customer_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Conversation {
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Source of opaque unique identifiers for new documents.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, CoreError>;
    fn verify(&self, plain: &str, hash: &str) -> bool;
}

/// Sort order for product queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    BestSelling,
    Name,
}

impl ProductSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "newest" => Some(ProductSort::Newest),
            "price_asc" => Some(ProductSort::PriceAsc),
            "price_desc" => Some(ProductSort::PriceDesc),
            "best_selling" => Some(ProductSort::BestSelling),
            "name" => Some(ProductSort::Name),
            _ => None,
        }
    }
}

/// Filters and pagination for product listing.
#[derive(Clone, Debug, Default)]
pub struct ProductQuery {
    pub category_id: Option<String>,
    pub type_slug: Option<Slug>,
    pub subtype_slug: Option<Slug>,
    pub brand_id: Option<String>,
    /// Case-insensitive match against name, description and tags.
    pub search: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub sort: ProductSort,
    pub include_inactive: bool,
    pub limit: usize,
    pub offset: usize,
}

impl ProductQuery {
    /// In-process predicate mirroring the SQL filter in the sqlite adapter.
    pub fn matches(&self, p: &Product) -> bool {
        if !self.include_inactive && !p.is_active {
            return false;
        }
        if self.category_id.as_ref().is_some_and(|c| c != &p.category_id) {
            return false;
        }
        if self.type_slug.is_some() && self.type_slug != p.type_slug {
            return false;
        }
        if self.subtype_slug.is_some() && self.subtype_slug != p.subtype_slug {
            return false;
        }
        if self.brand_id.is_some() && self.brand_id != p.brand_id {
            return false;
        }
        let price = p.effective_price();
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }
        if let Some(q) = self.search.as_deref().map(str::to_lowercase) {
            let in_name = p.name.to_lowercase().contains(&q);
            let in_desc = p
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&q));
            let in_tags = p.tags.iter().any(|t| t.contains(&q));
            if !(in_name || in_desc || in_tags) {
                return false;
            }
        }
        true
    }
}

/// Filters and pagination for order listing.
#[derive(Clone, Debug, Default)]
pub struct OrderQuery {
    pub user_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Paginated list result.
#[derive(Clone, Debug)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

impl<T> ListResult<T> {
    pub fn from_page(items: Vec<T>, offset: usize, total: usize) -> Self {
        let has_more = offset.saturating_add(items.len()) < total;
        Self {
            items,
            total,
            has_more,
        }
    }
}

pub trait UserRepository: Send + Sync {
    fn get_user(&self, id: &str) -> Result<Option<User>, CoreError>;
    fn get_user_by_email(&self, email: &UserEmail) -> Result<Option<User>, CoreError>;
    fn get_user_by_google_sub(&self, sub: &str) -> Result<Option<User>, CoreError>;
    /// Insert a new user; duplicate id or email is `AlreadyExists`.
    fn insert_user(&self, user: User) -> Result<(), CoreError>;
    fn update_user(&self, user: &User) -> Result<(), CoreError>;
    fn list_users(&self, limit: usize, offset: usize) -> Result<ListResult<User>, CoreError>;
}

pub trait BrandRepository: Send + Sync {
    fn get_brand(&self, id: &str) -> Result<Option<Brand>, CoreError>;
    fn get_brand_by_slug(&self, slug: &Slug) -> Result<Option<Brand>, CoreError>;
    fn insert_brand(&self, brand: Brand) -> Result<(), CoreError>;
    fn update_brand(&self, brand: &Brand) -> Result<(), CoreError>;
    fn delete_brand(&self, id: &str) -> Result<(), CoreError>;
    fn list_brands(&self) -> Result<Vec<Brand>, CoreError>;
}

pub trait CategoryRepository: Send + Sync {
    fn get_category(&self, id: &str) -> Result<Option<ProductCategory>, CoreError>;
    fn get_category_by_slug(&self, slug: &Slug) -> Result<Option<ProductCategory>, CoreError>;
    fn insert_category(&self, category: ProductCategory) -> Result<(), CoreError>;
    /// Replace the category document, embedded types and subtypes included.
    fn update_category(&self, category: &ProductCategory) -> Result<(), CoreError>;
    fn delete_category(&self, id: &str) -> Result<(), CoreError>;
    fn list_categories(&self) -> Result<Vec<ProductCategory>, CoreError>;
}

pub trait ProductRepository: Send + Sync {
    fn get_product(&self, id: &str) -> Result<Option<Product>, CoreError>;
    fn get_product_by_slug(&self, slug: &Slug) -> Result<Option<Product>, CoreError>;
    fn insert_product(&self, product: Product) -> Result<(), CoreError>;
    /// Persist everything but `stock` and `sold`, which only move through
    /// `set_stock` and `adjust_stock`.
    fn update_product(&self, product: &Product) -> Result<(), CoreError>;
    fn delete_product(&self, id: &str) -> Result<(), CoreError>;
    fn query_products(&self, query: &ProductQuery) -> Result<ListResult<Product>, CoreError>;
    fn count_products(&self) -> Result<usize, CoreError>;
    fn count_products_by_brand(&self, brand_id: &str) -> Result<usize, CoreError>;
    /// Count products in a category, optionally narrowed to a type and subtype.
    fn count_products_by_category(
        &self,
        category_id: &str,
        type_slug: Option<&Slug>,
        subtype_slug: Option<&Slug>,
    ) -> Result<usize, CoreError>;
    /// Atomically add `delta` to stock and return the new stock.
    ///
    /// Fails with `InsufficientStock` when stock would drop below zero. A
    /// negative delta is also added to `sold`, a positive one taken back out.
    fn adjust_stock(&self, id: &str, delta: i64) -> Result<u32, CoreError>;
    /// Overwrite stock with an absolute count; `sold` is untouched.
    fn set_stock(&self, id: &str, stock: u32) -> Result<(), CoreError>;
    fn low_stock(&self, threshold: u32, limit: usize) -> Result<Vec<Product>, CoreError>;
}

pub trait CartRepository: Send + Sync {
    fn get_cart(&self, user_id: &str) -> Result<Option<Cart>, CoreError>;
    fn save_cart(&self, cart: &Cart) -> Result<(), CoreError>;
    fn clear_cart(&self, user_id: &str) -> Result<(), CoreError>;
}

pub trait WishlistRepository: Send + Sync {
    fn get_wishlist(&self, user_id: &str) -> Result<Wishlist, CoreError>;
    /// Returns `true` when the product was not already listed.
    fn add_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError>;
    /// Returns `true` when the product was listed.
    fn remove_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError>;
}

pub trait OrderRepository: Send + Sync {
    /// Monotonic counter backing human-readable order codes.
    fn next_order_number(&self) -> Result<u64, CoreError>;
    fn insert_order(&self, order: Order) -> Result<(), CoreError>;
    fn get_order(&self, id: &str) -> Result<Option<Order>, CoreError>;
    fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, CoreError>;
    /// Persist status, note and `updated_at` if the stored status is still
    /// `expected`. Returns `false` when another writer moved it first.
    /// Lines and totals never change.
    fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<bool, CoreError>;
    fn list_orders(&self, query: &OrderQuery) -> Result<ListResult<Order>, CoreError>;
    fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, usize)>, CoreError>;
    fn delivered_revenue(&self) -> Result<u64, CoreError>;
}

pub trait ConversationRepository: Send + Sync {
    fn get_conversation(&self, chat_id: &str) -> Result<Option<Conversation>, CoreError>;
    /// Append to a conversation, creating it on the first message.
    fn append_message(
        &self,
        chat_id: &str,
        customer_id: &str,
        message: ChatMessage,
    ) -> Result<Conversation, CoreError>;
    /// Most recently updated conversations first.
    fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, CoreError>;
}

/// Everything the server persists, behind one object.
pub trait Store:
    UserRepository
    + BrandRepository
    + CategoryRepository
    + ProductRepository
    + CartRepository
    + WishlistRepository
    + OrderRepository
    + ConversationRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + BrandRepository
        + CategoryRepository
        + ProductRepository
        + CartRepository
        + WishlistRepository
        + OrderRepository
        + ConversationRepository
{
}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Debug, PartialEq, Eq)]
pub enum CoreError {
    InvalidInput(String),
    InvalidSlug(String),
    InvalidUserEmail,
    AlreadyExists,
    NotFound,
    Conflict(String),
    InsufficientStock {
        product_id: String,
        available: u32,
        requested: u32,
    },
    EmptyCart,
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
    Unauthorized,
    Forbidden,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CoreError::InvalidSlug(msg) => write!(f, "invalid slug: {}", msg),
            CoreError::InvalidUserEmail => write!(f, "invalid user email"),
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Conflict(msg) => write!(f, "conflict: {}", msg),
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => write!(
                f,
                "insufficient stock for {}: requested {}, available {}",
                product_id, requested, available
            ),
            CoreError::EmptyCart => write!(f, "cart is empty"),
            CoreError::InvalidTransition { from, to } => write!(
                f,
                "cannot move order from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            CoreError::Unauthorized => write!(f, "invalid credentials"),
            CoreError::Forbidden => write!(f, "access denied"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod account;
pub mod adapters;
pub mod base62;
pub mod cart;
pub mod catalog;
pub mod chat;
pub mod dashboard;
pub mod order;
pub mod service;
pub mod slug;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_new_accepts_simple_values() {
        let s = Slug::new("son-moi_01").expect("valid slug");
        assert_eq!(s.as_str(), "son-moi_01");
    }

    #[test]
    fn list_result_tolerates_offsets_past_the_end() {
        let page = ListResult::<u8>::from_page(vec![], usize::MAX, 1);
        assert!(!page.has_more);
        let page = ListResult::from_page(vec![1, 2], 0, 3);
        assert!(page.has_more);
    }

    #[test]
    fn slug_rejects_empty() {
        let err = Slug::new("").unwrap_err();
        match err {
            CoreError::InvalidSlug(_) => {}
            _ => panic!("expected InvalidSlug"),
        }
    }

    #[test]
    fn user_email_is_normalized() {
        let e = UserEmail::new("  Lan@Example.COM ").unwrap();
        assert_eq!(e.as_str(), "lan@example.com");
        assert!(matches!(
            UserEmail::new("not-an-email"),
            Err(CoreError::InvalidUserEmail)
        ));
    }

    #[test]
    fn order_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipping));
        assert!(Shipping.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Shipping.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Pending.can_transition_to(Delivered));
    }

    #[test]
    fn effective_price_ignores_higher_sale_price() {
        let mut p = Product {
            id: "p1".into(),
            name: "Lipstick".into(),
            slug: Slug::new("lipstick").unwrap(),
            description: None,
            brand_id: None,
            category_id: "c1".into(),
            type_slug: None,
            subtype_slug: None,
            price: 200,
            sale_price: Some(150),
            stock: 1,
            sold: 0,
            images: vec![],
            custom_tags: vec![],
            tags: vec![],
            is_active: true,
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: None,
        };
        assert_eq!(p.effective_price(), 150);
        assert!(p.is_on_sale());
        p.sale_price = Some(250);
        assert_eq!(p.effective_price(), 200);
        assert!(!p.is_on_sale());
    }

    #[test]
    fn role_staff_and_parse() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Consultant.is_staff());
        assert!(!Role::Customer.is_staff());
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::Customer));
        assert_eq!(Role::parse("root"), None);
    }
}
