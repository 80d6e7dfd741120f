//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::SystemTime;

use domain::account::AccountService;
use domain::cart::{CartService, WishlistService};
use domain::catalog::CatalogService;
use domain::chat::ChatService;
use domain::dashboard::DashboardService;
use domain::order::OrderService;
use domain::service::ServiceContext;
use domain::{Clock, IdGenerator, PasswordHasher, Store};
use google_auth::GoogleVerifier;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::hub::ChatHub;

#[derive(Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Random v4 UUIDs for new documents.
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService<dyn Store>>,
    pub carts: Arc<CartService<dyn Store>>,
    pub wishlists: Arc<WishlistService<dyn Store>>,
    pub orders: Arc<OrderService<dyn Store>>,
    pub accounts: Arc<AccountService<dyn Store>>,
    pub chat: Arc<ChatService<dyn Store>>,
    pub dashboard: Arc<DashboardService<dyn Store>>,
    pub tokens: Arc<TokenIssuer>,
    /// `None` when Google sign-in is not configured.
    pub google: Option<Arc<GoogleVerifier>>,
    pub hub: ChatHub,
    pub clock: Arc<dyn Clock>,
    pub auth_debug_header: bool,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn Store>,
        hasher: Arc<dyn PasswordHasher>,
        google: Option<GoogleVerifier>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(StdClock);
        let ctx = ServiceContext::new(store, Arc::clone(&clock), Arc::new(UuidIds));
        Self {
            catalog: Arc::new(CatalogService::new(ctx.clone())),
            carts: Arc::new(CartService::new(ctx.clone())),
            wishlists: Arc::new(WishlistService::new(ctx.clone())),
            orders: Arc::new(OrderService::new(ctx.clone(), cfg.shipping)),
            accounts: Arc::new(AccountService::new(
                ctx.clone(),
                hasher,
                cfg.admin_emails.clone(),
            )),
            chat: Arc::new(ChatService::new(ctx.clone())),
            dashboard: Arc::new(DashboardService::new(ctx, cfg.low_stock_threshold)),
            tokens: Arc::new(TokenIssuer::new(
                &cfg.jwt_secret,
                cfg.access_token_ttl,
                cfg.refresh_token_ttl,
            )),
            google: google.map(Arc::new),
            hub: ChatHub::new(cfg.chat_room_capacity),
            clock,
            auth_debug_header: cfg.auth_debug_header,
        }
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }
}
