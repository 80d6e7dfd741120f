//! Route table and handler modules.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::{Deserialize, Deserializer};

use crate::state::AppState;

pub mod account;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod chat;
pub mod orders;

/// Build the API router. Layers (tracing, request ids, CORS) are added by
/// the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // auth and profile
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/login", post(account::login))
        .route("/api/auth/google", post(account::google_sign_in))
        .route("/api/auth/refresh", post(account::refresh))
        .route("/api/auth/logout", post(account::logout))
        .route("/api/me", get(account::me).patch(account::update_me))
        .route("/api/me/password", post(account::change_password))
        // catalog
        .route(
            "/api/brands",
            get(catalog::list_brands).post(catalog::create_brand),
        )
        .route(
            "/api/brands/:id",
            get(catalog::get_brand)
                .patch(catalog::update_brand)
                .delete(catalog::delete_brand),
        )
        .route(
            "/api/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route(
            "/api/categories/:id",
            get(catalog::get_category)
                .patch(catalog::rename_category)
                .delete(catalog::delete_category),
        )
        .route("/api/categories/:id/types", post(catalog::add_type))
        .route(
            "/api/categories/:id/types/:type_slug",
            delete(catalog::remove_type),
        )
        .route(
            "/api/categories/:id/types/:type_slug/subtypes",
            post(catalog::add_subtype),
        )
        .route(
            "/api/categories/:id/types/:type_slug/subtypes/:subtype_slug",
            delete(catalog::remove_subtype),
        )
        .route("/api/products", get(catalog::search_products))
        .route("/api/products/:slug", get(catalog::get_product))
        .route(
            "/api/admin/products",
            get(catalog::admin_list_products).post(catalog::create_product),
        )
        .route(
            "/api/admin/products/:id",
            get(catalog::admin_get_product)
                .patch(catalog::update_product)
                .delete(catalog::delete_product),
        )
        // cart and wishlist
        .route("/api/cart", get(cart::view).delete(cart::clear))
        .route("/api/cart/items", post(cart::add_item))
        .route(
            "/api/cart/items/:product_id",
            patch(cart::set_quantity).delete(cart::remove_item),
        )
        .route("/api/wishlist", get(cart::wishlist))
        .route(
            "/api/wishlist/:product_id",
            post(cart::wish).delete(cart::unwish),
        )
        .route(
            "/api/wishlist/:product_id/toggle",
            post(cart::toggle_wish),
        )
        // orders
        .route("/api/orders", post(orders::checkout).get(orders::my_orders))
        .route("/api/orders/:id", get(orders::get_order))
        .route("/api/orders/:id/cancel", post(orders::cancel))
        .route("/api/admin/orders", get(orders::list_all))
        .route("/api/admin/orders/:id/status", patch(orders::update_status))
        // admin
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id", patch(admin::update_user))
        // chat
        .route("/api/chat/conversations", get(chat::list_conversations))
        .route(
            "/api/chat/:chat_id/messages",
            get(chat::history).post(chat::post_message),
        )
        .route("/ws/chat", get(chat::socket))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Tell an absent field (`None`) apart from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// `limit`/`offset` query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn limit(&self) -> usize {
        http_common::clamp_limit(self.limit)
    }

    pub fn offset(&self) -> usize {
        http_common::clamp_offset(self.offset)
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::TestApp;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let router = app.router.clone();
        let resp = tower::util::ServiceExt::oneshot(
            router,
            axum::http::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let app = TestApp::new();
        let (status, _) = app.call(Method::GET, "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn page_query_is_clamped() {
        let q = super::PageQuery {
            limit: Some(10_000),
            offset: None,
        };
        assert_eq!(q.limit(), http_common::MAX_PAGE_SIZE);
        assert_eq!(q.offset(), 0);
        let q = super::PageQuery {
            limit: None,
            offset: Some(usize::MAX),
        };
        assert_eq!(q.offset(), http_common::MAX_OFFSET);
    }

    async fn raw(app: &TestApp, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if !body.is_empty() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let resp = app
            .router
            .clone()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).expect("error body is JSON");
        (status, json)
    }

    #[tokio::test]
    async fn malformed_input_gets_the_json_error_body() {
        let app = TestApp::new();

        let (status, body) = raw(&app, Method::POST, "/api/auth/login", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_body");
        assert!(body["error"]["message"].as_str().unwrap().contains("JSON"));

        let (status, body) = raw(&app, Method::POST, "/api/auth/login", r#"{"email": 1}"#).await;
        assert!(status.is_client_error());
        assert_eq!(body["error"]["code"], "invalid_body");

        let (status, body) = raw(&app, Method::GET, "/api/products?limit=abc", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_query");
    }

    #[tokio::test]
    async fn huge_offsets_page_past_the_end() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let uri = format!("/api/admin/users?offset={}", usize::MAX);
        let (status, page) = app.call(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["items"], serde_json::json!([]));
        assert_eq!(page["total"], 1);
        assert_eq!(page["has_more"], false);
    }
}
