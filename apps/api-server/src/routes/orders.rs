//! Checkout, order history and fulfillment.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use domain::order::CheckoutInput;
use domain::{OrderQuery, OrderStatus, PaymentMethod, ShippingInfo};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::dto::{OrderOut, Page};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutReq {
    recipient: String,
    phone: String,
    address: String,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Deserialize)]
pub struct AdminOrderQuery {
    status: Option<String>,
    user_id: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct StatusReq {
    status: String,
}

fn parse_status(raw: &str) -> ApiResult<OrderStatus> {
    OrderStatus::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("unknown status '{}'", raw)))
}

pub async fn checkout(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<CheckoutReq>,
) -> ApiResult<(StatusCode, Json<OrderOut>)> {
    let payment_method = match body.payment_method.as_deref() {
        None => PaymentMethod::CashOnDelivery,
        Some(raw) => PaymentMethod::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown payment method '{}'", raw)))?,
    };
    let order = state.orders.checkout(
        &actor.user_id,
        CheckoutInput {
            shipping: ShippingInfo {
                recipient: body.recipient,
                phone: body.phone,
                address: body.address,
            },
            payment_method,
            note: body.note,
        },
    )?;
    info!(
        order_id = %order.id,
        code = %order.code,
        user_id = %order.user_id,
        total = order.total,
        "order placed"
    );
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn my_orders(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> ApiResult<Json<Page<OrderOut>>> {
    let result = state
        .orders
        .list_for_user(&actor.user_id, page.limit(), page.offset())?;
    Ok(Json(Page::map(result, OrderOut::from)))
}

/// Fetch by id or order code.
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<OrderOut>> {
    Ok(Json(state.orders.get(&actor, &id)?.into()))
}

pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<OrderOut>> {
    let order = state.orders.cancel(&actor, &id)?;
    info!(order_id = %order.id, by = %actor.user_id, "order cancelled by customer");
    Ok(Json(order.into()))
}

/// All orders, for staff.
pub async fn list_all(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(q): ApiQuery<AdminOrderQuery>,
) -> ApiResult<Json<Page<OrderOut>>> {
    let query = OrderQuery {
        user_id: q.user_id,
        status: q.status.as_deref().map(parse_status).transpose()?,
        limit: http_common::clamp_limit(q.limit),
        offset: http_common::clamp_offset(q.offset),
    };
    let result = state.orders.list(&actor, &query)?;
    Ok(Json(Page::map(result, OrderOut::from)))
}

pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<StatusReq>,
) -> ApiResult<Json<OrderOut>> {
    let next = parse_status(&body.status)?;
    let order = state.orders.update_status(&actor, &id, next)?;
    info!(order_id = %order.id, status = order.status.as_str(), by = %actor.user_id, "order status changed");
    Ok(Json(order.into()))
}

#[cfg(test)]
mod tests {
    use crate::routes::catalog::tests::seed_catalog;
    use crate::routes::testkit::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn shipping() -> Value {
        json!({
            "recipient": "Nguyen Lan",
            "phone": "+84 912 345 678",
            "address": "12 Hang Bai, Ha Noi",
            "note": "  ",
        })
    }

    async fn stock_of(app: &TestApp, admin: &str, product_id: &str) -> u64 {
        let (_, p) = app
            .call(
                Method::GET,
                &format!("/api/admin/products/{product_id}"),
                Some(admin),
                None,
            )
            .await;
        p["stock"].as_u64().unwrap()
    }

    async fn place_order(app: &TestApp, token: &str, product_id: &str) -> String {
        app.call(
            Method::POST,
            "/api/cart/items",
            Some(token),
            Some(json!({"product_id": product_id, "quantity": 2})),
        )
        .await;
        let (status, order) = app
            .call(Method::POST, "/api/orders", Some(token), Some(shipping()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn checkout_snapshots_cart_and_takes_stock() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (_, _, product_id, _) = seed_catalog(&app, &admin).await;
        let (token, user_id) = app.register("Lan", "lan@mail.com").await;

        let (status, body) = app
            .call(Method::POST, "/api/orders", Some(&token), Some(shipping()))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "empty_cart");

        app.call(
            Method::POST,
            "/api/cart/items",
            Some(&token),
            Some(json!({"product_id": product_id, "quantity": 2})),
        )
        .await;
        let (status, order) = app
            .call(Method::POST, "/api/orders", Some(&token), Some(shipping()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["user_id"], user_id.as_str());
        assert_eq!(order["status"], "pending");
        assert_eq!(order["payment_method"], "cod");
        assert_eq!(order["subtotal"], 300000);
        assert_eq!(order["shipping_fee"], 30000);
        assert_eq!(order["total"], 330000);
        assert_eq!(order["lines"][0]["unit_price"], 150000);
        assert!(order.get("note").is_none());
        assert!(order["code"].as_str().unwrap().starts_with("ORD"));

        assert_eq!(stock_of(&app, &admin, &product_id).await, 3);
        let (_, cart) = app.call(Method::GET, "/api/cart", Some(&token), None).await;
        assert_eq!(cart["items"], json!([]));

        let code = order["code"].as_str().unwrap();
        let (status, by_code) = app
            .call(Method::GET, &format!("/api/orders/{code}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_code["id"], order["id"]);

        let (_, mine) = app.call(Method::GET, "/api/orders", Some(&token), None).await;
        assert_eq!(mine["total"], 1);
    }

    #[tokio::test]
    async fn customers_cannot_see_or_manage_others_orders() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (_, _, product_id, _) = seed_catalog(&app, &admin).await;
        let (lan, _) = app.register("Lan", "lan@mail.com").await;
        let (mai, _) = app.register("Mai", "mai@mail.com").await;

        app.call(
            Method::POST,
            "/api/cart/items",
            Some(&lan),
            Some(json!({"product_id": product_id})),
        )
        .await;
        let (_, order) = app
            .call(Method::POST, "/api/orders", Some(&lan), Some(shipping()))
            .await;
        let id = order["id"].as_str().unwrap();

        let (status, _) = app
            .call(Method::GET, &format!("/api/orders/{id}"), Some(&mai), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .call(Method::GET, "/api/admin/orders", Some(&mai), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app
            .call(
                Method::PATCH,
                &format!("/api/admin/orders/{id}/status"),
                Some(&lan),
                Some(json!({"status": "confirmed"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn fulfillment_and_cancellation() {
        let app = TestApp::new();
        let admin = app.admin().await;
        let (_, _, product_id, _) = seed_catalog(&app, &admin).await;
        let (token, _) = app.register("Lan", "lan@mail.com").await;


        // Customer cancels a pending order; stock comes back.
        let first = place_order(&app, &token, &product_id).await;
        assert_eq!(stock_of(&app, &admin, &product_id).await, 3);
        let (status, cancelled) = app
            .call(Method::POST, &format!("/api/orders/{first}/cancel"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cancelled["status"], "cancelled");
        assert_eq!(stock_of(&app, &admin, &product_id).await, 5);

        // Admin walks the second order through to delivery.
        let second = place_order(&app, &token, &product_id).await;
        let status_uri = format!("/api/admin/orders/{second}/status");
        for next in ["confirmed", "shipping", "delivered"] {
            let (status, order) = app
                .call(Method::PATCH, &status_uri, Some(&admin), Some(json!({"status": next})))
                .await;
            assert_eq!(status, StatusCode::OK, "{order}");
            assert_eq!(order["status"], next);
        }
        let (status, body) = app
            .call(Method::PATCH, &status_uri, Some(&admin), Some(json!({"status": "pending"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "invalid_transition");
        let (status, _) = app
            .call(Method::POST, &format!("/api/orders/{second}/cancel"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = app
            .call(Method::PATCH, &status_uri, Some(&admin), Some(json!({"status": "lost"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, delivered) = app
            .call(Method::GET, "/api/admin/orders?status=delivered", Some(&admin), None)
            .await;
        assert_eq!(delivered["total"], 1);
    }
}
