//! The caller's cart and wishlist.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::dto::{CartOut, ProductOut};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemReq {
    product_id: String,
    #[serde(default = "one")]
    quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
pub struct SetQuantityReq {
    quantity: u32,
}

pub async fn view(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<CartOut>> {
    Ok(Json(state.carts.view(&actor.user_id)?.into()))
}

pub async fn add_item(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<AddItemReq>,
) -> ApiResult<Json<CartOut>> {
    let cart = state
        .carts
        .add_item(&actor.user_id, &body.product_id, body.quantity)?;
    Ok(Json(cart.into()))
}

/// Set a line's quantity; `0` removes the line.
pub async fn set_quantity(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(product_id): ApiPath<String>,
    ApiJson(body): ApiJson<SetQuantityReq>,
) -> ApiResult<Json<CartOut>> {
    let cart = state
        .carts
        .set_quantity(&actor.user_id, &product_id, body.quantity)?;
    Ok(Json(cart.into()))
}

pub async fn remove_item(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(product_id): ApiPath<String>,
) -> ApiResult<Json<CartOut>> {
    Ok(Json(
        state.carts.remove_item(&actor.user_id, &product_id)?.into(),
    ))
}

pub async fn clear(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<StatusCode> {
    state.carts.clear(&actor.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct WishStateOut {
    product_id: String,
    wishlisted: bool,
}

pub async fn wishlist(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<Vec<ProductOut>>> {
    let products = state.wishlists.view(&actor.user_id)?;
    Ok(Json(products.into_iter().map(ProductOut::from).collect()))
}

pub async fn wish(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(product_id): ApiPath<String>,
) -> ApiResult<Json<WishStateOut>> {
    state.wishlists.add(&actor.user_id, &product_id)?;
    Ok(Json(WishStateOut {
        product_id,
        wishlisted: true,
    }))
}

pub async fn unwish(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(product_id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    if !state.wishlists.remove(&actor.user_id, &product_id)? {
        return Err(ApiError::NotFound("product is not wishlisted"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_wish(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(product_id): ApiPath<String>,
) -> ApiResult<Json<WishStateOut>> {
    let wishlisted = state.wishlists.toggle(&actor.user_id, &product_id)?;
    Ok(Json(WishStateOut {
        product_id,
        wishlisted,
    }))
}
