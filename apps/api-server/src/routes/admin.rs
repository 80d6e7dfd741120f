//! Admin dashboard and user management.

use axum::extract::State;
use axum::Json;
use domain::Role;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AdminUser;
use crate::dto::{Page, ProductOut, UserOut};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::PageQuery;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DashboardOut {
    product_count: usize,
    user_count: usize,
    order_count: usize,
    orders_by_status: serde_json::Map<String, serde_json::Value>,
    revenue: u64,
    low_stock: Vec<ProductOut>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Json<DashboardOut>> {
    let summary = state.dashboard.summary(&admin)?;
    Ok(Json(DashboardOut {
        product_count: summary.product_count,
        user_count: summary.user_count,
        order_count: summary.order_count,
        orders_by_status: summary
            .orders_by_status
            .into_iter()
            .map(|(status, n)| (status.as_str().to_string(), n.into()))
            .collect(),
        revenue: summary.revenue,
        low_stock: summary.low_stock.into_iter().map(ProductOut::from).collect(),
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> ApiResult<Json<Page<UserOut>>> {
    let result = state
        .accounts
        .list_users(&admin, page.limit(), page.offset())?;
    Ok(Json(Page::map(result, UserOut::from)))
}

#[derive(Deserialize)]
pub struct UpdateUserReq {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    is_blocked: Option<bool>,
}

/// Change a user's role and/or block state.
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateUserReq>,
) -> ApiResult<Json<UserOut>> {
    if body.role.is_none() && body.is_blocked.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }
    let mut user = state.accounts.get(&id)?;
    if let Some(raw) = body.role.as_deref() {
        let role =
            Role::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("unknown role '{}'", raw)))?;
        user = state.accounts.set_role(&admin, &id, role)?;
        info!(user_id = %id, role = role.as_str(), by = %admin.user_id, "role changed");
    }
    if let Some(blocked) = body.is_blocked {
        user = state.accounts.set_blocked(&admin, &id, blocked)?;
        info!(user_id = %id, blocked, by = %admin.user_id, "block state changed");
    }
    Ok(Json(user.into()))
}
