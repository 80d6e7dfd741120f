//! Brands, categories (with embedded types and subtypes) and products.
//!
//! Reads are public. Writes require an admin.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use domain::catalog::{BrandPatch, NewBrand, NewProduct, ProductPatch};
use domain::{CoreError, ProductCategory, ProductQuery, ProductSort, Slug};
use serde::Deserialize;
use tracing::info;

use crate::auth::{AdminUser, MaybeUser};
use crate::dto::{BrandOut, CategoryOut, Page, ProductOut};
use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::routes::double_option;
use crate::state::AppState;

fn slug_param(raw: &str) -> ApiResult<Slug> {
    Slug::new(raw).map_err(|_| ApiError::NotFound("no such slug"))
}

// ---- brands ----

#[derive(Deserialize)]
pub struct NewBrandReq {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    logo_url: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateBrandReq {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    logo_url: Option<Option<String>>,
}

pub async fn list_brands(State(state): State<AppState>) -> ApiResult<Json<Vec<BrandOut>>> {
    let brands = state.catalog.list_brands()?;
    Ok(Json(brands.into_iter().map(BrandOut::from).collect()))
}

/// Storefront brand page, addressed by slug.
pub async fn get_brand(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<BrandOut>> {
    let brand = state.catalog.brand_by_slug(&slug_param(&slug)?)?;
    Ok(Json(brand.into()))
}

pub async fn create_brand(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<NewBrandReq>,
) -> ApiResult<(StatusCode, Json<BrandOut>)> {
    let brand = state.catalog.create_brand(NewBrand {
        name: body.name,
        description: body.description,
        logo_url: body.logo_url,
    })?;
    info!(brand_id = %brand.id, slug = %brand.slug, by = %admin.user_id, "brand created");
    Ok((StatusCode::CREATED, Json(brand.into())))
}

pub async fn update_brand(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateBrandReq>,
) -> ApiResult<Json<BrandOut>> {
    let brand = state.catalog.update_brand(
        &id,
        BrandPatch {
            name: body.name,
            description: body.description,
            logo_url: body.logo_url,
        },
    )?;
    Ok(Json(brand.into()))
}

pub async fn delete_brand(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_brand(&id)?;
    info!(brand_id = %id, by = %admin.user_id, "brand deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- categories ----

#[derive(Deserialize)]
pub struct NameReq {
    name: String,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CategoryOut>>> {
    let categories = state.catalog.list_categories()?;
    Ok(Json(categories.into_iter().map(CategoryOut::from).collect()))
}

/// Resolve a category by id, falling back to its slug.
fn find_category(state: &AppState, key: &str) -> ApiResult<ProductCategory> {
    match state.catalog.category(key) {
        Err(CoreError::NotFound) => Ok(state.catalog.category_by_slug(&slug_param(key)?)?),
        other => Ok(other?),
    }
}

pub async fn get_category(
    State(state): State<AppState>,
    ApiPath(key): ApiPath<String>,
) -> ApiResult<Json<CategoryOut>> {
    Ok(Json(find_category(&state, &key)?.into()))
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<NameReq>,
) -> ApiResult<(StatusCode, Json<CategoryOut>)> {
    let category = state.catalog.create_category(&body.name)?;
    info!(category_id = %category.id, by = %admin.user_id, "category created");
    Ok((StatusCode::CREATED, Json(category.into())))
}

pub async fn rename_category(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<NameReq>,
) -> ApiResult<Json<CategoryOut>> {
    Ok(Json(state.catalog.rename_category(&id, &body.name)?.into()))
}

pub async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_category(&id)?;
    info!(category_id = %id, by = %admin.user_id, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_type(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<NameReq>,
) -> ApiResult<(StatusCode, Json<CategoryOut>)> {
    let category = state.catalog.add_type(&id, &body.name)?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

pub async fn remove_type(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath((id, type_slug)): ApiPath<(String, String)>,
) -> ApiResult<Json<CategoryOut>> {
    let category = state.catalog.remove_type(&id, &slug_param(&type_slug)?)?;
    Ok(Json(category.into()))
}

pub async fn add_subtype(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath((id, type_slug)): ApiPath<(String, String)>,
    ApiJson(body): ApiJson<NameReq>,
) -> ApiResult<(StatusCode, Json<CategoryOut>)> {
    let category = state
        .catalog
        .add_subtype(&id, &slug_param(&type_slug)?, &body.name)?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

pub async fn remove_subtype(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath((id, type_slug, subtype_slug)): ApiPath<(String, String, String)>,
) -> ApiResult<Json<CategoryOut>> {
    let category = state.catalog.remove_subtype(
        &id,
        &slug_param(&type_slug)?,
        &slug_param(&subtype_slug)?,
    )?;
    Ok(Json(category.into()))
}

// ---- products ----

/// Product listing filters. `category` and `brand` take slugs; `type` and
/// `subtype` narrow within the category.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    category: Option<String>,
    #[serde(rename = "type")]
    type_slug: Option<String>,
    subtype: Option<String>,
    brand: Option<String>,
    q: Option<String>,
    min_price: Option<u64>,
    max_price: Option<u64>,
    sort: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl ProductListQuery {
    fn resolve(self, state: &AppState, include_inactive: bool) -> ApiResult<ProductQuery> {
        let category_id = match self.category.as_deref() {
            Some(key) => Some(find_category(state, key)?.id),
            None => None,
        };
        let brand_id = match self.brand.as_deref() {
            Some(slug) => Some(state.catalog.brand_by_slug(&slug_param(slug)?)?.id),
            None => None,
        };
        let sort = match self.sort.as_deref() {
            Some(s) => ProductSort::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown sort '{}'", s)))?,
            None => ProductSort::default(),
        };
        let optional_slug = |raw: Option<String>| -> ApiResult<Option<Slug>> {
            raw.map(|s| slug_param(&s)).transpose()
        };
        Ok(ProductQuery {
            category_id,
            type_slug: optional_slug(self.type_slug)?,
            subtype_slug: optional_slug(self.subtype)?,
            brand_id,
            search: self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
            sort,
            include_inactive,
            limit: http_common::clamp_limit(self.limit),
            offset: http_common::clamp_offset(self.offset),
        })
    }
}

pub async fn search_products(
    State(state): State<AppState>,
    MaybeUser(actor): MaybeUser,
    ApiQuery(q): ApiQuery<ProductListQuery>,
) -> ApiResult<Json<Page<ProductOut>>> {
    let include_inactive = actor.is_some_and(|a| a.is_staff());
    let query = q.resolve(&state, include_inactive)?;
    let result = state.catalog.search_products(&query)?;
    Ok(Json(Page::map(result, ProductOut::from)))
}

/// Product page. Inactive products are visible to staff only.
pub async fn get_product(
    State(state): State<AppState>,
    MaybeUser(actor): MaybeUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<ProductOut>> {
    let include_inactive = actor.is_some_and(|a| a.is_staff());
    let product = state
        .catalog
        .product_by_slug(&slug_param(&slug)?, include_inactive)?;
    Ok(Json(product.into()))
}

pub async fn admin_list_products(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiQuery(q): ApiQuery<ProductListQuery>,
) -> ApiResult<Json<Page<ProductOut>>> {
    let query = q.resolve(&state, true)?;
    Ok(Json(Page::map(
        state.catalog.search_products(&query)?,
        ProductOut::from,
    )))
}

pub async fn admin_get_product(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<ProductOut>> {
    Ok(Json(state.catalog.product(&id)?.into()))
}

#[derive(Deserialize)]
pub struct NewProductReq {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    brand_id: Option<String>,
    category_id: String,
    #[serde(default)]
    type_slug: Option<String>,
    #[serde(default)]
    subtype_slug: Option<String>,
    price: u64,
    #[serde(default)]
    sale_price: Option<u64>,
    #[serde(default)]
    stock: u32,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct UpdateProductReq {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    brand_id: Option<Option<String>>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    type_slug: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    subtype_slug: Option<Option<String>>,
    #[serde(default)]
    price: Option<u64>,
    #[serde(default, deserialize_with = "double_option")]
    sale_price: Option<Option<u64>>,
    #[serde(default)]
    stock: Option<u32>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    is_active: Option<bool>,
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(body): ApiJson<NewProductReq>,
) -> ApiResult<(StatusCode, Json<ProductOut>)> {
    let product = state.catalog.create_product(NewProduct {
        name: body.name,
        description: body.description,
        brand_id: body.brand_id,
        category_id: body.category_id,
        type_slug: body.type_slug,
        subtype_slug: body.subtype_slug,
        price: body.price,
        sale_price: body.sale_price,
        stock: body.stock,
        images: body.images,
        tags: body.tags,
        is_active: body.is_active,
    })?;
    info!(product_id = %product.id, slug = %product.slug, by = %admin.user_id, "product created");
    Ok((StatusCode::CREATED, Json(product.into())))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    ApiPath(id): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateProductReq>,
) -> ApiResult<Json<ProductOut>> {
    let product = state.catalog.update_product(
        &id,
        ProductPatch {
            name: body.name,
            description: body.description,
            brand_id: body.brand_id,
            category_id: body.category_id,
            type_slug: body.type_slug,
            subtype_slug: body.subtype_slug,
            price: body.price,
            sale_price: body.sale_price,
            stock: body.stock,
            images: body.images,
            tags: body.tags,
            is_active: body.is_active,
        },
    )?;
    Ok(Json(product.into()))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_product(&id)?;
    info!(product_id = %id, by = %admin.user_id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}
