//! Catalog management: brands, categories with embedded types/subtypes, and
//! products.

use crate::service::ServiceContext;
use crate::slug::{derive_tags, slugify, unique_slug, TagSources};
use crate::validate::{validate_media_url, validate_name, validate_pricing};
use crate::{
    Brand, BrandRepository, CategoryRepository, CoreError, ListResult, Product, ProductCategory,
    ProductQuery, ProductRepository, ProductSubtype, ProductType, Slug,
};

#[derive(Clone, Debug, Default)]
pub struct NewBrand {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
}

/// Partial brand update; `Some(None)` clears an optional field.
#[derive(Clone, Debug, Default)]
pub struct BrandPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub logo_url: Option<Option<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub brand_id: Option<String>,
    pub category_id: String,
    pub type_slug: Option<String>,
    pub subtype_slug: Option<String>,
    pub price: u64,
    pub sale_price: Option<u64>,
    pub stock: u32,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
}

/// Partial product update; `Some(None)` clears an optional field.
#[derive(Clone, Debug, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub brand_id: Option<Option<String>>,
    pub category_id: Option<String>,
    pub type_slug: Option<Option<String>>,
    pub subtype_slug: Option<Option<String>>,
    pub price: Option<u64>,
    pub sale_price: Option<Option<u64>>,
    pub stock: Option<u32>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Catalog operations. Reads are public; writes are expected to be gated to
/// admins by the caller.
pub struct CatalogService<R: ?Sized> {
    ctx: ServiceContext<R>,
}

impl<R> CatalogService<R>
where
    R: BrandRepository + CategoryRepository + ProductRepository + ?Sized,
{
    pub fn new(ctx: ServiceContext<R>) -> Self {
        Self { ctx }
    }

    // ---- brands ----

    pub fn create_brand(&self, input: NewBrand) -> Result<Brand, CoreError> {
        let name = validate_name("brand name", &input.name)?;
        if let Some(url) = &input.logo_url {
            validate_media_url(url)?;
        }
        let repo = &self.ctx.repo;
        let slug = unique_slug(&name, |s| Ok(repo.get_brand_by_slug(s)?.is_some()))?;
        let brand = Brand {
            id: self.ctx.next_id(),
            name,
            slug,
            description: input.description,
            logo_url: input.logo_url,
            created_at: self.ctx.now(),
        };
        repo.insert_brand(brand.clone())?;
        Ok(brand)
    }

    pub fn update_brand(&self, id: &str, patch: BrandPatch) -> Result<Brand, CoreError> {
        let repo = &self.ctx.repo;
        let mut brand = repo.get_brand(id)?.ok_or(CoreError::NotFound)?;
        if let Some(name) = patch.name {
            let name = validate_name("brand name", &name)?;
            if name != brand.name {
                brand.slug = unique_slug(&name, |s| {
                    Ok(repo.get_brand_by_slug(s)?.is_some_and(|b| b.id != brand.id))
                })?;
                brand.name = name;
            }
        }
        if let Some(description) = patch.description {
            brand.description = description;
        }
        if let Some(logo_url) = patch.logo_url {
            if let Some(url) = &logo_url {
                validate_media_url(url)?;
            }
            brand.logo_url = logo_url;
        }
        let renamed = repo.get_brand(id)?.is_some_and(|b| b.name != brand.name);
        repo.update_brand(&brand)?;
        if renamed {
            self.retag(ProductQuery {
                brand_id: Some(brand.id.clone()),
                ..Default::default()
            })?;
        }
        Ok(brand)
    }

    /// Delete a brand no product references.
    pub fn delete_brand(&self, id: &str) -> Result<(), CoreError> {
        let in_use = self.ctx.repo.count_products_by_brand(id)?;
        if in_use > 0 {
            return Err(CoreError::Conflict(format!(
                "brand is used by {} product(s)",
                in_use
            )));
        }
        self.ctx.repo.delete_brand(id)
    }

    pub fn list_brands(&self) -> Result<Vec<Brand>, CoreError> {
        self.ctx.repo.list_brands()
    }

    pub fn brand_by_slug(&self, slug: &Slug) -> Result<Brand, CoreError> {
        self.ctx
            .repo
            .get_brand_by_slug(slug)?
            .ok_or(CoreError::NotFound)
    }

    // ---- categories ----

    pub fn create_category(&self, name: &str) -> Result<ProductCategory, CoreError> {
        let name = validate_name("category name", name)?;
        let repo = &self.ctx.repo;
        let slug = unique_slug(&name, |s| Ok(repo.get_category_by_slug(s)?.is_some()))?;
        let category = ProductCategory {
            id: self.ctx.next_id(),
            name,
            slug,
            types: Vec::new(),
            created_at: self.ctx.now(),
        };
        repo.insert_category(category.clone())?;
        Ok(category)
    }

    pub fn rename_category(&self, id: &str, name: &str) -> Result<ProductCategory, CoreError> {
        let name = validate_name("category name", name)?;
        let repo = &self.ctx.repo;
        let mut category = self.category(id)?;
        if name != category.name {
            category.slug = unique_slug(&name, |s| {
                Ok(repo
                    .get_category_by_slug(s)?
                    .is_some_and(|c| c.id != category.id))
            })?;
            category.name = name;
            repo.update_category(&category)?;
            self.retag(ProductQuery {
                category_id: Some(category.id.clone()),
                ..Default::default()
            })?;
        }
        Ok(category)
    }

    pub fn delete_category(&self, id: &str) -> Result<(), CoreError> {
        let in_use = self.ctx.repo.count_products_by_category(id, None, None)?;
        if in_use > 0 {
            return Err(CoreError::Conflict(format!(
                "category is used by {} product(s)",
                in_use
            )));
        }
        self.ctx.repo.delete_category(id)
    }

    pub fn list_categories(&self) -> Result<Vec<ProductCategory>, CoreError> {
        self.ctx.repo.list_categories()
    }

    pub fn category(&self, id: &str) -> Result<ProductCategory, CoreError> {
        self.ctx.repo.get_category(id)?.ok_or(CoreError::NotFound)
    }

    pub fn category_by_slug(&self, slug: &Slug) -> Result<ProductCategory, CoreError> {
        self.ctx
            .repo
            .get_category_by_slug(slug)?
            .ok_or(CoreError::NotFound)
    }

    /// Add a type to a category. Type slugs are unique within the category.
    pub fn add_type(&self, category_id: &str, name: &str) -> Result<ProductCategory, CoreError> {
        let name = validate_name("type name", name)?;
        let mut category = self.category(category_id)?;
        let slug = unique_slug(&name, |s| Ok(category.product_type(s).is_some()))?;
        category.types.push(ProductType {
            id: self.ctx.next_id(),
            name,
            slug,
            subtypes: Vec::new(),
        });
        self.ctx.repo.update_category(&category)?;
        Ok(category)
    }

    pub fn remove_type(
        &self,
        category_id: &str,
        type_slug: &Slug,
    ) -> Result<ProductCategory, CoreError> {
        let mut category = self.category(category_id)?;
        if category.product_type(type_slug).is_none() {
            return Err(CoreError::NotFound);
        }
        let in_use = self
            .ctx
            .repo
            .count_products_by_category(category_id, Some(type_slug), None)?;
        if in_use > 0 {
            return Err(CoreError::Conflict(format!(
                "type is used by {} product(s)",
                in_use
            )));
        }
        category.types.retain(|t| &t.slug != type_slug);
        self.ctx.repo.update_category(&category)?;
        Ok(category)
    }

    /// Add a subtype under a type. Subtype slugs are unique within the type.
    pub fn add_subtype(
        &self,
        category_id: &str,
        type_slug: &Slug,
        name: &str,
    ) -> Result<ProductCategory, CoreError> {
        let name = validate_name("subtype name", name)?;
        let id = self.ctx.next_id();
        let mut category = self.category(category_id)?;
        let product_type = category
            .product_type_mut(type_slug)
            .ok_or(CoreError::NotFound)?;
        let slug = unique_slug(&name, |s| Ok(product_type.subtype(s).is_some()))?;
        product_type.subtypes.push(ProductSubtype { id, name, slug });
        self.ctx.repo.update_category(&category)?;
        Ok(category)
    }

    pub fn remove_subtype(
        &self,
        category_id: &str,
        type_slug: &Slug,
        subtype_slug: &Slug,
    ) -> Result<ProductCategory, CoreError> {
        let mut category = self.category(category_id)?;
        let product_type = category
            .product_type_mut(type_slug)
            .ok_or(CoreError::NotFound)?;
        if product_type.subtype(subtype_slug).is_none() {
            return Err(CoreError::NotFound);
        }
        let in_use = self.ctx.repo.count_products_by_category(
            category_id,
            Some(type_slug),
            Some(subtype_slug),
        )?;
        if in_use > 0 {
            return Err(CoreError::Conflict(format!(
                "subtype is used by {} product(s)",
                in_use
            )));
        }
        product_type.subtypes.retain(|s| &s.slug != subtype_slug);
        self.ctx.repo.update_category(&category)?;
        Ok(category)
    }

    // ---- products ----

    pub fn create_product(&self, input: NewProduct) -> Result<Product, CoreError> {
        let name = validate_name("product name", &input.name)?;
        validate_pricing(input.price, input.sale_price)?;
        for url in &input.images {
            validate_media_url(url)?;
        }
        let repo = &self.ctx.repo;
        let slug = unique_slug(&name, |s| Ok(repo.get_product_by_slug(s)?.is_some()))?;

        let mut product = Product {
            id: self.ctx.next_id(),
            name,
            slug,
            description: input.description,
            brand_id: input.brand_id,
            category_id: input.category_id,
            type_slug: parse_optional_slug(input.type_slug.as_deref())?,
            subtype_slug: parse_optional_slug(input.subtype_slug.as_deref())?,
            price: input.price,
            sale_price: input.sale_price,
            stock: input.stock,
            sold: 0,
            images: input.images,
            custom_tags: input.tags,
            tags: Vec::new(),
            is_active: input.is_active,
            created_at: self.ctx.now(),
            updated_at: None,
        };
        self.classify(&mut product)?;
        repo.insert_product(product.clone())?;
        Ok(product)
    }

    pub fn update_product(&self, id: &str, patch: ProductPatch) -> Result<Product, CoreError> {
        let repo = &self.ctx.repo;
        let mut product = repo.get_product(id)?.ok_or(CoreError::NotFound)?;

        if let Some(name) = patch.name {
            let name = validate_name("product name", &name)?;
            if name != product.name {
                product.slug = unique_slug(&name, |s| {
                    Ok(repo
                        .get_product_by_slug(s)?
                        .is_some_and(|p| p.id != product.id))
                })?;
                product.name = name;
            }
        }
        if let Some(description) = patch.description {
            product.description = description;
        }
        if let Some(brand_id) = patch.brand_id {
            product.brand_id = brand_id;
        }
        if let Some(category_id) = patch.category_id {
            if category_id != product.category_id {
                // Types belong to a category; moving clears them unless re-specified
                product.type_slug = None;
                product.subtype_slug = None;
            }
            product.category_id = category_id;
        }
        if let Some(type_slug) = patch.type_slug {
            product.type_slug = parse_optional_slug(type_slug.as_deref())?;
            if product.type_slug.is_none() {
                product.subtype_slug = None;
            }
        }
        if let Some(subtype_slug) = patch.subtype_slug {
            product.subtype_slug = parse_optional_slug(subtype_slug.as_deref())?;
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(sale_price) = patch.sale_price {
            product.sale_price = sale_price;
        }
        validate_pricing(product.price, product.sale_price)?;
        if let Some(images) = patch.images {
            for url in &images {
                validate_media_url(url)?;
            }
            product.images = images;
        }
        if let Some(tags) = patch.tags {
            product.custom_tags = tags;
        }
        if let Some(is_active) = patch.is_active {
            product.is_active = is_active;
        }

        self.classify(&mut product)?;
        product.updated_at = Some(self.ctx.now());
        repo.update_product(&product)?;
        if let Some(stock) = patch.stock {
            repo.set_stock(&product.id, stock)?;
        }
        // Stock may have moved since the read above.
        repo.get_product(&product.id)?.ok_or(CoreError::NotFound)
    }

    pub fn delete_product(&self, id: &str) -> Result<(), CoreError> {
        self.ctx.repo.delete_product(id)
    }

    pub fn product(&self, id: &str) -> Result<Product, CoreError> {
        self.ctx.repo.get_product(id)?.ok_or(CoreError::NotFound)
    }

    /// Look up a product page; inactive products are only visible to staff.
    pub fn product_by_slug(&self, slug: &Slug, include_inactive: bool) -> Result<Product, CoreError> {
        match self.ctx.repo.get_product_by_slug(slug)? {
            Some(p) if p.is_active || include_inactive => Ok(p),
            _ => Err(CoreError::NotFound),
        }
    }

    pub fn search_products(&self, query: &ProductQuery) -> Result<ListResult<Product>, CoreError> {
        self.ctx.repo.query_products(query)
    }

    /// Check brand/category/type/subtype references and rebuild derived tags.
    /// Re-derive tags of every product matching `filter`, inactive ones
    /// included. Runs after a brand or category is renamed.
    fn retag(&self, filter: ProductQuery) -> Result<(), CoreError> {
        const BATCH: usize = 100;
        let repo = &self.ctx.repo;
        let mut products = Vec::new();
        loop {
            let page = repo.query_products(&ProductQuery {
                include_inactive: true,
                limit: BATCH,
                offset: products.len(),
                ..filter.clone()
            })?;
            let more = page.has_more && !page.items.is_empty();
            products.extend(page.items);
            if !more {
                break;
            }
        }

        for mut product in products {
            let before = product.tags.clone();
            self.classify(&mut product)?;
            if product.tags != before {
                repo.update_product(&product)?;
            }
        }
        Ok(())
    }

    fn classify(&self, product: &mut Product) -> Result<(), CoreError> {
        let repo = &self.ctx.repo;
        let category = repo
            .get_category(&product.category_id)?
            .ok_or_else(|| CoreError::InvalidInput("unknown category".into()))?;

        let product_type = match &product.type_slug {
            Some(slug) => Some(category.product_type(slug).ok_or_else(|| {
                CoreError::InvalidInput(format!("category has no type '{}'", slug))
            })?),
            None => None,
        };
        let subtype = match (&product.subtype_slug, product_type) {
            (Some(slug), Some(t)) => Some(t.subtype(slug).ok_or_else(|| {
                CoreError::InvalidInput(format!("type has no subtype '{}'", slug))
            })?),
            (Some(_), None) => {
                return Err(CoreError::InvalidInput(
                    "subtype requires a type".into(),
                ))
            }
            (None, _) => None,
        };
        let brand = match &product.brand_id {
            Some(id) => Some(
                repo.get_brand(id)?
                    .ok_or_else(|| CoreError::InvalidInput("unknown brand".into()))?,
            ),
            None => None,
        };

        product.tags = derive_tags(&TagSources {
            product_name: &product.name,
            brand_name: brand.as_ref().map(|b| b.name.as_str()),
            category_name: Some(category.name.as_str()),
            type_name: product_type.map(|t| t.name.as_str()),
            subtype_name: subtype.map(|s| s.name.as_str()),
            extra: &product.custom_tags,
        });
        Ok(())
    }
}

/// Accept either a ready slug or a display name for type/subtype references.
fn parse_optional_slug(raw: Option<&str>) -> Result<Option<Slug>, CoreError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Slug::new(s).or_else(|_| slugify(s)).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryStore;
    use crate::service::fixtures;

    fn service() -> CatalogService<InMemoryStore> {
        CatalogService::new(fixtures::context())
    }

    /// Category "Makeup" > type "Lips" > subtype "Matte", plus brand "Maybelline".
    fn seed(svc: &CatalogService<InMemoryStore>) -> (ProductCategory, Brand) {
        let cat = svc.create_category("Makeup").unwrap();
        svc.add_type(&cat.id, "Lips").unwrap();
        let lips = Slug::new("lips").unwrap();
        let cat = svc.add_subtype(&cat.id, &lips, "Matte").unwrap();
        let brand = svc
            .create_brand(NewBrand {
                name: "Maybelline".into(),
                ..Default::default()
            })
            .unwrap();
        (cat, brand)
    }

    fn lipstick(cat: &ProductCategory, brand: &Brand) -> NewProduct {
        NewProduct {
            name: "Super Stay Matte Ink".into(),
            brand_id: Some(brand.id.clone()),
            category_id: cat.id.clone(),
            type_slug: Some("lips".into()),
            subtype_slug: Some("matte".into()),
            price: 250_000,
            sale_price: Some(199_000),
            stock: 10,
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn create_product_derives_slug_and_tags() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let p = svc.create_product(lipstick(&cat, &brand)).unwrap();
        assert_eq!(p.slug.as_str(), "super-stay-matte-ink");
        assert_eq!(
            p.tags,
            vec!["maybelline", "makeup", "lips", "matte", "super", "stay", "ink"]
        );

        let again = svc.create_product(lipstick(&cat, &brand)).unwrap();
        assert_eq!(again.slug.as_str(), "super-stay-matte-ink-2");
    }

    #[test]
    fn create_product_rejects_unknown_references() {
        let svc = service();
        let (cat, brand) = seed(&svc);

        let mut bad_type = lipstick(&cat, &brand);
        bad_type.type_slug = Some("eyes".into());
        assert!(matches!(
            svc.create_product(bad_type),
            Err(CoreError::InvalidInput(_))
        ));

        let mut orphan_subtype = lipstick(&cat, &brand);
        orphan_subtype.type_slug = None;
        assert!(matches!(
            svc.create_product(orphan_subtype),
            Err(CoreError::InvalidInput(_))
        ));

        let mut bad_brand = lipstick(&cat, &brand);
        bad_brand.brand_id = Some("nope".into());
        assert!(matches!(
            svc.create_product(bad_brand),
            Err(CoreError::InvalidInput(_))
        ));

        let mut bad_price = lipstick(&cat, &brand);
        bad_price.sale_price = Some(300_000);
        assert!(matches!(
            svc.create_product(bad_price),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn update_product_reslugs_and_rebuilds_tags() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let p = svc.create_product(lipstick(&cat, &brand)).unwrap();
        let updated = svc
            .update_product(
                &p.id,
                ProductPatch {
                    name: Some("Vinyl Ink".into()),
                    subtype_slug: Some(None),
                    tags: Some(vec!["Bán chạy".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.slug.as_str(), "vinyl-ink");
        assert_eq!(updated.subtype_slug, None);
        assert_eq!(
            updated.tags,
            vec!["maybelline", "makeup", "lips", "vinyl", "ink", "ban-chay"]
        );
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn update_product_sets_stock_without_touching_sold() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let p = svc.create_product(lipstick(&cat, &brand)).unwrap();
        svc.ctx.repo.adjust_stock(&p.id, -2).unwrap();

        let renamed = svc
            .update_product(
                &p.id,
                ProductPatch {
                    name: Some("Vinyl Ink".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!((renamed.stock, renamed.sold), (p.stock - 2, 2));

        let restocked = svc
            .update_product(
                &p.id,
                ProductPatch {
                    stock: Some(40),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!((restocked.stock, restocked.sold), (40, 2));
    }

    #[test]
    fn renaming_brand_or_category_retags_products() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let p = svc.create_product(lipstick(&cat, &brand)).unwrap();
        let mut hidden = lipstick(&cat, &brand);
        hidden.name = "Lifter Gloss".into();
        hidden.is_active = false;
        let hidden = svc.create_product(hidden).unwrap();

        svc.update_brand(
            &brand.id,
            BrandPatch {
                name: Some("Loreal Paris".into()),
                ..Default::default()
            },
        )
        .unwrap();
        svc.rename_category(&cat.id, "Trang điểm").unwrap();

        for id in [&p.id, &hidden.id] {
            let tags = svc.ctx.repo.get_product(id).unwrap().unwrap().tags;
            assert!(tags.contains(&"loreal-paris".to_string()), "{tags:?}");
            assert!(tags.contains(&"trang-diem".to_string()), "{tags:?}");
            assert!(!tags.contains(&"maybelline".to_string()));
            assert!(!tags.contains(&"makeup".to_string()));
        }
        let p = svc.ctx.repo.get_product(&p.id).unwrap().unwrap();
        assert_eq!(p.stock, 10);
    }

    #[test]
    fn inactive_products_hidden_from_public_lookup() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let mut input = lipstick(&cat, &brand);
        input.is_active = false;
        let p = svc.create_product(input).unwrap();
        assert!(matches!(
            svc.product_by_slug(&p.slug, false),
            Err(CoreError::NotFound)
        ));
        assert!(svc.product_by_slug(&p.slug, true).is_ok());
    }

    #[test]
    fn referenced_taxonomy_cannot_be_removed() {
        let svc = service();
        let (cat, brand) = seed(&svc);
        let p = svc.create_product(lipstick(&cat, &brand)).unwrap();
        let lips = Slug::new("lips").unwrap();
        let matte = Slug::new("matte").unwrap();

        assert!(matches!(svc.delete_brand(&brand.id), Err(CoreError::Conflict(_))));
        assert!(matches!(svc.delete_category(&cat.id), Err(CoreError::Conflict(_))));
        assert!(matches!(
            svc.remove_subtype(&cat.id, &lips, &matte),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(svc.remove_type(&cat.id, &lips), Err(CoreError::Conflict(_))));

        svc.delete_product(&p.id).unwrap();
        let cat = svc.remove_subtype(&cat.id, &lips, &matte).unwrap();
        assert!(cat.types[0].subtypes.is_empty());
        let cat = svc.remove_type(&cat.id, &lips).unwrap();
        assert!(cat.types.is_empty());
        svc.delete_category(&cat.id).unwrap();
        svc.delete_brand(&brand.id).unwrap();
    }

    #[test]
    fn type_slugs_unique_within_category() {
        let svc = service();
        let cat = svc.create_category("Skincare").unwrap();
        svc.add_type(&cat.id, "Serum").unwrap();
        let cat = svc.add_type(&cat.id, "Serum").unwrap();
        let slugs: Vec<&str> = cat.types.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["serum", "serum-2"]);

        // A different category may reuse the slug
        let other = svc.create_category("Body").unwrap();
        let other = svc.add_type(&other.id, "Serum").unwrap();
        assert_eq!(other.types[0].slug.as_str(), "serum");
    }

    #[test]
    fn rename_brand_updates_slug() {
        let svc = service();
        let (_, brand) = seed(&svc);
        let b = svc
            .update_brand(
                &brand.id,
                BrandPatch {
                    name: Some("L'Oréal Paris".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(b.slug.as_str(), "l-oreal-paris");
        assert_eq!(svc.brand_by_slug(&b.slug).unwrap().id, brand.id);
    }
}
