//! sqlite-adapter: SQLite implementation of the storefront repository ports.
//!
//! Purpose
//! - Provide a file-based store so the API can run locally without a
//!   document database.
//! - Implements every repository trait from the `domain` crate, so a
//!   `SqliteRepo` can be used wherever a `dyn Store` is expected.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as seconds since UNIX_EPOCH.
//! - Embedded collections (category types and subtypes, cart lines, order
//!   lines, wishlist items, chat messages) live in child tables ordered by a
//!   position column. Image URLs and tags are newline-joined text.
//! - A single connection sits behind a mutex, so every method runs alone and
//!   multi-statement writes use a transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{
    Brand, BrandRepository, Cart, CartLine, CartRepository, CategoryRepository, ChatMessage,
    Conversation, ConversationRepository, CoreError, ListResult, Order, OrderLine, OrderQuery,
    OrderRepository, OrderStatus, PaymentMethod, Product, ProductCategory, ProductQuery,
    ProductRepository, ProductSort, ProductSubtype, ProductType, Role, ShippingInfo, Slug, User,
    UserEmail, UserRepository, Wishlist, WishlistRepository,
};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, Statement};

/// SQLite-backed store for local development.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(map_sqerr)?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::with_connection(conn)
    }

    /// A private database that disappears with the process.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(map_sqerr)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    /// Atomically increment the named counter and return the new value.
    fn increment_counter(&self, name: &str) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT OR IGNORE INTO counters(name, value) VALUES(?1, 0)",
            params![name],
        )
        .map_err(map_sqerr)?;
        tx.execute(
            "UPDATE counters SET value = value + 1 WHERE name = ?1",
            params![name],
        )
        .map_err(map_sqerr)?;
        let val: i64 = tx
            .query_row(
                "SELECT value FROM counters WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(val as u64)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            google_sub TEXT UNIQUE,
            avatar_url TEXT,
            role TEXT NOT NULL DEFAULT 'customer',
            refresh_token TEXT,
            is_blocked INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS brands (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            logo_url TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS product_types (
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            UNIQUE (category_id, slug)
        );
        CREATE TABLE IF NOT EXISTS product_subtypes (
            id TEXT PRIMARY KEY,
            type_id TEXT NOT NULL REFERENCES product_types(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            UNIQUE (type_id, slug)
        );
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            brand_id TEXT,
            category_id TEXT NOT NULL,
            type_slug TEXT,
            subtype_slug TEXT,
            price INTEGER NOT NULL,
            sale_price INTEGER,
            effective_price INTEGER NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0,
            sold INTEGER NOT NULL DEFAULT 0,
            images TEXT NOT NULL DEFAULT '',
            custom_tags TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id, type_slug, subtype_slug);
        CREATE INDEX IF NOT EXISTS idx_products_brand ON products(brand_id);
        CREATE TABLE IF NOT EXISTS carts (
            user_id TEXT PRIMARY KEY,
            updated_at INTEGER
        );
        CREATE TABLE IF NOT EXISTS cart_lines (
            user_id TEXT NOT NULL REFERENCES carts(user_id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            PRIMARY KEY (user_id, product_id)
        );
        CREATE TABLE IF NOT EXISTS wishlist_items (
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (user_id, product_id)
        );
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            user_id TEXT NOT NULL,
            recipient TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            status TEXT NOT NULL,
            subtotal INTEGER NOT NULL,
            shipping_fee INTEGER NOT NULL,
            total INTEGER NOT NULL,
            note TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id, created_at);
        CREATE TABLE IF NOT EXISTS order_lines (
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            unit_price INTEGER NOT NULL,
            quantity INTEGER NOT NULL,
            PRIMARY KEY (order_id, position)
        );
        CREATE TABLE IF NOT EXISTS conversations (
            chat_id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS chat_messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            chat_id TEXT NOT NULL REFERENCES conversations(chat_id) ON DELETE CASCADE,
            sender_id TEXT NOT NULL,
            sender_role TEXT NOT NULL,
            text TEXT NOT NULL,
            sent_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_messages_chat ON chat_messages(chat_id, seq);
        "#,
    )
    .map_err(map_sqerr)
}

/// Page bounds as SQLite integers. Anything past `i64::MAX` saturates
/// instead of wrapping to a negative (unbounded) value.
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

/// Unique-constraint failures become `AlreadyExists`.
fn map_write_err(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return CoreError::AlreadyExists;
        }
    }
    map_sqerr(e)
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn slug_col(s: String) -> Result<Slug, CoreError> {
    Slug::new(s).map_err(|e| CoreError::Repository(format!("bad slug in db: {e}")))
}

fn role_col(s: &str) -> Result<Role, CoreError> {
    Role::parse(s).ok_or_else(|| CoreError::Repository(format!("bad role in db: {s}")))
}

fn join_list(items: &[String]) -> String {
    items.join("\n")
}

fn split_list(s: &str) -> Vec<String> {
    s.split('\n')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run a query and map every row, keeping domain errors from the mapper.
fn collect_rows<T, P: Params>(
    stmt: &mut Statement<'_>,
    params: P,
    map: fn(&Row<'_>) -> Result<T, CoreError>,
) -> Result<Vec<T>, CoreError> {
    let mut rows = stmt.query(params).map_err(map_sqerr)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqerr)? {
        out.push(map(row)?);
    }
    Ok(out)
}

fn first_row<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> Result<T, CoreError>,
) -> Result<Option<T>, CoreError> {
    let mut stmt = conn.prepare(sql).map_err(map_sqerr)?;
    Ok(collect_rows(&mut stmt, params, map)?.into_iter().next())
}

// ============ UserRepository ============

const USER_COLS: &str = "id, name, email, password_hash, google_sub, avatar_url, role, refresh_token, is_blocked, created_at, updated_at";

fn row_to_user(row: &Row<'_>) -> Result<User, CoreError> {
    let email: String = row.get(2).map_err(map_sqerr)?;
    let role: String = row.get(6).map_err(map_sqerr)?;
    let created_at: i64 = row.get(9).map_err(map_sqerr)?;
    let updated_at: Option<i64> = row.get(10).map_err(map_sqerr)?;
    let is_blocked: i64 = row.get(8).map_err(map_sqerr)?;
    Ok(User {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        email: UserEmail::new(email)
            .map_err(|_| CoreError::Repository("bad email in db".into()))?,
        password_hash: row.get(3).map_err(map_sqerr)?,
        google_sub: row.get(4).map_err(map_sqerr)?,
        avatar_url: row.get(5).map_err(map_sqerr)?,
        role: role_col(&role)?,
        refresh_token: row.get(7).map_err(map_sqerr)?,
        is_blocked: is_blocked != 0,
        created_at: secs_to_system_time(created_at),
        updated_at: updated_at.map(secs_to_system_time),
    })
}

impl UserRepository for SqliteRepo {
    fn get_user(&self, id: &str) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
    }

    fn get_user_by_email(&self, email: &UserEmail) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            params![email.as_str()],
            row_to_user,
        )
    }

    fn get_user_by_google_sub(&self, sub: &str) -> Result<Option<User>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {USER_COLS} FROM users WHERE google_sub = ?1"),
            params![sub],
            row_to_user,
        )
    }

    fn insert_user(&self, user: User) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO users({USER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                user.id,
                user.name,
                user.email.as_str(),
                user.password_hash,
                user.google_sub,
                user.avatar_url,
                user.role.as_str(),
                user.refresh_token,
                user.is_blocked as i64,
                system_time_to_secs(user.created_at),
                user.updated_at.map(system_time_to_secs),
            ],
        )
        .map_err(map_write_err)?;
        Ok(())
    }

    fn update_user(&self, user: &User) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE users SET name = ?1, email = ?2, password_hash = ?3, google_sub = ?4, avatar_url = ?5, role = ?6, refresh_token = ?7, is_blocked = ?8, updated_at = ?9 WHERE id = ?10",
                params![
                    user.name,
                    user.email.as_str(),
                    user.password_hash,
                    user.google_sub,
                    user.avatar_url,
                    user.role.as_str(),
                    user.refresh_token,
                    user.is_blocked as i64,
                    user.updated_at.map(system_time_to_secs),
                    user.id,
                ],
            )
            .map_err(map_write_err)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list_users(&self, limit: usize, offset: usize) -> Result<ListResult<User>, CoreError> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .map_err(map_sqerr)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLS} FROM users ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
            ))
            .map_err(map_sqerr)?;
        let items = collect_rows(&mut stmt, params![sql_count(limit), sql_count(offset)], row_to_user)?;
        Ok(ListResult::from_page(items, offset, total as usize))
    }
}

// ============ BrandRepository ============

const BRAND_COLS: &str = "id, name, slug, description, logo_url, created_at";

fn row_to_brand(row: &Row<'_>) -> Result<Brand, CoreError> {
    let created_at: i64 = row.get(5).map_err(map_sqerr)?;
    Ok(Brand {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        slug: slug_col(row.get(2).map_err(map_sqerr)?)?,
        description: row.get(3).map_err(map_sqerr)?,
        logo_url: row.get(4).map_err(map_sqerr)?,
        created_at: secs_to_system_time(created_at),
    })
}

impl BrandRepository for SqliteRepo {
    fn get_brand(&self, id: &str) -> Result<Option<Brand>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {BRAND_COLS} FROM brands WHERE id = ?1"),
            params![id],
            row_to_brand,
        )
    }

    fn get_brand_by_slug(&self, slug: &Slug) -> Result<Option<Brand>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {BRAND_COLS} FROM brands WHERE slug = ?1"),
            params![slug.as_str()],
            row_to_brand,
        )
    }

    fn insert_brand(&self, brand: Brand) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO brands({BRAND_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                brand.id,
                brand.name,
                brand.slug.as_str(),
                brand.description,
                brand.logo_url,
                system_time_to_secs(brand.created_at),
            ],
        )
        .map_err(map_write_err)?;
        Ok(())
    }

    fn update_brand(&self, brand: &Brand) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE brands SET name = ?1, slug = ?2, description = ?3, logo_url = ?4 WHERE id = ?5",
                params![
                    brand.name,
                    brand.slug.as_str(),
                    brand.description,
                    brand.logo_url,
                    brand.id,
                ],
            )
            .map_err(map_write_err)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn delete_brand(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM brands WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list_brands(&self) -> Result<Vec<Brand>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {BRAND_COLS} FROM brands ORDER BY name"))
            .map_err(map_sqerr)?;
        collect_rows(&mut stmt, [], row_to_brand)
    }
}

// ============ CategoryRepository ============

fn row_to_subtype(row: &Row<'_>) -> Result<ProductSubtype, CoreError> {
    Ok(ProductSubtype {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        slug: slug_col(row.get(2).map_err(map_sqerr)?)?,
    })
}

fn row_to_type(row: &Row<'_>) -> Result<ProductType, CoreError> {
    Ok(ProductType {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        slug: slug_col(row.get(2).map_err(map_sqerr)?)?,
        subtypes: Vec::new(),
    })
}

fn row_to_category(row: &Row<'_>) -> Result<ProductCategory, CoreError> {
    let created_at: i64 = row.get(3).map_err(map_sqerr)?;
    Ok(ProductCategory {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        slug: slug_col(row.get(2).map_err(map_sqerr)?)?,
        types: Vec::new(),
        created_at: secs_to_system_time(created_at),
    })
}

/// Fill in the embedded types and subtypes of a category row.
fn load_types(conn: &Connection, category: &mut ProductCategory) -> Result<(), CoreError> {
    let mut stmt = conn
        .prepare("SELECT id, name, slug FROM product_types WHERE category_id = ?1 ORDER BY position")
        .map_err(map_sqerr)?;
    let mut types = collect_rows(&mut stmt, params![category.id], row_to_type)?;
    let mut sub_stmt = conn
        .prepare("SELECT id, name, slug FROM product_subtypes WHERE type_id = ?1 ORDER BY position")
        .map_err(map_sqerr)?;
    for t in &mut types {
        t.subtypes = collect_rows(&mut sub_stmt, params![t.id], row_to_subtype)?;
    }
    category.types = types;
    Ok(())
}

fn write_types(conn: &Connection, category: &ProductCategory) -> Result<(), CoreError> {
    conn.execute(
        "DELETE FROM product_types WHERE category_id = ?1",
        params![category.id],
    )
    .map_err(map_sqerr)?;
    for (i, t) in category.types.iter().enumerate() {
        conn.execute(
            "INSERT INTO product_types(id, category_id, position, name, slug) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![t.id, category.id, i as i64, t.name, t.slug.as_str()],
        )
        .map_err(map_write_err)?;
        for (j, s) in t.subtypes.iter().enumerate() {
            conn.execute(
                "INSERT INTO product_subtypes(id, type_id, position, name, slug) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![s.id, t.id, j as i64, s.name, s.slug.as_str()],
            )
            .map_err(map_write_err)?;
        }
    }
    Ok(())
}

fn get_category_where(
    conn: &Connection,
    clause: &str,
    value: &str,
) -> Result<Option<ProductCategory>, CoreError> {
    let sql = format!("SELECT id, name, slug, created_at FROM categories WHERE {clause} = ?1");
    match first_row(conn, &sql, params![value], row_to_category)? {
        Some(mut c) => {
            load_types(conn, &mut c)?;
            Ok(Some(c))
        }
        None => Ok(None),
    }
}

impl CategoryRepository for SqliteRepo {
    fn get_category(&self, id: &str) -> Result<Option<ProductCategory>, CoreError> {
        let conn = self.lock()?;
        get_category_where(&conn, "id", id)
    }

    fn get_category_by_slug(&self, slug: &Slug) -> Result<Option<ProductCategory>, CoreError> {
        let conn = self.lock()?;
        get_category_where(&conn, "slug", slug.as_str())
    }

    fn insert_category(&self, category: ProductCategory) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT INTO categories(id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                category.id,
                category.name,
                category.slug.as_str(),
                system_time_to_secs(category.created_at),
            ],
        )
        .map_err(map_write_err)?;
        write_types(&tx, &category)?;
        tx.commit().map_err(map_sqerr)
    }

    fn update_category(&self, category: &ProductCategory) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let changed = tx
            .execute(
                "UPDATE categories SET name = ?1, slug = ?2 WHERE id = ?3",
                params![category.name, category.slug.as_str(), category.id],
            )
            .map_err(map_write_err)?;
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        write_types(&tx, category)?;
        tx.commit().map_err(map_sqerr)
    }

    fn delete_category(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn list_categories(&self) -> Result<Vec<ProductCategory>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, slug, created_at FROM categories ORDER BY name")
            .map_err(map_sqerr)?;
        let mut cats = collect_rows(&mut stmt, [], row_to_category)?;
        for c in &mut cats {
            load_types(&conn, c)?;
        }
        Ok(cats)
    }
}

// ============ ProductRepository ============

const PRODUCT_COLS: &str = "id, name, slug, description, brand_id, category_id, type_slug, subtype_slug, price, sale_price, stock, sold, images, custom_tags, tags, is_active, created_at, updated_at";

fn row_to_product(row: &Row<'_>) -> Result<Product, CoreError> {
    let type_slug: Option<String> = row.get(6).map_err(map_sqerr)?;
    let subtype_slug: Option<String> = row.get(7).map_err(map_sqerr)?;
    let price: i64 = row.get(8).map_err(map_sqerr)?;
    let sale_price: Option<i64> = row.get(9).map_err(map_sqerr)?;
    let stock: i64 = row.get(10).map_err(map_sqerr)?;
    let sold: i64 = row.get(11).map_err(map_sqerr)?;
    let images: String = row.get(12).map_err(map_sqerr)?;
    let custom_tags: String = row.get(13).map_err(map_sqerr)?;
    let tags: String = row.get(14).map_err(map_sqerr)?;
    let is_active: i64 = row.get(15).map_err(map_sqerr)?;
    let created_at: i64 = row.get(16).map_err(map_sqerr)?;
    let updated_at: Option<i64> = row.get(17).map_err(map_sqerr)?;
    Ok(Product {
        id: row.get(0).map_err(map_sqerr)?,
        name: row.get(1).map_err(map_sqerr)?,
        slug: slug_col(row.get(2).map_err(map_sqerr)?)?,
        description: row.get(3).map_err(map_sqerr)?,
        brand_id: row.get(4).map_err(map_sqerr)?,
        category_id: row.get(5).map_err(map_sqerr)?,
        type_slug: type_slug.map(slug_col).transpose()?,
        subtype_slug: subtype_slug.map(slug_col).transpose()?,
        price: price as u64,
        sale_price: sale_price.map(|p| p as u64),
        stock: stock as u32,
        sold: sold as u32,
        images: split_list(&images),
        custom_tags: split_list(&custom_tags),
        tags: split_list(&tags),
        is_active: is_active != 0,
        created_at: secs_to_system_time(created_at),
        updated_at: updated_at.map(secs_to_system_time),
    })
}

fn sort_clause(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Newest => "created_at DESC, id",
        ProductSort::PriceAsc => "effective_price ASC, id",
        ProductSort::PriceDesc => "effective_price DESC, id",
        ProductSort::BestSelling => "sold DESC, id",
        ProductSort::Name => "name ASC, id",
    }
}

impl ProductRepository for SqliteRepo {
    fn get_product(&self, id: &str) -> Result<Option<Product>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {PRODUCT_COLS} FROM products WHERE id = ?1"),
            params![id],
            row_to_product,
        )
    }

    fn get_product_by_slug(&self, slug: &Slug) -> Result<Option<Product>, CoreError> {
        let conn = self.lock()?;
        first_row(
            &conn,
            &format!("SELECT {PRODUCT_COLS} FROM products WHERE slug = ?1"),
            params![slug.as_str()],
            row_to_product,
        )
    }

    fn insert_product(&self, product: Product) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO products({PRODUCT_COLS}, effective_price) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"),
            params![
                product.id,
                product.name,
                product.slug.as_str(),
                product.description,
                product.brand_id,
                product.category_id,
                product.type_slug.as_ref().map(Slug::as_str),
                product.subtype_slug.as_ref().map(Slug::as_str),
                product.price as i64,
                product.sale_price.map(|p| p as i64),
                product.stock as i64,
                product.sold as i64,
                join_list(&product.images),
                join_list(&product.custom_tags),
                join_list(&product.tags),
                product.is_active as i64,
                system_time_to_secs(product.created_at),
                product.updated_at.map(system_time_to_secs),
                product.effective_price() as i64,
            ],
        )
        .map_err(map_write_err)?;
        Ok(())
    }

    fn update_product(&self, product: &Product) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE products SET name = ?1, slug = ?2, description = ?3, brand_id = ?4, category_id = ?5, type_slug = ?6, subtype_slug = ?7, price = ?8, sale_price = ?9, effective_price = ?10, images = ?11, custom_tags = ?12, tags = ?13, is_active = ?14, updated_at = ?15 WHERE id = ?16",
                params![
                    product.name,
                    product.slug.as_str(),
                    product.description,
                    product.brand_id,
                    product.category_id,
                    product.type_slug.as_ref().map(Slug::as_str),
                    product.subtype_slug.as_ref().map(Slug::as_str),
                    product.price as i64,
                    product.sale_price.map(|p| p as i64),
                    product.effective_price() as i64,
                    join_list(&product.images),
                    join_list(&product.custom_tags),
                    join_list(&product.tags),
                    product.is_active as i64,
                    product.updated_at.map(system_time_to_secs),
                    product.id,
                ],
            )
            .map_err(map_write_err)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn delete_product(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn query_products(&self, query: &ProductQuery) -> Result<ListResult<Product>, CoreError> {
        let conn = self.lock()?;

        // Build WHERE clause dynamically
        let mut conditions = Vec::new();
        let mut params_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !query.include_inactive {
            conditions.push("is_active = 1".to_string());
        }
        if let Some(ref cat) = query.category_id {
            conditions.push(format!("category_id = ?{}", params_values.len() + 1));
            params_values.push(Box::new(cat.clone()));
        }
        if let Some(ref t) = query.type_slug {
            conditions.push(format!("type_slug = ?{}", params_values.len() + 1));
            params_values.push(Box::new(t.as_str().to_string()));
        }
        if let Some(ref s) = query.subtype_slug {
            conditions.push(format!("subtype_slug = ?{}", params_values.len() + 1));
            params_values.push(Box::new(s.as_str().to_string()));
        }
        if let Some(ref b) = query.brand_id {
            conditions.push(format!("brand_id = ?{}", params_values.len() + 1));
            params_values.push(Box::new(b.clone()));
        }
        if let Some(min) = query.min_price {
            conditions.push(format!("effective_price >= ?{}", params_values.len() + 1));
            params_values.push(Box::new(min as i64));
        }
        if let Some(max) = query.max_price {
            conditions.push(format!("effective_price <= ?{}", params_values.len() + 1));
            params_values.push(Box::new(max as i64));
        }
        if let Some(ref q) = query.search {
            let pattern = format!("%{}%", q.to_lowercase());
            let idx = params_values.len() + 1;
            conditions.push(format!(
                "(LOWER(name) LIKE ?{idx} OR LOWER(COALESCE(description, '')) LIKE ?{idx} OR tags LIKE ?{idx})"
            ));
            params_values.push(Box::new(pattern));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Count total
        let count_sql = format!("SELECT COUNT(*) FROM products {}", where_clause);
        let total: i64 = {
            let mut stmt = conn.prepare(&count_sql).map_err(map_sqerr)?;
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_values.iter().map(|b| b.as_ref()).collect();
            stmt.query_row(params_refs.as_slice(), |r| r.get(0))
                .map_err(map_sqerr)?
        };

        // Fetch items
        let select_sql = format!(
            "SELECT {PRODUCT_COLS} FROM products {} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            where_clause,
            sort_clause(query.sort),
            params_values.len() + 1,
            params_values.len() + 2
        );
        params_values.push(Box::new(sql_count(query.limit)));
        params_values.push(Box::new(sql_count(query.offset)));

        let mut stmt = conn.prepare(&select_sql).map_err(map_sqerr)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_values.iter().map(|b| b.as_ref()).collect();
        let items = collect_rows(&mut stmt, params_refs.as_slice(), row_to_product)?;
        Ok(ListResult::from_page(items, query.offset, total as usize))
    }

    fn count_products(&self) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))
            .map_err(map_sqerr)?;
        Ok(n as usize)
    }

    fn count_products_by_brand(&self, brand_id: &str) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE brand_id = ?1",
                params![brand_id],
                |r| r.get(0),
            )
            .map_err(map_sqerr)?;
        Ok(n as usize)
    }

    fn count_products_by_category(
        &self,
        category_id: &str,
        type_slug: Option<&Slug>,
        subtype_slug: Option<&Slug>,
    ) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE category_id = ?1 AND (?2 IS NULL OR type_slug = ?2) AND (?3 IS NULL OR subtype_slug = ?3)",
                params![
                    category_id,
                    type_slug.map(Slug::as_str),
                    subtype_slug.map(Slug::as_str),
                ],
                |r| r.get(0),
            )
            .map_err(map_sqerr)?;
        Ok(n as usize)
    }

    fn adjust_stock(&self, id: &str, delta: i64) -> Result<u32, CoreError> {
        let conn = self.lock()?;
        // Single statement, so the check and the write cannot interleave.
        let changed = conn
            .execute(
                "UPDATE products SET stock = stock + ?2, sold = MAX(0, sold - ?2) WHERE id = ?1 AND stock + ?2 >= 0",
                params![id, delta],
            )
            .map_err(map_sqerr)?;
        let stock: Option<i64> = conn
            .query_row(
                "SELECT stock FROM products WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        match (changed, stock) {
            (_, None) => Err(CoreError::NotFound),
            (0, Some(available)) => Err(CoreError::InsufficientStock {
                product_id: id.to_string(),
                available: available as u32,
                requested: delta.unsigned_abs() as u32,
            }),
            (_, Some(stock)) => Ok(stock as u32),
        }
    }

    fn set_stock(&self, id: &str, stock: u32) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE products SET stock = ?2 WHERE id = ?1",
                params![id, stock as i64],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn low_stock(&self, threshold: u32, limit: usize) -> Result<Vec<Product>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PRODUCT_COLS} FROM products WHERE is_active = 1 AND stock <= ?1 ORDER BY stock ASC, name ASC LIMIT ?2"
            ))
            .map_err(map_sqerr)?;
        collect_rows(
            &mut stmt,
            params![threshold as i64, sql_count(limit)],
            row_to_product,
        )
    }
}

// ============ CartRepository / WishlistRepository ============

fn row_to_cart_line(row: &Row<'_>) -> Result<CartLine, CoreError> {
    let quantity: i64 = row.get(1).map_err(map_sqerr)?;
    Ok(CartLine {
        product_id: row.get(0).map_err(map_sqerr)?,
        quantity: quantity as u32,
    })
}

impl CartRepository for SqliteRepo {
    fn get_cart(&self, user_id: &str) -> Result<Option<Cart>, CoreError> {
        let conn = self.lock()?;
        let head: Option<Option<i64>> = conn
            .query_row(
                "SELECT updated_at FROM carts WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        let Some(updated_at) = head else {
            return Ok(None);
        };
        let mut stmt = conn
            .prepare("SELECT product_id, quantity FROM cart_lines WHERE user_id = ?1 ORDER BY position")
            .map_err(map_sqerr)?;
        let lines = collect_rows(&mut stmt, params![user_id], row_to_cart_line)?;
        Ok(Some(Cart {
            user_id: user_id.to_string(),
            lines,
            updated_at: updated_at.map(secs_to_system_time),
        }))
    }

    fn save_cart(&self, cart: &Cart) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT INTO carts(user_id, updated_at) VALUES (?1, ?2) ON CONFLICT(user_id) DO UPDATE SET updated_at = excluded.updated_at",
            params![cart.user_id, cart.updated_at.map(system_time_to_secs)],
        )
        .map_err(map_sqerr)?;
        tx.execute(
            "DELETE FROM cart_lines WHERE user_id = ?1",
            params![cart.user_id],
        )
        .map_err(map_sqerr)?;
        for (i, line) in cart.lines.iter().enumerate() {
            tx.execute(
                "INSERT INTO cart_lines(user_id, product_id, position, quantity) VALUES (?1, ?2, ?3, ?4)",
                params![cart.user_id, line.product_id, i as i64, line.quantity as i64],
            )
            .map_err(map_write_err)?;
        }
        tx.commit().map_err(map_sqerr)
    }

    fn clear_cart(&self, user_id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM carts WHERE user_id = ?1", params![user_id])
            .map_err(map_sqerr)?;
        Ok(())
    }
}

impl WishlistRepository for SqliteRepo {
    fn get_wishlist(&self, user_id: &str) -> Result<Wishlist, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT product_id FROM wishlist_items WHERE user_id = ?1 ORDER BY position")
            .map_err(map_sqerr)?;
        let product_ids = collect_rows(&mut stmt, params![user_id], |row| {
            row.get(0).map_err(map_sqerr)
        })?;
        Ok(Wishlist {
            user_id: user_id.to_string(),
            product_ids,
        })
    }

    fn add_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO wishlist_items(user_id, product_id, position) VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM wishlist_items WHERE user_id = ?1))",
                params![user_id, product_id],
            )
            .map_err(map_sqerr)?;
        Ok(changed > 0)
    }

    fn remove_wish(&self, user_id: &str, product_id: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "DELETE FROM wishlist_items WHERE user_id = ?1 AND product_id = ?2",
                params![user_id, product_id],
            )
            .map_err(map_sqerr)?;
        Ok(changed > 0)
    }
}

// ============ OrderRepository ============

const ORDER_COLS: &str = "id, code, user_id, recipient, phone, address, payment_method, status, subtotal, shipping_fee, total, note, created_at, updated_at";

fn row_to_order(row: &Row<'_>) -> Result<Order, CoreError> {
    let payment: String = row.get(6).map_err(map_sqerr)?;
    let status: String = row.get(7).map_err(map_sqerr)?;
    let subtotal: i64 = row.get(8).map_err(map_sqerr)?;
    let shipping_fee: i64 = row.get(9).map_err(map_sqerr)?;
    let total: i64 = row.get(10).map_err(map_sqerr)?;
    let created_at: i64 = row.get(12).map_err(map_sqerr)?;
    let updated_at: Option<i64> = row.get(13).map_err(map_sqerr)?;
    Ok(Order {
        id: row.get(0).map_err(map_sqerr)?,
        code: row.get(1).map_err(map_sqerr)?,
        user_id: row.get(2).map_err(map_sqerr)?,
        lines: Vec::new(),
        shipping: ShippingInfo {
            recipient: row.get(3).map_err(map_sqerr)?,
            phone: row.get(4).map_err(map_sqerr)?,
            address: row.get(5).map_err(map_sqerr)?,
        },
        payment_method: PaymentMethod::parse(&payment).ok_or_else(|| {
            CoreError::Repository(format!("bad payment method in db: {payment}"))
        })?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| CoreError::Repository(format!("bad order status in db: {status}")))?,
        subtotal: subtotal as u64,
        shipping_fee: shipping_fee as u64,
        total: total as u64,
        note: row.get(11).map_err(map_sqerr)?,
        created_at: secs_to_system_time(created_at),
        updated_at: updated_at.map(secs_to_system_time),
    })
}

fn row_to_order_line(row: &Row<'_>) -> Result<OrderLine, CoreError> {
    let unit_price: i64 = row.get(2).map_err(map_sqerr)?;
    let quantity: i64 = row.get(3).map_err(map_sqerr)?;
    Ok(OrderLine {
        product_id: row.get(0).map_err(map_sqerr)?,
        product_name: row.get(1).map_err(map_sqerr)?,
        unit_price: unit_price as u64,
        quantity: quantity as u32,
    })
}

fn load_order_lines(conn: &Connection, orders: &mut [Order]) -> Result<(), CoreError> {
    let mut stmt = conn
        .prepare("SELECT product_id, product_name, unit_price, quantity FROM order_lines WHERE order_id = ?1 ORDER BY position")
        .map_err(map_sqerr)?;
    for o in orders {
        o.lines = collect_rows(&mut stmt, params![o.id], row_to_order_line)?;
    }
    Ok(())
}

fn get_order_where(conn: &Connection, clause: &str, value: &str) -> Result<Option<Order>, CoreError> {
    let sql = format!("SELECT {ORDER_COLS} FROM orders WHERE {clause} = ?1");
    let mut found: Vec<Order> = first_row(conn, &sql, params![value], row_to_order)?
        .into_iter()
        .collect();
    load_order_lines(conn, &mut found)?;
    Ok(found.pop())
}

impl OrderRepository for SqliteRepo {
    fn next_order_number(&self) -> Result<u64, CoreError> {
        self.increment_counter("orders")
    }

    fn insert_order(&self, order: Order) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            &format!("INSERT INTO orders({ORDER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
            params![
                order.id,
                order.code,
                order.user_id,
                order.shipping.recipient,
                order.shipping.phone,
                order.shipping.address,
                order.payment_method.as_str(),
                order.status.as_str(),
                order.subtotal as i64,
                order.shipping_fee as i64,
                order.total as i64,
                order.note,
                system_time_to_secs(order.created_at),
                order.updated_at.map(system_time_to_secs),
            ],
        )
        .map_err(map_write_err)?;
        for (i, line) in order.lines.iter().enumerate() {
            tx.execute(
                "INSERT INTO order_lines(order_id, position, product_id, product_name, unit_price, quantity) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    order.id,
                    i as i64,
                    line.product_id,
                    line.product_name,
                    line.unit_price as i64,
                    line.quantity as i64,
                ],
            )
            .map_err(map_write_err)?;
        }
        tx.commit().map_err(map_sqerr)
    }

    fn get_order(&self, id: &str) -> Result<Option<Order>, CoreError> {
        let conn = self.lock()?;
        get_order_where(&conn, "id", id)
    }

    fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, CoreError> {
        let conn = self.lock()?;
        get_order_where(&conn, "code", code)
    }

    fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE orders SET status = ?1, note = ?2, updated_at = ?3 WHERE id = ?4 AND status = ?5",
                params![
                    order.status.as_str(),
                    order.note,
                    order.updated_at.map(system_time_to_secs),
                    order.id,
                    expected.as_str(),
                ],
            )
            .map_err(map_sqerr)?;
        if changed > 0 {
            return Ok(true);
        }
        let exists = conn
            .query_row("SELECT 1 FROM orders WHERE id = ?1", params![order.id], |_| Ok(()))
            .optional()
            .map_err(map_sqerr)?;
        match exists {
            Some(()) => Ok(false),
            None => Err(CoreError::NotFound),
        }
    }

    fn list_orders(&self, query: &OrderQuery) -> Result<ListResult<Order>, CoreError> {
        let conn = self.lock()?;
        let status = query.status.map(|s| s.as_str());
        let filter = "(?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR status = ?2)";
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM orders WHERE {filter}"),
                params![query.user_id, status],
                |r| r.get(0),
            )
            .map_err(map_sqerr)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLS} FROM orders WHERE {filter} ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
            ))
            .map_err(map_sqerr)?;
        let mut items = collect_rows(
            &mut stmt,
            params![
                query.user_id,
                status,
                sql_count(query.limit),
                sql_count(query.offset)
            ],
            row_to_order,
        )?;
        load_order_lines(&conn, &mut items)?;
        Ok(ListResult::from_page(items, query.offset, total as usize))
    }

    fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, usize)>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM orders GROUP BY status")
            .map_err(map_sqerr)?;
        let counted = collect_rows(&mut stmt, [], |row| {
            let status: String = row.get(0).map_err(map_sqerr)?;
            let n: i64 = row.get(1).map_err(map_sqerr)?;
            Ok((status, n as usize))
        })?;
        Ok(OrderStatus::ALL
            .iter()
            .map(|s| {
                let n = counted
                    .iter()
                    .find(|(name, _)| name == s.as_str())
                    .map_or(0, |(_, n)| *n);
                (*s, n)
            })
            .collect())
    }

    fn delivered_revenue(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let sum: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(total), 0) FROM orders WHERE status = ?1",
                params![OrderStatus::Delivered.as_str()],
                |r| r.get(0),
            )
            .map_err(map_sqerr)?;
        Ok(sum as u64)
    }
}

// ============ ConversationRepository ============

fn row_to_message(row: &Row<'_>) -> Result<ChatMessage, CoreError> {
    let role: String = row.get(2).map_err(map_sqerr)?;
    let sent_at: i64 = row.get(4).map_err(map_sqerr)?;
    Ok(ChatMessage {
        id: row.get(0).map_err(map_sqerr)?,
        sender_id: row.get(1).map_err(map_sqerr)?,
        sender_role: role_col(&role)?,
        text: row.get(3).map_err(map_sqerr)?,
        sent_at: secs_to_system_time(sent_at),
    })
}

fn row_to_conversation(row: &Row<'_>) -> Result<Conversation, CoreError> {
    let created_at: i64 = row.get(2).map_err(map_sqerr)?;
    let updated_at: i64 = row.get(3).map_err(map_sqerr)?;
    Ok(Conversation {
        chat_id: row.get(0).map_err(map_sqerr)?,
        customer_id: row.get(1).map_err(map_sqerr)?,
        messages: Vec::new(),
        created_at: secs_to_system_time(created_at),
        updated_at: secs_to_system_time(updated_at),
    })
}

fn load_messages(conn: &Connection, convs: &mut [Conversation]) -> Result<(), CoreError> {
    let mut stmt = conn
        .prepare("SELECT id, sender_id, sender_role, text, sent_at FROM chat_messages WHERE chat_id = ?1 ORDER BY seq")
        .map_err(map_sqerr)?;
    for c in convs {
        c.messages = collect_rows(&mut stmt, params![c.chat_id], row_to_message)?;
    }
    Ok(())
}

fn load_conversation(conn: &Connection, chat_id: &str) -> Result<Option<Conversation>, CoreError> {
    let mut found: Vec<Conversation> = first_row(
        conn,
        "SELECT chat_id, customer_id, created_at, updated_at FROM conversations WHERE chat_id = ?1",
        params![chat_id],
        row_to_conversation,
    )?
    .into_iter()
    .collect();
    load_messages(conn, &mut found)?;
    Ok(found.pop())
}

impl ConversationRepository for SqliteRepo {
    fn get_conversation(&self, chat_id: &str) -> Result<Option<Conversation>, CoreError> {
        let conn = self.lock()?;
        load_conversation(&conn, chat_id)
    }

    fn append_message(
        &self,
        chat_id: &str,
        customer_id: &str,
        message: ChatMessage,
    ) -> Result<Conversation, CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let sent_at = system_time_to_secs(message.sent_at);
        tx.execute(
            "INSERT INTO conversations(chat_id, customer_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3) ON CONFLICT(chat_id) DO UPDATE SET updated_at = excluded.updated_at",
            params![chat_id, customer_id, sent_at],
        )
        .map_err(map_sqerr)?;
        tx.execute(
            "INSERT INTO chat_messages(id, chat_id, sender_id, sender_role, text, sent_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                chat_id,
                message.sender_id,
                message.sender_role.as_str(),
                message.text,
                sent_at,
            ],
        )
        .map_err(map_write_err)?;
        let conv = load_conversation(&tx, chat_id)?
            .ok_or_else(|| CoreError::Repository("conversation vanished".into()))?;
        tx.commit().map_err(map_sqerr)?;
        Ok(conv)
    }

    fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT chat_id, customer_id, created_at, updated_at FROM conversations ORDER BY updated_at DESC, chat_id LIMIT ?1")
            .map_err(map_sqerr)?;
        let mut convs = collect_rows(&mut stmt, params![sql_count(limit)], row_to_conversation)?;
        load_messages(&conn, &mut convs)?;
        Ok(convs)
    }
}
