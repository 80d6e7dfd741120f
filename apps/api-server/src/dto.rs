//! JSON shapes returned by the API.

use domain::cart::CartView;
use domain::{
    Brand, ChatMessage, Conversation, ListResult, Order, Product, ProductCategory, User,
};
use http_common::system_time_to_rfc3339;
use serde::Serialize;

#[derive(Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U>(list: ListResult<U>, f: impl Fn(U) -> T) -> Self {
        Page {
            items: list.items.into_iter().map(f).collect(),
            total: list.total,
            has_more: list.has_more,
        }
    }
}

#[derive(Serialize)]
pub struct UserOut {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub has_password: bool,
    pub google_linked: bool,
    pub is_blocked: bool,
    pub created_at: String,
}

impl From<User> for UserOut {
    fn from(u: User) -> Self {
        UserOut {
            id: u.id,
            name: u.name,
            email: u.email.as_str().to_string(),
            role: u.role.as_str(),
            avatar_url: u.avatar_url,
            has_password: u.password_hash.is_some(),
            google_linked: u.google_sub.is_some(),
            is_blocked: u.is_blocked,
            created_at: system_time_to_rfc3339(u.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct BrandOut {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub created_at: String,
}

impl From<Brand> for BrandOut {
    fn from(b: Brand) -> Self {
        BrandOut {
            id: b.id,
            name: b.name,
            slug: b.slug.to_string(),
            description: b.description,
            logo_url: b.logo_url,
            created_at: system_time_to_rfc3339(b.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct SubtypeOut {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Serialize)]
pub struct TypeOut {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub subtypes: Vec<SubtypeOut>,
}

#[derive(Serialize)]
pub struct CategoryOut {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub types: Vec<TypeOut>,
    pub created_at: String,
}

impl From<ProductCategory> for CategoryOut {
    fn from(c: ProductCategory) -> Self {
        CategoryOut {
            id: c.id,
            name: c.name,
            slug: c.slug.to_string(),
            types: c
                .types
                .into_iter()
                .map(|t| TypeOut {
                    id: t.id,
                    name: t.name,
                    slug: t.slug.to_string(),
                    subtypes: t
                        .subtypes
                        .into_iter()
                        .map(|s| SubtypeOut {
                            id: s.id,
                            name: s.name,
                            slug: s.slug.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            created_at: system_time_to_rfc3339(c.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct ProductOut {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype_slug: Option<String>,
    pub price: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<u64>,
    pub effective_price: u64,
    pub on_sale: bool,
    pub stock: u32,
    pub sold: u32,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<Product> for ProductOut {
    fn from(p: Product) -> Self {
        ProductOut {
            effective_price: p.effective_price(),
            on_sale: p.is_on_sale(),
            id: p.id,
            name: p.name,
            slug: p.slug.to_string(),
            description: p.description,
            brand_id: p.brand_id,
            category_id: p.category_id,
            type_slug: p.type_slug.map(|s| s.to_string()),
            subtype_slug: p.subtype_slug.map(|s| s.to_string()),
            price: p.price,
            sale_price: p.sale_price,
            stock: p.stock,
            sold: p.sold,
            images: p.images,
            tags: p.tags,
            is_active: p.is_active,
            created_at: system_time_to_rfc3339(p.created_at),
            updated_at: p.updated_at.map(system_time_to_rfc3339),
        }
    }
}

#[derive(Serialize)]
pub struct CartItemOut {
    pub product: ProductOut,
    pub quantity: u32,
    pub line_total: u64,
}

#[derive(Serialize)]
pub struct CartOut {
    pub items: Vec<CartItemOut>,
    pub subtotal: u64,
    pub item_count: u32,
}

impl From<CartView> for CartOut {
    fn from(v: CartView) -> Self {
        CartOut {
            items: v
                .items
                .into_iter()
                .map(|i| CartItemOut {
                    product: i.product.into(),
                    quantity: i.quantity,
                    line_total: i.line_total,
                })
                .collect(),
            subtotal: v.subtotal,
            item_count: v.item_count,
        }
    }
}

#[derive(Serialize)]
pub struct OrderLineOut {
    pub product_id: String,
    pub product_name: String,
    pub unit_price: u64,
    pub quantity: u32,
    pub line_total: u64,
}

#[derive(Serialize)]
pub struct ShippingOut {
    pub recipient: String,
    pub phone: String,
    pub address: String,
}

#[derive(Serialize)]
pub struct OrderOut {
    pub id: String,
    pub code: String,
    pub user_id: String,
    pub lines: Vec<OrderLineOut>,
    pub shipping: ShippingOut,
    pub payment_method: &'static str,
    pub status: &'static str,
    pub subtotal: u64,
    pub shipping_fee: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<Order> for OrderOut {
    fn from(o: Order) -> Self {
        OrderOut {
            id: o.id,
            code: o.code,
            user_id: o.user_id,
            lines: o
                .lines
                .into_iter()
                .map(|l| OrderLineOut {
                    line_total: l.line_total(),
                    product_id: l.product_id,
                    product_name: l.product_name,
                    unit_price: l.unit_price,
                    quantity: l.quantity,
                })
                .collect(),
            shipping: ShippingOut {
                recipient: o.shipping.recipient,
                phone: o.shipping.phone,
                address: o.shipping.address,
            },
            payment_method: o.payment_method.as_str(),
            status: o.status.as_str(),
            subtotal: o.subtotal,
            shipping_fee: o.shipping_fee,
            total: o.total,
            note: o.note,
            created_at: system_time_to_rfc3339(o.created_at),
            updated_at: o.updated_at.map(system_time_to_rfc3339),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct MessageOut {
    pub id: String,
    pub sender_id: String,
    pub sender_role: &'static str,
    pub text: String,
    pub sent_at: String,
}

impl From<ChatMessage> for MessageOut {
    fn from(m: ChatMessage) -> Self {
        MessageOut {
            id: m.id,
            sender_id: m.sender_id,
            sender_role: m.sender_role.as_str(),
            text: m.text,
            sent_at: system_time_to_rfc3339(m.sent_at),
        }
    }
}

#[derive(Serialize)]
pub struct ConversationOut {
    pub chat_id: String,
    pub customer_id: String,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageOut>,
    pub updated_at: String,
}

impl From<Conversation> for ConversationOut {
    fn from(c: Conversation) -> Self {
        ConversationOut {
            message_count: c.messages.len(),
            last_message: c.last_message().cloned().map(MessageOut::from),
            chat_id: c.chat_id,
            customer_id: c.customer_id,
            updated_at: system_time_to_rfc3339(c.updated_at),
        }
    }
}
