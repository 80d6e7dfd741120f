//! Slug generation and tag derivation for catalog documents.

use crate::{CoreError, Slug};

/// Upper bound on `-2`, `-3`, ... suffixes tried before giving up.
const MAX_SLUG_ATTEMPTS: usize = 100;

/// Combining diacritical marks, as found in decomposed (NFD) input.
const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{300}'..='\u{36f}';

/// Fold a Latin letter with diacritics (Vietnamese included) to its ASCII base.
fn fold_char(c: char) -> Option<char> {
    let folded = match c {
        'a'..='z' | '0'..='9' => c,
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ'
        | 'ẩ' | 'ẫ' | 'ậ' | 'ä' | 'å' => 'a',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' | 'ë' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ'
        | 'ở' | 'ỡ' | 'ợ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' | 'û' | 'ü' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' | 'ÿ' => 'y',
        'đ' => 'd',
        'ç' => 'c',
        'ñ' => 'n',
        _ => return None,
    };
    Some(folded)
}

/// Derive a URL-safe slug from a display name.
///
/// "Son Kem Lì Màu Đỏ" becomes "son-kem-li-mau-do".
pub fn slugify(name: &str) -> Result<Slug, CoreError> {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if COMBINING_MARKS.contains(&c) {
            continue;
        }
        match fold_char(c) {
            Some(f) => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push(f);
            }
            None => pending_dash = true,
        }
    }
    if out.is_empty() {
        return Err(CoreError::InvalidSlug(format!(
            "name '{}' has no usable characters",
            name
        )));
    }
    Slug::new(out)
}

/// Slugify `name` and append the first free numeric suffix.
///
/// `taken` reports whether a candidate is already used by another document.
pub fn unique_slug<F>(name: &str, mut taken: F) -> Result<Slug, CoreError>
where
    F: FnMut(&Slug) -> Result<bool, CoreError>,
{
    let base = slugify(name)?;
    if !taken(&base)? {
        return Ok(base);
    }
    for n in 2..=MAX_SLUG_ATTEMPTS + 1 {
        let candidate = Slug::new(format!("{}-{}", base.as_str(), n))?;
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(CoreError::Repository(format!(
        "failed to find a free slug for '{}'",
        base
    )))
}

/// Names feeding into a product's search tags.
#[derive(Clone, Debug, Default)]
pub struct TagSources<'a> {
    pub product_name: &'a str,
    pub brand_name: Option<&'a str>,
    pub category_name: Option<&'a str>,
    pub type_name: Option<&'a str>,
    pub subtype_name: Option<&'a str>,
    pub extra: &'a [String],
}

/// Build the tag list: brand, category, type and subtype slugs, then name
/// words of two or more characters, then explicit tags. First occurrence wins.
pub fn derive_tags(src: &TagSources<'_>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        if let Ok(slug) = slugify(raw) {
            let tag = slug.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    };

    for name in [
        src.brand_name,
        src.category_name,
        src.type_name,
        src.subtype_name,
    ]
    .into_iter()
    .flatten()
    {
        push(name);
    }
    for word in src.product_name.split_whitespace() {
        if word.chars().filter(|c| c.is_alphanumeric()).count() >= 2 {
            push(word);
        }
    }
    for extra in src.extra {
        push(extra);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_vietnamese_and_collapses_separators() {
        assert_eq!(slugify("Son Kem Lì Màu Đỏ").unwrap().as_str(), "son-kem-li-mau-do");
        assert_eq!(slugify("  Serum -- Vitamin C!! ").unwrap().as_str(), "serum-vitamin-c");
        assert_eq!(slugify("Crème Brûlée").unwrap().as_str(), "creme-brulee");
    }

    #[test]
    fn slugify_drops_combining_marks_of_decomposed_input() {
        assert_eq!(slugify("Cre\u{300}me").unwrap().as_str(), "creme");
        // "Sữa rửa mặt" in NFD: horn, tilde, hook and dot below as separate marks.
        let nfd = "Su\u{31b}\u{303}a ru\u{31b}\u{309}a ma\u{306}\u{323}t";
        assert_eq!(slugify(nfd).unwrap().as_str(), "sua-rua-mat");
        assert!(slugify("\u{301}\u{301}").is_err());
    }

    #[test]
    fn slugify_rejects_symbol_only_names() {
        assert!(matches!(slugify("!!!"), Err(CoreError::InvalidSlug(_))));
        assert!(matches!(slugify(""), Err(CoreError::InvalidSlug(_))));
    }

    #[test]
    fn unique_slug_appends_first_free_suffix() {
        let used = ["toner", "toner-2"];
        let slug = unique_slug("Toner", |s| Ok(used.contains(&s.as_str()))).unwrap();
        assert_eq!(slug.as_str(), "toner-3");
    }

    #[test]
    fn unique_slug_gives_up_eventually() {
        let err = unique_slug("Toner", |_| Ok(true)).unwrap_err();
        assert!(matches!(err, CoreError::Repository(_)));
    }

    #[test]
    fn derive_tags_dedups_in_order() {
        let extra = vec!["Best Seller".to_string(), "innisfree".to_string()];
        let tags = derive_tags(&TagSources {
            product_name: "Innisfree Green Tea Serum 80ml",
            brand_name: Some("Innisfree"),
            category_name: Some("Chăm sóc da"),
            type_name: Some("Serum"),
            subtype_name: None,
            extra: &extra,
        });
        assert_eq!(
            tags,
            vec![
                "innisfree",
                "cham-soc-da",
                "serum",
                "green",
                "tea",
                "80ml",
                "best-seller"
            ]
        );
    }
}
