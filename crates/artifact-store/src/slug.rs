//! Slug generation: Unicode-normalized lowercase ASCII transliteration
//! with `-` separators; collisions get a numeric suffix. Slug is
//! regenerated on title change and the previous slug is not preserved —
//! a documented caveat, not an oversight.

use unicode_normalization::UnicodeNormalization;

/// Transliterates `title` into a URL-safe slug: NFKD-normalize, drop
/// combining marks and non-alphanumerics, lowercase, collapse runs of
/// separators into one `-`.
pub fn slugify(title: &str) -> String {
    let ascii: String = title
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut slug = String::with_capacity(ascii.len());
    let mut last_was_sep = true;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// Appends `-2`, `-3`, ... until `exists` reports no collision. Called by
/// the service with the appropriate per-kind/per-user uniqueness scope.
pub async fn unique_slug<F, Fut>(base: &str, exists: F) -> String
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    if !exists(base.to_string()).await {
        return base.to_string();
    }
    let mut suffix = 2u32;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !exists(candidate.clone()).await {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_separates_words() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
    }

    #[test]
    fn slugify_transliterates_accents() {
        assert_eq!(slugify("Café Déjà Vu"), "cafe-deja-vu");
    }

    #[test]
    fn slugify_empty_title_falls_back_to_untitled() {
        assert_eq!(slugify("   !!!   "), "untitled");
    }

    #[tokio::test]
    async fn unique_slug_appends_numeric_suffix_on_collision() {
        let taken = vec!["my-title".to_string(), "my-title-2".to_string()];
        let slug = unique_slug("my-title", |candidate| {
            let taken = taken.clone();
            async move { taken.contains(&candidate) }
        })
        .await;
        assert_eq!(slug, "my-title-3");
    }
}
