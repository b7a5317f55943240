//! Chapter slugs

use std::collections::HashSet;

const MAX_SLUG_CHARS: usize = 80;

/// Lowercase, alphanumerics kept, everything else collapsed to `-`
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(MAX_SLUG_CHARS).collect();
    slug.trim_end_matches('-').to_string()
}

/// Hands out slugs unique within one edition
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashSet<String>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slug for `title`, suffixed `-2`, `-3`, ... on collision
    pub fn allocate(&mut self, title: &str, chapter_number: usize) -> String {
        let mut base = slugify(title);
        if base.is_empty() {
            base = format!("chapter-{}", chapter_number);
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Chapter 3 (2/3)"), "chapter-3-2-3");
        assert_eq!(slugify("  The End!  "), "the-end");
        assert_eq!(slugify("Глава Первая"), "глава-первая");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_allocate_unique() {
        let mut slugs = SlugAllocator::new();
        assert_eq!(slugs.allocate("Prologue", 1), "prologue");
        assert_eq!(slugs.allocate("Prologue", 2), "prologue-2");
        assert_eq!(slugs.allocate("Prologue 2", 3), "prologue-2-2");
        assert_eq!(slugs.allocate("Prologue", 4), "prologue-3");
        assert_eq!(slugs.allocate("", 5), "chapter-5");
    }
}
