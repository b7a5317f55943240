//! Post-ingestion lint
//!
//! Checks persisted chapters for problems worth an operator's attention.
//! Findings are logged; they never change the job outcome.

use std::collections::HashSet;
use std::fmt;

use crate::db::NewChapter;
use crate::html::image_sources;
use crate::pipeline::watermark_domains;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintFinding {
    EmptyChapter { chapter: i64 },
    UnrewrittenImage { chapter: i64, src: String },
    WatermarkDomain { chapter: i64, domain: String },
    DuplicateSlug { slug: String },
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyChapter { chapter } => write!(f, "chapter {} has no text", chapter),
            Self::UnrewrittenImage { chapter, src } => {
                write!(f, "chapter {} references unresolved image {}", chapter, src)
            }
            Self::WatermarkDomain { chapter, domain } => {
                write!(f, "chapter {} still mentions {}", chapter, domain)
            }
            Self::DuplicateSlug { slug } => write!(f, "slug {} is used twice", slug),
        }
    }
}

/// Inspect chapters about to be published
pub fn lint_chapters(edition_id: &str, chapters: &[NewChapter]) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let mut slugs: HashSet<&str> = HashSet::new();

    for chapter in chapters {
        if chapter.plain_text.trim().is_empty() {
            findings.push(LintFinding::EmptyChapter {
                chapter: chapter.chapter_number,
            });
        }
        for src in image_sources(&chapter.html) {
            if !src.starts_with("/books/") {
                findings.push(LintFinding::UnrewrittenImage {
                    chapter: chapter.chapter_number,
                    src,
                });
            }
        }
        for domain in watermark_domains(&chapter.html) {
            findings.push(LintFinding::WatermarkDomain {
                chapter: chapter.chapter_number,
                domain,
            });
        }
        if !slugs.insert(chapter.slug.as_str()) {
            findings.push(LintFinding::DuplicateSlug {
                slug: chapter.slug.clone(),
            });
        }
    }

    for finding in &findings {
        tracing::warn!(edition_id, "Lint: {}", finding);
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::UnitType;

    fn chapter(number: i64, slug: &str, html: &str, text: &str) -> NewChapter {
        NewChapter {
            id: number.to_string(),
            chapter_number: number,
            slug: slug.to_string(),
            title: slug.to_string(),
            html: html.to_string(),
            plain_text: text.to_string(),
            word_count: 1,
            unit_type: UnitType::Chapter,
            original_chapter_number: None,
            part_number: None,
            total_parts: None,
        }
    }

    #[test]
    fn test_clean_chapters_have_no_findings() {
        let chapters = vec![
            chapter(1, "one", r#"<p>Hi <img src="/books/e/assets/a"/></p>"#, "Hi"),
            chapter(2, "two", "<p>There</p>", "There"),
        ];
        assert!(lint_chapters("e", &chapters).is_empty());
    }

    #[test]
    fn test_findings() {
        let chapters = vec![
            chapter(1, "one", r#"<p><img src="images/a.png"/></p>"#, ""),
            chapter(2, "one", "<p>text</p>", "text"),
        ];
        let findings = lint_chapters("e", &chapters);
        assert!(findings.contains(&LintFinding::EmptyChapter { chapter: 1 }));
        assert!(findings.contains(&LintFinding::UnrewrittenImage {
            chapter: 1,
            src: "images/a.png".to_string()
        }));
        assert!(findings.contains(&LintFinding::DuplicateSlug { slug: "one".to_string() }));
    }
}
