//! Aggregate statistics over the whole wishlist.
//!
//! One pass over every book, in id order. Each book lands in a category
//! bucket, one or more region buckets, zero or more subject buckets, one or
//! more author buckets, and an ownership bucket.

use indexmap::IndexMap;
use serde::Serialize;

use super::models::{Book, BookSummary};
use crate::utils::split_list;

const TOP_N: usize = 5;
const UNCATEGORIZED: &str = "Uncategorized";
const UNKNOWN_REGION: &str = "Unknown";
const OWNED: &str = "Owned";
const NOT_OWNED: &str = "Not Owned";

/// Named groups of book summaries in first-seen key order.
pub type BucketMap = IndexMap<String, Vec<BookSummary>>;

fn push(buckets: &mut BucketMap, key: &str, summary: BookSummary) {
    buckets.entry(key.to_string()).or_default().push(summary);
}

/// The `n` largest buckets, largest first. Equal sizes keep first-seen order.
fn top(buckets: &BucketMap, n: usize) -> BucketMap {
    let mut ranked: Vec<(&String, &Vec<BookSummary>)> = buckets.iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    ranked
        .into_iter()
        .take(n)
        .map(|(key, members)| (key.clone(), members.clone()))
        .collect()
}

/// The statistics report served by `GET /api/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_books: usize,
    /// Distinct comma-split author names, the same granularity as the
    /// author buckets.
    pub unique_authors: usize,
    pub regions: BucketMap,
    pub categories: BucketMap,
    pub top_subjects: BucketMap,
    pub top_authors: BucketMap,
    pub ownership: BucketMap,
}

impl StatsReport {
    pub fn from_books(books: &[Book]) -> Self {
        let mut regions = BucketMap::new();
        let mut categories = BucketMap::new();
        let mut subjects = BucketMap::new();
        let mut authors = BucketMap::new();
        let mut ownership = BucketMap::new();

        for book in books {
            let summary = BookSummary::from(book);

            let category = book
                .is_fiction
                .map(|c| c.as_str())
                .unwrap_or(UNCATEGORIZED);
            push(&mut categories, category, summary.clone());

            let book_regions = book.region.as_deref().map(split_list).unwrap_or_default();
            if book_regions.is_empty() {
                push(&mut regions, UNKNOWN_REGION, summary.clone());
            } else {
                for region in &book_regions {
                    push(&mut regions, region, summary.clone());
                }
            }

            for subject in &book.subjects {
                push(&mut subjects, subject, summary.clone());
            }

            for author in split_list(&book.author) {
                push(&mut authors, &author, summary.clone());
            }

            let owned = if book.is_owned { OWNED } else { NOT_OWNED };
            push(&mut ownership, owned, summary);
        }

        StatsReport {
            total_books: books.len(),
            unique_authors: authors.len(),
            regions,
            categories,
            top_subjects: top(&subjects, TOP_N),
            top_authors: top(&authors, TOP_N),
            ownership,
        }
    }
}
