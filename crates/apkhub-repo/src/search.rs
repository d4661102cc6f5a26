//! Relevance search over a merged index
//!
//! Shared by online search and offline mode so both rank identically.

use apkhub_core::{AppPackage, ManifestIndex};
use serde::Serialize;

/// Search filters
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Only packages in this category (case-insensitive)
    pub category: Option<String>,
    /// Only packages with at least one version installable at this SDK level
    pub device_sdk: Option<u32>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub package_id: String,
    pub score: u32,
    pub package: AppPackage,
}

/// Score a package against a lowercased query. 0 means no match.
pub fn score(package: &AppPackage, query: &str) -> u32 {
    if query.is_empty() {
        return 1;
    }

    let mut score = 0;

    let id = package.package_id.to_lowercase();
    if id == query {
        score += 100;
    } else if id.contains(query) {
        score += 50;
    }

    let names: Vec<String> = package.name.values().map(str::to_lowercase).collect();
    if names.iter().any(|n| n == query) {
        score += 80;
    } else if names.iter().any(|n| n.contains(query)) {
        score += 40;
    }

    if package
        .description
        .values()
        .any(|d| d.to_lowercase().contains(query))
    {
        score += 10;
    }

    if package.category.to_lowercase() == query {
        score += 20;
    }

    score
}

fn matches_filters(package: &AppPackage, options: &SearchOptions) -> bool {
    if let Some(category) = &options.category
        && !package.category.eq_ignore_ascii_case(category)
    {
        return false;
    }

    if let Some(sdk) = options.device_sdk
        && !package.versions.values().any(|v| v.supports_sdk(sdk))
    {
        return false;
    }

    true
}

/// Search packages, best match first
pub fn search(index: &ManifestIndex, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
    let query = query.trim().to_lowercase();

    let mut hits: Vec<SearchHit> = index
        .packages
        .iter()
        .filter(|(_, package)| matches_filters(package, options))
        .filter_map(|(id, package)| {
            let score = score(package, &query);
            (score > 0).then(|| SearchHit {
                package_id: id.clone(),
                score,
                package: package.clone(),
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.package_id.cmp(&b.package_id))
    });

    if let Some(limit) = options.limit {
        hits.truncate(limit);
    }

    hits
}
