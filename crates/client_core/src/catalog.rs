use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use shared::domain::{SortDirection, SortKey};

use crate::reconcile::CampaignView;

/// Filters and ordering for the explore listing.
///
/// `SortDirection::Descending` yields each key's headline order: newest
/// first, soonest deadline first, best funded first, largest goal first.
/// `Ascending` reverses it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub min_goal_sol: Option<f64>,
    pub max_goal_sol: Option<f64>,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl CatalogQuery {
    pub fn matches(&self, view: &CampaignView) -> bool {
        let title_matches = match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => view
                .metadata
                .title
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        };
        let goal = view.metadata.goal_sol;
        title_matches
            && self.min_goal_sol.map_or(true, |min| goal >= min)
            && self.max_goal_sol.map_or(true, |max| goal <= max)
    }

    fn headline_order(&self, a: &CampaignView, b: &CampaignView) -> Ordering {
        match self.sort {
            SortKey::Newest => b.metadata.created_at.cmp(&a.metadata.created_at),
            SortKey::EndingSoon => a.state.deadline.cmp(&b.state.deadline),
            SortKey::MostFunded => b
                .progress
                .percent_funded
                .total_cmp(&a.progress.percent_funded),
            SortKey::Goal => b.state.goal.cmp(&a.state.goal),
        }
    }

    pub fn compare(&self, a: &CampaignView, b: &CampaignView) -> Ordering {
        let order = self.headline_order(a, b);
        match self.direction {
            SortDirection::Descending => order,
            SortDirection::Ascending => order.reverse(),
        }
    }
}

/// Live campaigns: metadata expiration still ahead of `now`.
pub fn explore(
    views: Vec<CampaignView>,
    query: &CatalogQuery,
    now: DateTime<Utc>,
) -> Vec<CampaignView> {
    let mut live: Vec<CampaignView> = views
        .into_iter()
        .filter(|view| !view.is_expired(now) && query.matches(view))
        .collect();
    live.sort_by(|a, b| query.compare(a, b));
    live
}

/// Campaigns whose metadata expiration has passed, most recently expired first.
pub fn archived(views: Vec<CampaignView>, now: DateTime<Utc>) -> Vec<CampaignView> {
    let mut expired: Vec<CampaignView> = views
        .into_iter()
        .filter(|view| view.is_expired(now))
        .collect();
    expired.sort_by(|a, b| b.metadata.expiration.cmp(&a.metadata.expiration));
    expired
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
