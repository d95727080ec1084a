use dashmap::DashMap;
use std::sync::Arc;

use crate::models::expenses::Expense;
use crate::models::location::LocationInfo;
use crate::repositories::places::PlaceLookup;

/// Fills in missing location data from a place search. Each expense is
/// searched at most once for the lifetime of the enricher; results are never
/// persisted.
pub struct LocationEnricher {
    lookup: Arc<dyn PlaceLookup>,
    searched: DashMap<String, Option<LocationInfo>>,
}

impl LocationEnricher {
    pub fn new(lookup: Arc<dyn PlaceLookup>) -> Self {
        Self {
            lookup,
            searched: DashMap::new(),
        }
    }

    pub fn needs_lookup(expense: &Expense) -> bool {
        !expense.has_location() && !expense.merchant.trim().is_empty()
    }

    pub async fn enrich(&self, expense: &Expense) -> Expense {
        if !Self::needs_lookup(expense) {
            return expense.clone();
        }

        if let Some(known) = self.searched.get(&expense.id) {
            return match known.value() {
                Some(info) => info.apply_to(expense),
                None => expense.clone(),
            };
        }

        let found = match self.lookup.search(expense.merchant.trim()).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Place lookup for expense {} failed: {}", expense.id, e);
                None
            }
        };
        self.searched.insert(expense.id.clone(), found.clone());

        match found {
            Some(info) => {
                log::debug!("Expense {} located at {:?}", expense.id, info.location);
                info.apply_to(expense)
            }
            None => expense.clone(),
        }
    }
}
