use chrono::NaiveDate;
use futures_util::future::join_all;
use futures_util::stream::{self, Stream};
use std::sync::Arc;

use super::months::MonthCursor;
use crate::models::expenses::ExpensesResponse;
use crate::repositories::api::{ApiError, ExpenseSource};
use crate::repositories::storage::{
    expenses_key, get_json, set_json, KeyValueStore, StoreError, PRELOAD_KEY,
};

#[derive(Debug)]
pub enum LoadPhase {
    Cached(ExpensesResponse),
    Fresh(ExpensesResponse),
    Failed(ApiError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: usize,
    pub failed: usize,
    pub skipped: bool,
}

enum Step {
    Start,
    Network { had_cache: bool },
    Done,
}

pub struct ExpenseLoader {
    source: Arc<dyn ExpenseSource>,
    store: Arc<dyn KeyValueStore>,
}

impl ExpenseLoader {
    pub fn new(source: Arc<dyn ExpenseSource>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { source, store }
    }

    pub async fn cached(&self, cursor: MonthCursor) -> Option<ExpensesResponse> {
        let key = expenses_key(cursor.year(), cursor.month());
        match get_json(self.store.as_ref(), &key).await {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Cache first, then network.
    ///
    /// Yields `Cached` when a cache entry exists, followed by `Fresh` once the
    /// backend answers. A network failure after a cache hit ends the stream
    /// quietly; without a cache hit it is reported as `Failed`.
    pub fn load(&self, cursor: MonthCursor) -> impl Stream<Item = LoadPhase> + '_ {
        stream::unfold(Step::Start, move |step| async move {
            match step {
                Step::Start => match self.cached(cursor).await {
                    Some(cached) => {
                        log::debug!("Serving {} from cache", cursor);
                        Some((LoadPhase::Cached(cached), Step::Network { had_cache: true }))
                    }
                    None => self.network_phase(cursor, false).await,
                },
                Step::Network { had_cache } => self.network_phase(cursor, had_cache).await,
                Step::Done => None,
            }
        })
    }

    pub async fn refresh(&self, cursor: MonthCursor) -> Result<ExpensesResponse, ApiError> {
        let response = self
            .source
            .fetch_expenses(cursor.month(), cursor.year())
            .await?;

        let key = expenses_key(cursor.year(), cursor.month());
        if let Err(e) = set_json(self.store.as_ref(), &key, &response).await {
            log::error!("Could not cache {}: {}", key, e);
        }
        Ok(response)
    }

    /// Warms the cache with the last `months` months, current one included.
    /// Runs once per sign-in; later calls are skipped.
    pub async fn preload_recent(
        &self,
        today: NaiveDate,
        months: u32,
    ) -> Result<PreloadReport, StoreError> {
        if self.store.get(PRELOAD_KEY).await?.is_some() {
            log::debug!("Initial preload already done.");
            return Ok(PreloadReport {
                skipped: true,
                ..PreloadReport::default()
            });
        }

        let current = MonthCursor::current(today);
        let cursors: Vec<MonthCursor> = (0..months).map(|n| current.back(n)).collect();
        log::info!("Preloading {} months of expenses.", cursors.len());

        let results = join_all(cursors.iter().map(|cursor| self.refresh(*cursor))).await;

        let mut report = PreloadReport::default();
        for (cursor, result) in cursors.iter().zip(results) {
            match result {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    log::warn!("Preload of {} failed: {}", cursor, e);
                    report.failed += 1;
                }
            }
        }

        self.store.set(PRELOAD_KEY, "true").await?;
        log::info!(
            "Preload finished: {} loaded, {} failed.",
            report.loaded,
            report.failed
        );
        Ok(report)
    }

    async fn network_phase(
        &self,
        cursor: MonthCursor,
        had_cache: bool,
    ) -> Option<(LoadPhase, Step)> {
        match self.refresh(cursor).await {
            Ok(fresh) => Some((LoadPhase::Fresh(fresh), Step::Done)),
            Err(e) if had_cache => {
                log::warn!("Refreshing {} failed, keeping cached data: {}", cursor, e);
                None
            }
            Err(e) => {
                log::error!("Loading {} failed: {}", cursor, e);
                Some((LoadPhase::Failed(e), Step::Done))
            }
        }
    }
}
