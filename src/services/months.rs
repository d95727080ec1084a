use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MonthError {
    #[error("Month must be between 1 and 12, got {0}")]
    OutOfRange(u32),
    #[error("{0} is in the future")]
    Future(MonthCursor),
}

/// A (month, year) pair. Field order makes the derived ordering
/// chronological.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthCursor {
    year: i32,
    month: u32,
}

impl MonthCursor {
    pub fn new(month: u32, year: i32) -> Result<Self, MonthError> {
        if !(1..=12).contains(&month) {
            return Err(MonthError::OutOfRange(month));
        }
        Ok(Self { year, month })
    }

    pub fn past_or_current(month: u32, year: i32, today: NaiveDate) -> Result<Self, MonthError> {
        let cursor = Self::new(month, year)?;
        if cursor.is_future(today) {
            return Err(MonthError::Future(cursor));
        }
        Ok(cursor)
    }

    pub fn current(today: NaiveDate) -> Self {
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self, today: NaiveDate) -> Option<Self> {
        if *self >= Self::current(today) {
            return None;
        }
        if self.month == 12 {
            Some(Self {
                year: self.year + 1,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    pub fn back(&self, months: u32) -> Self {
        (0..months).fold(*self, |cursor, _| cursor.previous())
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        *self == Self::current(today)
    }

    pub fn is_future(&self, today: NaiveDate) -> bool {
        *self > Self::current(today)
    }
}

impl TryFrom<(u32, i32)> for MonthCursor {
    type Error = MonthError;

    fn try_from((month, year): (u32, i32)) -> Result<Self, Self::Error> {
        Self::new(month, year)
    }
}

impl fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Re-entrancy gate for month transitions. Only one guard exists at a time;
/// the gate reopens when it is dropped.
#[derive(Clone, Default)]
pub struct TransitionGate {
    busy: Arc<AtomicBool>,
}

impl TransitionGate {
    pub fn try_begin(&self) -> Option<TransitionGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TransitionGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct TransitionGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub struct MonthPager {
    cursor: MonthCursor,
    gate: TransitionGate,
}

impl MonthPager {
    pub fn new(cursor: MonthCursor) -> Self {
        Self {
            cursor,
            gate: TransitionGate::default(),
        }
    }

    pub fn cursor(&self) -> MonthCursor {
        self.cursor
    }

    pub fn begin_previous(&mut self) -> Option<TransitionGuard> {
        let guard = self.gate.try_begin()?;
        self.cursor = self.cursor.previous();
        log::debug!("Month changed to {}", self.cursor);
        Some(guard)
    }

    pub fn begin_next(&mut self, today: NaiveDate) -> Option<TransitionGuard> {
        let guard = self.gate.try_begin()?;
        match self.cursor.next(today) {
            Some(next) => {
                self.cursor = next;
                log::debug!("Month changed to {}", self.cursor);
                Some(guard)
            }
            None => {
                log::debug!("Refusing to move past {}", self.cursor);
                None
            }
        }
    }
}
