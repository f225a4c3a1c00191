use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single daily close.
///
/// `is_closed = false` marks a provisional (intraday) candle that must be
/// re-fetched once the session is over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    pub date: NaiveDate,
    pub price: f64,
    pub is_closed: bool,
}

/// Sparse date → price series for one instrument, kept sorted by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    items: Vec<PriceItem>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-date lookup. O(log n).
    pub fn get(&self, date: NaiveDate) -> Option<&PriceItem> {
        self.items
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| &self.items[idx])
    }

    /// Insert or replace the item for its date, keeping the order.
    pub fn set(&mut self, item: PriceItem) {
        match self.items.binary_search_by_key(&item.date, |p| p.date) {
            Ok(idx) => self.items[idx] = item,
            Err(idx) => self.items.insert(idx, item),
        }
    }

    /// Closest cached date strictly before `date`.
    pub fn find_lt(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.items.partition_point(|p| p.date < date);
        idx.checked_sub(1).map(|i| self.items[i].date)
    }

    /// Closest cached date strictly after `date`.
    pub fn find_gt(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.items.partition_point(|p| p.date <= date);
        self.items.get(idx).map(|p| p.date)
    }

    /// Carry the most recent known price forward over every missing calendar
    /// day in `[from, to]`. Days before the first known price stay empty.
    /// Returns the number of days filled.
    pub fn fill_forward(&mut self, from: NaiveDate, to: NaiveDate) -> usize {
        let mut last: Option<PriceItem> = None;
        let mut filled = Vec::new();
        let mut day = from;
        while day <= to {
            match self.get(day) {
                Some(item) => last = Some(*item),
                None => {
                    if let Some(prev) = last {
                        filled.push(PriceItem {
                            date: day,
                            price: prev.price,
                            is_closed: prev.is_closed,
                        });
                    }
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        let count = filled.len();
        for item in filled {
            self.set(item);
        }
        count
    }

    /// Mark every entry dated in `(after, to]` as provisional.
    /// Returns how many were marked.
    pub fn mark_provisional_after(&mut self, after: NaiveDate, to: NaiveDate) -> usize {
        let start = self.items.partition_point(|p| p.date <= after);
        let end = self.items.partition_point(|p| p.date <= to);
        let mut marked = 0;
        for item in self.items.iter_mut().take(end).skip(start) {
            if item.is_closed {
                item.is_closed = false;
                marked += 1;
            }
        }
        marked
    }

    /// Drop provisional entries. Returns how many were removed.
    pub fn evict_unclosed(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|p| p.is_closed);
        before - self.items.len()
    }

    /// Items within `[from, to]`, inclusive.
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> &[PriceItem] {
        let start = self.items.partition_point(|p| p.date < from);
        let end = self.items.partition_point(|p| p.date <= to);
        if start >= end {
            &[]
        } else {
            &self.items[start..end]
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.items.first().map(|p| p.date)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// In-memory view of the persisted price tables.
///
/// - `entries`: instrument id → sparse series of daily closes.
/// - `first_trade_dates`: instrument id → earliest observed candle date.
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    pub entries: HashMap<String, PriceSeries>,
    pub first_trade_dates: HashMap<String, NaiveDate>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached price for an exact date, if any.
    pub fn get_price(&self, instrument_id: &str, date: NaiveDate) -> Option<f64> {
        self.entries
            .get(instrument_id)
            .and_then(|series| series.get(date))
            .map(|item| item.price)
    }

    pub fn series(&self, instrument_id: &str) -> Option<&PriceSeries> {
        self.entries.get(instrument_id)
    }

    pub fn series_mut(&mut self, instrument_id: &str) -> &mut PriceSeries {
        self.entries.entry(instrument_id.to_string()).or_default()
    }

    /// Drop every provisional entry across all series.
    pub fn evict_unclosed(&mut self) -> usize {
        let removed = self.entries.values_mut().map(|s| s.evict_unclosed()).sum();
        self.entries.retain(|_, s| !s.is_empty());
        removed
    }

    /// Total number of cached price points across all instruments.
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(|s| s.len()).sum()
    }

    /// Number of instruments with at least one cached price.
    pub fn instrument_count(&self) -> usize {
        self.entries.len()
    }
}
