//! Report source collaborator and change subscriptions
//!
//! The backend is reached through [`ReportSource`]: fetch the full approved report
//! list and subscribe to a payload-less change stream. Everything here is
//! single-threaded (`Rc`/`Cell`), matching the core's execution model.

use crate::{AccessibilityReport, MapError, Result};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Page size used when materializing paginated fetches
pub const PAGE_SIZE: usize = 1000;

/// Change callback; receives no payload, the core refetches
pub type Listener = Box<dyn FnMut()>;

/// Backend that owns the reports
pub trait ReportSource {
    /// Fetch every approved report
    ///
    /// Failures are returned to the caller; the core does not retry.
    fn fetch_approved_reports(&mut self) -> Result<Vec<AccessibilityReport>>;

    /// Call `listener` on every insert, update or delete until the returned
    /// subscription is dropped or unsubscribed
    fn subscribe(&mut self, listener: Listener) -> Subscription;
}

/// Handle that removes its listener when dropped
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to cancel
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Shared "needs refetch" flag set by a change listener
#[derive(Debug, Clone, Default)]
pub struct StaleFlag(Rc<Cell<bool>>);

impl StaleFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mark(&self) {
        self.0.set(true);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    /// Read and clear
    #[inline]
    pub fn take(&self) -> bool {
        self.0.replace(false)
    }

    /// Listener that marks this flag
    pub fn listener(&self) -> Listener {
        let flag = self.clone();
        Box::new(move || flag.mark())
    }
}

/// Registered listeners keyed by subscription order
///
/// Listeners run while the set is borrowed, so they must not subscribe or
/// unsubscribe from inside the callback.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Rc<RefCell<ListenerSetInner>>,
}

#[derive(Default)]
struct ListenerSetInner {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

impl ListenerSet {
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(id, listener);
            id
        };

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().listeners.remove(&id);
            }
        })
    }

    pub fn notify(&self) {
        for listener in self.inner.borrow_mut().listeners.values_mut() {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain a paginated endpoint into one list
///
/// `fetch_page(offset, limit)` is called until it returns fewer than `page_size` items.
pub fn collect_pages<F>(page_size: usize, mut fetch_page: F) -> Result<Vec<AccessibilityReport>>
where
    F: FnMut(usize, usize) -> Result<Vec<AccessibilityReport>>,
{
    if page_size == 0 {
        return Err(MapError::Source("page size must be positive".to_string()));
    }

    let mut all = Vec::new();
    loop {
        let page = fetch_page(all.len(), page_size)?;
        let done = page.len() < page_size;
        all.extend(page);
        if done {
            return Ok(all);
        }
    }
}

/// In-memory source, used by the CLI and in tests
#[derive(Default)]
pub struct MemoryReportSource {
    reports: Vec<AccessibilityReport>,
    listeners: ListenerSet,
    failure: Option<String>,
    fetches: usize,
}

impl MemoryReportSource {
    pub fn new(reports: Vec<AccessibilityReport>) -> Self {
        Self {
            reports,
            ..Default::default()
        }
    }

    /// Replace the whole set and notify subscribers
    pub fn set_reports(&mut self, reports: Vec<AccessibilityReport>) {
        self.reports = reports;
        self.listeners.notify();
    }

    /// Insert or update by id and notify subscribers
    pub fn upsert(&mut self, report: AccessibilityReport) {
        match self.reports.iter_mut().find(|r| r.id == report.id) {
            Some(existing) => *existing = report,
            None => self.reports.push(report),
        }
        self.listeners.notify();
    }

    /// Delete by id; notifies only when something was removed
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.reports.len();
        self.reports.retain(|r| r.id != id);
        let removed = self.reports.len() != before;
        if removed {
            self.listeners.notify();
        }
        removed
    }

    /// Make the next fetch fail with `message`
    pub fn fail_next_fetch(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }

    /// Number of fetch calls so far, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ReportSource for MemoryReportSource {
    fn fetch_approved_reports(&mut self) -> Result<Vec<AccessibilityReport>> {
        self.fetches += 1;
        if let Some(message) = self.failure.take() {
            return Err(MapError::Source(message));
        }

        let reports = &self.reports;
        collect_pages(PAGE_SIZE, |offset, limit| {
            Ok(reports.iter().skip(offset).take(limit).cloned().collect())
        })
    }

    fn subscribe(&mut self, listener: Listener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
