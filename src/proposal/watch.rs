use std::time::{Duration, Instant};

use crate::page::{NodeId, Page, SelectorChain};

/// Outcome of one look for the watched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPoll {
    Pending,
    Found(NodeId),
    TimedOut,
    Cancelled,
}

/// Repeated lookup of an element that may not be on the page yet.
///
/// The caller drives it with [`ElementWatch::poll`] on each timer tick. Once
/// the watch finds the element, times out, or is cancelled, every later poll
/// reports that same outcome.
pub struct ElementWatch {
    selectors: SelectorChain,
    started: Instant,
    timeout: Option<Duration>,
    finished: Option<WatchPoll>,
}

impl ElementWatch {
    pub fn start(selectors: SelectorChain, timeout: Option<Duration>, now: Instant) -> Self {
        Self {
            selectors,
            started: now,
            timeout,
            finished: None,
        }
    }

    pub fn cancel(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(WatchPoll::Cancelled);
        }
    }

    pub fn is_active(&self) -> bool {
        self.finished.is_none()
    }

    pub fn poll(&mut self, page: &Page, now: Instant) -> WatchPoll {
        self.poll_where(page, now, |_, _| true)
    }

    /// Like [`ElementWatch::poll`], but a found element only completes the
    /// watch when `accept` agrees.
    pub fn poll_where<F>(&mut self, page: &Page, now: Instant, accept: F) -> WatchPoll
    where
        F: Fn(&Page, NodeId) -> bool,
    {
        if let Some(outcome) = self.finished {
            return outcome;
        }

        if let Some(found) = page.select_first(&self.selectors) {
            if accept(page, found) {
                self.finished = Some(WatchPoll::Found(found));
                return WatchPoll::Found(found);
            }
        }

        if let Some(timeout) = self.timeout {
            if now.saturating_duration_since(self.started) >= timeout {
                self.finished = Some(WatchPoll::TimedOut);
                return WatchPoll::TimedOut;
            }
        }

        WatchPoll::Pending
    }
}
