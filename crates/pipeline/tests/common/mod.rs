#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use collect::{CollectError, Collector};
use listings::RawCandidate;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
}

pub fn candidate(company: &str, title: &str) -> RawCandidate {
    RawCandidate::new(company, title)
}

pub enum Behavior {
    Return(Vec<RawCandidate>),
    /// Rate limited this many times, then returns the candidates
    RateLimited(usize, Vec<RawCandidate>),
    NotFound,
    Panic,
    /// Signals `started`, then waits for `release`
    Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// In-memory collector with a scripted outcome and an optional delay.
pub struct StubCollector {
    label: String,
    delay: Duration,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubCollector {
    pub fn new(label: &str, behavior: Behavior) -> Self {
        Self {
            label: label.to_string(),
            delay: Duration::ZERO,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn shared(self) -> Arc<dyn Collector> {
        Arc::new(self)
    }
}

#[async_trait]
impl Collector for StubCollector {
    fn label(&self) -> &str {
        &self.label
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>, CollectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behavior {
            Behavior::Return(candidates) => Ok(candidates.clone()),
            Behavior::RateLimited(times, candidates) => {
                if call < *times {
                    Err(CollectError::RateLimited("rate_limit_error".into()))
                } else {
                    Ok(candidates.clone())
                }
            }
            Behavior::NotFound => Err(CollectError::NotFound(self.label.clone())),
            Behavior::Panic => panic!("collector blew up"),
            Behavior::Gated { started, release } => {
                started.notify_one();
                release.notified().await;
                Ok(Vec::new())
            }
        }
    }
}
