//! # ActiveSelection - Visibility State
//!
//! Tracks the visible member of every exclusive group, the visibility flag
//! of every independent part, and the latest request per group/part.
//!
//! Requests are ordered by a per-key sequence number. A request only applies
//! its visibility if it is still the latest one for its key when its load
//! completes; newer requests cancel the [`SelectionToken`] of older ones.

use crate::catalog::PartCatalog;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::watch;

/// Token held by an in-progress selection request.
#[derive(Debug)]
pub struct SelectionToken {
    key: String,
    seq: u64,
    latest: watch::Receiver<u64>,
}

impl SelectionToken {
    /// Group id or independent part id this request targets
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_cancelled(&self) -> bool {
        *self.latest.borrow() != self.seq
    }

    /// Resolves once a newer request for the same key has been made.
    pub async fn cancelled(&mut self) {
        let seq = self.seq;
        let changed = self.latest.wait_for(|latest| *latest != seq).await.map(|_| ());
        if changed.is_err() {
            // Selection state dropped; nothing can supersede us any more
            std::future::pending::<()>().await;
        }
    }
}

/// Visible member per exclusive group and flag per independent part.
#[derive(Debug)]
pub struct ActiveSelection {
    exclusive: BTreeMap<String, Option<String>>,
    independent: BTreeMap<String, bool>,
    requests: HashMap<String, watch::Sender<u64>>,
}

impl ActiveSelection {
    /// Empty selection: no group member active, every independent part hidden.
    pub fn new(catalog: &PartCatalog) -> Self {
        Self {
            exclusive: catalog.groups().map(|g| (g.to_string(), None)).collect(),
            independent: catalog
                .independent_parts()
                .map(|p| (p.id.clone(), false))
                .collect(),
            requests: HashMap::new(),
        }
    }

    /// Record a new request for `key`, cancelling any older one.
    pub fn request(&mut self, key: &str) -> SelectionToken {
        let sender = self
            .requests
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(0).0);
        let seq = *sender.borrow() + 1;
        sender.send_replace(seq);

        SelectionToken {
            key: key.to_string(),
            seq,
            latest: sender.subscribe(),
        }
    }

    /// True if `token` is still the latest request for its key
    pub fn is_current(&self, token: &SelectionToken) -> bool {
        self.requests
            .get(&token.key)
            .map(|sender| *sender.borrow() == token.seq)
            .unwrap_or(false)
    }

    pub fn active(&self, group: &str) -> Option<&str> {
        self.exclusive.get(group)?.as_deref()
    }

    pub fn set_active(&mut self, group: &str, part: &str) {
        self.exclusive.insert(group.to_string(), Some(part.to_string()));
    }

    pub fn flag(&self, part: &str) -> bool {
        self.independent.get(part).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, part: &str, visible: bool) {
        self.independent.insert(part.to_string(), visible);
    }

    /// Group -> active member
    pub fn exclusive(&self) -> &BTreeMap<String, Option<String>> {
        &self.exclusive
    }

    /// Independent part -> visibility flag
    pub fn independent(&self) -> &BTreeMap<String, bool> {
        &self.independent
    }
}
