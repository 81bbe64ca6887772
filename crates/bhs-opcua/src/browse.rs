// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA address-space browsing.
//!
//! [`AddressSpaceBrowser`] lists the direct children of a node. Each call
//! sends two browse requests in one exchange, one following `Aggregates`
//! and one following `Organizes`, and then follows every continuation point
//! until the server has nothing left to return.
//!
//! # Pagination
//!
//! ```text
//!  pass 1:  Browse[Aggregates, Organizes]
//!              │                 │
//!              ▼                 ▼
//!          page + cp ──▶ BrowseNext ──▶ ... ──▶ done
//!                        BadNoContinuationPoints ──▶ queued
//!  pass 2:  Browse[queued requests] ...
//! ```
//!
//! Pages of one request are concatenated in the order they arrive. A request
//! failing with `BadNoContinuationPoints` is reissued in a follow-up pass once
//! the other requests have released their continuation points. Any other
//! per-request failure drops that branch. A failed exchange fails the whole
//! call with [`BrowseError::Transport`], so an error is never mistaken for a
//! node without children.
//!
//! # Examples
//!
//! ```
//! use bhs_opcua::browse::AddressSpaceBrowser;
//! use bhs_opcua::client::SessionManager;
//! use bhs_opcua::simulation::SimulatedServer;
//! use bhs_opcua::types::{NodeId, OpcUaConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> bhs_opcua::OpcUaResult<()> {
//! let server = SimulatedServer::demo();
//! let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
//! session.connect(server.endpoint_url()).await?;
//!
//! let browser = AddressSpaceBrowser::new(session);
//! let children = browser.browse_children(&NodeId::OBJECTS_FOLDER).await?;
//! assert_eq!(children[0].display_name, "FolderA");
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::transport::{
    BrowseDescription, BrowseResult, ContinuationPoint, OpcUaSession, ReferenceDescription,
    AGGREGATES, ORGANIZES,
};
use crate::client::SessionManager;
use crate::error::{BrowseError, OpcUaError, OpcUaResult};
use crate::types::{NodeId, StatusCode};

// =============================================================================
// BrowseOptions
// =============================================================================

/// Options for browse operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseOptions {
    /// Follow-up passes allowed for requests refused with
    /// `BadNoContinuationPoints`.
    #[serde(default = "default_max_retry_passes")]
    pub max_retry_passes: u32,

    /// Default depth for [`AddressSpaceBrowser::browse_tree`].
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_retry_passes() -> u32 {
    8
}

fn default_max_depth() -> usize {
    3
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            max_retry_passes: default_max_retry_passes(),
            max_depth: default_max_depth(),
        }
    }
}

impl BrowseOptions {
    /// Sets the number of follow-up passes.
    pub fn with_max_retry_passes(mut self, passes: u32) -> Self {
        self.max_retry_passes = passes;
        self
    }

    /// Sets the default tree depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

// =============================================================================
// BrowseEntry
// =============================================================================

/// One node reached by [`AddressSpaceBrowser::browse_tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrowseEntry {
    /// Distance from the starting node (children are at depth 1).
    pub depth: usize,

    /// The reference that led here.
    pub reference: ReferenceDescription,
}

impl fmt::Display for BrowseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} ({}) [{}]",
            "",
            self.reference.display_name,
            self.reference.node_id,
            self.reference.node_class,
            indent = (self.depth.saturating_sub(1)) * 2
        )
    }
}

// =============================================================================
// AddressSpaceBrowser
// =============================================================================

/// Lists children of address-space nodes over the active session.
#[derive(Debug, Clone)]
pub struct AddressSpaceBrowser {
    session: SessionManager,
    options: BrowseOptions,
    stats: Arc<BrowseStatistics>,
}

enum Drained {
    Complete(Vec<ReferenceDescription>),
    Retry,
    Skipped(StatusCode),
}

impl AddressSpaceBrowser {
    /// Creates a browser using the session manager's browse options.
    pub fn new(session: SessionManager) -> Self {
        let options = session.config().browse.clone();
        Self::with_options(session, options)
    }

    /// Creates a browser with explicit options.
    pub fn with_options(session: SessionManager, options: BrowseOptions) -> Self {
        Self {
            session,
            options,
            stats: Arc::new(BrowseStatistics::new()),
        }
    }

    /// Returns the browse options.
    pub fn options(&self) -> &BrowseOptions {
        &self.options
    }

    /// Returns the browse statistics.
    pub fn stats(&self) -> &BrowseStatistics {
        &self.stats
    }

    /// Returns the direct children of `node_id`.
    ///
    /// Aggregated children come before organized ones; within each group the
    /// server's page order is kept.
    pub async fn browse_children(&self, node_id: &NodeId) -> OpcUaResult<Vec<ReferenceDescription>> {
        let result = self.browse_children_inner(node_id).await;
        match &result {
            Ok(children) => self.stats.record_browse(children.len()),
            Err(_) => self.stats.record_error(),
        }
        result
    }

    async fn browse_children_inner(
        &self,
        node_id: &NodeId,
    ) -> OpcUaResult<Vec<ReferenceDescription>> {
        let session = self
            .session
            .session()
            .map_err(|e| OpcUaError::browse(BrowseError::transport(node_id.to_string(), e)))?;

        let requests = [
            BrowseDescription::forward(node_id.clone(), AGGREGATES),
            BrowseDescription::forward(node_id.clone(), ORGANIZES),
        ];
        let mut buckets: Vec<Vec<ReferenceDescription>> = vec![Vec::new(); requests.len()];
        let mut pending: Vec<usize> = (0..requests.len()).collect();
        let mut passes = 0u32;

        while !pending.is_empty() {
            if passes > self.options.max_retry_passes {
                return Err(OpcUaError::browse(BrowseError::continuation_points_exhausted(
                    node_id.to_string(),
                    passes,
                )));
            }
            if passes > 0 {
                self.stats.record_retry(pending.len());
                tracing::debug!(
                    node_id = %node_id,
                    pass = passes + 1,
                    requests = pending.len(),
                    "Retrying browse requests refused for lack of continuation points"
                );
            }
            passes += 1;

            let batch: Vec<BrowseDescription> =
                pending.iter().map(|&i| requests[i].clone()).collect();
            self.stats.record_requests(batch.len());
            let results = session
                .browse(&batch)
                .await
                .map_err(|e| OpcUaError::browse(BrowseError::transport(node_id.to_string(), e)))?;
            if results.len() != batch.len() {
                return Err(OpcUaError::browse(BrowseError::response_mismatch(
                    batch.len(),
                    results.len(),
                )));
            }

            let mut retry = Vec::new();
            let mut results = pending.iter().copied().zip(results);
            while let Some((index, result)) = results.next() {
                let drained = match self.drain(session.as_ref(), node_id, result).await {
                    Ok(drained) => drained,
                    Err(e) => {
                        let held: Vec<ContinuationPoint> =
                            results.by_ref().filter_map(|(_, r)| r.continuation_point).collect();
                        self.release(session.as_ref(), node_id, &held).await;
                        return Err(e);
                    }
                };
                match drained {
                    Drained::Complete(references) => buckets[index] = references,
                    Drained::Retry => retry.push(index),
                    Drained::Skipped(status) => {
                        self.stats.record_skipped();
                        tracing::debug!(
                            node_id = %node_id,
                            reference_type = %requests[index].reference_type_id,
                            status = %status,
                            "Skipping failed browse request"
                        );
                    }
                }
            }
            pending = retry;
        }

        Ok(buckets.into_iter().flatten().collect())
    }

    /// Follows continuation points of one request until it is exhausted.
    async fn drain(
        &self,
        session: &dyn OpcUaSession,
        node_id: &NodeId,
        first: BrowseResult,
    ) -> OpcUaResult<Drained> {
        if first.status == StatusCode::BAD_NO_CONTINUATION_POINTS {
            return Ok(Drained::Retry);
        }
        if first.status.is_bad() {
            return Ok(Drained::Skipped(first.status));
        }

        let mut references = first.references;
        let mut continuation = first.continuation_point;

        while let Some(point) = continuation.take() {
            self.stats.record_continuation();
            tracing::debug!(
                node_id = %node_id,
                fetched = references.len(),
                "Fetching next browse page"
            );

            let mut pages = match session.browse_next(false, std::slice::from_ref(&point)).await {
                Ok(pages) => pages,
                Err(e) => {
                    self.release(session, node_id, std::slice::from_ref(&point)).await;
                    return Err(OpcUaError::browse(BrowseError::transport(node_id.to_string(), e)));
                }
            };
            if pages.len() != 1 {
                return Err(OpcUaError::browse(BrowseError::response_mismatch(
                    1,
                    pages.len(),
                )));
            }
            let page = pages.remove(0);

            // Earlier pages of a restarted request are discarded.
            if page.status == StatusCode::BAD_NO_CONTINUATION_POINTS {
                return Ok(Drained::Retry);
            }
            if page.status.is_bad() {
                return Ok(Drained::Skipped(page.status));
            }

            references.extend(page.references);
            continuation = page.continuation_point;
        }

        Ok(Drained::Complete(references))
    }

    /// Releases continuation points still held on the server. Best effort.
    async fn release(&self, session: &dyn OpcUaSession, node_id: &NodeId, points: &[ContinuationPoint]) {
        if points.is_empty() {
            return;
        }
        match session.browse_next(true, points).await {
            Ok(_) => tracing::debug!(
                node_id = %node_id,
                released = points.len(),
                "Released continuation points of an abandoned browse"
            ),
            Err(e) => tracing::debug!(
                node_id = %node_id,
                error = %e,
                "Continuation points could not be released"
            ),
        }
    }

    /// Returns `true` if `reference` leads to a node with children.
    ///
    /// Targets on other servers are never expandable. Otherwise this is a
    /// full [`browse_children`](Self::browse_children) call.
    pub async fn is_expandable(&self, reference: &ReferenceDescription) -> OpcUaResult<bool> {
        match reference.node_id.to_local() {
            Some(node_id) => self.has_children(node_id).await,
            None => Ok(false),
        }
    }

    /// Returns `true` if `node_id` has at least one child.
    pub async fn has_children(&self, node_id: &NodeId) -> OpcUaResult<bool> {
        Ok(!self.browse_children(node_id).await?.is_empty())
    }

    /// Walks the hierarchy below `node_id` depth-first, up to `max_depth`
    /// levels (`None` uses the configured depth).
    ///
    /// Nodes already visited and targets on other servers are not descended
    /// into.
    pub async fn browse_tree(
        &self,
        node_id: &NodeId,
        max_depth: Option<usize>,
    ) -> OpcUaResult<Vec<BrowseEntry>> {
        let max_depth = max_depth.unwrap_or(self.options.max_depth);
        let mut entries = Vec::new();
        if max_depth == 0 {
            return Ok(entries);
        }

        let mut visited = HashSet::from([node_id.clone()]);
        let mut stack: Vec<BrowseEntry> = self
            .browse_children(node_id)
            .await?
            .into_iter()
            .rev()
            .map(|reference| BrowseEntry {
                depth: 1,
                reference,
            })
            .collect();

        while let Some(entry) = stack.pop() {
            let depth = entry.depth;
            let descend = match entry.reference.node_id.to_local() {
                Some(local) if depth < max_depth && visited.insert(local.clone()) => {
                    Some(local.clone())
                }
                _ => None,
            };
            entries.push(entry);

            if let Some(child) = descend {
                let children = self.browse_children(&child).await?;
                stack.extend(children.into_iter().rev().map(|reference| BrowseEntry {
                    depth: depth + 1,
                    reference,
                }));
            }
        }

        Ok(entries)
    }
}

// =============================================================================
// BrowseStatistics
// =============================================================================

/// Statistics for browse operations.
#[derive(Debug, Default)]
pub struct BrowseStatistics {
    browse_calls: AtomicU64,
    references_returned: AtomicU64,
    requests_sent: AtomicU64,
    continuation_fetches: AtomicU64,
    retried_requests: AtomicU64,
    skipped_requests: AtomicU64,
    errors: AtomicU64,
}

impl BrowseStatistics {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_browse(&self, references: usize) {
        self.browse_calls.fetch_add(1, Ordering::Relaxed);
        self.references_returned
            .fetch_add(references as u64, Ordering::Relaxed);
    }

    fn record_requests(&self, count: usize) {
        self.requests_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_continuation(&self) {
        self.continuation_fetches.fetch_add(1, Ordering::Relaxed);
    }

    fn record_retry(&self, count: usize) {
        self.retried_requests
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_skipped(&self) {
        self.skipped_requests.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful `browse_children` calls.
    pub fn browse_calls(&self) -> u64 {
        self.browse_calls.load(Ordering::Relaxed)
    }

    /// References returned by successful calls.
    pub fn references_returned(&self) -> u64 {
        self.references_returned.load(Ordering::Relaxed)
    }

    /// Browse requests sent, counting reissued ones.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Browse-next exchanges.
    pub fn continuation_fetches(&self) -> u64 {
        self.continuation_fetches.load(Ordering::Relaxed)
    }

    /// Requests reissued in follow-up passes.
    pub fn retried_requests(&self) -> u64 {
        self.retried_requests.load(Ordering::Relaxed)
    }

    /// Requests dropped because of a bad status.
    pub fn skipped_requests(&self) -> u64 {
        self.skipped_requests.load(Ordering::Relaxed)
    }

    /// Failed calls.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.browse_calls,
            &self.references_returned,
            &self.requests_sent,
            &self.continuation_fetches,
            &self.retried_requests,
            &self.skipped_requests,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
