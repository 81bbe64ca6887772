// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value read and write.
//!
//! [`ValueAccess`] reads and writes node values over the active session,
//! singly or in batches, and inspects access levels. Every exchange is
//! bounded by the configured request timeout.
//!
//! The non-blocking forms return a [`PendingOperation`], a future that
//! completes exactly once with the outcome and can be cancelled or bounded
//! with a timeout.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, OpcUaError, OpcUaResult, OperationError};
use crate::types::{AccessLevel, AttributeId, NodeClass, NodeId, StatusCode};

use super::session::SessionManager;
use super::transport::{DataValue, OpcUaValue, ReadValueId, WriteValue};

// =============================================================================
// PendingOperation
// =============================================================================

/// A read or write running in the background.
///
/// Awaiting yields the outcome. Dropping the handle does not stop the
/// operation; use [`cancel`](Self::cancel) for that.
#[derive(Debug)]
#[must_use = "the outcome is only observable by awaiting the operation"]
pub struct PendingOperation<T> {
    operation: &'static str,
    receiver: oneshot::Receiver<OpcUaResult<T>>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> PendingOperation<T> {
    pub(crate) fn spawn<F>(operation: &'static str, future: F) -> Self
    where
        F: Future<Output = OpcUaResult<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = sender.send(future.await);
        });
        Self {
            operation,
            receiver,
            handle,
        }
    }
}

impl<T> PendingOperation<T> {
    /// Returns the operation name.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Returns `true` once the operation has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the operation. A request already on the wire may still take
    /// effect on the server.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Waits at most `timeout`, cancelling the operation if it runs longer.
    pub async fn wait_timeout(mut self, timeout: Duration) -> OpcUaResult<T> {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.handle.abort();
                Err(OpcUaError::operation_timeout(self.operation, timeout))
            }
        }
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = OpcUaResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(OpcUaError::operation(
                OperationError::cancelled(this.operation),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

// =============================================================================
// NodeAttributes
// =============================================================================

/// Descriptive attributes of a node read in one exchange.
///
/// Attributes the server could not return are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttributes {
    /// The node.
    pub node_id: NodeId,

    /// Node class.
    pub node_class: Option<NodeClass>,

    /// Value attribute with its status; bad for non-variables.
    pub value: DataValue,

    /// Access level.
    pub access_level: Option<AccessLevel>,

    /// Display name.
    pub display_name: Option<String>,

    /// Description.
    pub description: Option<String>,
}

const ATTRIBUTE_SET: [AttributeId; 5] = [
    AttributeId::NodeClass,
    AttributeId::Value,
    AttributeId::AccessLevel,
    AttributeId::DisplayName,
    AttributeId::Description,
];

impl NodeAttributes {
    fn from_values(node_id: NodeId, values: &[DataValue]) -> Self {
        let good = |i: usize| values.get(i).filter(|v| v.is_good()).map(|v| &v.value);
        Self {
            node_class: good(0)
                .and_then(OpcUaValue::as_i64)
                .and_then(|v| u32::try_from(v).ok())
                .and_then(NodeClass::from_value),
            value: values.get(1).cloned().unwrap_or_default(),
            access_level: good(2).and_then(OpcUaValue::as_byte).map(AccessLevel),
            display_name: good(3).and_then(OpcUaValue::as_str).map(str::to_string),
            description: good(4).and_then(OpcUaValue::as_str).map(str::to_string),
            node_id,
        }
    }
}

// =============================================================================
// ValueAccess
// =============================================================================

/// Reads and writes node values over the active session.
///
/// # Examples
///
/// ```
/// use bhs_opcua::client::{OpcUaValue, SessionManager, ValueAccess};
/// use bhs_opcua::simulation::SimulatedServer;
/// use bhs_opcua::types::{NodeId, OpcUaConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> bhs_opcua::OpcUaResult<()> {
/// let server = SimulatedServer::demo();
/// let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
/// session.connect(server.endpoint_url()).await?;
///
/// let access = ValueAccess::new(session);
/// let var_x = NodeId::string(2, "FolderA.VarX");
/// access.write_value(&var_x, OpcUaValue::Int32(100)).await?;
/// assert_eq!(access.read_value(&var_x).await?.value, OpcUaValue::Int32(100));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ValueAccess {
    session: SessionManager,
}

impl ValueAccess {
    /// Creates a value access layer over `session`.
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    fn request_timeout(&self) -> Duration {
        self.session.config().request_timeout
    }

    async fn exchange_read(&self, items: &[ReadValueId]) -> OpcUaResult<Vec<DataValue>> {
        let session = self.session.session()?;
        let timeout = self.request_timeout();
        let values = tokio::time::timeout(timeout, session.read(items))
            .await
            .map_err(|_| OpcUaError::operation_timeout("Read", timeout))??;
        if values.len() != items.len() {
            return Err(OpcUaError::operation(OperationError::response_mismatch(
                "Read",
                items.len(),
                values.len(),
            )));
        }
        Ok(values)
    }

    async fn exchange_write(&self, items: &[WriteValue]) -> OpcUaResult<Vec<StatusCode>> {
        let session = self.session.session()?;
        let timeout = self.request_timeout();
        let statuses = tokio::time::timeout(timeout, session.write(items))
            .await
            .map_err(|_| OpcUaError::operation_timeout("Write", timeout))??;
        if statuses.len() != items.len() {
            return Err(OpcUaError::operation(OperationError::response_mismatch(
                "Write",
                items.len(),
                statuses.len(),
            )));
        }
        Ok(statuses)
    }

    /// Reads the value attribute of `node_id`.
    ///
    /// A bad per-item status, or a fault on the whole Read request, is
    /// returned as `ReadFailed`. Having no session stays `NotConnected`.
    pub async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<DataValue> {
        let mut values = self
            .exchange_read(&[ReadValueId::value(node_id.clone())])
            .await
            .map_err(|e| match e {
                OpcUaError::Connection(ConnectionError::ServiceFault { status, .. }) => {
                    OpcUaError::read_failed(node_id.to_string(), status)
                }
                other => other,
            })?;
        let value = values.remove(0);
        if value.is_bad() {
            return Err(OpcUaError::read_failed(node_id.to_string(), value.status));
        }
        Ok(value)
    }

    /// Reads the value attributes of `node_ids` in one exchange.
    ///
    /// Results match the input positionally. Per-item failures stay in the
    /// returned values' statuses.
    pub async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<DataValue>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<ReadValueId> = node_ids.iter().cloned().map(ReadValueId::value).collect();
        self.exchange_read(&items).await
    }

    /// Reads class, value, access level, display name and description of
    /// each node in one exchange.
    pub async fn read_attributes(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<NodeAttributes>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<ReadValueId> = node_ids
            .iter()
            .flat_map(|node_id| {
                ATTRIBUTE_SET
                    .iter()
                    .map(move |attribute| ReadValueId::attribute(node_id.clone(), *attribute))
            })
            .collect();

        let values = self.exchange_read(&items).await?;
        Ok(node_ids
            .iter()
            .zip(values.chunks(ATTRIBUTE_SET.len()))
            .map(|(node_id, chunk)| NodeAttributes::from_values(node_id.clone(), chunk))
            .collect())
    }

    /// Returns `true` if the current value of `node_id` may be written.
    ///
    /// When the access level cannot be read the node is assumed writable and
    /// the write itself reports any refusal.
    pub async fn is_writable(&self, node_id: &NodeId) -> OpcUaResult<bool> {
        let mut values = self
            .exchange_read(&[ReadValueId::attribute(node_id.clone(), AttributeId::AccessLevel)])
            .await?;
        let value = values.remove(0);

        if value.is_bad() {
            tracing::debug!(
                node_id = %node_id,
                status = %value.status,
                "Access level unreadable, assuming writable"
            );
            return Ok(true);
        }

        Ok(value
            .value
            .as_byte()
            .map_or(true, |bits| AccessLevel(bits).is_writable()))
    }

    /// Writes `value` to `node_id`.
    ///
    /// The value is sent with good status and no timestamps. A bad per-item
    /// status is returned as `WriteFailed`.
    pub async fn write_value(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<()> {
        let statuses = self
            .exchange_write(&[WriteValue::value(node_id.clone(), value)])
            .await?;
        let status = statuses[0];
        if status.is_bad() {
            return Err(OpcUaError::write_failed(node_id.to_string(), status));
        }
        tracing::debug!(node_id = %node_id, "Value written");
        Ok(())
    }

    /// Writes `values[i]` to `node_ids[i]` in one exchange.
    ///
    /// Returns `true` only if every item was written. Lists of different
    /// lengths are rejected before anything is sent.
    pub async fn write_values(&self, node_ids: &[NodeId], values: &[OpcUaValue]) -> OpcUaResult<bool> {
        if node_ids.len() != values.len() {
            return Err(OpcUaError::operation(OperationError::batch_length_mismatch(
                node_ids.len(),
                values.len(),
            )));
        }
        if node_ids.is_empty() {
            return Ok(true);
        }

        let items: Vec<WriteValue> = node_ids
            .iter()
            .zip(values)
            .map(|(node_id, value)| WriteValue::value(node_id.clone(), value.clone()))
            .collect();
        let statuses = self.exchange_write(&items).await?;

        let mut all_good = true;
        for (node_id, status) in node_ids.iter().zip(&statuses) {
            if status.is_bad() {
                all_good = false;
                tracing::debug!(node_id = %node_id, status = %status, "Batch write item failed");
            }
        }
        Ok(all_good)
    }

    /// Starts reading the value of `node_id` without waiting.
    pub fn read_value_async(&self, node_id: &NodeId) -> PendingOperation<DataValue> {
        let access = self.clone();
        let node_id = node_id.clone();
        PendingOperation::spawn("Read", async move { access.read_value(&node_id).await })
    }

    /// Starts reading the values of `node_ids` without waiting.
    ///
    /// Results match the input positionally, as with
    /// [`read_values`](Self::read_values).
    pub fn read_values_async(&self, node_ids: &[NodeId]) -> PendingOperation<Vec<DataValue>> {
        let access = self.clone();
        let node_ids = node_ids.to_vec();
        PendingOperation::spawn("Read", async move { access.read_values(&node_ids).await })
    }

    /// Starts writing `value` to `node_id` without waiting.
    pub fn write_value_async(&self, node_id: &NodeId, value: OpcUaValue) -> PendingOperation<()> {
        let access = self.clone();
        let node_id = node_id.clone();
        PendingOperation::spawn("Write", async move { access.write_value(&node_id, value).await })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedServer;
    use crate::types::OpcUaConfig;

    fn var_x() -> NodeId {
        NodeId::string(2, "FolderA.VarX")
    }

    fn var_y() -> NodeId {
        NodeId::string(2, "FolderA.VarY")
    }

    async fn connected(server: &SimulatedServer) -> ValueAccess {
        let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        session.connect(server.endpoint_url()).await.unwrap();
        ValueAccess::new(session)
    }

    #[tokio::test]
    async fn test_read_value_bad_status_is_error() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let err = access
            .read_value(&NodeId::string(2, "Missing"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
        assert!(matches!(err, OpcUaError::Operation(OperationError::ReadFailed { .. })));
    }

    #[tokio::test]
    async fn test_read_values_keeps_bad_items() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let values = access
            .read_values(&[var_y(), NodeId::string(2, "Missing"), var_x()])
            .await
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].value, OpcUaValue::from("hi"));
        assert_eq!(values[1].status, StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(values[2].value, OpcUaValue::Int32(42));
        assert_eq!(server.read_count(), 1);
    }

    #[tokio::test]
    async fn test_read_attributes() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let attributes = access
            .read_attributes(&[var_x(), NodeId::string(2, "FolderA")])
            .await
            .unwrap();
        assert_eq!(attributes[0].node_class, Some(NodeClass::Variable));
        assert_eq!(attributes[0].display_name.as_deref(), Some("VarX"));
        assert_eq!(attributes[0].access_level.map(|a| a.to_string()).as_deref(), Some("CurrentReadOrWrite"));
        assert_eq!(attributes[1].node_class, Some(NodeClass::Object));
        assert!(attributes[1].access_level.is_none());
        assert!(attributes[1].value.is_bad());
    }

    #[tokio::test]
    async fn test_is_writable() {
        let server = SimulatedServer::demo();
        let read_only = NodeId::string(2, "FolderA.ReadOnly");
        server.add_variable(
            &NodeId::string(2, "FolderA"),
            read_only.clone(),
            "ReadOnly",
            1i32,
            AccessLevel::CURRENT_READ,
        );
        server.set_attribute_status(&var_y(), AttributeId::AccessLevel, StatusCode::BAD_NOT_READABLE);
        let access = connected(&server).await;

        assert!(access.is_writable(&var_x()).await.unwrap());
        assert!(!access.is_writable(&read_only).await.unwrap());
        assert!(access.is_writable(&var_y()).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_value_bad_status_is_error() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let err = access
            .write_value(&var_x(), OpcUaValue::from("not a number"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_TYPE_MISMATCH));
        assert_eq!(server.value(&var_x()), Some(OpcUaValue::Int32(42)));
    }

    #[tokio::test]
    async fn test_write_values() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let ok = access
            .write_values(&[var_x(), var_y()], &[OpcUaValue::Int32(1), OpcUaValue::from("a")])
            .await
            .unwrap();
        assert!(ok);

        let partial = access
            .write_values(&[var_x(), var_y()], &[OpcUaValue::Int32(2), OpcUaValue::Int32(3)])
            .await
            .unwrap();
        assert!(!partial);
        assert_eq!(server.value(&var_x()), Some(OpcUaValue::Int32(2)));
    }

    #[tokio::test]
    async fn test_write_values_length_mismatch() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let err = access
            .write_values(&[var_x(), var_y()], &[OpcUaValue::Int32(1)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Operation(OperationError::BatchLengthMismatch { nodes: 2, values: 1 })
        ));
        assert_eq!(server.write_count(), 0);
    }

    #[tokio::test]
    async fn test_async_read_and_write() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        access
            .write_value_async(&var_x(), OpcUaValue::Int32(7))
            .await
            .unwrap();
        let value = access
            .read_value_async(&var_x())
            .wait_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value.value, OpcUaValue::Int32(7));

        let failed = access
            .write_value_async(&NodeId::string(2, "Missing"), OpcUaValue::Int32(1))
            .await;
        assert!(failed.is_err());
    }

    #[tokio::test]
    async fn test_read_value_rejected_request_is_read_failed() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;
        server.set_fail_read(true);

        let err = access.read_value(&var_x()).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Operation(OperationError::ReadFailed { .. })));
        assert_eq!(err.status_code(), Some(StatusCode::BAD_COMMUNICATION_ERROR));

        let err = access.read_value_async(&var_x()).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Operation(OperationError::ReadFailed { .. })));

        server.set_fail_read(false);
        assert_eq!(access.read_value(&var_x()).await.unwrap().value, OpcUaValue::Int32(42));
    }

    #[tokio::test]
    async fn test_read_values_async_is_positional() {
        let server = SimulatedServer::demo();
        let access = connected(&server).await;

        let values = access
            .read_values_async(&[var_x(), NodeId::string(2, "Missing"), var_y()])
            .wait_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].value, OpcUaValue::Int32(42));
        assert_eq!(values[1].status, StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(values[2].value, OpcUaValue::from("hi"));
        assert_eq!(server.read_count(), 1);

        let empty = access.read_values_async(&[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_not_connected() {
        let server = SimulatedServer::demo();
        let session = SessionManager::new(OpcUaConfig::new(server.endpoint_url()), server.transport());
        let access = ValueAccess::new(session);
        let err = access.read_value(&var_x()).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Connection(_)));
    }
}
