//! Delivery-domain tools
//!
//! The tools the specialist agents expose to their reasoning loops. All of
//! them act through the [`RecordStore`] trait; the mutating ones use its
//! conditional-write discipline so concurrent invocations against the same
//! record fail loudly instead of overwriting each other.
//!
//! Record key layout: `order:{orderId}`, `refund:{deliveryId}`,
//! `inventory:{sku}`, `notification:{target}`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    protocol::error::ToolError,
    store::{RecordStore, VersionedRecord},
    tool::{required_str, ToolHandler, ToolSpec},
};

fn tenant_or_err(tenant: Option<&str>) -> Result<&str, ToolError> {
    tenant.ok_or_else(|| ToolError::new("TENANT_REQUIRED", "tool invoked without tenant context"))
}

async fn fetch_record(
    store: &dyn RecordStore,
    tenant: &str,
    key: &str,
) -> Result<VersionedRecord, ToolError> {
    match store.get(tenant, key).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ToolError::new(
            "RECORD_NOT_FOUND",
            format!("no record stored under '{key}'"),
        )),
        Err(err) => Err(err.into_tool_error()),
    }
}

/// Update an order's status (order agent)
pub struct UpdateOrderStatus {
    store: Arc<dyn RecordStore>,
}

impl UpdateOrderStatus {
    /// Build the registrable spec for this tool
    pub fn spec(store: Arc<dyn RecordStore>) -> ToolSpec {
        ToolSpec::new(
            "update_order_status",
            "Update the status of an existing order, optionally attaching a note.",
            json!({
                "type": "object",
                "properties": {
                    "orderId": { "type": "string" },
                    "status": { "type": "string" },
                    "note": { "type": "string" }
                },
                "required": ["orderId", "status"]
            }),
            Arc::new(Self { store }),
        )
        .multi_tenant()
    }
}

#[async_trait]
impl ToolHandler for UpdateOrderStatus {
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant_or_err(tenant)?;
        let order_id = required_str(&input, "orderId")?;
        let status = required_str(&input, "status")?;

        let key = format!("order:{order_id}");
        let mut record = fetch_record(self.store.as_ref(), tenant, &key).await?;
        if !record.value.is_object() {
            return Err(ToolError::new(
                "MALFORMED_RECORD",
                format!("record '{key}' is not an object"),
            ));
        }

        record.value["status"] = json!(status);
        if let Some(note) = input.get("note").and_then(Value::as_str) {
            if !record.value["notes"].is_array() {
                record.value["notes"] = json!([]);
            }
            if let Some(notes) = record.value["notes"].as_array_mut() {
                notes.push(json!(note));
            }
        }

        let updated = self
            .store
            .update(tenant, &key, record.version, record.value)
            .await
            .map_err(|err| err.into_tool_error())?;

        Ok(json!({
            "orderId": order_id,
            "status": status,
            "version": updated.version,
        }))
    }
}

/// Recreate a lost or damaged order as a replacement (order agent)
pub struct RecreateOrder {
    store: Arc<dyn RecordStore>,
}

impl RecreateOrder {
    /// Build the registrable spec for this tool
    pub fn spec(store: Arc<dyn RecordStore>) -> ToolSpec {
        ToolSpec::new(
            "recreate_order",
            "Recreate an order as a replacement shipment for a lost or damaged delivery.",
            json!({
                "type": "object",
                "properties": {
                    "orderId": { "type": "string" }
                },
                "required": ["orderId"]
            }),
            Arc::new(Self { store }),
        )
        .multi_tenant()
    }
}

#[async_trait]
impl ToolHandler for RecreateOrder {
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant_or_err(tenant)?;
        let order_id = required_str(&input, "orderId")?;

        let original = fetch_record(self.store.as_ref(), tenant, &format!("order:{order_id}")).await?;

        let replacement_id = format!("{order_id}-R");
        let mut replacement = original.value.clone();
        replacement["status"] = json!("recreated");
        replacement["replacementOf"] = json!(order_id);

        match self
            .store
            .create(tenant, &format!("order:{replacement_id}"), replacement)
            .await
        {
            Ok(_) => Ok(json!({ "replacementOrderId": replacement_id })),
            Err(crate::protocol::error::MeshError::Conflict { .. }) => Err(ToolError::new(
                "ORDER_ALREADY_RECREATED",
                format!("a replacement for {order_id} already exists"),
            )),
            Err(err) => Err(err.into_tool_error()),
        }
    }
}

/// Issue a refund for a delivery (payment agent)
///
/// At-most-once: the refund record is created conditionally, keyed by the
/// delivery id, so a retried or duplicated call cannot refund twice.
pub struct IssueRefund {
    store: Arc<dyn RecordStore>,
}

impl IssueRefund {
    /// Build the registrable spec for this tool
    pub fn spec(store: Arc<dyn RecordStore>) -> ToolSpec {
        ToolSpec::new(
            "issue_refund",
            "Issue a refund for a delivery. Set expedite for high-value or priority cases.",
            json!({
                "type": "object",
                "properties": {
                    "deliveryId": { "type": "string" },
                    "orderId": { "type": "string" },
                    "amount": { "type": "number" },
                    "expedite": { "type": "boolean" }
                },
                "required": ["deliveryId", "orderId", "amount"]
            }),
            Arc::new(Self { store }),
        )
        .multi_tenant()
    }
}

#[async_trait]
impl ToolHandler for IssueRefund {
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant_or_err(tenant)?;
        let delivery_id = required_str(&input, "deliveryId")?;
        let order_id = required_str(&input, "orderId")?;
        let amount = input
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::new("INVALID_INPUT", "missing property 'amount'"))?;
        let expedite = input
            .get("expedite")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let key = format!("refund:{delivery_id}");
        let refund = json!({
            "orderId": order_id,
            "amount": amount,
            "expedite": expedite,
            "issuedAt": Utc::now(),
        });

        match self.store.create(tenant, &key, refund).await {
            Ok(_) => Ok(json!({
                "refundId": key,
                "amount": amount,
                "expedite": expedite,
            })),
            Err(crate::protocol::error::MeshError::Conflict { .. }) => Err(ToolError::new(
                "REFUND_ALREADY_ISSUED",
                format!("a refund for {delivery_id} was already issued"),
            )
            .with_details(json!({ "refundId": key }))),
            Err(err) => Err(err.into_tool_error()),
        }
    }
}

/// Allocate replacement inventory (warehouse agent)
pub struct AllocateInventory {
    store: Arc<dyn RecordStore>,
}

impl AllocateInventory {
    /// Build the registrable spec for this tool
    pub fn spec(store: Arc<dyn RecordStore>) -> ToolSpec {
        ToolSpec::new(
            "allocate_inventory",
            "Allocate units of a SKU from warehouse stock for a replacement shipment.",
            json!({
                "type": "object",
                "properties": {
                    "sku": { "type": "string" },
                    "quantity": { "type": "integer" }
                },
                "required": ["sku", "quantity"]
            }),
            Arc::new(Self { store }),
        )
        .multi_tenant()
    }
}

#[async_trait]
impl ToolHandler for AllocateInventory {
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant_or_err(tenant)?;
        let sku = required_str(&input, "sku")?;
        let quantity = input
            .get("quantity")
            .and_then(Value::as_i64)
            .ok_or_else(|| ToolError::new("INVALID_INPUT", "missing property 'quantity'"))?;

        let key = format!("inventory:{sku}");
        let mut record = fetch_record(self.store.as_ref(), tenant, &key).await?;

        let available = record.value["available"].as_i64().unwrap_or(0);
        if available < quantity {
            return Err(ToolError::new(
                "INSUFFICIENT_INVENTORY",
                format!("{available} units of {sku} available, {quantity} requested"),
            ));
        }

        record.value["available"] = json!(available - quantity);
        let updated = self
            .store
            .update(tenant, &key, record.version, record.value)
            .await
            .map_err(|err| err.into_tool_error())?;

        Ok(json!({
            "sku": sku,
            "allocated": quantity,
            "remaining": updated.value["available"],
        }))
    }
}

/// Record an outbound customer notification
///
/// Delivery itself (email, SMS) is an external concern; this tool records
/// the communication so the resolution trail always shows the customer was
/// told what happened.
pub struct NotifyCustomer {
    store: Arc<dyn RecordStore>,
}

impl NotifyCustomer {
    /// Build the registrable spec for this tool
    pub fn spec(store: Arc<dyn RecordStore>) -> ToolSpec {
        ToolSpec::new(
            "notify_customer",
            "Send the customer a message about their delivery and record it on the case.",
            json!({
                "type": "object",
                "properties": {
                    "deliveryId": { "type": "string" },
                    "message": { "type": "string" }
                },
                "required": ["deliveryId", "message"]
            }),
            Arc::new(Self { store }),
        )
        .multi_tenant()
    }
}

#[async_trait]
impl ToolHandler for NotifyCustomer {
    async fn execute(&self, tenant: Option<&str>, input: Value) -> Result<Value, ToolError> {
        let tenant = tenant_or_err(tenant)?;
        let delivery_id = required_str(&input, "deliveryId")?;
        let message = required_str(&input, "message")?;

        let key = format!("notification:{delivery_id}");
        let mut notifications = match self.store.get(tenant, &key).await {
            Ok(Some(record)) => record.value.as_array().cloned().unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => return Err(err.into_tool_error()),
        };
        notifications.push(json!({ "message": message, "sentAt": Utc::now() }));
        let count = notifications.len();

        self.store
            .put(tenant, &key, Value::Array(notifications))
            .await
            .map_err(|err| err.into_tool_error())?;

        Ok(json!({ "notified": true, "count": count }))
    }
}

/// Tool set for the order specialist
pub fn order_tools(store: &Arc<dyn RecordStore>) -> Vec<ToolSpec> {
    vec![
        UpdateOrderStatus::spec(store.clone()),
        RecreateOrder::spec(store.clone()),
        NotifyCustomer::spec(store.clone()),
    ]
}

/// Tool set for the payment specialist
pub fn payment_tools(store: &Arc<dyn RecordStore>) -> Vec<ToolSpec> {
    vec![
        IssueRefund::spec(store.clone()),
        NotifyCustomer::spec(store.clone()),
    ]
}

/// Tool set for the warehouse specialist
pub fn warehouse_tools(store: &Arc<dyn RecordStore>) -> Vec<ToolSpec> {
    vec![
        AllocateInventory::spec(store.clone()),
        NotifyCustomer::spec(store.clone()),
    ]
}
