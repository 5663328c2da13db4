//! Order-side payloads and the helpers turning them into policy checks.

use serde::{Deserialize, Serialize};

use crate::types::{PolicyCheckRequest, PolicyLine};

/// Category used for lines that do not name one.
pub const DEFAULT_POLICY_CATEGORY: &str = "General";

/// A line as entered by the storefront; the category may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLineInput {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub quantity: u32,
}

impl PolicyLineInput {
    pub fn new(sku: impl Into<String>, category: Option<&str>, quantity: u32) -> Self {
        Self {
            sku: sku.into(),
            category: category.map(String::from),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub brand_id: String,
    pub destination_state: String,
    pub items: Vec<PolicyLineInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPreviewRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub brand_id: String,
    pub destination_state: String,
    pub items: Vec<PolicyLineInput>,
}

/// A priced checkout line sent when creating an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub sku: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub quantity: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub items: Vec<CheckoutLine>,
}

/// Fills in `fallback_category` for lines without a (non-empty) category.
pub fn normalize_policy_lines(items: &[PolicyLineInput], fallback_category: &str) -> Vec<PolicyLine> {
    items
        .iter()
        .map(|item| PolicyLine {
            sku: item.sku.clone(),
            category: item
                .category
                .as_deref()
                .filter(|c| !c.is_empty())
                .unwrap_or(fallback_category)
                .to_string(),
            quantity: item.quantity,
        })
        .collect()
}

/// Builds the authority's policy check for a draft order.
pub fn policy_request_from_draft(draft: &OrderDraft) -> PolicyCheckRequest {
    PolicyCheckRequest {
        brand_id: draft.brand_id.clone(),
        destination_state: draft.destination_state.clone(),
        lines: normalize_policy_lines(&draft.items, DEFAULT_POLICY_CATEGORY),
    }
}
