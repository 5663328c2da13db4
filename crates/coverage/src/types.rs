//! Wire types exchanged with the orchestration authority.

use serde::{Deserialize, Serialize};

/// A routing assignment for a destination region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageLane {
    pub lane_id: String,
    pub owner: String,
    pub owner_type: String,
    pub sla_hours: u32,
}

/// One line of a checkout policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLine {
    pub sku: String,
    pub category: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheckRequest {
    pub brand_id: String,
    pub destination_state: String,
    pub lines: Vec<PolicyLine>,
}

/// Per-category verdict within a policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheck {
    pub category: String,
    pub quantity: u32,
    #[serde(rename = "requiredMOQ")]
    pub required_moq: u32,
    pub compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheckResponse {
    pub compliant: bool,
    pub coverage_lane: String,
    pub expected_sla_hours: u32,
    #[serde(default)]
    pub checks: Vec<PolicyCheck>,
    #[serde(default)]
    pub automation_notes: Vec<String>,
}

/// Breadth of a rebalance workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceScope {
    National,
    Regional,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    pub brand_id: String,
    pub reason: String,
    pub scope: RebalanceScope,
}

/// Handle of a workflow started by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub status: String,
}
