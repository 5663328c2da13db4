//! Stable topic names.

/// Published by the orders service once an order has been persisted.
pub const ORDER_CREATED: &str = "order.created";

/// Published by the reservation saga when every line item was committed.
pub const INVENTORY_RESERVED: &str = "inventory.reserved";

/// Published by the reservation saga when at least one line item could not be committed.
pub const INVENTORY_INSUFFICIENT: &str = "inventory.insufficient";

pub const PAYMENT_CREATED: &str = "payment.created";
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const PAYMENT_FAILED: &str = "payment.failed";

pub const SHIPPING_LABEL_CREATED: &str = "shipping.label.created";

pub const CAMPAIGN_CREATED: &str = "group-commerce.campaign.created";
pub const CAMPAIGN_JOINED: &str = "group-commerce.campaign.joined";
pub const CAMPAIGN_SUCCESSFUL: &str = "group-commerce.campaign.successful";
