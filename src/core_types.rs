//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

use uuid::Uuid;

/// User ID - globally unique, immutable after assignment.
///
/// Assigned at auto-registration (first observed email) and used as the
/// key for rate tokens and purchase state in the coordination store.
pub type UserId = Uuid;

/// Product ID - identifies a product and its 1:1 stock row.
pub type ProductId = Uuid;

/// Flash sale ID - identifies one time-bounded selling window.
pub type SaleId = Uuid;

/// Order ID - unique within the system
pub type OrderId = Uuid;

/// Purchase job ID - handed back to the client on admission (202) and
/// used to poll job state until it reaches a terminal status.
pub type JobId = Uuid;
