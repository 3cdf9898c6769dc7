//! Application layer containing the escrow orchestration.
//!
//! `EscrowService` is the state machine fronting every escrow operation; it
//! consults the `DecisionEngine` before releasing funds.

pub mod decision;
pub mod escrow;
