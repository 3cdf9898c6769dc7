//! Domain model of the escrow core: value types, the order record, decision
//! records, the authorization guard and the ports adapters must implement.

pub mod decision;
pub mod guard;
pub mod money;
pub mod notification;
pub mod order;
pub mod ports;
