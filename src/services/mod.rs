//! Business logic. The movement engine ([`movements`]) is the only writer of
//! the ledger and balances; the order services drive fulfillment through it.

pub mod balances;
pub mod customers;
pub mod movements;
pub mod products;
pub mod purchase_orders;
pub mod sales_orders;
pub mod stock_locks;
pub mod suppliers;
pub mod warehouses;
