//! # Repositories
//!
//! One repository per aggregate. Each wraps the shared pool and exposes
//! async CRUD plus the transactional operations the domain needs. Writes
//! that must be atomic across tables (checkout) live in
//! [`crate::checkout`], which borrows the same building blocks on a single
//! transaction.

pub mod coupon;
pub mod inventory;
pub mod order;
pub mod product;
pub mod tax;
