//! Catalog: users, products and flash sales
//!
//! Storage-layout structs and their repositories. API projections live in
//! the gateway layer; each entity has exactly one conversion path.

pub mod models;
pub mod repository;

pub use models::{FlashSale, Product, Role, SaleStatus, User};
pub use repository::{ProductRepository, SaleRepository, UserRepository};
