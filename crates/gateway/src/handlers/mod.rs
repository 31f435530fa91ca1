//! API handlers module

pub mod articles;
pub mod comments;
pub mod engagement;
pub mod health;
pub mod taxonomy;
