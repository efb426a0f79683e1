pub mod auth;
pub mod graphql;
pub mod health;
pub mod recovery;
pub mod types;
pub(crate) mod utils;
