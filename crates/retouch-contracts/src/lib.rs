pub mod chat;
pub mod events;
pub mod images;
pub mod ledger;
pub mod models;
pub mod session;
pub mod store;
