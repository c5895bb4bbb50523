pub mod client;
pub mod data;
pub mod endpoints;
