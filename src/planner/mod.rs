pub mod data;
pub mod endpoints;
pub mod migrate;
pub mod remote;
pub mod repository;
pub mod store;
pub mod visibility;
