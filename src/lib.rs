pub mod authority;
pub mod claims;
pub mod codec;
pub mod config;
pub mod constant;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod permission;
pub mod request;
pub mod store;
pub mod util;
