pub mod backend;
pub mod connection;
pub mod constants;
pub mod packet;
pub mod types;
