pub mod agent;
pub mod assembler;
pub mod demux;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod providers;
pub mod registry;
pub mod session;
pub mod tools;
