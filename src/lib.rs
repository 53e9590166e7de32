pub mod alias;
pub mod catalog;
pub mod completion;
pub mod disk;
pub mod error;
pub mod fetch;
pub mod footprint;
pub mod poll;
pub mod query_log;
pub mod region;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod worker;
