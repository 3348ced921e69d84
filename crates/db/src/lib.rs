pub mod connection;
pub mod migrations;
pub mod sheet;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use sheet::SqlSheetStore;
