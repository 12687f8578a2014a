pub mod connection;
pub mod counter;
pub mod migrations;
pub mod runtime;
pub mod sheet;

pub use connection::{connect, connect_with_config, connect_with_settings, probe, DbPool};
pub use counter::SqliteSequenceCounter;
pub use runtime::{build_engine, EngineBuildError};
pub use sheet::SqliteTable;
