pub mod archive;
pub mod command;
pub mod config;
pub mod driver;
pub mod errors;
pub mod files;
pub mod http;
pub mod permission;
pub mod protocol;
pub mod registry;
pub mod resource;

pub use command::{CommandEnvelope, CommandOutput};
pub use config::DriverConfig;
pub use driver::Driver;
pub use errors::DriverError;
pub use permission::Permission;
