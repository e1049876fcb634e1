//! CLI command implementations

pub mod local;
pub mod remote;
pub mod server;
pub mod store;

pub use local::execute as local;
pub use remote::execute as remote;
pub use server::execute as server;
pub use store::execute as store;
