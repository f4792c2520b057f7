pub mod errors;
pub mod registry;

pub use errors::SessionError;
pub use registry::Session;
pub use registry::SessionRegistry;
