pub mod broker;
pub mod dispatcher;
pub mod logging;
pub mod registry;
pub mod server;

pub use broker::{ObjectBroker, ObjectTable, Servant};
pub use dispatcher::Dispatcher;
pub use logging::{init_logging, init_test_logging};
pub use registry::{Invocation, MethodHandler, MethodRegistry, RegistryError, RegistryPhase};
pub use server::{Server, ServerConfig};
