pub mod layout;
pub mod loader;
pub mod schema;
pub mod store;

pub use layout::{build_factory, load_config, load_factory, load_layout};
pub use loader::DataLoadError;
pub use store::JsonFileStore;
