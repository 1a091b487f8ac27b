pub mod types;
pub mod graph;
pub mod validator;
pub mod options;
pub mod resolver;
pub mod loader;

pub use types::*;
pub use graph::*;
pub use validator::*;
pub use options::*;
pub use resolver::*;
pub use loader::*;
