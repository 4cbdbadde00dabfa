mod path;

pub use path::{PathValidator, SandboxPath};
