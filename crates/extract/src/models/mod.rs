mod module;
mod package;

pub use self::module::{ModuleVersion, Readme};
pub use self::package::{Package, import_path};
