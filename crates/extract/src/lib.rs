mod constraint;
mod consts;
mod context;
mod doc;
pub mod error;
mod gomod;
mod load;
pub mod models;
mod source;
mod version;

pub use crate::constraint::{Expr, parse_go_build, parse_plus_build};
pub use crate::context::BuildContext;
pub use crate::doc::{render as render_documentation, synopsis};
pub use crate::gomod::{GoMod, Retraction, parse_go_mod};
pub use crate::load::{LoadedPackage, Loader, SourceFile, load_package};
pub use crate::source::{Decl, DeclKind, ParsedFile, parse_file};
pub use crate::version::{
    VersionKind, check_module_path, compare as compare_versions, parse as parse_version, repository_url,
};

/// Module path of the standard library, whose packages are imported by their
/// bare directory path.
pub const STD_MODULE: &str = consts::STD_MODULE;
