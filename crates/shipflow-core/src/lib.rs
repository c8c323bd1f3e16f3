//! shipflow core
//!
//! deploy.yml のデータモデル、ローダー、ソースコード取得を提供します。

pub mod error;
pub mod loader;
pub mod model;
pub mod source;

pub use error::{ManifestError, Result, SourceError};
pub use loader::{load_manifest_file, parse_manifest};
pub use model::*;
pub use source::{CodeSource, GitRef, GitSource, MANIFEST_PATH};
