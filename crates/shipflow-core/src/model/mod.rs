//! モデル定義
//!
//! deploy.yml を表すデータモデルを定義します。
//! デプロイ対象の種類 (サービス・run task・スケジュールタスク) ごとに
//! 型を分けています。

mod container;
mod manifest;
mod scheduled;
mod service;
mod task;

// Re-exports
pub use container::*;
pub use manifest::*;
pub use scheduled::*;
pub use service::*;
pub use task::*;
