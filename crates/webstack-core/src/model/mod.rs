//! モデル定義
//!
//! 設定ファイルから読み込まれるデプロイ構成と、そのバリアントを定義します。

mod config;
mod variant;

pub use config::*;
pub use variant::*;
