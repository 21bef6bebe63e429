use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("テンプレートエラー: {file}\n理由: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error(transparent)]
    Config(#[from] webstack_config::ConfigError),

    #[error("1Passwordエラー: {0}")]
    OnePasswordError(String),

    #[error("シークレットが設定されていません: {0}")]
    MissingSecret(String),

    #[error("無効なデプロイ構成: {0}")]
    InvalidVariant(String),

    #[error("無効なアドレス空間: {0}")]
    InvalidCidr(String),

    #[error("アドレス空間 {cidr} に /{mask} のサブネットを {needed} 個確保できません（最大 {available} 個）")]
    AddressSpaceExhausted {
        cidr: String,
        mask: u8,
        needed: u32,
        available: u32,
    },

    #[error("データベース '{0}' は publicly_accessible = true を要求しています（プライベートサブネットのみ許可）")]
    PubliclyAccessibleDatabase(String),

    #[error("ストレージ上限 {max}GB が初期割り当て {allocated}GB より小さい値です")]
    InvalidStorage { allocated: u32, max: u32 },

    #[error("{resource} には最低 {required} 個のアベイラビリティゾーンが必要です（指定: {actual}）")]
    InsufficientZones {
        resource: String,
        required: u32,
        actual: u32,
    },

    #[error("{resource} に {requested} 個のアベイラビリティゾーンは指定できません（最大 {max} 個）")]
    TooManyZones {
        resource: String,
        requested: u32,
        max: u32,
    },

    #[error("リソースが重複しています: {0}")]
    DuplicateResource(String),

    #[error("未定義のリソースを参照しています: {resource} → {reference}")]
    UnknownReference { resource: String, reference: String },

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    #[error("{resource} がパブリックサブネット {subnet} に配置されています")]
    PublicPlacement { resource: String, subnet: String },

    #[error("ファイアウォールルールが不正です: {0}")]
    FirewallRuleViolation(String),

    #[error("ロードバランサー {0} に CDN とダイレクトエイリアスが同時に接続されています")]
    ConflictingEdgeRouting(String),

    #[error("アンカー行が見つかりません: {0}")]
    AnchorNotFound(String),

    #[error("プロバイダーエラー: {0}")]
    Cloud(#[from] webstack_cloud::CloudError),
}

impl StackError {
    /// Errors raised while building declarations, before any provider call
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            StackError::InvalidVariant(_)
                | StackError::InvalidCidr(_)
                | StackError::AddressSpaceExhausted { .. }
                | StackError::PubliclyAccessibleDatabase(_)
                | StackError::InvalidStorage { .. }
                | StackError::InsufficientZones { .. }
                | StackError::TooManyZones { .. }
                | StackError::DuplicateResource(_)
                | StackError::UnknownReference { .. }
                | StackError::CircularDependency(_)
                | StackError::PublicPlacement { .. }
                | StackError::FirewallRuleViolation(_)
                | StackError::ConflictingEdgeRouting(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
