use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: webstack.local.kdl, .webstack.local.kdl, webstack.kdl, .webstack.kdl\n\
        - ./.webstack/ ディレクトリ\n\
        - ~/.config/webstack/webstack.kdl\n\
        または WEBSTACK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("環境変数 {0} が設定されていません")]
    MissingEnvVar(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
