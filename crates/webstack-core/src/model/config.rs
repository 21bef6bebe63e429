//! デプロイ構成

use crate::compute::ComputeSpec;
use crate::context::DeploymentContext;
use crate::database::{DatabaseCredentials, DatabaseSpec};
use crate::error::Result;
use crate::model::DeploymentVariant;
use crate::network::NetworkSpec;
use crate::secret::SecretSource;
use serde::{Deserialize, Serialize};
use webstack_config::AccountEnvironment;

/// データベースの管理者資格情報の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: SecretSource,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: SecretSource::Env("WEBSTACK_DB_PASSWORD".to_string()),
        }
    }
}

impl CredentialsConfig {
    /// 秘密情報を解決して資格情報を作る
    pub fn resolve(&self) -> Result<DatabaseCredentials> {
        let password = self.password.resolve("database.password")?;
        Ok(DatabaseCredentials::new(self.username.clone(), password))
    }
}

/// 1つのデプロイの構成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub project: String,
    pub environment: String,
    pub domain: String,
    pub variant: DeploymentVariant,
    pub network: NetworkSpec,
    /// キーペアの物理名（未指定なら命名規則から導出）
    pub key_pair: Option<String>,
    pub database: DatabaseSpec,
    pub credentials: CredentialsConfig,
    pub compute: ComputeSpec,
}

impl DeploymentConfig {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            domain: domain.into(),
            variant: DeploymentVariant::default(),
            network: NetworkSpec::default(),
            key_pair: None,
            database: DatabaseSpec::default(),
            credentials: CredentialsConfig::default(),
            compute: ComputeSpec::default(),
        }
    }

    /// アカウント・リージョンと組み合わせてコンテキストを作る
    pub fn context(&self, account: &AccountEnvironment) -> DeploymentContext {
        DeploymentContext::new(
            &self.project,
            &self.environment,
            &self.domain,
            &account.account,
            &account.region,
        )
    }
}
