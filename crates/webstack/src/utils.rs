use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use webstack_cloud::{ActionType, ApplyResult, CloudProvider, Plan};
use webstack_cloud_local::LocalProvider;
use webstack_config::AccountEnvironment;
use webstack_core::{
    DatabaseCredentials, Deployment, DeploymentConfig, DeploymentContext, Engine, EngineOptions,
};

/// ローカルプロバイダーでは検証待ちを短い間隔で確認する
const LOCAL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 読み込んだ設定と実行環境
pub struct Workspace {
    pub config_path: PathBuf,
    pub project_root: PathBuf,
    pub config: DeploymentConfig,
    pub account: AccountEnvironment,
    pub context: DeploymentContext,
}

impl Workspace {
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => webstack_config::find_config_file()?,
        };
        let project_root = webstack_core::project_dir(&config_path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let config = webstack_core::load_config_from_path(&config_path)?;
        let account = AccountEnvironment::from_env()?;
        let context = config.context(&account);
        tracing::debug!(
            config = %config_path.display(),
            stack = %context.stack_name(),
            "Loaded workspace"
        );

        Ok(Self {
            config_path,
            project_root,
            config,
            account,
            context,
        })
    }

    pub fn credentials(&self) -> anyhow::Result<DatabaseCredentials> {
        Ok(self.config.credentials.resolve()?)
    }

    /// プロバイダー呼び出しなしでデプロイを組み立てる
    pub fn assemble(&self) -> anyhow::Result<(Deployment, DatabaseCredentials)> {
        let credentials = self.credentials()?;
        let deployment = webstack_core::assemble(&self.context, &self.config, &credentials)?;
        Ok((deployment, credentials))
    }

    pub fn engine(&self) -> Engine<LocalProvider> {
        let provider = LocalProvider::new(
            &self.project_root,
            &self.account.account,
            &self.account.region,
        );
        Engine::new(
            provider,
            EngineOptions {
                validation_poll_interval: LOCAL_POLL_INTERVAL,
                ..Default::default()
            },
        )
    }

    /// エンジンを用意し、プロバイダーの認証を確認する
    pub async fn connect(&self) -> anyhow::Result<Engine<LocalProvider>> {
        let engine = self.engine();
        let provider = engine.provider();
        let auth = provider.check_auth().await?;
        if !auth.authenticated {
            anyhow::bail!(
                "{} の認証に失敗しました: {}",
                provider.display_name(),
                auth.error.unwrap_or_default()
            );
        }
        println!(
            "プロバイダー: {} ({})",
            provider.display_name().cyan(),
            auth.account_info.unwrap_or_default()
        );
        Ok(engine)
    }

    pub fn print_header(&self) {
        println!("📄 設定ファイル: {}", self.config_path.display().to_string().cyan());
        println!(
            "スタック: {} ({} / {})",
            self.context.stack_name().cyan(),
            self.account.account,
            self.account.region
        );
    }
}

/// 計画を表示
pub fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        let line = format!("{} ({})", action.resource_key(), action.description);
        match action.action_type {
            ActionType::Create => println!("  {} {}", "+".green().bold(), line.green()),
            ActionType::Update => println!("  {} {}", "~".yellow().bold(), line.yellow()),
            ActionType::Delete => println!("  {} {}", "-".red().bold(), line.red()),
            ActionType::NoOp => println!("  {} {}", "=".dimmed(), line.dimmed()),
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

/// 適用結果を表示
pub fn print_apply_result(result: &ApplyResult) {
    for success in &result.succeeded {
        println!("  {} {}", "✓".green(), success.message);
    }
    for pending in &result.pending {
        println!("  {} {}", "…".yellow(), pending.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red().bold(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("")
        );
    }
    for skipped in &result.skipped {
        println!(
            "  {} {} ({} が未完了のためスキップ)",
            "-".dimmed(),
            skipped.action_id.dimmed(),
            skipped.blocked_by
        );
    }
    println!();
    println!(
        "完了: {} 成功, {} 失敗, {} 検証待ち, {} スキップ ({}ms)",
        result.succeeded.len(),
        result.failed.len(),
        result.pending.len(),
        result.skipped.len(),
        result.duration_ms
    );
}
