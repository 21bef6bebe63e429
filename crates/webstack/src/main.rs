mod commands;
mod utils;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "webstack")]
#[command(about = "WordPressホスティング環境をKDLひとつで構築する", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は自動検出）
    #[arg(short, long, global = true, env = "WEBSTACK_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// 宣言されたリソースを出力（プロバイダーは呼ばない）
    Synth {
        /// 出力形式
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// 現在のステートとの差分を表示
    Plan,
    /// 環境を構築・更新
    Up {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 環境を削除
    Down {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 設定を検証
    Validate,
    /// ホストの起動スクリプトを表示
    Script {
        /// パスワードを伏せずに表示
        #[arg(long)]
        show_secrets: bool,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 標準出力は合成結果などに使うので、ログはstderrに出す
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("webstack {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let workspace = utils::Workspace::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Synth { format } => commands::synth::handle(&workspace, format)?,
        Commands::Plan => commands::plan::handle(&workspace).await?,
        Commands::Up { yes } => commands::up::handle(&workspace, yes).await?,
        Commands::Down { yes } => commands::down::handle(&workspace, yes).await?,
        Commands::Validate => commands::validate::handle(&workspace)?,
        Commands::Script { show_secrets } => commands::script::handle(&workspace, show_secrets)?,
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
