use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TEST_PASSWORD: &str = "s3cret-pass";

/// 一時ディレクトリ上のテスト用プロジェクト
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.path().join("webstack.kdl");
        fs::write(&path, content).unwrap();
        path
    }

    /// 環境変数を設定したコマンド
    #[allow(deprecated)]
    pub fn command(&self, config: &Path) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("webstack").unwrap();
        cmd.current_dir(self.path())
            .env("WEBSTACK_CONFIG_PATH", config)
            .env("WEBSTACK_ACCOUNT", "123456789012")
            .env("WEBSTACK_REGION", "us-east-1")
            .env("WEBSTACK_DB_PASSWORD", TEST_PASSWORD)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }
}

pub const BASIC_CONFIG: &str = r#"
project "wordpress"
environment "prod"
domain "example.com"
"#;
