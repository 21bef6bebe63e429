//! デプロイコンテキストと命名ユーティリティ
//!
//! すべてのプロビジョナーは同じ [`DeploymentContext`] を参照で受け取ります。
//! 名前の導出は純粋関数で、同じ入力からは常に同じ名前が得られます。
//! DNSレコードとゾーンの照合はドメイン名の完全一致に依存するため、
//! この決定性は必須です。

use serde::{Deserialize, Serialize};

/// リージョン内で名前を付けられるゾーンの数（`a`〜`z`）
pub const MAX_AVAILABILITY_ZONES: u32 = 26;

/// 不変のデプロイコンテキスト
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    app: String,
    environment: String,
    domain: String,
    account: String,
    region: String,
}

impl DeploymentContext {
    pub fn new(
        app: impl Into<String>,
        environment: impl Into<String>,
        domain: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            environment: environment.into(),
            domain: normalize_domain(&domain.into()),
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// スタック名（`{app}-{environment}`）
    pub fn stack_name(&self) -> String {
        normalize_name(&format!("{}-{}", self.app, self.environment))
    }

    /// グローバルスコープのリソース名
    ///
    /// `resource_name("database")` → `wordpress-prod-database`
    pub fn resource_name(&self, component: &str) -> String {
        normalize_name(&format!("{}-{}-{}", self.app, self.environment, component))
    }

    /// コンポーネント識別子を接頭辞とする子リソース名
    ///
    /// `child_name("network", "public-1")` → `network-public-1`
    pub fn child_name(&self, component: &str, label: &str) -> String {
        normalize_name(&format!("{}-{}", component, label))
    }

    /// 子リソースのグローバルスコープ名
    pub fn scoped_name(&self, component: &str, label: &str) -> String {
        self.resource_name(&self.child_name(component, label))
    }

    /// `www.` サブドメイン
    pub fn www_domain(&self) -> String {
        format!("www.{}", self.domain)
    }

    /// ワイルドカードドメイン（証明書のSAN用）
    pub fn wildcard_domain(&self) -> String {
        format!("*.{}", self.domain)
    }

    /// サイトURL（`{scheme}://www.{domain}`）
    pub fn site_url(&self, scheme: &str) -> String {
        format!("{}://{}", scheme, self.www_domain())
    }

    /// アベイラビリティゾーン名（`us-east-1a`, `us-east-1b`, ...）
    ///
    /// ゾーン文字は `a`〜`z` なので、それを超える番号は `None` です。
    pub fn availability_zone(&self, index: usize) -> Option<String> {
        if index >= MAX_AVAILABILITY_ZONES as usize {
            return None;
        }
        let suffix = (b'a' + index as u8) as char;
        Some(format!("{}{}", self.region, suffix))
    }
}

/// リソース名を正規化
///
/// 小文字化し、`[a-z0-9-]` 以外は `-` に置換、連続する `-` と前後の `-` を除去します。
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// ドメイン名を正規化（小文字化、末尾のドットを除去）
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}
