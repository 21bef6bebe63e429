//! デプロイバリアント
//!
//! CDNの有無、TLS終端の位置、ブートストラップ方式をひとつの設定値で表します。

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// エッジルーティング戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeStrategy {
    /// CDNを前段に置き、CDNにエイリアスする
    #[default]
    Cdn,
    /// ロードバランサーに直接エイリアスする
    DirectAlias,
}

/// TLS終端の位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// CDNエッジで終端
    #[default]
    Edge,
    /// ロードバランサーの443リスナーで終端
    LoadBalancer,
    /// TLSなし（HTTPのみ）
    None,
}

impl TlsMode {
    /// 証明書が必要か
    pub fn needs_certificate(&self) -> bool {
        !matches!(self, TlsMode::None)
    }
}

/// ホストの初期化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapMode {
    /// シェルスクリプト（user data）
    #[default]
    Script,
    /// 宣言的な初期化定義（パッケージ・サービス・コマンド）
    DeclarativeInit,
}

/// 設定ファイルの書き換え方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    /// サンプル設定を sed で置換
    #[default]
    Sed,
    /// 設定ファイル全体をテンプレートから生成
    Template,
}

macro_rules! impl_variant_str {
    ($ty:ty, $label:literal, { $($name:literal => $value:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = StackError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($value),)+
                    other => Err(StackError::InvalidVariant(format!(
                        "{} に '{}' は指定できません（{}）",
                        $label,
                        other,
                        [$($name),+].join(" / ")
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                $(if *self == $value {
                    return write!(f, "{}", $name);
                })+
                Ok(())
            }
        }
    };
}

impl_variant_str!(EdgeStrategy, "edge", {
    "cdn" => EdgeStrategy::Cdn,
    "direct-alias" => EdgeStrategy::DirectAlias,
});

impl_variant_str!(TlsMode, "tls", {
    "edge" => TlsMode::Edge,
    "load-balancer" => TlsMode::LoadBalancer,
    "none" => TlsMode::None,
});

impl_variant_str!(BootstrapMode, "bootstrap", {
    "script" => BootstrapMode::Script,
    "declarative-init" => BootstrapMode::DeclarativeInit,
});

impl_variant_str!(RendererKind, "renderer", {
    "sed" => RendererKind::Sed,
    "template" => RendererKind::Template,
});

/// デプロイバリアント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DeploymentVariant {
    pub edge: EdgeStrategy,
    pub tls: TlsMode,
    pub bootstrap: BootstrapMode,
    pub renderer: RendererKind,
    /// WP_SITEURL / WP_HOME を設定ファイルに追記するか
    pub site_identity: bool,
}

impl Default for DeploymentVariant {
    fn default() -> Self {
        Self {
            edge: EdgeStrategy::Cdn,
            tls: TlsMode::Edge,
            bootstrap: BootstrapMode::Script,
            renderer: RendererKind::Sed,
            site_identity: true,
        }
    }
}

impl DeploymentVariant {
    /// 組み合わせの検証
    ///
    /// | edge         | tls           |
    /// |--------------|---------------|
    /// | cdn          | edge          |
    /// | direct-alias | load-balancer |
    /// | direct-alias | none          |
    pub fn validate(&self) -> Result<()> {
        match (self.edge, self.tls) {
            (EdgeStrategy::Cdn, TlsMode::Edge)
            | (EdgeStrategy::DirectAlias, TlsMode::LoadBalancer)
            | (EdgeStrategy::DirectAlias, TlsMode::None) => {}
            (edge, tls) => {
                return Err(StackError::InvalidVariant(format!(
                    "edge={} と tls={} は組み合わせられません",
                    edge, tls
                )));
            }
        }

        if self.renderer == RendererKind::Template && self.bootstrap == BootstrapMode::DeclarativeInit {
            return Err(StackError::InvalidVariant(
                "renderer=template は bootstrap=script でのみ使用できます".to_string(),
            ));
        }
        Ok(())
    }

    /// サイトURLのスキーム
    pub fn site_scheme(&self) -> &'static str {
        match self.tls {
            TlsMode::None => "http",
            _ => "https",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_variant_is_valid() {
        let variant = DeploymentVariant::default();
        variant.validate().unwrap();
        assert_eq!(variant.site_scheme(), "https");
    }

    #[test]
    fn test_invalid_combinations() {
        let cases = [
            (EdgeStrategy::Cdn, TlsMode::LoadBalancer),
            (EdgeStrategy::Cdn, TlsMode::None),
            (EdgeStrategy::DirectAlias, TlsMode::Edge),
        ];
        for (edge, tls) in cases {
            let variant = DeploymentVariant {
                edge,
                tls,
                ..Default::default()
            };
            assert!(
                matches!(variant.validate(), Err(StackError::InvalidVariant(_))),
                "{} / {} should be rejected",
                edge,
                tls
            );
        }
    }

    #[test]
    fn test_http_only_variant() {
        let variant = DeploymentVariant {
            edge: EdgeStrategy::DirectAlias,
            tls: TlsMode::None,
            ..Default::default()
        };
        variant.validate().unwrap();
        assert_eq!(variant.site_scheme(), "http");
        assert!(!variant.tls.needs_certificate());
    }

    #[test]
    fn test_parse_from_str() {
        assert_eq!("direct-alias".parse::<EdgeStrategy>().unwrap(), EdgeStrategy::DirectAlias);
        assert_eq!("load-balancer".parse::<TlsMode>().unwrap(), TlsMode::LoadBalancer);
        assert_eq!(
            "declarative-init".parse::<BootstrapMode>().unwrap(),
            BootstrapMode::DeclarativeInit
        );
        assert_eq!(RendererKind::Template.to_string(), "template");
        assert!("both".parse::<EdgeStrategy>().is_err());
    }
}
