//! 属性参照トークン
//!
//! 作成後にしか値が決まらない属性（エンドポイント、ID、DNS名など）は
//! `${type:id.attribute}` 形式のトークンとして宣言に埋め込みます。
//! トークンは評価エンジンが依存先の作成完了後に実際の値へ置換します。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-z][a-z0-9-]*):([A-Za-z0-9_-]+)\.([a-z0-9_]+)\}")
        .expect("token pattern is a valid regex")
});

/// リソース属性への参照
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrRef {
    pub resource_type: String,
    pub id: String,
    pub attribute: String,
}

impl AttrRef {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            attribute: attribute.into(),
        }
    }

    /// 参照先リソースのキー（`type:id`）
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// 宣言に埋め込むトークン文字列
    pub fn token(&self) -> String {
        format!("${{{}:{}.{}}}", self.resource_type, self.id, self.attribute)
    }
}

impl std::fmt::Display for AttrRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// 文字列にトークンが含まれるか
pub fn contains_reference(s: &str) -> bool {
    TOKEN_RE.is_match(s)
}

/// 文字列中のトークンを出現順に抽出
pub fn references_in_str(s: &str) -> Vec<AttrRef> {
    TOKEN_RE
        .captures_iter(s)
        .map(|cap| AttrRef::new(&cap[1], &cap[2], &cap[3]))
        .collect()
}

/// JSON値の中のトークンを重複なしで抽出
pub fn find_references(value: &serde_json::Value) -> Vec<AttrRef> {
    let mut found = Vec::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &serde_json::Value, found: &mut Vec<AttrRef>) {
    match value {
        serde_json::Value::String(s) => {
            for r in references_in_str(s) {
                if !found.contains(&r) {
                    found.push(r);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}

/// トークン以外の部分にだけ `f` を適用
///
/// エスケープ処理でトークン自体を壊さないために使います。
pub fn map_literals<F>(s: &str, f: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in TOKEN_RE.find_iter(s) {
        out.push_str(&f(&s[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&s[last..]));
    out
}

/// 文字列中のトークンを置換
///
/// 解決できないトークンがあればそのトークンを `Err` で返します。
pub fn resolve_str<F>(s: &str, lookup: &F) -> std::result::Result<String, AttrRef>
where
    F: Fn(&AttrRef) -> Option<String>,
{
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for cap in TOKEN_RE.captures_iter(s) {
        let Some(m) = cap.get(0) else { continue };
        let reference = AttrRef::new(&cap[1], &cap[2], &cap[3]);
        let value = lookup(&reference).ok_or(reference)?;
        out.push_str(&s[last..m.start()]);
        out.push_str(&value);
        last = m.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// JSON値の中のトークンをすべて置換
pub fn resolve_value<F>(
    value: &serde_json::Value,
    lookup: &F,
) -> std::result::Result<serde_json::Value, AttrRef>
where
    F: Fn(&AttrRef) -> Option<String>,
{
    Ok(match value {
        serde_json::Value::String(s) => serde_json::Value::String(resolve_str(s, lookup)?),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, lookup))
                .collect::<std::result::Result<_, _>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, lookup)?);
            }
            serde_json::Value::Object(resolved)
        }
        other => other.clone(),
    })
}
