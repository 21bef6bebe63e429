//! ノード値の取り出し

use crate::error::{Result, StackError};
use kdl::{KdlNode, KdlValue};

/// 最初の位置引数
pub(super) fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

/// 名前付き引数（`key=value`）
pub(super) fn prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

fn node_label(node: &KdlNode) -> &str {
    node.name().value()
}

pub(super) fn required_string(node: &KdlNode) -> Result<String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("{} には文字列を指定してください", node_label(node)))
        })
}

pub(super) fn required_bool(node: &KdlNode) -> Result<bool> {
    first_arg(node).and_then(|v| v.as_bool()).ok_or_else(|| {
        StackError::InvalidConfig(format!(
            "{} には #true / #false を指定してください",
            node_label(node)
        ))
    })
}

pub(super) fn required_u32(node: &KdlNode) -> Result<u32> {
    integer_u32(node_label(node), first_arg(node))
}

pub(super) fn prop_u32(node: &KdlNode, key: &str) -> Result<Option<u32>> {
    match prop(node, key) {
        Some(value) => integer_u32(&format!("{}.{}", node_label(node), key), Some(value)).map(Some),
        None => Ok(None),
    }
}

fn integer_u32(label: &str, value: Option<&KdlValue>) -> Result<u32> {
    value
        .and_then(|v| v.as_integer())
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("{} には0以上の整数を指定してください", label))
        })
}
