//! compute ノードのパース

use super::value::{prop, prop_u32, required_string, required_u32};
use crate::compute::ComputeSpec;
use crate::error::Result;
use kdl::KdlNode;

/// compute ノードをパース
pub fn parse_compute(node: &KdlNode) -> Result<ComputeSpec> {
    let mut spec = ComputeSpec::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "instance-type" | "instance_type" => spec.instance_type = required_string(child)?,
                "machine-image" | "machine_image" => spec.machine_image = required_string(child)?,
                "desired-capacity" | "desired_capacity" => {
                    spec.desired_capacity = required_u32(child)?
                }
                "health-check" | "health_check" => {
                    if let Some(path) = prop(child, "path").and_then(|v| v.as_string()) {
                        spec.health_check.path = path.to_string();
                    }
                    if let Some(interval) = prop_u32(child, "interval")? {
                        spec.health_check.interval_secs = interval;
                    }
                }
                "boot-signals" | "boot_signals" => {
                    if let Some(count) = prop_u32(child, "count")? {
                        spec.boot_signals.count = count;
                    }
                    if let Some(timeout) = prop_u32(child, "timeout")? {
                        spec.boot_signals.timeout_secs = timeout;
                    }
                }
                _ => {}
            }
        }
    }

    Ok(spec)
}
