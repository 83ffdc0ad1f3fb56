//! 集成测试公共辅助
#![allow(dead_code)]

use std::sync::Arc;

use robogym_articulation::MockArticulation;
use robogym_sdk::prelude::*;

pub const JOINTS: [&str; 3] = ["hip", "knee", "wheel"];

pub const SRDF: &str = r#"<?xml version="1.0"?>
<robot name="centauro">
    <group name="legs"/>
    <group_state name="home" group="legs">
        <joint name="hip" value="0.3"/>
        <joint name="knee" value="-0.6"/>
        <joint name="ankle" value="1.2"/>
    </group_state>
    <group_state name="crouch" group="legs">
        <joint name="hip" value="0.9"/>
    </group_state>
</robot>"#;

/// 2 个副本、关节 `[hip, knee, wheel]` 的 mock
pub fn mock_articulation() -> Arc<MockArticulation> {
    Arc::new(MockArticulation::new(2, &JOINTS))
}

pub fn cpu_config(robots: &[&str]) -> TaskConfig {
    let mut config = TaskConfig::with_robots(robots.iter().copied());
    config.device = "cpu".into();
    config.num_envs = 2;
    config
}

pub fn batch(rows: usize, cols: usize, values: &[f64]) -> Batch {
    Batch::from_row_slice(rows, cols, values, Device::Cpu).unwrap()
}
