//! # 接触传感器选项
//!
//! 每种机器人的接触连杆列表、传感器平移偏移和半径。偏移或半径字典缺少任一连杆时，
//! 整组回退到默认值（偏移全零、半径 `DEFAULT_SENSOR_RADIUS`），并报告被回退的选项。

use std::collections::BTreeMap;

use robogym_types::{Diagnostic, DiagnosticSink};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ConfigError;

/// 默认传感器半径（m）
pub const DEFAULT_SENSOR_RADIUS: f64 = 0.003;

/// 接触传感器原始配置（按机器人名称索引）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactSensorConfig {
    /// 机器人 → 接触连杆名称
    pub prims: BTreeMap<String, Vec<String>>,
    /// 机器人 → (连杆 → 平移偏移)
    pub offsets: BTreeMap<String, BTreeMap<String, [f64; 3]>>,
    /// 机器人 → (连杆 → 半径)
    pub radii: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ContactSensorConfig {
    /// 是否为该机器人配置了接触连杆
    pub fn has_robot(&self, robot: &str) -> bool {
        self.prims.contains_key(robot)
    }
}

/// 解析完成的接触传感器布局，按 `prims` 顺序排列
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSensorLayout {
    robot: String,
    prims: Vec<String>,
    offsets: Vec<[f64; 3]>,
    radii: Vec<f64>,
    defaulted: Vec<&'static str>,
}

impl ContactSensorLayout {
    /// 解析一个机器人的接触传感器选项
    ///
    /// 三个字典中任一缺少该机器人的键都是致命错误。
    pub fn resolve(
        robot: &str,
        config: &ContactSensorConfig,
        sink: &dyn DiagnosticSink,
    ) -> Result<Self, ConfigError> {
        let prims = lookup(&config.prims, robot, "contact_prims")?;
        let offsets_map = lookup(&config.offsets, robot, "contact_offsets")?;
        let radii_map = lookup(&config.radii, robot, "sensor_radii")?;

        let mut defaulted = Vec::new();

        let offsets = match prims
            .iter()
            .map(|p| offsets_map.get(p).copied())
            .collect::<Option<Vec<_>>>()
        {
            Some(offsets) => offsets,
            None => {
                report_default(
                    sink,
                    robot,
                    "contact_offsets",
                    prims,
                    "resetting all offsets to zero".to_string(),
                );
                defaulted.push("contact_offsets");
                vec![[0.0; 3]; prims.len()]
            },
        };

        let radii = match prims
            .iter()
            .map(|p| radii_map.get(p).copied())
            .collect::<Option<Vec<_>>>()
        {
            Some(radii) => radii,
            None => {
                report_default(
                    sink,
                    robot,
                    "sensor_radii",
                    prims,
                    format!("resetting all radii to {}", DEFAULT_SENSOR_RADIUS),
                );
                defaulted.push("sensor_radii");
                vec![DEFAULT_SENSOR_RADIUS; prims.len()]
            },
        };

        debug!(
            "Contact sensor layout for '{}': {} sensors, defaulted: {:?}",
            robot,
            prims.len(),
            defaulted
        );

        Ok(Self {
            robot: robot.to_string(),
            prims: prims.clone(),
            offsets,
            radii,
            defaulted,
        })
    }

    pub fn robot(&self) -> &str {
        &self.robot
    }

    pub fn prims(&self) -> &[String] {
        &self.prims
    }

    pub fn offsets(&self) -> &[[f64; 3]] {
        &self.offsets
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    /// 被回退到默认值的选项名称
    pub fn defaulted(&self) -> &[&'static str] {
        &self.defaulted
    }

    /// 连杆的 (偏移, 半径)
    pub fn sensor(&self, prim: &str) -> Option<([f64; 3], f64)> {
        let i = self.prims.iter().position(|p| p == prim)?;
        Some((self.offsets[i], self.radii[i]))
    }
}

fn lookup<'a, V>(
    map: &'a BTreeMap<String, V>,
    robot: &str,
    option: &'static str,
) -> Result<&'a V, ConfigError> {
    map.get(robot).ok_or_else(|| ConfigError::MissingRobotKey {
        robot: robot.to_string(),
        option,
    })
}

fn report_default(
    sink: &dyn DiagnosticSink,
    robot: &str,
    option: &str,
    prims: &[String],
    action: String,
) {
    sink.report(
        "contact_sensor",
        Diagnostic::DefaultApplied {
            scope: robot.to_string(),
            option: option.to_string(),
            detail: format!(
                "dictionary should contain all of [{}]; {}",
                prims.join(" "),
                action
            ),
        },
    );
}
