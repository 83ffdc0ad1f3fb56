//! # 任务配置
//!
//! 多机器人任务的 TOML 配置。所有字段都有默认值，配置文件只需写出需要覆盖的项：
//!
//! ```toml
//! num_envs = 16
//! integration_dt = 0.01
//! robot_names = ["centauro", "aliengo"]
//! fix_base = [false, true]
//! default_jnt_stiffness = 200.0
//!
//! [contact.prims]
//! centauro = ["contact_1", "contact_2"]
//! ```

use std::fs;
use std::path::Path;

use robogym_types::{Device, Diagnostic, DiagnosticSink};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ConfigError;
use crate::contact::ContactSensorConfig;

/// 任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// 任务名称
    pub name: String,

    /// 并行环境数量（每种机器人的副本数）
    pub num_envs: usize,

    /// 仿真积分步长（s）
    pub integration_dt: f64,

    /// 设备（"cpu"、"cuda"、"cuda:N"）
    pub device: String,

    /// 机器人种类名称（可自定义）
    pub robot_names: Vec<String>,

    /// 用于查找描述文件的包名，缺省时与 `robot_names` 相同
    pub robot_pkg_names: Option<Vec<String>>,

    pub fix_base: Option<Vec<bool>>,
    pub self_collide: Option<Vec<bool>>,
    pub merge_fixed: Option<Vec<bool>>,

    /// 同一环境内多种机器人出生圆周的半径（m）
    pub spawning_radius: f64,

    pub env_spacing: f64,

    pub default_jnt_stiffness: f64,
    pub default_jnt_damping: f64,
    pub default_wheel_stiffness: f64,
    pub default_wheel_damping: f64,

    /// 关闭原生 PD，只下发力矩
    pub override_art_controller: bool,

    /// 状态数值微分步长；缺省时直接读取仿真器速度
    pub state_differentiation_dt: Option<f64>,

    /// homing 使用的 group_state 名称
    pub homing_group: String,

    /// 轮关节名称匹配模式（子串）
    pub wheel_pattern: String,

    /// 参考滤波器带宽（Hz）
    pub filter_bandwidth: f64,

    /// 参考滤波器步长；缺省时不创建滤波器
    pub filter_dt: Option<f64>,

    /// 求解器位置迭代次数倍率（必须 > 0）
    pub pos_iter_increase_factor: i64,

    /// 求解器速度迭代次数倍率（必须 > 0）
    pub vel_iter_increase_factor: i64,

    /// 接触传感器选项
    pub contact: ContactSensorConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: "robogym_task".to_string(),
            num_envs: 1,
            integration_dt: 0.01,
            device: "cuda".to_string(),
            robot_names: Vec::new(),
            robot_pkg_names: None,
            fix_base: None,
            self_collide: None,
            merge_fixed: None,
            spawning_radius: 1.0,
            env_spacing: 5.0,
            default_jnt_stiffness: 300.0,
            default_jnt_damping: 20.0,
            default_wheel_stiffness: 0.0,
            default_wheel_damping: 10.0,
            override_art_controller: false,
            state_differentiation_dt: None,
            homing_group: "home".to_string(),
            wheel_pattern: "wheel".to_string(),
            filter_bandwidth: 50.0,
            filter_dt: None,
            pos_iter_increase_factor: 1,
            vel_iter_increase_factor: 1,
            contact: ContactSensorConfig::default(),
        }
    }
}

/// 已解析的单个机器人选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotOptions {
    pub name: String,
    pub pkg_name: String,
    pub fix_base: bool,
    pub self_collide: bool,
    pub merge_fixed: bool,
}

/// 求解器迭代次数倍率
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationFactors {
    pub position: u32,
    pub velocity: u32,
}

impl Default for IterationFactors {
    fn default() -> Self {
        Self {
            position: 1,
            velocity: 1,
        }
    }
}

impl IterationFactors {
    /// 按倍率放大仿真器报告的位置迭代次数
    pub fn scale_position(&self, count: u32) -> u32 {
        count.saturating_mul(self.position)
    }

    /// 按倍率放大仿真器报告的速度迭代次数
    pub fn scale_velocity(&self, count: u32) -> u32 {
        count.saturating_mul(self.velocity)
    }
}

impl TaskConfig {
    /// 以机器人名称列表创建默认配置
    pub fn with_robots<I, S>(robot_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            robot_names: robot_names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// 从 TOML 字符串解析（不做校验）
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 从文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        debug!(
            "Loaded task config '{}' from {}",
            config.name,
            path.display()
        );
        Ok(config)
    }

    /// 序列化为 TOML 字符串
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// 校验配置
    ///
    /// 每机器人选项列表长度不一致、数值非法、设备字符串无法解析都是致命错误。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_envs == 0 {
            return Err(ConfigError::invalid("num_envs", "must be > 0"));
        }
        check_positive("integration_dt", self.integration_dt)?;
        self.device()?;

        let expected = self.robot_names.len();
        for (i, name) in self.robot_names.iter().enumerate() {
            if name.is_empty() {
                return Err(ConfigError::invalid("robot_names", "empty robot name"));
            }
            if self.robot_names[..i].contains(name) {
                return Err(ConfigError::invalid(
                    "robot_names",
                    format!("duplicate robot name '{}'", name),
                ));
            }
        }
        check_len("robot_pkg_names", self.robot_pkg_names.as_deref(), expected)?;
        check_len("fix_base", self.fix_base.as_deref(), expected)?;
        check_len("self_collide", self.self_collide.as_deref(), expected)?;
        check_len("merge_fixed", self.merge_fixed.as_deref(), expected)?;

        check_non_negative("spawning_radius", self.spawning_radius)?;
        check_non_negative("env_spacing", self.env_spacing)?;
        check_non_negative("default_jnt_stiffness", self.default_jnt_stiffness)?;
        check_non_negative("default_jnt_damping", self.default_jnt_damping)?;
        check_non_negative("default_wheel_stiffness", self.default_wheel_stiffness)?;
        check_non_negative("default_wheel_damping", self.default_wheel_damping)?;

        if let Some(dt) = self.state_differentiation_dt {
            check_positive("state_differentiation_dt", dt)?;
        }
        if let Some(dt) = self.filter_dt {
            check_positive("filter_dt", dt)?;
            check_positive("filter_bandwidth", self.filter_bandwidth)?;
        }
        if self.homing_group.is_empty() {
            return Err(ConfigError::invalid("homing_group", "must not be empty"));
        }

        Ok(())
    }

    /// 解析设备字符串
    pub fn device(&self) -> Result<Device, ConfigError> {
        self.device
            .parse()
            .map_err(|e: robogym_types::TypesError| ConfigError::invalid("device", e.to_string()))
    }

    /// 机器人种类数量
    pub fn robot_count(&self) -> usize {
        self.robot_names.len()
    }

    /// 每个机器人的选项（缺省的列表按默认值展开）
    pub fn robot_options(&self) -> Result<Vec<RobotOptions>, ConfigError> {
        self.validate()?;
        Ok(self
            .robot_names
            .iter()
            .enumerate()
            .map(|(i, name)| RobotOptions {
                name: name.clone(),
                pkg_name: self
                    .robot_pkg_names
                    .as_ref()
                    .map_or_else(|| name.clone(), |pkgs| pkgs[i].clone()),
                fix_base: self.fix_base.as_ref().is_some_and(|v| v[i]),
                self_collide: self.self_collide.as_ref().is_some_and(|v| v[i]),
                merge_fixed: self.merge_fixed.as_ref().is_some_and(|v| v[i]),
            })
            .collect())
    }

    /// 解析求解器迭代倍率
    ///
    /// 倍率必须 > 0，否则回退为 1 并报告 `DefaultApplied`。
    pub fn resolve_iteration_factors(&self, sink: &dyn DiagnosticSink) -> IterationFactors {
        IterationFactors {
            position: resolve_factor(
                "pos_iter_increase_factor",
                self.pos_iter_increase_factor,
                sink,
            ),
            velocity: resolve_factor(
                "vel_iter_increase_factor",
                self.vel_iter_increase_factor,
                sink,
            ),
        }
    }
}

fn resolve_factor(option: &'static str, value: i64, sink: &dyn DiagnosticSink) -> u32 {
    match u32::try_from(value) {
        Ok(v) if v > 0 => v,
        _ => {
            sink.report(
                "task_config",
                Diagnostic::DefaultApplied {
                    scope: "task".to_string(),
                    option: option.to_string(),
                    detail: format!("provided value {} should be > 0, resetting it to 1", value),
                },
            );
            1
        },
    }
}

fn check_len<T>(option: &'static str, list: Option<&[T]>, expected: usize) -> Result<(), ConfigError> {
    match list {
        Some(list) if list.len() != expected => Err(ConfigError::LengthMismatch {
            option,
            expected,
            got: list.len(),
        }),
        _ => Ok(()),
    }
}

fn check_positive(option: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(option, format!("{} must be finite and > 0", value)))
    }
}

fn check_non_negative(option: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(option, format!("{} must be finite and >= 0", value)))
    }
}
