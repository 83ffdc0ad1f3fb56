//! # 任务运行时
//!
//! 编排一个任务中的多种机器人：world 初始化后依次完成 homing 解析、状态同步器初始化、
//! 默认状态下发、阻抗控制器创建与 reset；之后每个周期刷新状态并下发指令。
//!
//! 场景搭建（导入描述文件、克隆环境、创建传感器与地形）不在此处，调用方在
//! articulation 初始化完成后通过 `add_robot` 注册每种机器人。

use std::path::Path;

use nalgebra::Vector3;
use robogym_articulation::SharedArticulation;
use robogym_control::{HomingBuffer, HomingError, HomingResolver, ImpedanceConfig, ImpedanceController};
use robogym_sync::{StateSynchronizer, VelocitySource, circular_spawn_offsets};
use robogym_tools::{ContactSensorLayout, IterationFactors, TaskConfig};
use robogym_types::{Batch, Device, SharedSink};
use tracing::{debug, info, warn};

use crate::RuntimeError;

/// 一种机器人在任务中的全部状态
pub struct RobotHandle {
    name: String,
    articulation: SharedArticulation,
    homing: HomingBuffer,
    synchronizer: StateSynchronizer,
    controller: ImpedanceController,
    contact: Option<ContactSensorLayout>,
}

impl RobotHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn articulation(&self) -> &SharedArticulation {
        &self.articulation
    }

    pub fn homing(&self) -> &HomingBuffer {
        &self.homing
    }

    pub fn synchronizer(&self) -> &StateSynchronizer {
        &self.synchronizer
    }

    pub fn controller(&self) -> &ImpedanceController {
        &self.controller
    }

    /// 直接访问控制器（设置增益/参考）
    pub fn controller_mut(&mut self) -> &mut ImpedanceController {
        &mut self.controller
    }

    /// 接触传感器布局（未配置时为 `None`）
    pub fn contact_layout(&self) -> Option<&ContactSensorLayout> {
        self.contact.as_ref()
    }
}

/// 任务运行时
pub struct TaskRuntime {
    config: TaskConfig,
    device: Device,
    sink: SharedSink,
    spawn_offsets: Vec<Vector3<f64>>,
    iteration_factors: IterationFactors,
    velocity_source: VelocitySource,
    robots: Vec<RobotHandle>,
}

impl TaskRuntime {
    /// 校验配置并计算每种机器人的出生偏移
    pub fn new(config: TaskConfig, sink: SharedSink) -> Result<Self, RuntimeError> {
        config.validate()?;
        let device = config.device()?;
        let spawn_offsets = circular_spawn_offsets(config.robot_count(), config.spawning_radius);
        let iteration_factors = config.resolve_iteration_factors(&*sink);
        let velocity_source = VelocitySource::from_dt(config.state_differentiation_dt);

        info!(
            "Task '{}' created: {} robot kinds x {} envs on {} ({:?})",
            config.name,
            config.robot_count(),
            config.num_envs,
            device,
            velocity_source
        );

        Ok(Self {
            config,
            device,
            sink,
            spawn_offsets,
            iteration_factors,
            velocity_source,
            robots: Vec::new(),
        })
    }

    /// 注册一种机器人（articulation 必须已初始化）
    ///
    /// 1. 解析 homing
    /// 2. 初始化状态同步器（默认根位置 = 初始位置 + 圆周出生偏移）
    /// 3. 下发默认关节状态（homing）与默认根位姿
    /// 4. 解析接触传感器选项（已配置时）
    /// 5. 创建阻抗控制器并执行 reset 流程
    pub fn add_robot(
        &mut self,
        name: &str,
        articulation: SharedArticulation,
        description: &str,
    ) -> Result<(), RuntimeError> {
        let slot = self.check_new_robot(name, &articulation)?;

        let homing = HomingResolver::new(self.sink.clone())
            .with_group(self.config.homing_group.clone())
            .resolve_for(&*articulation, description)?;

        let synchronizer = StateSynchronizer::new(articulation.clone(), self.spawn_offsets[slot])?;
        synchronizer.push_defaults(homing.get_homing())?;

        let contact = if self.config.contact.has_robot(name) {
            Some(ContactSensorLayout::resolve(
                name,
                &self.config.contact,
                &*self.sink,
            )?)
        } else {
            None
        };

        let controller = ImpedanceController::new(
            articulation.clone(),
            self.impedance_config(),
            self.sink.clone(),
        )?;

        self.robots.push(RobotHandle {
            name: name.to_string(),
            articulation,
            homing,
            synchronizer,
            controller,
            contact,
        });
        let index = self.robots.len() - 1;
        self.reset_controller(index)?;

        info!("Robot '{}' added to task '{}'", name, self.config.name);
        Ok(())
    }

    /// 从文件读取描述文档后注册
    pub fn add_robot_from_file(
        &mut self,
        name: &str,
        articulation: SharedArticulation,
        path: impl AsRef<Path>,
    ) -> Result<(), RuntimeError> {
        let path = path.as_ref();
        let description = std::fs::read_to_string(path).map_err(|source| HomingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_robot(name, articulation, &description)
    }

    /// 以 reset 周期刷新所有状态，然后对每种机器人执行控制器 reset 流程
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        self.reset_with(self.velocity_source)
    }

    /// 以 `integration_dt` 数值微分的 reset
    ///
    /// 与配置的速度来源无关：速度严格置零，并用 reset 状态刷新 `_prev`，
    /// 之后的周期照常按配置的来源刷新。
    pub fn reset_integrated(&mut self) -> Result<(), RuntimeError> {
        self.reset_with(VelocitySource::Differentiated {
            dt: self.config.integration_dt,
        })
    }

    fn reset_with(&mut self, source: VelocitySource) -> Result<(), RuntimeError> {
        self.refresh_with(source, true)?;
        for index in 0..self.robots.len() {
            self.reset_controller(index)?;
        }
        debug!("Task '{}' reset", self.config.name);
        Ok(())
    }

    /// 刷新所有机器人的状态并写入控制器测量值
    pub fn refresh_states(&mut self, reset: bool) -> Result<(), RuntimeError> {
        self.refresh_with(self.velocity_source, reset)
    }

    fn refresh_with(&mut self, source: VelocitySource, reset: bool) -> Result<(), RuntimeError> {
        for robot in &mut self.robots {
            robot.synchronizer.refresh(source, reset)?;
            let report = robot.controller.update_state(
                Some(robot.synchronizer.jnts_q()),
                Some(robot.synchronizer.jnts_v()),
                None,
                None,
                None,
            )?;
            if !report.all_ok() {
                warn!("[{}] impedance controller could not update joint state", robot.name);
            }
        }
        Ok(())
    }

    /// 更新一种机器人的关节阻抗
    ///
    /// 先以 `jnt_stiffness`/`jnt_damping` 覆盖全部关节，再对轮关节单独设置。
    /// 写入失败只记录警告。
    pub fn update_jnt_imp_control(
        &mut self,
        robot: &str,
        jnt_stiffness: f64,
        jnt_damping: f64,
        wheel_stiffness: f64,
        wheel_damping: f64,
    ) -> Result<(), RuntimeError> {
        let index = self.robot_index(robot)?;
        let wheel_pattern = self.config.wheel_pattern.clone();
        let handle = &mut self.robots[index];
        info!("[{}] updating joint impedances...", robot);

        let controller = &mut handle.controller;
        let (rows, cols) = (controller.num_robots(), controller.num_joints());
        let device = controller.device();
        let report = controller.set_gains(
            Some(&Batch::full(rows, cols, jnt_stiffness, device)),
            Some(&Batch::full(rows, cols, jnt_damping, device)),
            None,
            None,
        )?;
        if !report.all_ok() {
            warn!("[{}] impedance controller could not set gains", robot);
        }

        if !set_wheel_gains(controller, &wheel_pattern, wheel_stiffness, wheel_damping)? {
            warn!("[{}] impedance controller could not set wheel gains", robot);
        }

        info!("[{}] joint impedances updated", robot);
        Ok(())
    }

    /// 所有机器人计算并下发指令
    pub fn apply_cmds(&mut self, use_filter: bool) -> Result<(), RuntimeError> {
        for robot in &mut self.robots {
            robot.controller.apply_cmds(use_filter)?;
        }
        Ok(())
    }

    /// 按迭代倍率放大每种机器人的求解器迭代次数
    ///
    /// 读取当前次数后乘以倍率再写回；每调用一次放大一次。
    pub fn update_solver_options(&mut self) -> Result<(), RuntimeError> {
        for robot in &self.robots {
            let (position, velocity) = robot.articulation.solver_iteration_counts()?;
            let (position, velocity) = self.scaled_solver_iterations(&position, &velocity);
            robot
                .articulation
                .set_solver_iteration_counts(&position, &velocity)?;
            debug!(
                "[{}] solver iterations set to {:?} (position), {:?} (velocity)",
                robot.name, position, velocity
            );
        }
        Ok(())
    }

    /// 按迭代倍率放大给定的 `(位置, 速度)` 迭代次数
    pub fn scaled_solver_iterations(
        &self,
        position: &[u32],
        velocity: &[u32],
    ) -> (Vec<u32>, Vec<u32>) {
        let factors = self.iteration_factors;
        (
            position.iter().map(|&c| factors.scale_position(c)).collect(),
            velocity.iter().map(|&c| factors.scale_velocity(c)).collect(),
        )
    }

    /// 用当前根位姿覆盖所有机器人的默认根位姿
    pub fn synch_default_root_states(&mut self) {
        for robot in &mut self.robots {
            robot.synchronizer.sync_default_root_states();
        }
    }

    pub fn robot(&self, name: &str) -> Option<&RobotHandle> {
        self.robots.iter().find(|r| r.name == name)
    }

    pub fn robot_mut(&mut self, name: &str) -> Option<&mut RobotHandle> {
        self.robots.iter_mut().find(|r| r.name == name)
    }

    /// 已注册的机器人（按注册顺序）
    pub fn robots(&self) -> &[RobotHandle] {
        &self.robots
    }

    pub fn controller(&self, name: &str) -> Option<&ImpedanceController> {
        self.robot(name).map(RobotHandle::controller)
    }

    pub fn controller_mut(&mut self, name: &str) -> Option<&mut ImpedanceController> {
        self.robot_mut(name).map(RobotHandle::controller_mut)
    }

    pub fn synchronizer(&self, name: &str) -> Option<&StateSynchronizer> {
        self.robot(name).map(RobotHandle::synchronizer)
    }

    pub fn homing(&self, name: &str) -> Option<&HomingBuffer> {
        self.robot(name).map(RobotHandle::homing)
    }

    /// 配置中的所有机器人是否都已注册
    pub fn is_complete(&self) -> bool {
        self.robots.len() == self.config.robot_count()
    }

    /// 机器人在同一环境内的出生偏移（按 `robot_names` 顺序）
    pub fn spawn_offsets(&self) -> &[Vector3<f64>] {
        &self.spawn_offsets
    }

    /// 求解器迭代倍率（非法配置已回退为 1）
    pub fn iteration_factors(&self) -> IterationFactors {
        self.iteration_factors
    }

    pub fn velocity_source(&self) -> VelocitySource {
        self.velocity_source
    }

    pub fn integration_dt(&self) -> f64 {
        self.config.integration_dt
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// 控制器 reset 流程
    ///
    /// reset → 写入测量值 → 轮关节默认增益 → 参考位置设为 homing → 下发一次指令
    fn reset_controller(&mut self, index: usize) -> Result<(), RuntimeError> {
        let wheel_stiffness = self.config.default_wheel_stiffness;
        let wheel_damping = self.config.default_wheel_damping;
        let wheel_pattern = self.config.wheel_pattern.clone();
        let robot = &mut self.robots[index];

        robot.controller.reset()?;
        let report = robot.controller.update_state(
            Some(robot.synchronizer.jnts_q()),
            Some(robot.synchronizer.jnts_v()),
            None,
            None,
            None,
        )?;
        if !report.all_ok() {
            warn!("[{}] impedance controller could not update joint state", robot.name);
        }

        if !set_wheel_gains(&mut robot.controller, &wheel_pattern, wheel_stiffness, wheel_damping)? {
            warn!("[{}] impedance controller could not set wheel gains", robot.name);
        }

        let report = robot
            .controller
            .set_refs(None, Some(robot.homing.get_homing()), None, None, None)?;
        if !report.all_ok() {
            warn!("[{}] cannot set impedance controller reference to homing", robot.name);
        }

        robot.controller.apply_cmds(false)?;
        debug!("[{}] impedance controller reset", robot.name);
        Ok(())
    }

    fn impedance_config(&self) -> ImpedanceConfig {
        let config = ImpedanceConfig::default()
            .with_gains(self.config.default_jnt_stiffness, self.config.default_jnt_damping)
            .with_override(self.config.override_art_controller);
        match self.config.filter_dt {
            Some(dt) => config.with_filter(dt, self.config.filter_bandwidth),
            None => config,
        }
    }

    /// 返回 `robot_names` 中的槽位
    fn check_new_robot(
        &self,
        name: &str,
        articulation: &SharedArticulation,
    ) -> Result<usize, RuntimeError> {
        let slot = self
            .config
            .robot_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RuntimeError::UnknownRobot(name.to_string()))?;
        if self.robot(name).is_some() {
            return Err(RuntimeError::RobotAlreadyAdded(name.to_string()));
        }
        if !articulation.is_initialized() {
            return Err(RuntimeError::ArticulationNotInitialized(name.to_string()));
        }
        if articulation.robot_count() != self.config.num_envs {
            return Err(RuntimeError::EnvCountMismatch {
                robot: name.to_string(),
                expected: self.config.num_envs,
                actual: articulation.robot_count(),
            });
        }
        let actual = articulation.device();
        if !actual.is_compatible(&self.device) {
            return Err(RuntimeError::DeviceMismatch {
                robot: name.to_string(),
                expected: self.device,
                actual,
            });
        }
        Ok(slot)
    }

    fn robot_index(&self, name: &str) -> Result<usize, RuntimeError> {
        self.robots
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RuntimeError::UnknownRobot(name.to_string()))
    }
}

/// 轮关节增益；没有轮关节时不做任何事并返回 `true`
fn set_wheel_gains(
    controller: &mut ImpedanceController,
    pattern: &str,
    stiffness: f64,
    damping: f64,
) -> Result<bool, RuntimeError> {
    let wheels = controller.get_jnt_indices_matching(pattern);
    if wheels.is_empty() {
        return Ok(true);
    }
    let rows = controller.num_robots();
    let device = controller.device();
    let report = controller.set_gains(
        Some(&Batch::full(rows, wheels.len(), stiffness, device)),
        Some(&Batch::full(rows, wheels.len(), damping, device)),
        None,
        Some(&wheels),
    )?;
    Ok(report.all_ok())
}
