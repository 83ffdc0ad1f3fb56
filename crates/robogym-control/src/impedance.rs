//! 批量关节阻抗控制器
//!
//! 为 `num_robots` 个机器人副本的每个关节维护增益、参考和测量缓冲区，
//! 支持基于选择器的局部更新，并按下式计算指令力矩：
//!
//! ```text
//! imp_eff = eff_ref + pos_gains ⊙ (pos_ref − pos) + vel_gains ⊙ (vel_ref − vel)
//! ```
//!
//! # 两种工作模式
//!
//! - **原生模式**（默认）：增益下发到 articulation 的原生 PD，
//!   每个周期分别下发力矩、位置目标和速度目标，由原生控制律合成。
//! - **覆盖模式**（`override_native = true`）：原生增益被置零，
//!   每个周期只下发 `imp_eff` 一个力矩指令，本控制器是唯一的反馈来源。
//!
//! # 状态机
//!
//! ```text
//! UNINITIALIZED ──initialize_gains()──▶ GAINS_SET ──initialize_refs()──▶ REFS_SET ──apply_cmds()──▶ READY
//!        ▲                                                                                          │
//!        └────────────────────────────────────── reset() ───────────────────────────────────────────┘
//! ```
//!
//! `apply_cmds()` 会自动补齐尚未执行的初始化步骤。

use std::fmt;

use nalgebra::DMatrix;
use robogym_articulation::SharedArticulation;
use robogym_types::{
    Batch, Device, Diagnostic, IndexSelector, JointIndexMap, Selector, SharedSink, SignalKind,
};
use tracing::{debug, info};

use crate::ControlError;
use crate::filter::FirstOrderFilter;

const COMPONENT: &str = "impedance";

/// 控制器配置
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceConfig {
    /// 默认位置增益（reset 时填充）
    pub default_pgain: f64,

    /// 默认速度增益（reset 时填充）
    pub default_vgain: f64,

    /// 参考滤波器带宽（Hz）
    pub filter_bandwidth: f64,

    /// 参考滤波器步长（秒）
    ///
    /// `None` 表示不创建滤波器，`apply_cmds(true)` 退化为不滤波。
    pub filter_dt: Option<f64>,

    /// 覆盖 articulation 的原生 PD（原生增益置零，仅下发力矩）
    pub override_native: bool,

    /// 构造及每次 `reset()` 时立即执行两步初始化
    pub init_on_creation: bool,

    /// 缓冲区设备，`None` 表示使用 articulation 的设备
    pub device: Option<Device>,
}

impl Default for ImpedanceConfig {
    fn default() -> Self {
        Self {
            default_pgain: 300.0,
            default_vgain: 30.0,
            filter_bandwidth: 50.0,
            filter_dt: None,
            override_native: false,
            init_on_creation: false,
            device: None,
        }
    }
}

impl ImpedanceConfig {
    pub fn with_gains(mut self, pgain: f64, vgain: f64) -> Self {
        self.default_pgain = pgain;
        self.default_vgain = vgain;
        self
    }

    pub fn with_filter(mut self, dt: f64, bandwidth: f64) -> Self {
        self.filter_dt = Some(dt);
        self.filter_bandwidth = bandwidth;
        self
    }

    pub fn with_override(mut self, override_native: bool) -> Self {
        self.override_native = override_native;
        self
    }

    pub fn with_init_on_creation(mut self, init_on_creation: bool) -> Self {
        self.init_on_creation = init_on_creation;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }
}

/// 控制器初始化阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Uninitialized,
    GainsSet,
    RefsSet,
    Ready,
}

impl ControllerPhase {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, ControllerPhase::Uninitialized)
    }

    /// 增益是否已下发
    pub fn gains_initialized(&self) -> bool {
        !self.is_uninitialized()
    }

    /// 参考是否已下发
    pub fn refs_initialized(&self) -> bool {
        matches!(self, ControllerPhase::RefsSet | ControllerPhase::Ready)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ControllerPhase::Ready)
    }
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControllerPhase::Uninitialized => "UNINITIALIZED",
            ControllerPhase::GainsSet => "GAINS_SET",
            ControllerPhase::RefsSet => "REFS_SET",
            ControllerPhase::Ready => "READY",
        };
        f.write_str(s)
    }
}

/// `update_state()` 各字段的结果（未提供的字段为 `true`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdateReport {
    pub pos: bool,
    pub vel: bool,
    pub eff: bool,
}

impl StateUpdateReport {
    pub fn all_ok(&self) -> bool {
        self.pos && self.vel && self.eff
    }
}

/// `set_gains()` 各字段的结果（未提供的字段为 `true`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainUpdateReport {
    pub pos_gains: bool,
    pub vel_gains: bool,
}

impl GainUpdateReport {
    pub fn all_ok(&self) -> bool {
        self.pos_gains && self.vel_gains
    }
}

/// `set_refs()` 各字段的结果（未提供的字段为 `true`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefUpdateReport {
    pub eff_ref: bool,
    pub pos_ref: bool,
    pub vel_ref: bool,
}

impl RefUpdateReport {
    pub fn all_ok(&self) -> bool {
        self.eff_ref && self.pos_ref && self.vel_ref
    }
}

/// 阻抗控制律
///
/// 返回 `(pos_err, vel_err, imp_eff)`，所有输入形状相同。
pub fn effort_law(
    eff_ref: &DMatrix<f64>,
    pos_ref: &DMatrix<f64>,
    vel_ref: &DMatrix<f64>,
    pos: &DMatrix<f64>,
    vel: &DMatrix<f64>,
    pos_gains: &DMatrix<f64>,
    vel_gains: &DMatrix<f64>,
) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
    let pos_err = pos_ref - pos;
    let vel_err = vel_ref - vel;
    let imp_eff = eff_ref + pos_gains.component_mul(&pos_err) + vel_gains.component_mul(&vel_err);
    (pos_err, vel_err, imp_eff)
}

/// 控制器缓冲区，全部为 `[num_robots, num_joints]`
#[derive(Debug, Clone)]
struct Buffers {
    pos_gains: Batch,
    vel_gains: Batch,
    eff_ref: Batch,
    pos_ref: Batch,
    vel_ref: Batch,
    pos: Batch,
    vel: Batch,
    eff: Batch,
    pos_err: Batch,
    vel_err: Batch,
    imp_eff: Batch,
}

impl Buffers {
    fn new(rows: usize, cols: usize, pgain: f64, vgain: f64, device: Device) -> Self {
        let zeros = Batch::zeros(rows, cols, device);
        Self {
            pos_gains: Batch::full(rows, cols, pgain, device),
            vel_gains: Batch::full(rows, cols, vgain, device),
            eff_ref: zeros.clone(),
            pos_ref: zeros.clone(),
            vel_ref: zeros.clone(),
            pos: zeros.clone(),
            vel: zeros.clone(),
            eff: zeros.clone(),
            pos_err: zeros.clone(),
            vel_err: zeros.clone(),
            imp_eff: zeros,
        }
    }

    fn signal(&self, kind: SignalKind) -> &Batch {
        match kind {
            SignalKind::PositionRef => &self.pos_ref,
            SignalKind::VelocityRef => &self.vel_ref,
            SignalKind::EffortRef => &self.eff_ref,
            SignalKind::Position => &self.pos,
            SignalKind::Velocity => &self.vel,
            SignalKind::Effort => &self.eff,
            SignalKind::PositionGain => &self.pos_gains,
            SignalKind::VelocityGain => &self.vel_gains,
        }
    }

    fn signal_mut(&mut self, kind: SignalKind) -> &mut Batch {
        match kind {
            SignalKind::PositionRef => &mut self.pos_ref,
            SignalKind::VelocityRef => &mut self.vel_ref,
            SignalKind::EffortRef => &mut self.eff_ref,
            SignalKind::Position => &mut self.pos,
            SignalKind::Velocity => &mut self.vel,
            SignalKind::Effort => &mut self.eff,
            SignalKind::PositionGain => &mut self.pos_gains,
            SignalKind::VelocityGain => &mut self.vel_gains,
        }
    }
}

/// 三路参考滤波器
#[derive(Debug, Clone)]
struct ReferenceFilters {
    eff: FirstOrderFilter,
    pos: FirstOrderFilter,
    vel: FirstOrderFilter,
}

impl ReferenceFilters {
    fn new(
        dt: f64,
        bandwidth: f64,
        rows: usize,
        cols: usize,
        device: Device,
    ) -> Result<Self, ControlError> {
        Ok(Self {
            eff: FirstOrderFilter::new(dt, bandwidth, rows, cols, device)?,
            pos: FirstOrderFilter::new(dt, bandwidth, rows, cols, device)?,
            vel: FirstOrderFilter::new(dt, bandwidth, rows, cols, device)?,
        })
    }

    fn reset(&mut self) {
        self.eff.reset();
        self.pos.reset();
        self.vel.reset();
    }
}

/// 批量关节阻抗控制器
pub struct ImpedanceController {
    articulation: SharedArticulation,
    config: ImpedanceConfig,
    device: Device,
    num_robots: usize,
    num_joints: usize,
    joint_map: JointIndexMap,
    selector: IndexSelector,
    sink: SharedSink,
    buffers: Buffers,
    filters: Option<ReferenceFilters>,
    phase: ControllerPhase,
}

impl fmt::Debug for ImpedanceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpedanceController")
            .field("num_robots", &self.num_robots)
            .field("num_joints", &self.num_joints)
            .field("device", &self.device)
            .field("phase", &self.phase)
            .field("override_native", &self.config.override_native)
            .field("filter_available", &self.filters.is_some())
            .finish_non_exhaustive()
    }
}

impl ImpedanceController {
    /// 创建控制器并执行一次 `reset()`
    ///
    /// # 错误
    ///
    /// - `ArticulationNotInitialized`: articulation 尚未初始化
    /// - `Types`: 关节名称重复
    /// - `InvalidFilterParams`: 滤波器参数非法
    pub fn new(
        articulation: SharedArticulation,
        config: ImpedanceConfig,
        sink: SharedSink,
    ) -> Result<Self, ControlError> {
        if !articulation.is_initialized() {
            return Err(ControlError::ArticulationNotInitialized);
        }

        let num_robots = articulation.robot_count();
        let num_joints = articulation.joint_count();
        let joint_map = JointIndexMap::from_names(articulation.joint_names())?;
        let device = config.device.unwrap_or_else(|| articulation.device());

        let filters = match config.filter_dt {
            Some(dt) => Some(ReferenceFilters::new(
                dt,
                config.filter_bandwidth,
                num_robots,
                num_joints,
                device,
            )?),
            None => {
                info!("No filter dt provided, reference filter will not be available");
                None
            },
        };

        let buffers = Buffers::new(
            num_robots,
            num_joints,
            config.default_pgain,
            config.default_vgain,
            device,
        );

        let mut controller = Self {
            selector: IndexSelector::new(num_robots, num_joints, sink.clone()),
            articulation,
            config,
            device,
            num_robots,
            num_joints,
            joint_map,
            sink,
            buffers,
            filters,
            phase: ControllerPhase::Uninitialized,
        };
        controller.reset()?;

        info!(
            "Impedance controller created: {} robots x {} joints on {} (override native: {})",
            num_robots, num_joints, device, controller.config.override_native
        );
        Ok(controller)
    }

    /// 所有缓冲区恢复默认值，状态机回到 `UNINITIALIZED`
    ///
    /// 开启 `init_on_creation` 时随后立即执行两步初始化。
    pub fn reset(&mut self) -> Result<(), ControlError> {
        self.ensure_initialized()?;

        self.phase = ControllerPhase::Uninitialized;
        self.buffers = Buffers::new(
            self.num_robots,
            self.num_joints,
            self.config.default_pgain,
            self.config.default_vgain,
            self.device,
        );
        if let Some(filters) = self.filters.as_mut() {
            filters.reset();
        }
        debug!("Impedance controller reset");

        if self.config.init_on_creation {
            self.initialize_gains()?;
            self.initialize_refs()?;
        }
        Ok(())
    }

    /// `UNINITIALIZED → GAINS_SET`：下发增益（覆盖模式下下发零增益）
    ///
    /// 其他阶段为空操作。
    pub fn initialize_gains(&mut self) -> Result<(), ControlError> {
        self.ensure_initialized()?;
        if !self.phase.is_uninitialized() {
            return Ok(());
        }

        if self.config.override_native {
            let no_gains = Batch::zeros(self.num_robots, self.num_joints, self.device);
            self.articulation
                .set_gains(Some(&no_gains), Some(&no_gains))?;
            debug!("Native PD gains zeroed (override mode)");
        } else {
            self.articulation
                .set_gains(Some(&self.buffers.pos_gains), Some(&self.buffers.vel_gains))?;
            debug!("Native PD gains initialized");
        }
        self.phase = ControllerPhase::GainsSet;
        Ok(())
    }

    /// `GAINS_SET → REFS_SET`：下发参考（覆盖模式下只下发力矩参考）
    ///
    /// # 错误
    ///
    /// 在 `UNINITIALIZED` 阶段调用返回 `InvalidTransition`。
    pub fn initialize_refs(&mut self) -> Result<(), ControlError> {
        self.ensure_initialized()?;
        match self.phase {
            ControllerPhase::Uninitialized => Err(ControlError::InvalidTransition {
                from: ControllerPhase::Uninitialized,
                to: ControllerPhase::RefsSet,
            }),
            ControllerPhase::GainsSet => {
                self.articulation.set_joint_efforts(&self.buffers.eff_ref)?;
                if !self.config.override_native {
                    self.articulation
                        .set_joint_position_targets(&self.buffers.pos_ref)?;
                    self.articulation
                        .set_joint_velocity_targets(&self.buffers.vel_ref)?;
                }
                self.phase = ControllerPhase::RefsSet;
                debug!("References initialized");
                Ok(())
            },
            ControllerPhase::RefsSet | ControllerPhase::Ready => Ok(()),
        }
    }

    /// 写入测量值
    pub fn update_state(
        &mut self,
        pos: Option<&Batch>,
        vel: Option<&Batch>,
        eff: Option<&Batch>,
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> Result<StateUpdateReport, ControlError> {
        self.ensure_initialized()?;
        let [pos, vel, eff] = self.write_signals(
            [
                (SignalKind::Position, pos),
                (SignalKind::Velocity, vel),
                (SignalKind::Effort, eff),
            ],
            robot_indices,
            joint_indices,
        );
        Ok(StateUpdateReport { pos, vel, eff })
    }

    /// 写入增益；非覆盖模式下成功写入的增益立即下发到原生 PD
    pub fn set_gains(
        &mut self,
        pos_gains: Option<&Batch>,
        vel_gains: Option<&Batch>,
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> Result<GainUpdateReport, ControlError> {
        self.ensure_initialized()?;
        let [pos_ok, vel_ok] = self.write_signals(
            [
                (SignalKind::PositionGain, pos_gains),
                (SignalKind::VelocityGain, vel_gains),
            ],
            robot_indices,
            joint_indices,
        );

        if !self.config.override_native {
            if pos_gains.is_some() && pos_ok {
                self.articulation
                    .set_gains(Some(&self.buffers.pos_gains), None)?;
            }
            if vel_gains.is_some() && vel_ok {
                self.articulation
                    .set_gains(None, Some(&self.buffers.vel_gains))?;
            }
        }

        Ok(GainUpdateReport {
            pos_gains: pos_ok,
            vel_gains: vel_ok,
        })
    }

    /// 写入参考（不立即下发）
    pub fn set_refs(
        &mut self,
        eff_ref: Option<&Batch>,
        pos_ref: Option<&Batch>,
        vel_ref: Option<&Batch>,
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> Result<RefUpdateReport, ControlError> {
        self.ensure_initialized()?;
        let [eff_ref, pos_ref, vel_ref] = self.write_signals(
            [
                (SignalKind::EffortRef, eff_ref),
                (SignalKind::PositionRef, pos_ref),
                (SignalKind::VelocityRef, vel_ref),
            ],
            robot_indices,
            joint_indices,
        );
        Ok(RefUpdateReport {
            eff_ref,
            pos_ref,
            vel_ref,
        })
    }

    /// 计算并下发指令
    ///
    /// 1. 补齐未执行的初始化步骤
    /// 2. `use_filter` 且滤波器可用时，参考先经过滤波器
    /// 3. 计算 `pos_err`、`vel_err`、`imp_eff`
    /// 4. 设备同步屏障
    /// 5. 覆盖模式：只下发 `imp_eff`；否则依次下发力矩、位置目标、速度目标
    pub fn apply_cmds(&mut self, use_filter: bool) -> Result<(), ControlError> {
        self.ensure_initialized()?;
        if self.phase.is_uninitialized() {
            self.initialize_gains()?;
        }
        if !self.phase.refs_initialized() {
            self.initialize_refs()?;
        }

        if use_filter && self.filters.is_none() {
            self.sink.report(COMPONENT, Diagnostic::FilterUnavailable);
        }

        let buffers = &mut self.buffers;
        let (eff_src, pos_src, vel_src) = match self.filters.as_mut() {
            Some(filters) if use_filter => {
                filters.eff.update(Some(&buffers.eff_ref))?;
                filters.pos.update(Some(&buffers.pos_ref))?;
                filters.vel.update(Some(&buffers.vel_ref))?;
                (filters.eff.get(), filters.pos.get(), filters.vel.get())
            },
            _ => (&buffers.eff_ref, &buffers.pos_ref, &buffers.vel_ref),
        };

        let (pos_err, vel_err, imp_eff) = effort_law(
            eff_src.as_matrix(),
            pos_src.as_matrix(),
            vel_src.as_matrix(),
            buffers.pos.as_matrix(),
            buffers.vel.as_matrix(),
            buffers.pos_gains.as_matrix(),
            buffers.vel_gains.as_matrix(),
        );
        buffers.pos_err.as_matrix_mut().copy_from(&pos_err);
        buffers.vel_err.as_matrix_mut().copy_from(&vel_err);
        buffers.imp_eff.as_matrix_mut().copy_from(&imp_eff);

        self.articulation.synchronize()?;
        if self.config.override_native {
            self.articulation.set_joint_efforts(&buffers.imp_eff)?;
        } else {
            self.articulation.set_joint_efforts(eff_src)?;
            self.articulation.set_joint_position_targets(pos_src)?;
            self.articulation.set_joint_velocity_targets(vel_src)?;
        }

        self.phase = ControllerPhase::Ready;
        Ok(())
    }

    /// 名称中包含 `pattern` 的关节（按关节顺序）
    pub fn get_jnt_names_matching(&self, pattern: &str) -> Vec<&str> {
        self.joint_map.names_matching(pattern)
    }

    /// 名称中包含 `pattern` 的关节列索引
    pub fn get_jnt_indices_matching(&self, pattern: &str) -> Vec<usize> {
        self.joint_map.indices_matching(pattern)
    }

    pub fn pos_gains(&self) -> &Batch {
        &self.buffers.pos_gains
    }

    pub fn vel_gains(&self) -> &Batch {
        &self.buffers.vel_gains
    }

    pub fn eff_ref(&self) -> &Batch {
        &self.buffers.eff_ref
    }

    pub fn pos_ref(&self) -> &Batch {
        &self.buffers.pos_ref
    }

    pub fn vel_ref(&self) -> &Batch {
        &self.buffers.vel_ref
    }

    pub fn pos_err(&self) -> &Batch {
        &self.buffers.pos_err
    }

    pub fn vel_err(&self) -> &Batch {
        &self.buffers.vel_err
    }

    pub fn pos(&self) -> &Batch {
        &self.buffers.pos
    }

    pub fn vel(&self) -> &Batch {
        &self.buffers.vel
    }

    pub fn eff(&self) -> &Batch {
        &self.buffers.eff
    }

    /// 最近一次 `apply_cmds()` 计算的指令力矩
    pub fn imp_eff(&self) -> &Batch {
        &self.buffers.imp_eff
    }

    pub fn signal(&self, kind: SignalKind) -> &Batch {
        self.buffers.signal(kind)
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn num_robots(&self) -> usize {
        self.num_robots
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    pub fn joint_names(&self) -> &[String] {
        self.joint_map.names()
    }

    pub fn joint_map(&self) -> &JointIndexMap {
        &self.joint_map
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn config(&self) -> &ImpedanceConfig {
        &self.config
    }

    pub fn filter_available(&self) -> bool {
        self.filters.is_some()
    }

    pub fn articulation(&self) -> &SharedArticulation {
        &self.articulation
    }

    fn ensure_initialized(&self) -> Result<(), ControlError> {
        if self.articulation.is_initialized() {
            Ok(())
        } else {
            Err(ControlError::ArticulationNotInitialized)
        }
    }

    /// 构造选择器并逐个写入信号，返回每个字段的结果
    fn write_signals<const N: usize>(
        &mut self,
        signals: [(SignalKind, Option<&Batch>); N],
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> [bool; N] {
        let selector = self.selector.build(robot_indices, joint_indices);
        let mut results = [true; N];
        for (result, (kind, signal)) in results.iter_mut().zip(signals) {
            let Some(signal) = signal else {
                continue;
            };
            *result = match &selector {
                Some(selector) => {
                    let valid = self.validate_signal(kind, signal, selector);
                    if valid {
                        selector.assign(
                            self.buffers.signal_mut(kind).as_matrix_mut(),
                            signal.as_matrix(),
                        );
                    }
                    valid
                },
                None => {
                    self.sink
                        .report(COMPONENT, Diagnostic::SignalRejected { signal: kind });
                    false
                },
            };
        }
        results
    }

    fn validate_signal(&self, kind: SignalKind, signal: &Batch, selector: &Selector) -> bool {
        let (expected_rows, expected_cols) = selector.shape();
        if signal.shape() == (expected_rows, expected_cols)
            && signal.device().is_compatible(&self.device)
        {
            return true;
        }
        self.sink.report(
            COMPONENT,
            Diagnostic::SignalMismatch {
                signal: kind,
                expected_rows,
                expected_cols,
                expected_device: self.device,
                rows: signal.rows(),
                cols: signal.cols(),
                device: signal.device(),
            },
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use robogym_articulation::{MockArticulation, MockCommand};
    use robogym_types::MemorySink;
    use std::sync::Arc;

    struct Fixture {
        mock: Arc<MockArticulation>,
        sink: Arc<MemorySink>,
        controller: ImpedanceController,
    }

    fn fixture(config: ImpedanceConfig) -> Fixture {
        let mock = Arc::new(MockArticulation::new(2, &["hip", "knee", "wheel"]));
        let sink = Arc::new(MemorySink::new());
        let controller = ImpedanceController::new(mock.clone(), config, sink.clone()).unwrap();
        Fixture {
            mock,
            sink,
            controller,
        }
    }

    fn batch(rows: usize, cols: usize, values: &[f64]) -> Batch {
        Batch::from_row_slice(rows, cols, values, Device::Cpu).unwrap()
    }

    fn kinds(commands: &[MockCommand]) -> Vec<&'static str> {
        commands.iter().map(MockCommand::kind).collect()
    }

    #[test]
    fn test_new_requires_initialized_articulation() {
        let mock = Arc::new(MockArticulation::new(2, &["hip"]));
        mock.set_initialized(false);
        let err = ImpedanceController::new(
            mock,
            ImpedanceConfig::default(),
            Arc::new(MemorySink::new()),
        )
        .unwrap_err();
        assert_eq!(err, ControlError::ArticulationNotInitialized);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_new_rejects_duplicate_joint_names() {
        let mock = Arc::new(MockArticulation::new(1, &["hip", "hip"]));
        let err = ImpedanceController::new(
            mock,
            ImpedanceConfig::default(),
            Arc::new(MemorySink::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::Types(_)));
    }

    #[test]
    fn test_default_buffers() {
        let f = fixture(ImpedanceConfig::default());
        let c = &f.controller;
        assert_eq!(c.phase(), ControllerPhase::Uninitialized);
        assert_eq!(c.pos_gains(), &Batch::full(2, 3, 300.0, Device::Cpu));
        assert_eq!(c.vel_gains(), &Batch::full(2, 3, 30.0, Device::Cpu));
        assert!(c.pos_ref().is_all_zero());
        assert!(c.imp_eff().is_all_zero());
        assert!(!c.filter_available());
        // 未初始化时不下发任何指令
        assert!(f.mock.commands().is_empty());
    }

    #[test]
    fn test_selector_scoped_gain_update() {
        let mut f = fixture(ImpedanceConfig::default());
        let report = f
            .controller
            .set_gains(
                Some(&batch(1, 2, &[5.0, 7.0])),
                None,
                Some(&[1]),
                Some(&[0, 2]),
            )
            .unwrap();
        assert!(report.all_ok());

        let g = f.controller.pos_gains();
        assert_eq!(g.row_to_vec(0), vec![300.0, 300.0, 300.0]);
        assert_eq!(g.row_to_vec(1), vec![5.0, 300.0, 7.0]);

        // 非覆盖模式下立即下发 kps
        let commands = f.mock.take_commands();
        assert_eq!(
            commands,
            vec![MockCommand::Gains {
                kps: Some(g.clone()),
                kds: None
            }]
        );
    }

    #[test]
    fn test_out_of_bounds_joint_index_leaves_buffers_untouched() {
        let mut f = fixture(ImpedanceConfig::default());
        let before = f.controller.pos_gains().clone();
        let report = f
            .controller
            .set_gains(Some(&batch(2, 1, &[1.0, 2.0])), None, None, Some(&[5]))
            .unwrap();
        assert!(!report.pos_gains);
        assert!(report.vel_gains);
        assert_eq!(f.controller.pos_gains(), &before);
        assert!(f.mock.commands().is_empty());

        let kinds: Vec<_> = f.sink.take().iter().map(|(_, d)| d.kind()).collect();
        assert_eq!(kinds, vec!["invalid_indices", "signal_rejected"]);
    }

    #[test]
    fn test_shape_and_device_mismatch() {
        let mut f = fixture(ImpedanceConfig::default());
        let report = f
            .controller
            .set_refs(
                Some(&Batch::zeros(2, 2, Device::Cpu)),
                Some(&Batch::full(2, 3, 1.0, Device::Cuda(0))),
                Some(&Batch::full(2, 3, 0.5, Device::Cpu)),
                None,
                None,
            )
            .unwrap();
        assert_eq!(
            report,
            RefUpdateReport {
                eff_ref: false,
                pos_ref: false,
                vel_ref: true
            }
        );
        assert!(f.controller.eff_ref().is_all_zero());
        assert!(f.controller.pos_ref().is_all_zero());
        assert_eq!(f.controller.vel_ref()[(1, 2)], 0.5);

        let events = f.sink.take();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].1,
            Diagnostic::SignalMismatch {
                signal: SignalKind::PositionRef,
                expected_rows: 2,
                expected_cols: 3,
                expected_device: Device::Cpu,
                rows: 2,
                cols: 3,
                device: Device::Cuda(0),
            }
        );
    }

    #[test]
    fn test_unsupplied_fields_report_true() {
        let mut f = fixture(ImpedanceConfig::default());
        let report = f
            .controller
            .update_state(None, None, None, None, None)
            .unwrap();
        assert!(report.all_ok());
    }

    #[test]
    fn test_apply_cmds_native_mode_order() {
        let mut f = fixture(ImpedanceConfig::default());
        f.controller.apply_cmds(false).unwrap();
        assert_eq!(f.controller.phase(), ControllerPhase::Ready);

        assert_eq!(
            kinds(&f.mock.take_commands()),
            vec![
                // 惰性初始化
                "gains",
                "efforts",
                "position_targets",
                "velocity_targets",
                // 指令
                "synchronize",
                "efforts",
                "position_targets",
                "velocity_targets",
            ]
        );

        f.controller.apply_cmds(false).unwrap();
        assert_eq!(
            kinds(&f.mock.take_commands()),
            vec!["synchronize", "efforts", "position_targets", "velocity_targets"]
        );
    }

    #[test]
    fn test_apply_cmds_override_mode_sends_only_effort() {
        let mut f = fixture(ImpedanceConfig::default().with_override(true));
        f.controller
            .set_refs(None, Some(&Batch::full(2, 3, 0.1, Device::Cpu)), None, None, None)
            .unwrap();
        f.controller.apply_cmds(false).unwrap();

        let commands = f.mock.take_commands();
        assert_eq!(
            kinds(&commands),
            vec!["gains", "efforts", "synchronize", "efforts"]
        );
        // 原生增益被置零
        let (kps, kds) = f.mock.gains();
        assert!(kps.is_all_zero());
        assert!(kds.is_all_zero());
        // 下发的力矩为 imp_eff = 300 * 0.1
        match commands.last() {
            Some(MockCommand::Efforts(eff)) => {
                assert_relative_eq!(eff[(0, 0)], 30.0, epsilon = 1e-12);
                assert_eq!(eff, f.controller.imp_eff());
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_override_mode_never_pushes_gains() {
        let mut f = fixture(ImpedanceConfig::default().with_override(true));
        let report = f
            .controller
            .set_gains(
                Some(&Batch::full(2, 3, 10.0, Device::Cpu)),
                Some(&Batch::full(2, 3, 1.0, Device::Cpu)),
                None,
                None,
            )
            .unwrap();
        assert!(report.all_ok());
        assert!(f.mock.commands().is_empty());
        assert_eq!(f.controller.pos_gains()[(0, 0)], 10.0);
    }

    #[test]
    fn test_effort_law_in_native_mode_is_still_recorded() {
        let mut f = fixture(ImpedanceConfig::default().with_gains(2.0, 0.5));
        f.controller
            .update_state(
                Some(&Batch::full(2, 3, 1.0, Device::Cpu)),
                Some(&Batch::full(2, 3, 2.0, Device::Cpu)),
                None,
                None,
                None,
            )
            .unwrap();
        f.controller
            .set_refs(
                Some(&Batch::full(2, 3, 0.25, Device::Cpu)),
                Some(&Batch::full(2, 3, 1.5, Device::Cpu)),
                Some(&Batch::full(2, 3, 1.0, Device::Cpu)),
                None,
                None,
            )
            .unwrap();
        f.controller.apply_cmds(false).unwrap();

        // 0.25 + 2·(1.5 − 1) + 0.5·(1 − 2) = 0.75
        assert_relative_eq!(f.controller.pos_err()[(1, 1)], 0.5);
        assert_relative_eq!(f.controller.vel_err()[(1, 1)], -1.0);
        assert_relative_eq!(f.controller.imp_eff()[(1, 1)], 0.75);
    }

    #[test]
    fn test_init_on_creation() {
        let f = fixture(ImpedanceConfig::default().with_init_on_creation(true));
        assert_eq!(f.controller.phase(), ControllerPhase::RefsSet);
        assert_eq!(
            kinds(&f.mock.commands()),
            vec!["gains", "efforts", "position_targets", "velocity_targets"]
        );
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut f = fixture(ImpedanceConfig::default());
        let err = f.controller.initialize_refs().unwrap_err();
        assert_eq!(
            err,
            ControlError::InvalidTransition {
                from: ControllerPhase::Uninitialized,
                to: ControllerPhase::RefsSet
            }
        );

        f.controller.initialize_gains().unwrap();
        assert_eq!(f.controller.phase(), ControllerPhase::GainsSet);
        // 重复调用为空操作
        f.controller.initialize_gains().unwrap();
        assert_eq!(kinds(&f.mock.take_commands()), vec!["gains"]);

        f.controller.initialize_refs().unwrap();
        assert_eq!(f.controller.phase(), ControllerPhase::RefsSet);
        f.controller.apply_cmds(false).unwrap();
        assert!(f.controller.phase().is_ready());

        f.controller.reset().unwrap();
        assert_eq!(f.controller.phase(), ControllerPhase::Uninitialized);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut f = fixture(ImpedanceConfig::default().with_filter(0.01, 5.0));
        f.controller
            .set_gains(Some(&Batch::full(2, 3, 1.0, Device::Cpu)), None, None, None)
            .unwrap();
        f.controller
            .set_refs(None, Some(&Batch::full(2, 3, 1.0, Device::Cpu)), None, None, None)
            .unwrap();
        f.controller.apply_cmds(true).unwrap();

        f.controller.reset().unwrap();
        let once = (
            f.controller.pos_gains().clone(),
            f.controller.pos_ref().clone(),
            f.controller.imp_eff().clone(),
            f.controller.phase(),
        );
        f.controller.reset().unwrap();
        let twice = (
            f.controller.pos_gains().clone(),
            f.controller.pos_ref().clone(),
            f.controller.imp_eff().clone(),
            f.controller.phase(),
        );
        assert_eq!(once, twice);
        assert_eq!(once.0, Batch::full(2, 3, 300.0, Device::Cpu));
    }

    #[test]
    fn test_filtered_references() {
        let dt = 0.01;
        let bw = 5.0;
        let mut f = fixture(ImpedanceConfig::default().with_filter(dt, bw));
        assert!(f.controller.filter_available());

        let step = Batch::full(2, 3, 1.0, Device::Cpu);
        f.controller
            .set_refs(None, Some(&step), None, None, None)
            .unwrap();
        f.controller.apply_cmds(true).unwrap();

        let reference = FirstOrderFilter::new(dt, bw, 1, 1, Device::Cpu).unwrap();
        let (_, c2) = reference.coefficients();
        match f.mock.commands().iter().rev().nth(1) {
            Some(MockCommand::PositionTargets(targets)) => {
                assert_relative_eq!(targets[(0, 0)], c2, epsilon = 1e-12);
            },
            other => panic!("unexpected command: {:?}", other),
        }
        // 参考缓冲区本身不被滤波修改
        assert_eq!(f.controller.pos_ref(), &step);
    }

    #[test]
    fn test_filter_requested_without_filter() {
        let mut f = fixture(ImpedanceConfig::default());
        f.controller.apply_cmds(true).unwrap();
        let events = f.sink.take();
        assert_eq!(events[0].1, Diagnostic::FilterUnavailable);
    }

    #[test]
    fn test_operations_fail_when_articulation_deinitialized() {
        let mut f = fixture(ImpedanceConfig::default());
        f.mock.set_initialized(false);
        assert_eq!(
            f.controller.apply_cmds(false),
            Err(ControlError::ArticulationNotInitialized)
        );
        assert!(f.controller.update_state(None, None, None, None, None).is_err());
        assert!(f.controller.reset().is_err());
    }

    #[test]
    fn test_articulation_failure_propagates() {
        let mut f = fixture(ImpedanceConfig::default());
        f.controller.apply_cmds(false).unwrap();
        f.mock.fail_next_command("device lost");
        let err = f.controller.apply_cmds(false).unwrap_err();
        assert!(matches!(err, ControlError::Articulation(_)));
    }

    #[test]
    fn test_joint_matching() {
        let f = fixture(ImpedanceConfig::default());
        assert_eq!(f.controller.get_jnt_names_matching("wheel"), vec!["wheel"]);
        assert_eq!(f.controller.get_jnt_indices_matching("e"), vec![1, 2]);
        assert!(f.controller.get_jnt_indices_matching("arm").is_empty());
    }

    #[test]
    fn test_signal_accessor_matches_named_accessors() {
        let f = fixture(ImpedanceConfig::default());
        assert_eq!(
            f.controller.signal(SignalKind::PositionGain),
            f.controller.pos_gains()
        );
        assert_eq!(
            f.controller.signal(SignalKind::VelocityGain),
            f.controller.vel_gains()
        );
    }
}
