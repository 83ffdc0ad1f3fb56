//! Mock articulation（无仿真器依赖）
//!
//! 用于单元测试与集成测试：
//! - 按顺序记录所有下发的指令（包括同步屏障）
//! - 测试代码可以直接驱动关节/根状态
//! - 可以切换为未初始化状态或让下一条指令失败

use parking_lot::Mutex;
use robogym_types::{Batch, Device};
use tracing::trace;

use crate::{Articulation, ArticulationError, Result};

/// 记录的指令
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    PositionTargets(Batch),
    VelocityTargets(Batch),
    Efforts(Batch),
    Gains {
        kps: Option<Batch>,
        kds: Option<Batch>,
    },
    DefaultRootState {
        positions: Batch,
        orientations: Batch,
    },
    DefaultJointState {
        positions: Batch,
        velocities: Batch,
        efforts: Batch,
    },
    SolverIterations {
        position: Vec<u32>,
        velocity: Vec<u32>,
    },
    Synchronize,
}

impl MockCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            MockCommand::PositionTargets(_) => "position_targets",
            MockCommand::VelocityTargets(_) => "velocity_targets",
            MockCommand::Efforts(_) => "efforts",
            MockCommand::Gains { .. } => "gains",
            MockCommand::DefaultRootState { .. } => "default_root_state",
            MockCommand::DefaultJointState { .. } => "default_joint_state",
            MockCommand::SolverIterations { .. } => "solver_iterations",
            MockCommand::Synchronize => "synchronize",
        }
    }
}

#[derive(Debug)]
struct MockState {
    initialized: bool,
    joint_positions: Batch,
    joint_velocities: Batch,
    root_positions: Batch,
    root_orientations: Batch,
    linear_velocities: Batch,
    angular_velocities: Batch,
    kps: Batch,
    kds: Batch,
    solver_position_iterations: Vec<u32>,
    solver_velocity_iterations: Vec<u32>,
    commands: Vec<MockCommand>,
    fail_next: Option<String>,
}

/// Mock articulation
#[derive(Debug)]
pub struct MockArticulation {
    joint_names: Vec<String>,
    robot_count: usize,
    device: Device,
    state: Mutex<MockState>,
}

impl MockArticulation {
    /// 创建已初始化的 mock：关节与根状态为零，姿态为单位四元数，
    /// 求解器迭代次数为 `(4, 1)`
    pub fn new(robot_count: usize, joint_names: &[&str]) -> Self {
        Self::with_device(robot_count, joint_names, Device::Cpu)
    }

    pub fn with_device(robot_count: usize, joint_names: &[&str], device: Device) -> Self {
        let n = robot_count;
        let j = joint_names.len();
        let mut root_orientations = Batch::zeros(n, 4, device);
        for r in 0..n {
            root_orientations[(r, 0)] = 1.0;
        }
        Self {
            joint_names: joint_names.iter().map(|s| s.to_string()).collect(),
            robot_count,
            device,
            state: Mutex::new(MockState {
                initialized: true,
                joint_positions: Batch::zeros(n, j, device),
                joint_velocities: Batch::zeros(n, j, device),
                root_positions: Batch::zeros(n, 3, device),
                root_orientations,
                linear_velocities: Batch::zeros(n, 3, device),
                angular_velocities: Batch::zeros(n, 3, device),
                kps: Batch::zeros(n, j, device),
                kds: Batch::zeros(n, j, device),
                solver_position_iterations: vec![4; n],
                solver_velocity_iterations: vec![1; n],
                commands: Vec::new(),
                fail_next: None,
            }),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.state.lock().initialized = initialized;
    }

    pub fn drive_joint_positions(&self, positions: Batch) {
        self.state.lock().joint_positions = positions;
    }

    pub fn drive_joint_velocities(&self, velocities: Batch) {
        self.state.lock().joint_velocities = velocities;
    }

    pub fn drive_root_pose(&self, positions: Batch, orientations: Batch) {
        let mut state = self.state.lock();
        state.root_positions = positions;
        state.root_orientations = orientations;
    }

    pub fn drive_root_velocities(&self, linear: Batch, angular: Batch) {
        let mut state = self.state.lock();
        state.linear_velocities = linear;
        state.angular_velocities = angular;
    }

    /// 让下一条写入指令失败（返回 `ArticulationError::Backend`）
    pub fn fail_next_command(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    /// 已记录指令的快照
    pub fn commands(&self) -> Vec<MockCommand> {
        self.state.lock().commands.clone()
    }

    /// 取出并清空已记录指令
    pub fn take_commands(&self) -> Vec<MockCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// 当前原生 PD 增益 `(kps, kds)`
    pub fn gains(&self) -> (Batch, Batch) {
        let state = self.state.lock();
        (state.kps.clone(), state.kds.clone())
    }

    fn check_shape(&self, what: &'static str, batch: &Batch, cols: usize) -> Result<()> {
        if batch.shape() != (self.robot_count, cols) {
            return Err(ArticulationError::ShapeMismatch {
                what,
                expected_rows: self.robot_count,
                expected_cols: cols,
                rows: batch.rows(),
                cols: batch.cols(),
            });
        }
        Ok(())
    }

    /// 公共写入前置检查：初始化状态与注入的失败
    fn record(&self, command: MockCommand) -> Result<()> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(ArticulationError::NotInitialized);
        }
        if let Some(message) = state.fail_next.take() {
            return Err(ArticulationError::Backend(message));
        }
        trace!("mock articulation received {}", command.kind());
        if let MockCommand::Gains { kps, kds } = &command {
            if let Some(kps) = kps {
                state.kps = kps.clone();
            }
            if let Some(kds) = kds {
                state.kds = kds.clone();
            }
        }
        if let MockCommand::SolverIterations { position, velocity } = &command {
            state.solver_position_iterations = position.clone();
            state.solver_velocity_iterations = velocity.clone();
        }
        state.commands.push(command);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> Result<T> {
        let state = self.state.lock();
        if !state.initialized {
            return Err(ArticulationError::NotInitialized);
        }
        Ok(f(&state))
    }
}

impl Articulation for MockArticulation {
    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    fn robot_count(&self) -> usize {
        self.robot_count
    }

    fn joint_count(&self) -> usize {
        self.joint_names.len()
    }

    fn joint_names(&self) -> Vec<String> {
        self.joint_names.clone()
    }

    fn device(&self) -> Device {
        self.device
    }

    fn joint_positions(&self) -> Result<Batch> {
        self.read(|s| s.joint_positions.clone())
    }

    fn joint_velocities(&self) -> Result<Batch> {
        self.read(|s| s.joint_velocities.clone())
    }

    fn world_poses(&self) -> Result<(Batch, Batch)> {
        self.read(|s| (s.root_positions.clone(), s.root_orientations.clone()))
    }

    fn linear_velocities(&self) -> Result<Batch> {
        self.read(|s| s.linear_velocities.clone())
    }

    fn angular_velocities(&self) -> Result<Batch> {
        self.read(|s| s.angular_velocities.clone())
    }

    fn set_joint_position_targets(&self, targets: &Batch) -> Result<()> {
        self.check_shape("joint position targets", targets, self.joint_count())?;
        self.record(MockCommand::PositionTargets(targets.clone()))
    }

    fn set_joint_velocity_targets(&self, targets: &Batch) -> Result<()> {
        self.check_shape("joint velocity targets", targets, self.joint_count())?;
        self.record(MockCommand::VelocityTargets(targets.clone()))
    }

    fn set_joint_efforts(&self, efforts: &Batch) -> Result<()> {
        self.check_shape("joint efforts", efforts, self.joint_count())?;
        self.record(MockCommand::Efforts(efforts.clone()))
    }

    fn set_gains(&self, kps: Option<&Batch>, kds: Option<&Batch>) -> Result<()> {
        if let Some(kps) = kps {
            self.check_shape("kps", kps, self.joint_count())?;
        }
        if let Some(kds) = kds {
            self.check_shape("kds", kds, self.joint_count())?;
        }
        self.record(MockCommand::Gains {
            kps: kps.cloned(),
            kds: kds.cloned(),
        })
    }

    fn set_default_state(&self, positions: &Batch, orientations: &Batch) -> Result<()> {
        self.check_shape("default root positions", positions, 3)?;
        self.check_shape("default root orientations", orientations, 4)?;
        self.record(MockCommand::DefaultRootState {
            positions: positions.clone(),
            orientations: orientations.clone(),
        })
    }

    fn set_joints_default_state(
        &self,
        positions: &Batch,
        velocities: &Batch,
        efforts: &Batch,
    ) -> Result<()> {
        let j = self.joint_count();
        self.check_shape("default joint positions", positions, j)?;
        self.check_shape("default joint velocities", velocities, j)?;
        self.check_shape("default joint efforts", efforts, j)?;
        self.record(MockCommand::DefaultJointState {
            positions: positions.clone(),
            velocities: velocities.clone(),
            efforts: efforts.clone(),
        })
    }

    fn solver_iteration_counts(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        self.read(|s| {
            (
                s.solver_position_iterations.clone(),
                s.solver_velocity_iterations.clone(),
            )
        })
    }

    fn set_solver_iteration_counts(&self, position: &[u32], velocity: &[u32]) -> Result<()> {
        for (what, counts) in [
            ("solver position iterations", position),
            ("solver velocity iterations", velocity),
        ] {
            if counts.len() != self.robot_count {
                return Err(ArticulationError::ShapeMismatch {
                    what,
                    expected_rows: self.robot_count,
                    expected_cols: 1,
                    rows: counts.len(),
                    cols: 1,
                });
            }
        }
        self.record(MockCommand::SolverIterations {
            position: position.to_vec(),
            velocity: velocity.to_vec(),
        })
    }

    fn synchronize(&self) -> Result<()> {
        self.record(MockCommand::Synchronize)
    }
}
