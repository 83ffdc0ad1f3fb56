//! 状态同步器
//!
//! 每个周期读取一种机器人所有副本的根位姿与关节位置，速度来源二选一：
//!
//! - `VelocitySource::Direct`: 直接读取 articulation 报告的速度
//! - `VelocitySource::Differentiated { dt }`: 对位置/姿态数值微分
//!
//! 微分模式下，reset 周期的速度严格为零（避免 reset 造成的速度尖峰），
//! 并且每个周期结束时都用最新状态刷新 `_prev` 缓冲区。

use nalgebra::Vector3;
use robogym_articulation::SharedArticulation;
use robogym_types::{Batch, Device};
use tracing::{debug, info, trace};

use crate::SyncError;
use crate::kinematics::quat_to_omega;

/// 速度来源
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VelocitySource {
    /// 直接读取仿真器速度
    Direct,
    /// 以步长 `dt`（秒）数值微分
    Differentiated { dt: f64 },
}

impl VelocitySource {
    /// `None` 表示直接读取
    pub fn from_dt(dt: Option<f64>) -> Self {
        match dt {
            Some(dt) => VelocitySource::Differentiated { dt },
            None => VelocitySource::Direct,
        }
    }
}

/// 一种机器人的状态同步器
pub struct StateSynchronizer {
    articulation: SharedArticulation,
    num_robots: usize,
    num_joints: usize,
    device: Device,
    spawn_offset: Vector3<f64>,

    root_p: Batch,
    root_q: Batch,
    root_v: Batch,
    root_omega: Batch,
    jnts_q: Batch,
    jnts_v: Batch,

    root_p_prev: Batch,
    root_q_prev: Batch,
    jnts_q_prev: Batch,

    root_p_default: Batch,
    root_q_default: Batch,
    root_abs_offsets: Batch,
}

impl StateSynchronizer {
    /// 读取初始状态并计算默认位姿
    ///
    /// - 默认根位置 = 初始根位置 + `spawn_offset`
    /// - 默认根姿态 = 初始根姿态
    /// - `root_abs_offsets` 的 x/y 取初始根位置，z = 0
    pub fn new(
        articulation: SharedArticulation,
        spawn_offset: Vector3<f64>,
    ) -> Result<Self, SyncError> {
        if !articulation.is_initialized() {
            return Err(SyncError::ArticulationNotInitialized);
        }
        let num_robots = articulation.robot_count();
        let num_joints = articulation.joint_count();
        let device = articulation.device();

        let (root_p, root_q) = articulation.world_poses()?;
        check_shape("root positions", &root_p, num_robots, 3)?;
        check_shape("root orientations", &root_q, num_robots, 4)?;
        let jnts_q = articulation.joint_positions()?;
        check_shape("joint positions", &jnts_q, num_robots, num_joints)?;
        let root_v = articulation.linear_velocities()?;
        check_shape("root linear velocities", &root_v, num_robots, 3)?;
        let root_omega = articulation.angular_velocities()?;
        check_shape("root angular velocities", &root_omega, num_robots, 3)?;
        let jnts_v = articulation.joint_velocities()?;
        check_shape("joint velocities", &jnts_v, num_robots, num_joints)?;

        let mut root_p_default = root_p.clone();
        let mut root_abs_offsets = Batch::zeros(num_robots, 3, device);
        for r in 0..num_robots {
            for c in 0..3 {
                root_p_default[(r, c)] += spawn_offset[c];
            }
            root_abs_offsets[(r, 0)] = root_p[(r, 0)];
            root_abs_offsets[(r, 1)] = root_p[(r, 1)];
        }

        info!(
            "State synchronizer created: {} robots x {} joints, spawn offset [{:.3}, {:.3}, {:.3}]",
            num_robots, num_joints, spawn_offset.x, spawn_offset.y, spawn_offset.z
        );

        Ok(Self {
            articulation,
            num_robots,
            num_joints,
            device,
            spawn_offset,
            root_p_prev: root_p.clone(),
            root_q_prev: root_q.clone(),
            jnts_q_prev: jnts_q.clone(),
            root_q_default: root_q.clone(),
            root_p_default,
            root_abs_offsets,
            root_p,
            root_q,
            root_v,
            root_omega,
            jnts_q,
            jnts_v,
        })
    }

    /// 刷新一个周期的状态
    ///
    /// `reset` 只影响微分模式：速度置零，随后照常刷新 `_prev`。
    /// 读取、校验与微分全部成功后才写回缓冲区；出错时状态保持不变。
    pub fn refresh(&mut self, source: VelocitySource, reset: bool) -> Result<(), SyncError> {
        if !self.articulation.is_initialized() {
            return Err(SyncError::ArticulationNotInitialized);
        }
        match source {
            VelocitySource::Differentiated { dt } if !(dt.is_finite() && dt > 0.0) => {
                return Err(SyncError::InvalidDt(dt));
            },
            _ => {},
        }

        let (n, j) = (self.num_robots, self.num_joints);
        let (root_p, root_q) = self.articulation.world_poses()?;
        check_shape("root positions", &root_p, n, 3)?;
        check_shape("root orientations", &root_q, n, 4)?;
        let jnts_q = self.articulation.joint_positions()?;
        check_shape("joint positions", &jnts_q, n, j)?;

        let (root_v, root_omega, jnts_v) = match source {
            VelocitySource::Direct => {
                let root_v = self.articulation.linear_velocities()?;
                check_shape("root linear velocities", &root_v, n, 3)?;
                let root_omega = self.articulation.angular_velocities()?;
                check_shape("root angular velocities", &root_omega, n, 3)?;
                let jnts_v = self.articulation.joint_velocities()?;
                check_shape("joint velocities", &jnts_v, n, j)?;
                (root_v, root_omega, jnts_v)
            },
            VelocitySource::Differentiated { .. } if reset => (
                Batch::zeros(n, 3, self.device),
                Batch::zeros(n, 3, self.device),
                Batch::zeros(n, j, self.device),
            ),
            VelocitySource::Differentiated { dt } => {
                let root_omega = quat_to_omega(&root_q, &self.root_q_prev, dt)?;
                (
                    difference_quotient(&root_p, &self.root_p_prev, dt),
                    root_omega,
                    difference_quotient(&jnts_q, &self.jnts_q_prev, dt),
                )
            },
        };

        if let VelocitySource::Differentiated { .. } = source {
            self.root_p_prev.as_matrix_mut().copy_from(root_p.as_matrix());
            self.root_q_prev.as_matrix_mut().copy_from(root_q.as_matrix());
            self.jnts_q_prev.as_matrix_mut().copy_from(jnts_q.as_matrix());
        }
        self.root_p = root_p;
        self.root_q = root_q;
        self.jnts_q = jnts_q;
        self.root_v = root_v;
        self.root_omega = root_omega;
        self.jnts_v = jnts_v;

        trace!("State refreshed ({:?}, reset: {})", source, reset);
        Ok(())
    }

    /// 用当前根位姿覆盖默认根位姿
    pub fn sync_default_root_states(&mut self) {
        self.root_p_default
            .as_matrix_mut()
            .copy_from(self.root_p.as_matrix());
        self.root_q_default
            .as_matrix_mut()
            .copy_from(self.root_q.as_matrix());
    }

    /// 下发默认关节状态（homing 位置，零速度、零力矩）
    pub fn push_joint_defaults(&self, homing: &Batch) -> Result<(), SyncError> {
        check_shape("homing", homing, self.num_robots, self.num_joints)?;
        let zeros = Batch::zeros(self.num_robots, self.num_joints, self.device);
        self.articulation
            .set_joints_default_state(homing, &zeros, &zeros)?;
        Ok(())
    }

    /// 下发默认根位姿
    pub fn push_root_defaults(&self) -> Result<(), SyncError> {
        self.articulation
            .set_default_state(&self.root_p_default, &self.root_q_default)?;
        Ok(())
    }

    /// 下发默认关节状态与默认根位姿
    pub fn push_defaults(&self, homing: &Batch) -> Result<(), SyncError> {
        self.push_joint_defaults(homing)?;
        self.push_root_defaults()?;
        debug!("Default joint and root states pushed");
        Ok(())
    }

    pub fn root_p(&self) -> &Batch {
        &self.root_p
    }

    pub fn root_q(&self) -> &Batch {
        &self.root_q
    }

    pub fn root_v(&self) -> &Batch {
        &self.root_v
    }

    pub fn root_omega(&self) -> &Batch {
        &self.root_omega
    }

    pub fn jnts_q(&self) -> &Batch {
        &self.jnts_q
    }

    pub fn jnts_v(&self) -> &Batch {
        &self.jnts_v
    }

    pub fn root_p_prev(&self) -> &Batch {
        &self.root_p_prev
    }

    pub fn root_q_prev(&self) -> &Batch {
        &self.root_q_prev
    }

    pub fn jnts_q_prev(&self) -> &Batch {
        &self.jnts_q_prev
    }

    pub fn root_p_default(&self) -> &Batch {
        &self.root_p_default
    }

    pub fn root_q_default(&self) -> &Batch {
        &self.root_q_default
    }

    /// 各副本在地面上的参考位置（x/y 为初始根位置，z = 0）
    pub fn root_abs_offsets(&self) -> &Batch {
        &self.root_abs_offsets
    }

    pub fn spawn_offset(&self) -> &Vector3<f64> {
        &self.spawn_offset
    }

    pub fn num_robots(&self) -> usize {
        self.num_robots
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

fn check_shape(
    what: &'static str,
    b: &Batch,
    expected_rows: usize,
    expected_cols: usize,
) -> Result<(), SyncError> {
    if b.shape() != (expected_rows, expected_cols) {
        return Err(SyncError::ShapeMismatch {
            what,
            expected_rows,
            expected_cols,
            rows: b.rows(),
            cols: b.cols(),
        });
    }
    Ok(())
}

/// `(x − x_prev) / dt`
fn difference_quotient(x: &Batch, x_prev: &Batch, dt: f64) -> Batch {
    let mut out = x.clone();
    for (o, b) in out.as_matrix_mut().iter_mut().zip(x_prev.as_matrix().iter()) {
        *o = (*o - b) / dt;
    }
    out
}
