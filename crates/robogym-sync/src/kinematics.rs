//! 根姿态与布局相关的运动学工具

use std::f64::consts::PI;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use robogym_types::Batch;

use crate::SyncError;

/// 由相邻两次姿态差分得到角速度（世界坐标系）
///
/// `ω = log(q_t ⊗ q_{t−1}⁻¹)·2/dt`，取最短路径（旋转角 ∈ [0, π]）。
/// 四元数按 `(w, x, y, z)` 存放，输入 `[n, 4]`，输出 `[n, 3]`。
pub fn quat_to_omega(q: &Batch, q_prev: &Batch, dt: f64) -> Result<Batch, SyncError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(SyncError::InvalidDt(dt));
    }
    let rows = q.rows();
    for (what, b) in [("orientation", q), ("previous orientation", q_prev)] {
        if b.shape() != (rows, 4) {
            return Err(SyncError::ShapeMismatch {
                what,
                expected_rows: rows,
                expected_cols: 4,
                rows: b.rows(),
                cols: b.cols(),
            });
        }
    }

    let mut omega = Batch::zeros(rows, 3, q.device());
    for r in 0..rows {
        let q_t = unit_quaternion(q, r)?;
        let q_p = unit_quaternion(q_prev, r)?;
        let w = (q_t * q_p.inverse()).scaled_axis() / dt;
        for c in 0..3 {
            omega[(r, c)] = w[c];
        }
    }
    Ok(omega)
}

fn unit_quaternion(b: &Batch, row: usize) -> Result<UnitQuaternion<f64>, SyncError> {
    let q = Quaternion::new(b[(row, 0)], b[(row, 1)], b[(row, 2)], b[(row, 3)]);
    UnitQuaternion::try_new(q, f64::EPSILON)
        .filter(|u| u.coords.iter().all(|v| v.is_finite()))
        .ok_or(SyncError::DegenerateQuaternion { row })
}

/// 同一环境内 `n` 种机器人在半径为 `radius` 的圆周上的出生偏移
///
/// 第 `i` 种机器人位于角度 `(i+1)·2π/n`，z = 0。
pub fn circular_spawn_offsets(n: usize, radius: f64) -> Vec<Vector3<f64>> {
    if n == 0 {
        return Vec::new();
    }
    let base = 2.0 * PI / n as f64;
    (0..n)
        .map(|i| {
            let angle = base * (i + 1) as f64;
            Vector3::new(radius * angle.cos(), radius * angle.sin(), 0.0)
        })
        .collect()
}
