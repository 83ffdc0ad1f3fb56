//! 一阶低通滤波器组
//!
//! 对 `[rows, cols]` 的每个元素独立滤波。连续系统 `K / (s + K)`，`K = 2π·bandwidth`，
//! 采用双线性（Tustin）变换离散化：
//!
//! ```text
//! y_k = y_{k-1}·c1 + (ref_k + ref_{k-1})·c2
//! c1  = (1 − K·dt/2) / (1 + K·dt/2)
//! c2  = (K·dt/2) / (1 + K·dt/2)
//! ```
//!
//! `dt` 与 `bandwidth` 在滤波器生命周期内不可变。

use std::f64::consts::PI;

use robogym_types::{Batch, Device};

use crate::ControlError;

/// 一阶低通滤波器组
#[derive(Debug, Clone)]
pub struct FirstOrderFilter {
    dt: f64,
    bandwidth: f64,
    coeff_km1: f64,
    coeff_ref: f64,
    yk: Batch,
    ykm1: Batch,
    refk: Batch,
    refkm1: Batch,
}

impl FirstOrderFilter {
    /// 创建滤波器组，所有状态为零
    ///
    /// # 错误
    ///
    /// `dt` 或 `bandwidth` 不是有限正数时返回 `ControlError::InvalidFilterParams`。
    pub fn new(
        dt: f64,
        bandwidth: f64,
        rows: usize,
        cols: usize,
        device: Device,
    ) -> Result<Self, ControlError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(dt) || !valid(bandwidth) {
            return Err(ControlError::InvalidFilterParams { dt, bandwidth });
        }

        let kh2 = 2.0 * PI * bandwidth * dt / 2.0;
        Ok(Self {
            dt,
            bandwidth,
            coeff_km1: (1.0 - kh2) / (1.0 + kh2),
            coeff_ref: kh2 / (1.0 + kh2),
            yk: Batch::zeros(rows, cols, device),
            ykm1: Batch::zeros(rows, cols, device),
            refk: Batch::zeros(rows, cols, device),
            refkm1: Batch::zeros(rows, cols, device),
        })
    }

    /// 推进一步
    ///
    /// `reference` 为 `Some` 时先替换当前参考 `ref_k`，否则沿用上一次的参考。
    pub fn update(&mut self, reference: Option<&Batch>) -> Result<(), ControlError> {
        if let Some(reference) = reference {
            self.refk.copy_from(reference)?;
        }

        let (c1, c2) = (self.coeff_km1, self.coeff_ref);
        for (((y, ym1), r), rm1) in self
            .yk
            .as_matrix_mut()
            .iter_mut()
            .zip(self.ykm1.as_matrix().iter())
            .zip(self.refk.as_matrix().iter())
            .zip(self.refkm1.as_matrix().iter())
        {
            *y = ym1 * c1 + (r + rm1) * c2;
        }

        self.refkm1.as_matrix_mut().copy_from(self.refk.as_matrix());
        self.ykm1.as_matrix_mut().copy_from(self.yk.as_matrix());
        Ok(())
    }

    /// 所有状态清零
    pub fn reset(&mut self) {
        self.yk.fill(0.0);
        self.ykm1.fill(0.0);
        self.refk.fill(0.0);
        self.refkm1.fill(0.0);
    }

    /// 当前输出 `y_k`
    pub fn get(&self) -> &Batch {
        &self.yk
    }

    pub fn get_cloned(&self) -> Batch {
        self.yk.clone()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// `(c1, c2)`
    pub fn coefficients(&self) -> (f64, f64) {
        (self.coeff_km1, self.coeff_ref)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.yk.shape()
    }
}
