//! 批量缓冲区与设备
//!
//! `Batch` 是所有批量信号的统一载体：一个 `[行, 列]` 的 `DMatrix<f64>`，
//! 附带其所在的 `Device`。行对应机器人实例，列对应关节
//! （根位姿为 3 列位置 / 4 列四元数）。

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use nalgebra::DMatrix;

use crate::TypesError;

/// 设备类型（忽略序号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Cuda,
}

/// 缓冲区所在设备
///
/// 兼容性只比较设备类型：`cuda:0` 与 `cuda:1` 视为兼容。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA 设备（序号）
    Cuda(u32),
}

impl Device {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Cpu => DeviceKind::Cpu,
            Device::Cuda(_) => DeviceKind::Cuda,
        }
    }

    /// 两个设备的类型是否一致
    pub fn is_compatible(&self, other: &Device) -> bool {
        self.kind() == other.kind()
    }

    pub fn is_cuda(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse::<u32>().ok())
                .map(Device::Cuda)
                .ok_or_else(|| TypesError::InvalidDevice(s.to_string())),
        }
    }
}

/// 批量缓冲区 `[rows, cols]`
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    data: DMatrix<f64>,
    device: Device,
}

impl Batch {
    /// 全零缓冲区
    pub fn zeros(rows: usize, cols: usize, device: Device) -> Self {
        Self {
            data: DMatrix::zeros(rows, cols),
            device,
        }
    }

    /// 常数填充的缓冲区
    pub fn full(rows: usize, cols: usize, value: f64, device: Device) -> Self {
        Self {
            data: DMatrix::from_element(rows, cols, value),
            device,
        }
    }

    pub fn from_matrix(data: DMatrix<f64>, device: Device) -> Self {
        Self { data, device }
    }

    /// 按行优先顺序从切片构造
    ///
    /// # 错误
    ///
    /// `values.len() != rows * cols` 时返回 `ShapeMismatch`。
    pub fn from_row_slice(
        rows: usize,
        cols: usize,
        values: &[f64],
        device: Device,
    ) -> Result<Self, TypesError> {
        if values.len() != rows * cols {
            return Err(TypesError::ShapeMismatch {
                expected_rows: rows,
                expected_cols: cols,
                rows: 1,
                cols: values.len(),
            });
        }
        Ok(Self {
            data: DMatrix::from_row_slice(rows, cols, values),
            device,
        })
    }

    /// 将一行数据广播到 `rows` 行
    pub fn broadcast_row(row: &[f64], rows: usize, device: Device) -> Self {
        let cols = row.len();
        Self {
            data: DMatrix::from_fn(rows, cols, |_, c| row[c]),
            device,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn as_matrix_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.data
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.data
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// 原地拷贝另一个同形状缓冲区的数据（设备保持不变）
    pub fn copy_from(&mut self, other: &Batch) -> Result<(), TypesError> {
        if self.shape() != other.shape() {
            return Err(TypesError::ShapeMismatch {
                expected_rows: self.rows(),
                expected_cols: self.cols(),
                rows: other.rows(),
                cols: other.cols(),
            });
        }
        self.data.copy_from(&other.data);
        Ok(())
    }

    pub fn row_to_vec(&self, row: usize) -> Vec<f64> {
        self.data.row(row).iter().copied().collect()
    }

    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0)
    }
}

impl Index<(usize, usize)> for Batch {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &f64 {
        &self.data[index]
    }
}

impl IndexMut<(usize, usize)> for Batch {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut f64 {
        &mut self.data[index]
    }
}
