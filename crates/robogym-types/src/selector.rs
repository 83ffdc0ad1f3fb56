//! 机器人/关节子集选择器
//!
//! `IndexSelector` 负责校验调用方给出的索引子集并构造 `Selector`；
//! `Selector` 是两个轴上索引集合的笛卡尔积，所有局部读写都经过它完成。
//!
//! 子集缺省（`None`）表示该轴上的全部索引。子集必须非空、无重复、
//! 且最大值小于对应轴的长度，否则视为非法并发出诊断。

use std::collections::HashSet;
use std::fmt;

use nalgebra::DMatrix;

use crate::diagnostics::{Diagnostic, SharedSink};

const COMPONENT: &str = "selector";

/// 索引轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Robot,
    Joint,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Robot => write!(f, "robot"),
            Axis::Joint => write!(f, "joint"),
        }
    }
}

/// 单个轴的校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// 未提供子集（等价于全部）
    Absent,
    Valid,
    Invalid,
}

impl IndexState {
    pub fn is_invalid(&self) -> bool {
        matches!(self, IndexState::Invalid)
    }
}

/// 两个轴的校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorCheck {
    pub robot: IndexState,
    pub joint: IndexState,
}

impl SelectorCheck {
    /// 两个轴都不是 `Invalid` 时可以构造选择器
    pub fn is_buildable(&self) -> bool {
        !self.robot.is_invalid() && !self.joint.is_invalid()
    }
}

/// 索引子集未通过的具体检查项
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexViolation {
    /// 子集为空
    Empty,
    /// 存在重复索引
    Duplicates { indices: Vec<usize> },
    /// 最大索引越界
    OutOfBounds { max: usize, bound: usize },
}

impl fmt::Display for IndexViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexViolation::Empty => write!(f, "subset is empty, expected at least one index"),
            IndexViolation::Duplicates { indices } => {
                write!(f, "duplicate indices {:?}, expected unique indices", indices)
            },
            IndexViolation::OutOfBounds { max, bound } => {
                write!(f, "max index {} is out of bounds, expected < {}", max, bound)
            },
        }
    }
}

/// 检查一个索引子集，返回所有未通过的检查项（空表示合法）
pub fn check_indices(indices: &[usize], bound: usize) -> Vec<IndexViolation> {
    let mut violations = Vec::new();
    if indices.is_empty() {
        violations.push(IndexViolation::Empty);
        return violations;
    }

    let mut seen = HashSet::with_capacity(indices.len());
    let mut duplicates = Vec::new();
    for &i in indices {
        if !seen.insert(i) && !duplicates.contains(&i) {
            duplicates.push(i);
        }
    }
    if !duplicates.is_empty() {
        violations.push(IndexViolation::Duplicates {
            indices: duplicates,
        });
    }

    let max = indices.iter().copied().max().unwrap_or(0);
    if max >= bound {
        violations.push(IndexViolation::OutOfBounds { max, bound });
    }
    violations
}

/// 单个轴上的索引集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSet {
    /// `0..n` 全部索引
    All(usize),
    /// 显式的有序子集
    Subset(Vec<usize>),
}

impl IndexSet {
    pub fn len(&self) -> usize {
        match self {
            IndexSet::All(n) => *n,
            IndexSet::Subset(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_all(&self) -> bool {
        matches!(self, IndexSet::All(_))
    }

    /// 第 `local` 个元素对应的全局索引
    pub fn get(&self, local: usize) -> usize {
        match self {
            IndexSet::All(_) => local,
            IndexSet::Subset(v) => v[local],
        }
    }

    pub fn to_vec(&self) -> Vec<usize> {
        match self {
            IndexSet::All(n) => (0..*n).collect(),
            IndexSet::Subset(v) => v.clone(),
        }
    }
}

/// 已校验的 `(robot, joint)` 选择器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    robots: IndexSet,
    joints: IndexSet,
}

impl Selector {
    /// 覆盖全部机器人与关节
    pub fn all(num_robots: usize, num_joints: usize) -> Self {
        Self {
            robots: IndexSet::All(num_robots),
            joints: IndexSet::All(num_joints),
        }
    }

    pub fn robots(&self) -> &IndexSet {
        &self.robots
    }

    pub fn joints(&self) -> &IndexSet {
        &self.joints
    }

    /// 选择区域的形状 `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.robots.len(), self.joints.len())
    }

    pub fn is_full(&self) -> bool {
        self.robots.is_all() && self.joints.is_all()
    }

    /// 将 `src`（形状为 `shape()`）写入 `dst` 的选择区域
    ///
    /// 调用方负责保证 `src.shape() == self.shape()`。
    pub fn assign(&self, dst: &mut DMatrix<f64>, src: &DMatrix<f64>) {
        debug_assert_eq!(src.shape(), self.shape());
        if self.is_full() {
            dst.copy_from(src);
            return;
        }
        for r in 0..self.robots.len() {
            let gr = self.robots.get(r);
            for c in 0..self.joints.len() {
                dst[(gr, self.joints.get(c))] = src[(r, c)];
            }
        }
    }

    /// 读出 `src` 的选择区域
    pub fn gather(&self, src: &DMatrix<f64>) -> DMatrix<f64> {
        let (rows, cols) = self.shape();
        DMatrix::from_fn(rows, cols, |r, c| {
            src[(self.robots.get(r), self.joints.get(c))]
        })
    }

    /// 将选择区域全部置为 `value`
    pub fn fill(&self, dst: &mut DMatrix<f64>, value: f64) {
        for r in 0..self.robots.len() {
            let gr = self.robots.get(r);
            for c in 0..self.joints.len() {
                dst[(gr, self.joints.get(c))] = value;
            }
        }
    }
}

/// 索引子集校验器
///
/// 绑定 `[num_robots, num_joints]` 边界和诊断接收器。
#[derive(Clone)]
pub struct IndexSelector {
    num_robots: usize,
    num_joints: usize,
    sink: SharedSink,
}

impl fmt::Debug for IndexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSelector")
            .field("num_robots", &self.num_robots)
            .field("num_joints", &self.num_joints)
            .finish_non_exhaustive()
    }
}

impl IndexSelector {
    pub fn new(num_robots: usize, num_joints: usize, sink: SharedSink) -> Self {
        Self {
            num_robots,
            num_joints,
            sink,
        }
    }

    pub fn num_robots(&self) -> usize {
        self.num_robots
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    /// 校验两个轴的子集
    ///
    /// 每个非法子集都会发出一条 `Diagnostic::InvalidIndices`。
    pub fn validate(
        &self,
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> SelectorCheck {
        SelectorCheck {
            robot: self.check_axis(Axis::Robot, robot_indices, self.num_robots),
            joint: self.check_axis(Axis::Joint, joint_indices, self.num_joints),
        }
    }

    /// 构造选择器；任一提供的子集非法时返回 `None`
    pub fn build(
        &self,
        robot_indices: Option<&[usize]>,
        joint_indices: Option<&[usize]>,
    ) -> Option<Selector> {
        let check = self.validate(robot_indices, joint_indices);
        if !check.is_buildable() {
            return None;
        }
        Some(Selector {
            robots: to_index_set(robot_indices, self.num_robots),
            joints: to_index_set(joint_indices, self.num_joints),
        })
    }

    fn check_axis(&self, axis: Axis, indices: Option<&[usize]>, bound: usize) -> IndexState {
        let Some(indices) = indices else {
            return IndexState::Absent;
        };
        let violations = check_indices(indices, bound);
        if violations.is_empty() {
            IndexState::Valid
        } else {
            self.sink
                .report(COMPONENT, Diagnostic::InvalidIndices { axis, violations });
            IndexState::Invalid
        }
    }
}

fn to_index_set(indices: Option<&[usize]>, bound: usize) -> IndexSet {
    match indices {
        None => IndexSet::All(bound),
        Some(v) => IndexSet::Subset(v.to_vec()),
    }
}
