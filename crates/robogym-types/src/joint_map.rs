//! 关节名称 ↔ 列索引映射

use std::collections::HashMap;

use crate::TypesError;

/// 关节名称到列索引的双射
///
/// 顺序即 articulation 报告的关节顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointIndexMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl JointIndexMap {
    /// 从有序关节名称列表构造
    ///
    /// # 错误
    ///
    /// 名称重复时返回 `TypesError::DuplicateJointName`。
    pub fn from_names<I, S>(names: I) -> Result<Self, TypesError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(TypesError::DuplicateJointName(name.clone()));
            }
        }
        Ok(Self { names, index })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 名称中包含 `pattern` 子串的关节（按关节顺序）
    pub fn names_matching(&self, pattern: &str) -> Vec<&str> {
        self.names
            .iter()
            .filter(|n| n.contains(pattern))
            .map(String::as_str)
            .collect()
    }

    /// 名称中包含 `pattern` 子串的关节列索引（升序）
    pub fn indices_matching(&self, pattern: &str) -> Vec<usize> {
        self.names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.contains(pattern))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}
