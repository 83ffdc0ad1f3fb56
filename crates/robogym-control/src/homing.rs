//! Homing 关节配置解析
//!
//! 从机器人描述文档（SRDF）中读取命名位姿：
//!
//! ```xml
//! <robot name="centauro">
//!   <group_state name="home" group="base">
//!     <joint name="hip" value="0.3"/>
//!     <joint name="knee" value="-0.6"/>
//!   </group_state>
//! </robot>
//! ```
//!
//! 解析结果按 `JointIndexMap` 广播为 `[num_robots, num_joints]` 的 homing 缓冲区：
//! - 文档中缺失的关节保持 0
//! - articulation 中不存在的关节被跳过，并发出诊断
//!
//! 文档格式错误（XML 非法、`joint` 缺少 `name`/`value`、`value` 非数值）为致命错误。

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use robogym_articulation::Articulation;
use robogym_types::{Batch, Device, Diagnostic, JointIndexMap, SharedSink};
use tracing::{debug, info};

use crate::HomingError;

const COMPONENT: &str = "homing";

/// 默认 homing 组名
pub const DEFAULT_HOMING_GROUP: &str = "home";

/// 关节名称 → homing 值（保持文档中的出现顺序，同名关节以后者为准）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomingMap {
    entries: Vec<(String, f64)>,
}

impl HomingMap {
    pub fn get(&self, joint: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == joint)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    fn insert(&mut self, joint: String, value: f64) {
        match self.entries.iter_mut().find(|(name, _)| *name == joint) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((joint, value)),
        }
    }
}

/// 已解析的 homing 配置
#[derive(Debug, Clone, PartialEq)]
pub struct HomingBuffer {
    map: HomingMap,
    homing: Batch,
}

impl HomingBuffer {
    /// homing 缓冲区 `[num_robots, num_joints]`
    pub fn get_homing(&self) -> &Batch {
        &self.homing
    }

    pub fn get_homing_cloned(&self) -> Batch {
        self.homing.clone()
    }

    /// 文档中解析出的原始映射（包括被跳过的未知关节）
    pub fn homing_map(&self) -> &HomingMap {
        &self.map
    }
}

/// Homing 解析器
pub struct HomingResolver {
    group: String,
    sink: SharedSink,
}

impl HomingResolver {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            group: DEFAULT_HOMING_GROUP.to_string(),
            sink,
        }
    }

    /// 使用其他命名位姿（默认 `"home"`）
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// 解析文档并广播到 homing 缓冲区
    pub fn resolve(
        &self,
        document: &str,
        joint_map: &JointIndexMap,
        num_robots: usize,
        device: Device,
    ) -> Result<HomingBuffer, HomingError> {
        let (map, found) = parse_group_state(document, &self.group)?;
        if !found {
            self.sink.report(
                COMPONENT,
                Diagnostic::MissingHomingGroup {
                    group: self.group.clone(),
                },
            );
        }

        let mut homing = Batch::zeros(num_robots, joint_map.len(), device);
        for (joint, value) in map.iter() {
            match joint_map.index_of(joint) {
                Some(col) => {
                    homing.as_matrix_mut().column_mut(col).fill(value);
                },
                None => self.sink.report(
                    COMPONENT,
                    Diagnostic::UnknownHomingJoint {
                        group: self.group.clone(),
                        joint: joint.to_string(),
                    },
                ),
            }
        }

        debug!(
            "Resolved homing group '{}': {} joints in document, {} articulation joints",
            self.group,
            map.len(),
            joint_map.len()
        );
        Ok(HomingBuffer { map, homing })
    }

    /// 从文件读取文档后解析
    pub fn resolve_file(
        &self,
        path: impl AsRef<Path>,
        joint_map: &JointIndexMap,
        num_robots: usize,
        device: Device,
    ) -> Result<HomingBuffer, HomingError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| HomingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded robot description from {:?}", path);
        self.resolve(&document, joint_map, num_robots, device)
    }

    /// 以 articulation 的关节顺序、机器人数量与设备解析
    pub fn resolve_for(
        &self,
        articulation: &dyn Articulation,
        document: &str,
    ) -> Result<HomingBuffer, HomingError> {
        if !articulation.is_initialized() {
            return Err(HomingError::ArticulationNotInitialized);
        }
        let joint_map = JointIndexMap::from_names(articulation.joint_names())?;
        self.resolve(
            document,
            &joint_map,
            articulation.robot_count(),
            articulation.device(),
        )
    }
}

/// 解析所有名为 `group` 的 `group_state` 的直接子元素 `joint`
///
/// 返回 `(映射, 是否找到该组)`。
fn parse_group_state(document: &str, group: &str) -> Result<(HomingMap, bool), HomingError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut map = HomingMap::default();
    let mut found = false;
    let mut has_root = false;
    let mut depth = 0usize;
    // 当前所在 homing 组元素的深度
    let mut group_depth: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                has_root = true;
                depth += 1;
                if visit_element(e, depth, group, group_depth, &mut map)? {
                    found = true;
                    group_depth = Some(depth);
                }
            },
            Ok(Event::Empty(ref e)) => {
                has_root = true;
                if visit_element(e, depth + 1, group, group_depth, &mut map)? {
                    found = true;
                }
            },
            Ok(Event::End(_)) => {
                if group_depth == Some(depth) {
                    group_depth = None;
                }
                depth = depth.saturating_sub(1);
            },
            Ok(Event::Eof) => break,
            Ok(_) => {},
            Err(e) => return Err(HomingError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    if !has_root {
        return Err(HomingError::XmlParse(
            "document has no root element".to_string(),
        ));
    }
    if depth != 0 {
        return Err(HomingError::XmlParse(
            "unexpected end of document: unclosed elements".to_string(),
        ));
    }
    Ok((map, found))
}

/// 处理一个元素；返回该元素是否为目标 homing 组
fn visit_element(
    e: &BytesStart,
    depth: usize,
    group: &str,
    group_depth: Option<usize>,
    map: &mut HomingMap,
) -> Result<bool, HomingError> {
    match (e.name().as_ref(), group_depth) {
        (b"group_state", None) => {
            Ok(get_attribute_opt(e, "name")?.as_deref() == Some(group))
        },
        (b"joint", Some(g)) if depth == g + 1 => {
            let name = get_attribute(e, "joint", "name")?;
            let raw = get_attribute(e, "joint", "value")?;
            let value = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| HomingError::InvalidValue {
                    joint: name.clone(),
                    value: raw.clone(),
                })?;
            map.insert(name, value);
            Ok(false)
        },
        _ => Ok(false),
    }
}

fn get_attribute(
    e: &BytesStart,
    element: &'static str,
    name: &'static str,
) -> Result<String, HomingError> {
    get_attribute_opt(e, name)?.ok_or(HomingError::MissingAttribute {
        element,
        attribute: name,
    })
}

/// 读取并反转义属性值；属性本身非法时返回解析错误
fn get_attribute_opt(e: &BytesStart, name: &str) -> Result<Option<String>, HomingError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| HomingError::XmlParse(e.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| HomingError::XmlParse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
