// 该文件是 Jingshen （景深） 项目的一部分。
// src/detection.rs - 空间检测结果与类别标签
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{borrow::Cow, path::Path, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

/// 归一化边框，取值范围 [0, 1]，相对于帧宽高
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedBox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

impl NormalizedBox {
  pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
    Self {
      xmin,
      ymin,
      xmax,
      ymax,
    }
  }
}

/// 相机坐标系下的空间坐标，单位毫米
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialPoint {
  pub x: f32,
  pub y: f32,
  pub z: f32,
}

impl SpatialPoint {
  pub fn new(x: f32, y: f32, z: f32) -> Self {
    Self { x, y, z }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialDetection {
  /// 类别索引，可能越界（包括负数）
  pub label: i32,
  pub confidence: f32,
  pub bbox: NormalizedBox,
  pub spatial: SpatialPoint,
}

impl SpatialDetection {
  pub fn new(label: i32, bbox: NormalizedBox, spatial: SpatialPoint) -> Self {
    Self {
      label,
      confidence: 1.0,
      bbox,
      spatial,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }
}

/// 一个推理周期内的全部检测结果
#[derive(Debug, Clone, Default)]
pub struct SpatialDetections {
  pub items: Box<[SpatialDetection]>,
}

impl SpatialDetections {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, SpatialDetection> {
    self.items.iter()
  }
}

impl From<Vec<SpatialDetection>> for SpatialDetections {
  fn from(items: Vec<SpatialDetection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl<'a> IntoIterator for &'a SpatialDetections {
  type Item = &'a SpatialDetection;
  type IntoIter = std::slice::Iter<'a, SpatialDetection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// 类别索引到名称的映射，启动后不可变
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
  labels: Arc<[String]>,
}

impl LabelMap {
  pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 读取标签文件：每行一个标签，忽略空行和 `#` 开头的注释
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelMapError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| LabelMapError::Io {
      path: path.display().to_string(),
      source,
    })?;
    let labels = Self::parse(&content);
    info!("从 {} 加载 {} 个类别标签", path.display(), labels.len());
    Ok(labels)
  }

  pub fn parse(content: &str) -> Self {
    Self::new(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, label: i32) -> Option<&str> {
    usize::try_from(label)
      .ok()
      .and_then(|index| self.labels.get(index))
      .map(String::as_str)
  }

  /// 解析类别名称；索引越界时退化为索引本身的十进制字符串
  pub fn resolve(&self, label: i32) -> Cow<'_, str> {
    match self.get(label) {
      Some(name) => Cow::Borrowed(name),
      None => {
        debug!("类别索引 {} 超出标签表范围 ({})", label, self.len());
        Cow::Owned(label.to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_in_range_returns_name() {
    let labels = LabelMap::new(["person", "bottle"]);
    assert_eq!(labels.resolve(0), "person");
    assert_eq!(labels.resolve(1), "bottle");
  }

  #[test]
  fn resolve_out_of_range_falls_back_to_index() {
    let labels = LabelMap::new(["person"]);
    assert_eq!(labels.resolve(1), "1");
    assert_eq!(labels.resolve(42), "42");
    assert_eq!(labels.resolve(-3), "-3");
    assert_eq!(LabelMap::default().resolve(0), "0");
  }

  #[test]
  fn parse_skips_blank_lines_and_comments() {
    let labels = LabelMap::parse("# coco subset\nperson\n\n  car  \n# end\n");
    assert_eq!(labels, LabelMap::new(["person", "car"]));
  }

  #[test]
  fn from_file_reports_missing_path() {
    let err = LabelMap::from_file("/definitely/not/here/labels.txt").unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here/labels.txt"));
  }
}
