// 该文件是 Jingshen （景深） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::SpatialDetections,
  frame::Frame,
  output::{
    Flow, Render,
    draw::{Overlay, Record},
  },
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 保存方式：绘制叠加层，或保存原始帧加文本记录
#[derive(Debug, Clone)]
pub enum DrawWrapper {
  Draw,
  Record(Record),
}

impl DrawWrapper {
  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw,
    }
  }

  pub fn save_result(
    &self,
    overlay: &Overlay,
    path: &Path,
    frame: &mut Frame,
    result: &SpatialDetections,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw => {
        overlay.draw_detections(&mut frame.image, result);
        frame.image.save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.image.save(path)?;
        record.record(overlay.labels(), result, path)?;
      }
    };

    Ok(())
  }
}

/// 按日期目录逐帧保存结果
///
/// URL 形如 `folder:///dir?record=name&always`：`record=name|id` 保存原始帧与文本记录，
/// 省略时保存叠加后的图像；默认只保存有检测结果的帧，`always` 保存所有帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  overlay: Overlay,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = match uri.query_pairs().find(|(k, _)| k == "record") {
      Some((_, v)) if v == "id" => "record-id",
      Some(_) => "record-name",
      None => "draw",
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_path(uri), DrawWrapper::with(kind)).with_always(always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, draw: DrawWrapper) -> Self {
    Self {
      directory: directory.into(),
      draw,
      overlay: Overlay::default(),
      frame_counter: AtomicU32::new(0),
      always: false,
    }
  }

  pub fn with_overlay(mut self, overlay: Overlay) -> Self {
    self.overlay = overlay;
    self
  }

  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Frame, SpatialDetections> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &mut Frame,
    result: &SpatialDetections,
  ) -> Result<Flow, Self::Error> {
    if self.always || !result.is_empty() {
      let path = self.frame_path()?;
      self.draw.save_result(&self.overlay, &path, frame, result)?;
      debug!("第 {} 帧已保存到 {}", frame.index, path.display());
    }
    Ok(Flow::Continue)
  }
}
