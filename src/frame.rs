// 该文件是 Jingshen （景深） 项目的一部分。
// src/frame.rs - 帧与同步消息组定义
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

use image::RgbImage;

use crate::detection::SpatialDetections;

/// 已解码的视频帧，仅在一个处理周期内由调用方独占
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: u64,
  pub timestamp_ms: u64,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: u64, timestamp_ms: u64, image: RgbImage) -> Self {
    Self {
      index,
      timestamp_ms,
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self::new(0, 0, image)
  }
}

/// 上游每个周期交付的一组同步数据：帧及其检测结果
#[derive(Debug, Clone)]
pub struct SyncedGroup {
  pub frame: Frame,
  pub detections: SpatialDetections,
}

impl SyncedGroup {
  pub fn new(frame: Frame, detections: SpatialDetections) -> Self {
    Self { frame, detections }
  }
}
