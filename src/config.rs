// 该文件是 Jingshen （景深） 项目的一部分。
// src/config.rs - 流水线启动配置
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

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::output::draw::TOO_CLOSE_THRESHOLD_MM;

/// 相机输出尺寸必须是该值的整数倍
pub const RESOLUTION_ALIGNMENT: u32 = 16;

/// 帧率下限，对应最长 100 秒的帧间隔
pub const MIN_FPS: f32 = 0.01;

/// 检测框内深度聚合算法，由设备端计算空间坐标时使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialAlgorithm {
  #[default]
  Average,
  Min,
  Max,
  Mode,
  Median,
}

impl SpatialAlgorithm {
  /// 按名称解析，未知名称回退到 `Average` 并发出警告
  pub fn from_name(name: &str) -> Self {
    match name {
      "average" | "mean" => SpatialAlgorithm::Average,
      "min" => SpatialAlgorithm::Min,
      "max" => SpatialAlgorithm::Max,
      "mode" => SpatialAlgorithm::Mode,
      "median" => SpatialAlgorithm::Median,
      other => {
        warn!("无法识别的深度算法 '{}', 使用 average 算法", other);
        SpatialAlgorithm::Average
      }
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      SpatialAlgorithm::Average => "average",
      SpatialAlgorithm::Min => "min",
      SpatialAlgorithm::Max => "max",
      SpatialAlgorithm::Mode => "mode",
      SpatialAlgorithm::Median => "median",
    }
  }
}

impl fmt::Display for SpatialAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("输出{axis}必须是 16 的正整数倍, 实际为 {value}")]
  Resolution { axis: &'static str, value: u32 },
  #[error("边框缩放系数必须在 (0, 1] 范围内, 实际为 {0}")]
  BoxScale(f32),
  #[error("深度下限 {lower}mm 必须小于上限 {upper}mm")]
  DepthThresholds { lower: u32, upper: u32 },
  #[error("深度计算步长必须至少为 1, 实际为 {0}")]
  StepSize(i32),
  #[error("帧率必须为不小于 0.01 的有限值, 实际为 {0}")]
  Fps(f32),
  #[error("过近阈值必须为非负数, 实际为 {0}")]
  TooCloseThreshold(f32),
}

/// 启动时读取一次的流水线配置
///
/// 分辨率与空间计算参数交给设备端流水线；
/// 本地只使用分辨率校验输入帧尺寸，并使用过近阈值绘制叠加层。
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub width: u32,
  pub height: u32,
  pub model: String,
  pub box_scale: f32,
  pub lower_threshold_mm: u32,
  pub upper_threshold_mm: u32,
  pub algorithm: SpatialAlgorithm,
  pub step_size: i32,
  pub fps: f32,
  pub too_close_threshold_mm: f32,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      width: 640,
      height: 480,
      model: "yolov6-nano".to_string(),
      box_scale: 0.5,
      lower_threshold_mm: 100,
      upper_threshold_mm: 5000,
      algorithm: SpatialAlgorithm::Average,
      step_size: 1,
      fps: 30.0,
      too_close_threshold_mm: TOO_CLOSE_THRESHOLD_MM,
    }
  }
}

impl PipelineConfig {
  pub fn validate(self) -> Result<Self, ConfigError> {
    for (axis, value) in [("宽度", self.width), ("高度", self.height)] {
      if value == 0 || value % RESOLUTION_ALIGNMENT != 0 {
        return Err(ConfigError::Resolution { axis, value });
      }
    }
    if !(self.box_scale > 0.0 && self.box_scale <= 1.0) {
      return Err(ConfigError::BoxScale(self.box_scale));
    }
    if self.lower_threshold_mm >= self.upper_threshold_mm {
      return Err(ConfigError::DepthThresholds {
        lower: self.lower_threshold_mm,
        upper: self.upper_threshold_mm,
      });
    }
    if self.step_size < 1 {
      return Err(ConfigError::StepSize(self.step_size));
    }
    if !(self.fps >= MIN_FPS && self.fps.is_finite()) {
      return Err(ConfigError::Fps(self.fps));
    }
    if !(self.too_close_threshold_mm >= 0.0) {
      return Err(ConfigError::TooCloseThreshold(self.too_close_threshold_mm));
    }
    Ok(self)
  }

  pub fn log_summary(&self) {
    info!("输出分辨率: {}x{}", self.width, self.height);
    info!("检测模型: {}", self.model);
    info!("边框缩放系数: {}", self.box_scale);
    info!(
      "深度范围: {}mm - {}mm",
      self.lower_threshold_mm, self.upper_threshold_mm
    );
    info!("深度算法: {}, 步长: {}", self.algorithm, self.step_size);
    info!("帧率: {}", self.fps);
    info!("过近阈值: {}mm", self.too_close_threshold_mm);
  }
}
