// 该文件是 Jingshen （景深） 项目的一部分。
// src/output/draw.rs - 空间检测结果可视化
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

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detection::{LabelMap, NormalizedBox, SpatialDetection, SpatialDetections};

/// 深度小于该值（毫米）的目标视为过近
pub const TOO_CLOSE_THRESHOLD_MM: f32 = 300.0;
pub const TOO_CLOSE_SUFFIX: &str = " [TOO CLOSE]";

pub const OK_COLOR: Rgb<u8> = Rgb([0, 255, 0]); // 绿色
pub const TOO_CLOSE_COLOR: Rgb<u8> = Rgb([255, 0, 0]); // 红色
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]); // 白色

// 文本布局常量，坐标均为基线位置
const FONT_SIZE: f32 = 16.0;
const LABEL_BASELINE_OFFSET: i32 = 5;
const COORD_INDENT: i32 = 3;
const COORD_LINE_SPACING: i32 = 15;

/// 内置字体 (DejaVu Sans)，保证任何主机上都能绘制文本
pub const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// 常见系统字体路径，仅在显式要求使用系统字体时依次尝试
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/usr/share/fonts/noto/NotoSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无效的字体文件 {0}")]
  Invalid(String),
}

pub fn embedded_font() -> Result<FontArc, FontError> {
  FontArc::try_from_slice(EMBEDDED_FONT).map_err(|_| FontError::Invalid("内置字体".to_string()))
}

pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, FontError> {
  let path = path.as_ref();
  let data = std::fs::read(path).map_err(|source| FontError::Io {
    path: path.display().to_string(),
    source,
  })?;
  FontArc::try_from_vec(data).map_err(|_| FontError::Invalid(path.display().to_string()))
}

pub fn system_font() -> Option<FontArc> {
  SYSTEM_FONT_CANDIDATES.iter().find_map(|candidate| {
    let font = load_font(candidate).ok()?;
    info!("使用系统字体: {}", candidate);
    Some(font)
  })
}

/// 像素坐标下的边框，未做裁剪，可能超出图像范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
  pub xmin: i32,
  pub ymin: i32,
  pub xmax: i32,
  pub ymax: i32,
}

impl PixelBox {
  /// 归一化坐标乘以帧宽高后向零截断
  pub fn from_normalized(bbox: &NormalizedBox, width: u32, height: u32) -> Self {
    let (w, h) = (width as f32, height as f32);
    Self {
      xmin: (bbox.xmin * w) as i32,
      ymin: (bbox.ymin * h) as i32,
      xmax: (bbox.xmax * w) as i32,
      ymax: (bbox.ymax * h) as i32,
    }
  }

  // 两个角点可以任意顺序给出，轮廓包含两端像素
  fn outline(&self) -> Rect {
    let left = self.xmin.min(self.xmax);
    let top = self.ymin.min(self.ymax);
    let width = self.xmin.abs_diff(self.xmax).saturating_add(1);
    let height = self.ymin.abs_diff(self.ymax).saturating_add(1);
    Rect::at(left, top).of_size(width, height)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
  pub text: String,
  pub x: i32,
  pub baseline: i32,
}

/// 单个检测目标的绘制计划
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub rect: PixelBox,
  pub color: Rgb<u8>,
  pub too_close: bool,
  /// 第一行为类别标签，其后依次为 X、Y、Z 坐标
  pub texts: Vec<TextLine>,
}

impl Annotation {
  pub fn label(&self) -> &str {
    &self.texts[0].text
  }
}

/// 检测结果叠加层
///
/// 对每个检测目标依次绘制 1 像素边框、框左上角上方的类别标签，
/// 以及框内左上角的三行空间坐标。绘制过程不做任何 I/O，也不在调用之间保留状态。
#[derive(Debug, Clone)]
pub struct Overlay {
  labels: LabelMap,
  too_close_threshold_mm: f32,
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Default for Overlay {
  fn default() -> Self {
    Self::new(LabelMap::default())
  }
}

impl Overlay {
  /// 默认使用内置字体
  pub fn new(labels: LabelMap) -> Self {
    let font = embedded_font()
      .inspect_err(|e| warn!("{}, 叠加层仅绘制检测框", e))
      .ok();
    Self {
      labels,
      too_close_threshold_mm: TOO_CLOSE_THRESHOLD_MM,
      font,
      font_scale: PxScale::from(FONT_SIZE),
    }
  }

  pub fn with_too_close_threshold(mut self, threshold_mm: f32) -> Self {
    self.too_close_threshold_mm = threshold_mm;
    self
  }

  /// 替换字体；传入 `None` 时只绘制检测框，文本被跳过
  pub fn with_font(mut self, font: Option<FontArc>) -> Self {
    if font.is_none() {
      warn!("未加载字体, 叠加层仅绘制检测框");
    }
    self.font = font;
    self
  }

  pub fn labels(&self) -> &LabelMap {
    &self.labels
  }

  pub fn too_close_threshold_mm(&self) -> f32 {
    self.too_close_threshold_mm
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn annotate(&self, width: u32, height: u32, detection: &SpatialDetection) -> Annotation {
    let rect = PixelBox::from_normalized(&detection.bbox, width, height);

    let mut label = self.labels.resolve(detection.label).into_owned();
    let too_close = detection.spatial.z < self.too_close_threshold_mm;
    let color = if too_close {
      label.push_str(TOO_CLOSE_SUFFIX);
      TOO_CLOSE_COLOR
    } else {
      OK_COLOR
    };

    let spatial = &detection.spatial;
    let coords = [
      format!("X: {}mm", spatial.x as i32),
      format!("Y: {}mm", spatial.y as i32),
      format!("Z (Depth): {}mm", spatial.z as i32),
    ];

    let mut texts = Vec::with_capacity(1 + coords.len());
    texts.push(TextLine {
      text: label,
      x: rect.xmin,
      baseline: rect.ymin - LABEL_BASELINE_OFFSET,
    });
    for (line, text) in (1..).zip(coords) {
      texts.push(TextLine {
        text,
        x: rect.xmin + COORD_INDENT,
        baseline: rect.ymin + COORD_LINE_SPACING * line,
      });
    }

    Annotation {
      rect,
      color,
      too_close,
      texts,
    }
  }

  pub fn layout(&self, width: u32, height: u32, detections: &SpatialDetections) -> Vec<Annotation> {
    detections
      .iter()
      .map(|detection| self.annotate(width, height, detection))
      .collect()
  }

  pub fn paint(&self, image: &mut RgbImage, annotations: &[Annotation]) {
    for annotation in annotations {
      // 超出图像的部分由绘制函数静默裁剪
      draw_hollow_rect_mut(image, annotation.rect.outline(), annotation.color);

      if let Some(font) = &self.font {
        let ascent = font.as_scaled(self.font_scale).ascent().round() as i32;
        for line in &annotation.texts {
          draw_text_mut(
            image,
            TEXT_COLOR,
            line.x,
            line.baseline - ascent,
            self.font_scale,
            font,
            &line.text,
          );
        }
      }
    }
  }

  /// 在帧上原地绘制全部检测结果
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &SpatialDetections) {
    let annotations = self.layout(image.width(), image.height(), detections);
    for annotation in &annotations {
      debug!(
        "绘制目标 '{}' 于 ({}, {})-({}, {})",
        annotation.label(),
        annotation.rect.xmin,
        annotation.rect.ymin,
        annotation.rect.xmax,
        annotation.rect.ymax
      );
    }
    self.paint(image, &annotations);
  }
}

/// 将检测结果写成文本记录，每个目标一行
#[derive(Debug, Clone)]
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, labels: &LabelMap, detections: &SpatialDetections) -> String {
    let mut records = Vec::with_capacity(detections.len());
    for item in detections {
      let name = if self.label_with_name {
        labels.resolve(item.label).into_owned()
      } else {
        item.label.to_string()
      };
      records.push(format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}, {:.1}, {:.1}, {:.1}",
        name,
        item.confidence,
        item.bbox.xmin,
        item.bbox.ymin,
        item.bbox.xmax,
        item.bbox.ymax,
        item.spatial.x,
        item.spatial.y,
        item.spatial.z
      ));
    }
    records.join("\n")
  }

  pub fn record(
    &self,
    labels: &LabelMap,
    detections: &SpatialDetections,
    path: &Path,
  ) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(labels, detections))
  }
}
