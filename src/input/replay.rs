// 该文件是 Jingshen （景深） 项目的一部分。
// src/input/replay.rs - 回放录制的帧与检测结果
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

use std::{
  fs::File,
  io::{BufRead, BufReader, Lines},
  path::{Path, PathBuf},
  thread,
  time::{Duration, Instant},
};

use image::ImageReader;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::{LabelMap, NormalizedBox, SpatialDetection, SpatialPoint},
  frame::{Frame, SyncedGroup},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("malformed record at line {line}: {source}")]
  Malformed {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("image loading error for {path}: {source}")]
  ImageLoad {
    path: String,
    #[source]
    source: image::ImageError,
  },
  #[error("frame {path} is {actual_w}x{actual_h}, expected {expected_w}x{expected_h}")]
  Resolution {
    path: String,
    expected_w: u32,
    expected_h: u32,
    actual_w: u32,
    actual_h: u32,
  },
}

impl ReplayInputError {
  fn io(path: &Path, source: std::io::Error) -> Self {
    ReplayInputError::Io {
      path: path.display().to_string(),
      source,
    }
  }
}

/// 会话文件首行，可选
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionHeader {
  classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GroupRecord {
  frame: PathBuf,
  timestamp_ms: Option<u64>,
  #[serde(default)]
  detections: Vec<DetectionRecord>,
}

#[derive(Debug, Deserialize)]
struct DetectionRecord {
  label: i32,
  #[serde(default = "default_confidence")]
  confidence: f32,
  xmin: f32,
  ymin: f32,
  xmax: f32,
  ymax: f32,
  x: f32,
  y: f32,
  z: f32,
}

fn default_confidence() -> f32 {
  1.0
}

impl From<DetectionRecord> for SpatialDetection {
  fn from(record: DetectionRecord) -> Self {
    SpatialDetection::new(
      record.label,
      NormalizedBox::new(record.xmin, record.ymin, record.xmax, record.ymax),
      SpatialPoint::new(record.x, record.y, record.z),
    )
    .with_confidence(record.confidence)
  }
}

/// 从 JSON Lines 会话文件回放同步的帧与空间检测结果
///
/// 第一行可以是 `{"classes": [...]}` 头部，其余每行对应一个周期：
/// `{"frame": "0001.png", "timestamp_ms": 33, "detections": [{"label": 0, "xmin": ..., "z": ...}]}`。
/// 帧路径相对于会话文件所在目录。
pub struct ReplayInput {
  path: PathBuf,
  base_dir: PathBuf,
  lines: Lines<BufReader<File>>,
  line_number: usize,
  pending: Option<(usize, String)>,
  classes: Option<LabelMap>,
  resolution: Option<(u32, u32)>,
  frame_interval: Option<Duration>,
  next_due: Option<Instant>,
  index: u64,
  finished: bool,
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInput {
  type Error = ReplayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayInputError::SchemeMismatch);
    }
    Self::open(url_path(url))
  }
}

impl ReplayInput {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReplayInputError> {
    let path = path.into();
    let file = File::open(&path).map_err(|e| ReplayInputError::io(&path, e))?;
    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    let mut input = ReplayInput {
      path,
      base_dir,
      lines: BufReader::new(file).lines(),
      line_number: 0,
      pending: None,
      classes: None,
      resolution: None,
      frame_interval: None,
      next_due: None,
      index: 0,
      finished: false,
    };
    input.read_header()?;
    info!("打开回放会话: {}", input.path.display());
    Ok(input)
  }

  /// 拒绝与配置分辨率不一致的帧
  pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
    self.resolution = Some((width, height));
    self
  }

  /// 按给定帧率节流回放
  pub fn with_fps(mut self, fps: f32) -> Self {
    self.frame_interval = if fps > 0.0 {
      Duration::try_from_secs_f32(1.0 / fps)
        .inspect_err(|_| warn!("帧率 {} 无法换算为帧间隔, 不做节流", fps))
        .ok()
    } else {
      None
    };
    self
  }

  /// 会话头部携带的类别标签
  pub fn classes(&self) -> Option<&LabelMap> {
    self.classes.as_ref()
  }

  fn next_line(&mut self) -> Result<Option<(usize, String)>, ReplayInputError> {
    if let Some(pending) = self.pending.take() {
      return Ok(Some(pending));
    }
    for line in self.lines.by_ref() {
      self.line_number += 1;
      let line = line.map_err(|e| ReplayInputError::io(&self.path, e))?;
      if !line.trim().is_empty() {
        return Ok(Some((self.line_number, line)));
      }
    }
    Ok(None)
  }

  fn read_header(&mut self) -> Result<(), ReplayInputError> {
    let Some((line_number, line)) = self.next_line()? else {
      return Ok(());
    };
    match serde_json::from_str::<SessionHeader>(&line) {
      Ok(header) => {
        info!("会话包含 {} 个类别标签", header.classes.len());
        self.classes = Some(LabelMap::new(header.classes));
      }
      Err(_) => self.pending = Some((line_number, line)),
    }
    Ok(())
  }

  fn load_frame(&self, relative: &Path) -> Result<image::RgbImage, ReplayInputError> {
    let path = self.base_dir.join(relative);
    let image = ImageReader::open(&path)
      .map_err(|e| ReplayInputError::io(&path, e))?
      .decode()
      .map_err(|source| ReplayInputError::ImageLoad {
        path: path.display().to_string(),
        source,
      })?
      .to_rgb8();

    if let Some((expected_w, expected_h)) = self.resolution
      && image.dimensions() != (expected_w, expected_h)
    {
      return Err(ReplayInputError::Resolution {
        path: path.display().to_string(),
        expected_w,
        expected_h,
        actual_w: image.width(),
        actual_h: image.height(),
      });
    }
    Ok(image)
  }

  fn pace(&mut self) {
    let Some(interval) = self.frame_interval else {
      return;
    };
    let now = Instant::now();
    if let Some(due) = self.next_due
      && due > now
    {
      thread::sleep(due - now);
    }
    self.next_due = Some(self.next_due.unwrap_or(now).max(now) + interval);
  }

  fn read_group(&mut self) -> Result<Option<SyncedGroup>, ReplayInputError> {
    let Some((line, content)) = self.next_line()? else {
      return Ok(None);
    };
    let record: GroupRecord = serde_json::from_str(&content)
      .map_err(|source| ReplayInputError::Malformed { line, source })?;

    let image = self.load_frame(&record.frame)?;
    let timestamp_ms = record.timestamp_ms.unwrap_or_else(|| {
      self
        .frame_interval
        .map(|interval| (interval.as_secs_f64() * 1000.0 * self.index as f64) as u64)
        .unwrap_or_default()
    });
    let frame = Frame::new(self.index, timestamp_ms, image);
    self.index += 1;

    let detections: Vec<SpatialDetection> =
      record.detections.into_iter().map(Into::into).collect();
    debug!(
      "回放第 {} 帧 ({}), {} 个检测结果",
      frame.index,
      record.frame.display(),
      detections.len()
    );

    self.pace();
    Ok(Some(SyncedGroup::new(frame, detections.into())))
  }
}

impl Iterator for ReplayInput {
  type Item = Result<SyncedGroup, ReplayInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }
    let item = self.read_group().transpose();
    if !matches!(item, Some(Ok(_))) {
      self.finished = true;
    }
    item
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use image::RgbImage;

  use super::*;

  fn session(dir: &Path, lines: &[&str]) -> PathBuf {
    RgbImage::new(64, 48).save(dir.join("a.png")).unwrap();
    RgbImage::new(32, 32).save(dir.join("small.png")).unwrap();
    let path = dir.join("session.jsonl");
    let mut file = File::create(&path).unwrap();
    for line in lines {
      writeln!(file, "{line}").unwrap();
    }
    path
  }

  #[test]
  fn reads_header_and_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(
      dir.path(),
      &[
        r#"{"classes": ["person", "cup"]}"#,
        "",
        r#"{"frame": "a.png", "timestamp_ms": 40, "detections": [{"label": 1, "confidence": 0.9, "xmin": 0.1, "ymin": 0.2, "xmax": 0.3, "ymax": 0.4, "x": 1.5, "y": -2.0, "z": 250.0}]}"#,
        r#"{"frame": "a.png"}"#,
      ],
    );

    let input = ReplayInput::open(&path).unwrap();
    assert_eq!(input.classes(), Some(&LabelMap::new(["person", "cup"])));

    let groups: Vec<_> = input.collect::<Result<_, _>>().unwrap();
    assert_eq!(groups.len(), 2);

    let first = &groups[0];
    assert_eq!(first.frame.index, 0);
    assert_eq!(first.frame.timestamp_ms, 40);
    assert_eq!((first.frame.width(), first.frame.height()), (64, 48));
    assert_eq!(
      first.detections.items[0],
      SpatialDetection::new(
        1,
        NormalizedBox::new(0.1, 0.2, 0.3, 0.4),
        SpatialPoint::new(1.5, -2.0, 250.0)
      )
      .with_confidence(0.9)
    );

    assert_eq!(groups[1].frame.index, 1);
    assert!(groups[1].detections.is_empty());
  }

  #[test]
  fn header_is_optional() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(dir.path(), &[r#"{"frame": "a.png", "detections": []}"#]);
    let input = ReplayInput::open(&path).unwrap();
    assert!(input.classes().is_none());
    assert_eq!(input.count(), 1);
  }

  #[test]
  fn malformed_detection_fails_with_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(
      dir.path(),
      &[
        r#"{"classes": []}"#,
        r#"{"frame": "a.png", "detections": [{"label": 0, "xmin": 0.1}]}"#,
        r#"{"frame": "a.png"}"#,
      ],
    );
    let mut input = ReplayInput::open(&path).unwrap();
    match input.next() {
      Some(Err(ReplayInputError::Malformed { line, .. })) => assert_eq!(line, 2),
      other => panic!("unexpected: {other:?}"),
    }
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_resolution_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(dir.path(), &[r#"{"frame": "small.png"}"#]);
    let mut input = ReplayInput::open(&path).unwrap().with_resolution(64, 48);
    assert!(matches!(
      input.next(),
      Some(Err(ReplayInputError::Resolution {
        actual_w: 32,
        actual_h: 32,
        ..
      }))
    ));
  }

  #[test]
  fn missing_frame_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(dir.path(), &[r#"{"frame": "nope.png"}"#]);
    let mut input = ReplayInput::open(&path).unwrap();
    assert!(matches!(input.next(), Some(Err(ReplayInputError::Io { .. }))));
  }

  #[test]
  fn fps_sets_frame_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = session(dir.path(), &[r#"{"frame": "a.png"}"#]);

    let input = ReplayInput::open(&path).unwrap().with_fps(4.0);
    assert_eq!(input.frame_interval, Some(Duration::from_millis(250)));

    // 间隔超出 Duration 范围时不节流，也不会 panic
    let input = ReplayInput::open(&path).unwrap().with_fps(1e-20);
    assert_eq!(input.frame_interval, None);
    let input = ReplayInput::open(&path).unwrap().with_fps(0.0);
    assert_eq!(input.frame_interval, None);
  }

  #[test]
  fn from_url_checks_scheme() {
    let url = Url::parse("image:///tmp/session.jsonl").unwrap();
    assert!(matches!(
      ReplayInput::from_url(&url),
      Err(ReplayInputError::SchemeMismatch)
    ));
  }
}
