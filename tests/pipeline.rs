// 该文件是 Jingshen （景深） 项目的一部分。
// tests/pipeline.rs - 回放、处理循环与输出的集成测试
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
  cell::RefCell,
  io::Write,
  path::{Path, PathBuf},
  time::Duration,
};

use image::{Rgb, RgbImage};
use jingshen::{
  FromUrl,
  detection::LabelMap,
  input::InputWrapper,
  output::{
    DisplayOutput, DisplaySurface, OutputWrapper,
    draw::{OK_COLOR, Overlay, TOO_CLOSE_COLOR},
  },
  task::{ContinuousTask, StopReason, Task},
};
use url::Url;

fn write_session(dir: &Path, frames: usize) -> PathBuf {
  let mut lines = vec![r#"{"classes": ["person", "bottle"]}"#.to_string()];
  for i in 0..frames {
    let name = format!("frame-{i}.png");
    RgbImage::new(640, 480).save(dir.join(&name)).unwrap();
    let z = if i % 2 == 0 { 150.0 } else { 900.0 };
    lines.push(format!(
      r#"{{"frame": "{name}", "timestamp_ms": {}, "detections": [{{"label": {}, "confidence": 0.8, "xmin": 0.1, "ymin": 0.1, "xmax": 0.4, "ymax": 0.4, "x": 10.0, "y": 20.0, "z": {z}}}]}}"#,
      i * 33,
      i % 2
    ));
  }

  let path = dir.join("session.jsonl");
  let mut file = std::fs::File::create(&path).unwrap();
  for line in lines {
    writeln!(file, "{line}").unwrap();
  }
  path
}

fn replay_url(path: &Path) -> Url {
  Url::from_file_path(path)
    .map(|url| Url::parse(&url.as_str().replacen("file:", "replay:", 1)).unwrap())
    .unwrap()
}

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
struct Never;

/// 脚本化按键的窗口，保存每一帧
#[derive(Default)]
struct ScriptedWindow {
  keys: RefCell<Vec<Option<char>>>,
  shown: RefCell<Vec<RgbImage>>,
}

impl DisplaySurface for &ScriptedWindow {
  type Error = Never;

  fn open(&self, _window: &str) -> Result<(), Self::Error> {
    Ok(())
  }

  fn show(&self, _window: &str, image: &RgbImage) -> Result<(), Self::Error> {
    self.shown.borrow_mut().push(image.clone());
    Ok(())
  }

  fn poll_key(&self, _window: &str, _wait: Duration) -> Result<Option<char>, Self::Error> {
    let mut keys = self.keys.borrow_mut();
    Ok(if keys.is_empty() { None } else { keys.remove(0) })
  }

  fn close(&self, _window: &str) {}
}

#[test]
fn quit_key_stops_replay() {
  let dir = tempfile::tempdir().unwrap();
  let session = write_session(dir.path(), 5);

  let input = InputWrapper::from_url(&replay_url(&session))
    .unwrap()
    .with_resolution(640, 480);
  let labels = input.classes().cloned().unwrap();
  assert_eq!(labels, LabelMap::new(["person", "bottle"]));

  let window = ScriptedWindow {
    keys: RefCell::new(vec![None, Some('q')]),
    ..Default::default()
  };
  let display = DisplayOutput::new("Display", &window).with_overlay(Overlay::new(labels));

  let summary = ContinuousTask::default().run_task(input, display).unwrap();
  assert_eq!(summary.stop_reason, StopReason::OutputRequested);
  assert_eq!(summary.frames, 2);

  let shown = window.shown.borrow();
  assert_eq!(shown.len(), 2);
  assert_eq!(*shown[0].get_pixel(64, 120), TOO_CLOSE_COLOR);
  assert_eq!(*shown[1].get_pixel(64, 120), OK_COLOR);
}

#[test]
fn replay_into_image_file() {
  let dir = tempfile::tempdir().unwrap();
  let session = write_session(dir.path(), 3);
  let target = dir.path().join("out").join("latest.png");

  let input = InputWrapper::from_url(&replay_url(&session)).unwrap();
  let output_url = Url::from_file_path(&target)
    .map(|url| Url::parse(&url.as_str().replacen("file:", "image:", 1)).unwrap())
    .unwrap();
  let output = OutputWrapper::from_url(&output_url)
    .unwrap()
    .with_overlay(Overlay::new(LabelMap::new(["person", "bottle"])));

  let summary = ContinuousTask::default()
    .with_frame_number(Some(2))
    .run_task(input, output)
    .unwrap();
  assert_eq!(summary.stop_reason, StopReason::FrameLimit);
  assert_eq!(summary.detections, 2);

  // 第二帧（深度 900mm）覆盖了第一帧
  let saved = image::open(&target).unwrap().to_rgb8();
  assert_eq!(*saved.get_pixel(64, 120), OK_COLOR);
  assert_eq!(*saved.get_pixel(320, 400), Rgb([0, 0, 0]));
}

#[test]
fn unknown_output_scheme_is_rejected() {
  let url = Url::parse("rtsp://camera/stream").unwrap();
  assert!(OutputWrapper::from_url(&url).is_err());
}
