// 该文件是 Jingshen （景深） 项目的一部分。
// src/output/display.rs - 窗口显示输出
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

use std::{cell::Cell, time::Duration};

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  detection::SpatialDetections,
  frame::Frame,
  output::{Flow, Render, draw::Overlay},
};

pub const DEFAULT_WINDOW_NAME: &str = "Display";
pub const DEFAULT_QUIT_KEY: char = 'q';

/// 每帧显示后等待窗口刷新并检查按键的时长，不能为 0
pub const KEY_POLL_WAIT: Duration = Duration::from_millis(1);

/// 可显示图像并读取按键的窗口系统
pub trait DisplaySurface {
  type Error: std::error::Error + Send + Sync + 'static;

  fn open(&self, window: &str) -> Result<(), Self::Error>;
  fn show(&self, window: &str, image: &RgbImage) -> Result<(), Self::Error>;
  /// 最多等待 `wait`，返回期间按下的键
  fn poll_key(&self, window: &str, wait: Duration) -> Result<Option<char>, Self::Error>;
  fn close(&self, window: &str);
}

#[derive(Error, Debug)]
pub enum DisplayOutputError {
  #[error("无法创建显示窗口 '{window}': {source}")]
  Open {
    window: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("无法更新显示窗口 '{window}': {source}")]
  Update {
    window: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 在命名窗口中显示叠加了检测结果的帧
///
/// 窗口在第一次渲染时创建，随本对象销毁而关闭；窗口名在构造后不再改变。
/// 按下退出键时 `render_result` 返回 [`Flow::Stop`]，这是它请求停止的唯一途径。
pub struct DisplayOutput<S: DisplaySurface> {
  window: String,
  quit_key: char,
  surface: S,
  overlay: Overlay,
  opened: Cell<bool>,
}

impl<S: DisplaySurface> DisplayOutput<S> {
  pub fn new(window: impl Into<String>, surface: S) -> Self {
    Self {
      window: window.into(),
      quit_key: DEFAULT_QUIT_KEY,
      surface,
      overlay: Overlay::default(),
      opened: Cell::new(false),
    }
  }

  pub fn with_overlay(mut self, overlay: Overlay) -> Self {
    self.overlay = overlay;
    self
  }

  pub fn with_quit_key(mut self, quit_key: char) -> Self {
    self.quit_key = quit_key;
    self
  }

  pub fn window(&self) -> &str {
    &self.window
  }

  pub fn surface(&self) -> &S {
    &self.surface
  }

  fn ensure_open(&self) -> Result<(), DisplayOutputError> {
    if !self.opened.get() {
      self
        .surface
        .open(&self.window)
        .map_err(|e| DisplayOutputError::Open {
          window: self.window.clone(),
          source: Box::new(e),
        })?;
      self.opened.set(true);
      info!("显示窗口 '{}' 已创建, 按 '{}' 退出", self.window, self.quit_key);
    }
    Ok(())
  }

  /// 显示一帧并检查退出键
  pub fn show(&self, image: &RgbImage) -> Result<Flow, DisplayOutputError> {
    self.ensure_open()?;

    let update = |e: S::Error| DisplayOutputError::Update {
      window: self.window.clone(),
      source: Box::new(e),
    };
    self.surface.show(&self.window, image).map_err(update)?;

    match self
      .surface
      .poll_key(&self.window, KEY_POLL_WAIT)
      .map_err(update)?
    {
      Some(key) if key == self.quit_key => {
        warn!("收到退出键 '{}', 请求停止流水线", key);
        Ok(Flow::Stop)
      }
      _ => Ok(Flow::Continue),
    }
  }
}

impl<S: DisplaySurface> Drop for DisplayOutput<S> {
  fn drop(&mut self) {
    if self.opened.get() {
      self.surface.close(&self.window);
      info!("显示窗口 '{}' 已关闭", self.window);
    }
  }
}

impl<S: DisplaySurface> Render<Frame, SpatialDetections> for DisplayOutput<S> {
  type Error = DisplayOutputError;

  fn render_result(
    &self,
    frame: &mut Frame,
    result: &SpatialDetections,
  ) -> Result<Flow, Self::Error> {
    self.overlay.draw_detections(&mut frame.image, result);
    self.show(&frame.image)
  }
}

#[cfg(feature = "highgui")]
pub use self::highgui::HighguiSurface;

#[cfg(feature = "highgui")]
mod highgui {
  use std::time::Duration;

  use image::RgbImage;
  use opencv::{
    core::Mat,
    highgui, imgproc,
    prelude::*,
  };
  use url::Url;

  use super::{DisplayOutput, DisplayOutputError, DisplaySurface};
  use crate::{FromUrl, FromUrlWithScheme};

  /// OpenCV HighGUI 窗口
  #[derive(Debug, Default)]
  pub struct HighguiSurface;

  impl DisplaySurface for HighguiSurface {
    type Error = opencv::Error;

    fn open(&self, window: &str) -> Result<(), Self::Error> {
      highgui::named_window(window, highgui::WINDOW_AUTOSIZE)
    }

    fn show(&self, window: &str, image: &RgbImage) -> Result<(), Self::Error> {
      // 帧数据为 RGB，OpenCV 需要 BGR
      let mat = Mat::from_slice(image.as_raw())?;
      let mat = mat.reshape(3, image.height() as i32)?;
      let mut bgr_mat = Mat::default();
      imgproc::cvt_color(&mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR, 0)?;
      highgui::imshow(window, &bgr_mat)
    }

    fn poll_key(&self, _window: &str, wait: Duration) -> Result<Option<char>, Self::Error> {
      let key = highgui::wait_key(wait.as_millis().max(1) as i32)?;
      if key < 0 {
        return Ok(None);
      }
      Ok(char::from_u32((key & 0xFF) as u32))
    }

    fn close(&self, window: &str) {
      let _ = highgui::destroy_window(window);
    }
  }

  impl FromUrlWithScheme for DisplayOutput<HighguiSurface> {
    const SCHEME: &'static str = "display";
  }

  impl FromUrl for DisplayOutput<HighguiSurface> {
    type Error = DisplayOutputError;

    /// `display://<窗口名>`，省略窗口名时使用默认名称
    fn from_url(url: &Url) -> Result<Self, Self::Error> {
      if url.scheme() != Self::SCHEME {
        return Err(DisplayOutputError::SchemeMismatch);
      }

      let window = match url.host_str() {
        Some(host) if !host.is_empty() => urlencoding::decode(host)
          .map(|name| name.into_owned())
          .unwrap_or_else(|_| host.to_string()),
        _ => super::DEFAULT_WINDOW_NAME.to_string(),
      };

      let mut output = DisplayOutput::new(window, HighguiSurface);
      if let Some((_, key)) = url.query_pairs().find(|(k, _)| k == "quit")
        && let Some(key) = key.chars().next()
      {
        output = output.with_quit_key(key);
      }
      Ok(output)
    }
  }
}
