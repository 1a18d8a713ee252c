// 该文件是 Jingshen （景深） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

#[cfg(any(
  feature = "highgui",
  feature = "save_image_file",
  feature = "directory_record"
))]
use crate::FromUrlWithScheme;
use crate::{FromUrl, detection::SpatialDetections, frame::Frame};

/// 一次渲染之后流水线是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Continue,
  Stop,
}

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &mut Frame, result: &Output) -> Result<Flow, Self::Error>;
}

pub mod display;
pub mod draw;

use self::draw::Overlay;

#[cfg(feature = "highgui")]
pub use self::display::HighguiSurface;
pub use self::display::{DisplayOutput, DisplayOutputError, DisplaySurface};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 命令行省略输出时使用：有窗口支持时显示，否则保存最新一帧
#[cfg(feature = "highgui")]
pub const DEFAULT_OUTPUT: &str = "display://Display";
#[cfg(not(feature = "highgui"))]
pub const DEFAULT_OUTPUT: &str = "image:///tmp/jingshen-latest.png";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("显示输出错误: {0}")]
  DisplayOutputError(#[from] DisplayOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "highgui")]
  Display(DisplayOutput<HighguiSurface>),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "highgui")]
      DisplayOutput::<HighguiSurface>::SCHEME => {
        let output = DisplayOutput::from_url(url)?;
        Ok(OutputWrapper::Display(output))
      }
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  pub fn with_overlay(self, overlay: Overlay) -> Self {
    match self {
      #[cfg(feature = "highgui")]
      OutputWrapper::Display(output) => OutputWrapper::Display(output.with_overlay(overlay)),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_overlay(overlay))
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_overlay(overlay))
      }
    }
  }
}

impl Render<Frame, SpatialDetections> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &mut Frame,
    result: &SpatialDetections,
  ) -> Result<Flow, Self::Error> {
    match self {
      #[cfg(feature = "highgui")]
      OutputWrapper::Display(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_output_is_compiled_in() {
    let url = Url::parse(DEFAULT_OUTPUT).unwrap();
    assert!(OutputWrapper::from_url(&url).is_ok());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }
}
