// 该文件是 Jingshen （景深） 项目的一部分。
// src/input.rs - 上游同步数据输入
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

//! 上游（相机、深度与推理流水线）每个周期交付一组完整的 [`SyncedGroup`]。
//! 任何 `Iterator<Item = Result<SyncedGroup, E>>` 都可以作为输入。

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::SyncedGroup};

mod replay;
pub use self::replay::{ReplayInput, ReplayInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Replay input error: {0}")]
  ReplayInputError(#[from] ReplayInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  Replay(ReplayInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayInput::SCHEME => Ok(InputWrapper::Replay(ReplayInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  pub fn with_resolution(self, width: u32, height: u32) -> Self {
    match self {
      InputWrapper::Replay(input) => InputWrapper::Replay(input.with_resolution(width, height)),
    }
  }

  pub fn with_fps(self, fps: f32) -> Self {
    match self {
      InputWrapper::Replay(input) => InputWrapper::Replay(input.with_fps(fps)),
    }
  }

  /// 输入自带的类别标签（如果有）
  pub fn classes(&self) -> Option<&crate::detection::LabelMap> {
    match self {
      InputWrapper::Replay(input) => input.classes(),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<SyncedGroup, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Replay(input) => input.next().map(|item| item.map_err(InputError::from)),
    }
  }
}
