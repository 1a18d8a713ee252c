// 该文件是 Jingshen （景深） 项目的一部分。
// src/main.rs - 空间检测叠加显示程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use jingshen::{
  FromUrl,
  config::{PipelineConfig, SpatialAlgorithm},
  detection::LabelMap,
  input::InputWrapper,
  output::{
    DEFAULT_OUTPUT, OutputWrapper,
    draw::{self, Overlay, TOO_CLOSE_THRESHOLD_MM},
  },
  task::{ContinuousTask, Task, install_interrupt_handler},
};

/// Jingshen 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，例如 replay:///path/to/session.jsonl
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 display://Display、image:///tmp/latest.png、folder:///tmp/records；
  /// 未启用 highgui 特性时默认保存到 image:///tmp/jingshen-latest.png
  #[arg(long, value_name = "OUTPUT", default_value = DEFAULT_OUTPUT)]
  pub output: Url,

  /// 相机输出宽度（像素），必须是 16 的倍数
  #[arg(short, long, default_value_t = 640)]
  pub width: u32,
  /// 相机输出高度（像素），必须是 16 的倍数；-h 已用于帮助，短选项为 -H
  #[arg(short = 'H', long, default_value_t = 480)]
  pub height: u32,
  /// 目标检测网络名称
  #[arg(short, long, default_value = "yolov6-nano")]
  pub model: String,
  /// 计算深度时检测框的缩放系数
  #[arg(short, long, default_value_t = 0.5)]
  pub box_scale: f32,
  /// 低于该深度（毫米）的像素不参与计算
  #[arg(short, long = "lower-threshold", alias = "l-threshold", default_value_t = 100)]
  pub lower_threshold: u32,
  /// 高于该深度（毫米）的像素不参与计算
  #[arg(short, long = "upper-threshold", alias = "u-threshold", default_value_t = 5000)]
  pub upper_threshold: u32,
  /// 深度聚合算法: average/mean/min/max/mode/median
  #[arg(short, long, alias = "alg", default_value = "average")]
  pub algorithm: String,
  /// 参与深度计算的像素间距
  #[arg(short, long, default_value_t = 1)]
  pub step_size: i32,
  /// 每秒处理的帧数
  #[arg(short, long, default_value_t = 30.0)]
  pub fps: f32,

  /// 类别标签文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 小于该深度（毫米）的目标标记为过近
  #[arg(long = "too-close", default_value_t = TOO_CLOSE_THRESHOLD_MM)]
  pub too_close: f32,
  /// 字体文件，省略时使用内置字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 未指定字体文件时优先尝试系统字体
  #[arg(long)]
  pub system_font: bool,
  /// 最大处理帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

impl From<&Args> for PipelineConfig {
  fn from(args: &Args) -> Self {
    PipelineConfig {
      width: args.width,
      height: args.height,
      model: args.model.clone(),
      box_scale: args.box_scale,
      lower_threshold_mm: args.lower_threshold,
      upper_threshold_mm: args.upper_threshold,
      algorithm: SpatialAlgorithm::from_name(&args.algorithm),
      step_size: args.step_size,
      fps: args.fps,
      too_close_threshold_mm: args.too_close,
    }
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let config = PipelineConfig::from(&args).validate()?;

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  config.log_summary();

  let input = InputWrapper::from_url(&args.input)?
    .with_resolution(config.width, config.height)
    .with_fps(config.fps);

  let labels = match (&args.labels, input.classes()) {
    (Some(path), _) => LabelMap::from_file(path)?,
    (None, Some(classes)) => classes.clone(),
    (None, None) => {
      warn!("未提供类别标签, 使用类别索引作为标签");
      LabelMap::default()
    }
  };

  let font = match &args.font {
    Some(path) => draw::load_font(path)?,
    None if args.system_font => match draw::system_font() {
      Some(font) => font,
      None => {
        warn!("未找到系统字体, 使用内置字体");
        draw::embedded_font()?
      }
    },
    None => draw::embedded_font()?,
  };

  let overlay = Overlay::new(labels)
    .with_too_close_threshold(config.too_close_threshold_mm)
    .with_font(Some(font));
  let output = OutputWrapper::from_url(&args.output)?.with_overlay(overlay);

  let summary = ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt(install_interrupt_handler()?)
    .run_task(input, output)?;

  info!(
    "处理完成: {} 帧, {} 个检测结果, 结束原因: {:?}",
    summary.frames, summary.detections, summary.stop_reason
  );

  Ok(())
}
