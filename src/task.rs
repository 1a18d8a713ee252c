// 该文件是 Jingshen （景深） 项目的一部分。
// src/task.rs - 逐周期处理循环
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
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};
use tracing::{info, warn};

use crate::{
  detection::SpatialDetections,
  frame::{Frame, SyncedGroup},
  output::{Flow, Render},
};

/// 收到中断信号后，处理循环必须在该时间内退出，否则强制结束进程
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task(self, input: I, output: O) -> Result<TaskSummary, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// 上游不再产生数据
  InputExhausted,
  /// 输出请求停止（例如在窗口中按下退出键）
  OutputRequested,
  FrameLimit,
  Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
  pub frames: usize,
  pub detections: usize,
  pub stop_reason: StopReason,
}

/// 安装 Ctrl-C 处理器，返回每次中断都会收到消息的通道
pub fn install_interrupt_handler() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = mpsc::channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_AFTER);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}

/// 逐周期拉取上游数据并交给输出，直到上游结束或收到停止请求
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|n| *n > 0);
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<SyncedGroup, IE>>,
  O: Render<Frame, SpatialDetections, Error = RE>,
> Task<I, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, output: O) -> Result<TaskSummary, Self::Error> {
    info!("开始任务...");

    let mut frames = 0;
    let mut detections = 0;
    let mut stop_reason = StopReason::InputExhausted;
    let mut now = Instant::now();
    for group in input {
      let SyncedGroup {
        mut frame,
        detections: result,
      } = group?;
      let waited = now.elapsed();
      frames += 1;
      detections += result.len();
      info!(
        "处理第 {} 帧图像, {} 个检测结果",
        frame.index,
        result.len()
      );

      let flow = output.render_result(&mut frame, &result)?;
      let elapsed = now.elapsed();
      now = Instant::now();
      info!("渲染完成，耗时: {:.2?} / {:.2?}", waited, elapsed);

      if flow == Flow::Stop {
        warn!("输出请求停止，退出任务循环");
        stop_reason = StopReason::OutputRequested;
        break;
      }
      if self.frame_number.is_some_and(|n| frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frames);
        stop_reason = StopReason::FrameLimit;
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        stop_reason = StopReason::Interrupted;
        break;
      }
    }

    info!("任务完成，共处理 {} 帧, {} 个检测结果", frames, detections);
    Ok(TaskSummary {
      frames,
      detections,
      stop_reason,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};

  use image::RgbImage;
  use thiserror::Error;

  use super::*;
  use crate::detection::{NormalizedBox, SpatialDetection, SpatialPoint};

  #[derive(Error, Debug)]
  #[error("upstream failed")]
  struct UpstreamError;

  #[derive(Error, Debug)]
  #[error("output failed")]
  struct OutputFailure;

  /// 记录收到的帧序号，在第 `stop_at` 帧请求停止
  struct Recorder {
    seen: RefCell<Vec<u64>>,
    stop_at: Option<u64>,
    calls: Cell<usize>,
  }

  impl Recorder {
    fn new(stop_at: Option<u64>) -> Self {
      Self {
        seen: RefCell::new(Vec::new()),
        stop_at,
        calls: Cell::new(0),
      }
    }
  }

  impl Render<Frame, SpatialDetections> for &Recorder {
    type Error = OutputFailure;

    fn render_result(
      &self,
      frame: &mut Frame,
      _result: &SpatialDetections,
    ) -> Result<Flow, Self::Error> {
      self.calls.set(self.calls.get() + 1);
      self.seen.borrow_mut().push(frame.index);
      if self.stop_at == Some(frame.index) {
        Ok(Flow::Stop)
      } else {
        Ok(Flow::Continue)
      }
    }
  }

  fn groups(count: u64) -> impl Iterator<Item = Result<SyncedGroup, UpstreamError>> {
    (0..count).map(|index| {
      let detections = vec![SpatialDetection::new(
        0,
        NormalizedBox::new(0.0, 0.0, 0.5, 0.5),
        SpatialPoint::new(0.0, 0.0, 1000.0),
      )];
      Ok(SyncedGroup::new(
        Frame::new(index, index * 33, RgbImage::new(8, 8)),
        detections.into(),
      ))
    })
  }

  #[test]
  fn runs_until_input_exhausted() {
    let recorder = Recorder::new(None);
    let summary = ContinuousTask::default()
      .run_task(groups(4), &recorder)
      .unwrap();
    assert_eq!(
      summary,
      TaskSummary {
        frames: 4,
        detections: 4,
        stop_reason: StopReason::InputExhausted
      }
    );
    assert_eq!(*recorder.seen.borrow(), vec![0, 1, 2, 3]);
  }

  #[test]
  fn output_stop_ends_loop_without_pulling_more() {
    let recorder = Recorder::new(Some(1));
    let pulled = Cell::new(0);
    let input = groups(10).inspect(|_| pulled.set(pulled.get() + 1));
    let summary = ContinuousTask::default().run_task(input, &recorder).unwrap();
    assert_eq!(summary.stop_reason, StopReason::OutputRequested);
    assert_eq!(summary.frames, 2);
    assert_eq!(pulled.get(), 2);
  }

  #[test]
  fn frame_limit() {
    let recorder = Recorder::new(None);
    let summary = ContinuousTask::default()
      .with_frame_number(Some(3))
      .run_task(groups(10), &recorder)
      .unwrap();
    assert_eq!(summary.stop_reason, StopReason::FrameLimit);
    assert_eq!(recorder.calls.get(), 3);
  }

  #[test]
  fn zero_frame_limit_means_unlimited() {
    let recorder = Recorder::new(None);
    let summary = ContinuousTask::default()
      .with_frame_number(Some(0))
      .run_task(groups(5), &recorder)
      .unwrap();
    assert_eq!(summary.frames, 5);
  }

  #[test]
  fn interrupt_is_checked_each_cycle() {
    let (tx, rx) = mpsc::channel();
    tx.send(()).unwrap();
    let recorder = Recorder::new(None);
    let summary = ContinuousTask::default()
      .with_interrupt(rx)
      .run_task(groups(10), &recorder)
      .unwrap();
    assert_eq!(summary.stop_reason, StopReason::Interrupted);
    assert_eq!(summary.frames, 1);
  }

  #[test]
  fn upstream_error_propagates() {
    let recorder = Recorder::new(None);
    let input = groups(2).chain(std::iter::once(Err(UpstreamError)));
    let err = ContinuousTask::default()
      .run_task(input, &recorder)
      .unwrap_err();
    assert_eq!(err.to_string(), "upstream failed");
    assert_eq!(recorder.calls.get(), 2);
  }
}
