// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/task.rs - 逐帧跟踪与称重任务
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
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{thread, time::Duration, time::Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::{Summary, summarize},
  frame::{DEFAULT_FPS, Frame, StreamInfo},
  geometry::{DEFAULT_SCALE_FACTOR, GeometryEstimator},
  input::{FrameSource, InputError},
  output::{
    FrameSink, OutputError,
    draw::{Annotation, Draw},
  },
  registry::ObservationLog,
  tracker::{DEFAULT_CLASS, Detection, Tracker, distinct_tracks},
};

/// 收到中断信号后强制退出前的等待时间
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// 任务参数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  scale_factor: f64,
  classes: Vec<u32>,
  max_frames: Option<u64>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      scale_factor: DEFAULT_SCALE_FACTOR,
      classes: vec![DEFAULT_CLASS],
      max_frames: None,
    }
  }
}

impl PipelineConfig {
  pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
    self.scale_factor = scale_factor;
    self
  }

  /// 空列表表示不过滤类别
  pub fn with_classes(mut self, classes: Vec<u32>) -> Self {
    self.classes = classes;
    self
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn scale_factor(&self) -> f64 {
    self.scale_factor
  }

  pub fn classes(&self) -> &[u32] {
    &self.classes
  }

  pub fn max_frames(&self) -> Option<u64> {
    self.max_frames
  }
}

/// 协作式停止信号，每帧开始前检查一次
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 注册 Ctrl-C 处理：第一次中断请求停止，超时仍未退出则强制结束进程
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let token = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      token.cancel();
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Init,
  Streaming,
  Done,
  Failed,
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PipelineState::Init => "INIT",
      PipelineState::Streaming => "STREAMING",
      PipelineState::Done => "DONE",
      PipelineState::Failed => "FAILED",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
  SourceUnavailable,
  SourceReadFailure,
  DetectorFailure,
  SinkWriteFailure,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("无法打开输入源: {0}")]
  SourceUnavailable(#[source] InputError),
  #[error("第 {frame} 帧读取失败: {source}")]
  SourceRead { frame: u64, source: InputError },
  #[error("第 {frame} 帧跟踪失败: {source}")]
  Detector { frame: u64, source: BoxError },
  #[error("无法打开输出: {0}")]
  SinkUnavailable(#[source] OutputError),
  #[error("第 {frame} 帧写入失败: {source}")]
  SinkWrite { frame: u64, source: OutputError },
  #[error("输出收尾失败: {0}")]
  SinkFinish(#[source] OutputError),
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
      PipelineError::SourceRead { .. } => ErrorKind::SourceReadFailure,
      PipelineError::Detector { .. } => ErrorKind::DetectorFailure,
      PipelineError::SinkUnavailable(_)
      | PipelineError::SinkWrite { .. }
      | PipelineError::SinkFinish(_) => ErrorKind::SinkWriteFailure,
    }
  }

  /// 出错的帧号（若与某一帧相关）
  pub fn frame(&self) -> Option<u64> {
    match self {
      PipelineError::SourceRead { frame, .. }
      | PipelineError::Detector { frame, .. }
      | PipelineError::SinkWrite { frame, .. } => Some(*frame),
      _ => None,
    }
  }
}

/// 一次成功（或被停止）的运行结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
  pub log: ObservationLog,
  /// 读取并写出的帧数
  pub frames_read: u64,
  pub cancelled: bool,
  pub stream: StreamInfo,
  /// 输出产物位置
  pub artifact: Option<String>,
}

impl RunOutcome {
  pub fn summary(&self) -> Summary {
    summarize(&self.log)
  }
}

pub struct TrackingTask<'a> {
  config: PipelineConfig,
  estimator: GeometryEstimator,
  draw: Draw<'a>,
  cancel: CancelToken,
  state: PipelineState,
}

impl<'a> TrackingTask<'a> {
  pub fn new(config: PipelineConfig) -> Self {
    let estimator = GeometryEstimator::new(config.scale_factor);
    Self {
      config,
      estimator,
      draw: Draw::default(),
      cancel: CancelToken::new(),
      state: PipelineState::Init,
    }
  }

  pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 实际生效的缩放系数
  pub fn scale_factor(&self) -> f64 {
    self.estimator.scale_factor()
  }

  fn transition(&mut self, next: PipelineState) {
    info!("任务状态: {} -> {}", self.state, next);
    self.state = next;
  }

  fn fail(&mut self, err: PipelineError) -> PipelineError {
    error!("任务失败 [{}]: {}", err.kind(), err);
    self.transition(PipelineState::Failed);
    err
  }

  /// 运行完整的任务。
  ///
  /// 输入源在 INIT 阶段打开，输出随后按输入源的尺寸与帧率打开。
  /// 无论结果如何，输入源都会被关闭；成功或停止时输出正常收尾，失败时输出被丢弃。
  pub fn run<S, T, O, FS, FO>(
    &mut self,
    open_source: FS,
    mut tracker: T,
    open_sink: FO,
  ) -> Result<RunOutcome, PipelineError>
  where
    S: FrameSource,
    T: Tracker,
    T::Error: std::error::Error + Send + Sync + 'static,
    O: FrameSink,
    FS: FnOnce() -> Result<S, InputError>,
    FO: FnOnce(&StreamInfo) -> Result<O, OutputError>,
  {
    self.state = PipelineState::Init;
    info!("开始任务...");

    let mut source = match open_source() {
      Ok(source) => source,
      Err(e) => return Err(self.fail(PipelineError::SourceUnavailable(e))),
    };

    let mut info = source.info();
    if !(info.fps.is_finite() && info.fps > 0.0) {
      warn!("输入源帧率 {} 无效，按 {} fps 处理", info.fps, DEFAULT_FPS);
      info.fps = DEFAULT_FPS;
    }
    info!(
      "输入源已打开: {}x{} @ {:.2} fps",
      info.width, info.height, info.fps
    );

    let mut sink = match open_sink(&info) {
      Ok(sink) => sink,
      Err(e) => {
        source.close();
        return Err(self.fail(PipelineError::SinkUnavailable(e)));
      }
    };

    self.transition(PipelineState::Streaming);
    let streamed = self.stream(&mut source, &mut tracker, &mut sink, &info);
    source.close();

    let mut outcome = match streamed {
      Ok(outcome) => outcome,
      Err(e) => {
        sink.discard();
        return Err(self.fail(e));
      }
    };

    if let Err(e) = sink.finish() {
      sink.discard();
      return Err(self.fail(PipelineError::SinkFinish(e)));
    }
    outcome.artifact = sink.location();

    self.transition(PipelineState::Done);
    info!(
      "任务完成: {} 帧, {} 条观测{}",
      outcome.frames_read,
      outcome.log.len(),
      if outcome.cancelled { " (已停止)" } else { "" }
    );
    Ok(outcome)
  }

  fn stream<S, T, O>(
    &self,
    source: &mut S,
    tracker: &mut T,
    sink: &mut O,
    info: &StreamInfo,
  ) -> Result<RunOutcome, PipelineError>
  where
    S: FrameSource,
    T: Tracker,
    T::Error: std::error::Error + Send + Sync + 'static,
    O: FrameSink,
  {
    let mut log = ObservationLog::new();
    let mut frame_index = 0u64;
    let mut cancelled = false;

    loop {
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，在第 {} 帧后退出任务循环", frame_index);
        cancelled = true;
        break;
      }
      if self.config.max_frames.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }

      let image = match source.next() {
        Some(Ok(image)) => image,
        Some(Err(source)) => {
          return Err(PipelineError::SourceRead {
            frame: frame_index + 1,
            source,
          });
        }
        None => {
          debug!("输入流结束");
          break;
        }
      };

      frame_index += 1;
      let now = Instant::now();
      let mut frame = Frame::new(image, frame_index, info.fps);

      let detections = tracker
        .track(&frame, &self.config.classes)
        .map_err(|e| PipelineError::Detector {
          frame: frame_index,
          source: Box::new(e),
        })?;
      let elapsed_a = now.elapsed();

      self.process_frame(&mut frame, &detections, &mut log);

      sink
        .write_frame(&frame.image)
        .map_err(|source| PipelineError::SinkWrite {
          frame: frame_index,
          source,
        })?;
      debug!(
        "第 {} 帧 (t={}) 完成，耗时: {:.2?} / {:.2?}",
        frame_index,
        frame.timestamp,
        elapsed_a,
        now.elapsed()
      );
    }

    Ok(RunOutcome {
      log,
      frames_read: frame_index,
      cancelled,
      stream: *info,
      artifact: None,
    })
  }

  /// 对一帧的跟踪结果估算、记录并绘制。没有跟踪目标的帧保持原样。
  fn process_frame(&self, frame: &mut Frame, detections: &[Detection], log: &mut ObservationLog) {
    if detections.iter().all(|d| d.track_id.is_none()) {
      debug!("第 {} 帧没有跟踪目标", frame.index);
      return;
    }

    let timestamp = frame.timestamp;
    let annotations: Vec<Annotation<'_>> = detections
      .iter()
      .map(|detection| {
        let weight_index = match (detection.track_id, detection.outline.as_deref()) {
          (Some(track_id), Some(outline)) => {
            let weight_index = self.estimator.estimate(outline);
            log.record(timestamp, track_id, Some(weight_index));
            Some(weight_index)
          }
          _ => None,
        };
        Annotation::new(detection, weight_index)
      })
      .collect();

    let count = distinct_tracks(detections);
    debug!(
      "第 {} 帧: {} 个检测, {} 个跟踪目标",
      frame.index,
      detections.len(),
      count
    );
    self.draw.annotate(&mut frame.image, &annotations, count);
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::rc::Rc;

  use image::{Rgb, RgbImage};

  use super::*;
  use crate::frame::Timestamp;

  struct Frames {
    remaining: u64,
    fps: Option<f64>,
    closed: Rc<Cell<bool>>,
  }

  impl Iterator for Frames {
    type Item = Result<RgbImage, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
      if self.remaining == 0 {
        return None;
      }
      self.remaining -= 1;
      Some(Ok(RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]))))
    }
  }

  impl FrameSource for Frames {
    fn width(&self) -> u32 {
      64
    }

    fn height(&self) -> u32 {
      48
    }

    fn fps(&self) -> Option<f64> {
      self.fps
    }

    fn close(&mut self) {
      self.closed.set(true);
    }
  }

  #[derive(Default)]
  struct Collect {
    frames: Vec<RgbImage>,
    finished: bool,
  }

  impl FrameSink for &mut Collect {
    fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
      self.frames.push(image.clone());
      Ok(())
    }

    fn finish(&mut self) -> Result<(), OutputError> {
      self.finished = true;
      Ok(())
    }
  }

  struct OneBird;

  impl Tracker for OneBird {
    type Error = std::io::Error;

    fn track(&mut self, _frame: &Frame, _classes: &[u32]) -> Result<Vec<Detection>, Self::Error> {
      Ok(vec![
        Detection::new([5.0, 5.0, 30.0, 30.0])
          .with_track_id(3)
          .with_outline(vec![[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0]]),
      ])
    }
  }

  fn frames(count: u64, fps: Option<f64>) -> Frames {
    Frames {
      remaining: count,
      fps,
      closed: Rc::new(Cell::new(false)),
    }
  }

  #[test]
  fn config_builders() {
    let config = PipelineConfig::default();
    assert_eq!(config.scale_factor(), DEFAULT_SCALE_FACTOR);
    assert_eq!(config.classes(), &[DEFAULT_CLASS]);
    assert_eq!(config.max_frames(), None);

    let config = config
      .with_scale_factor(50.0)
      .with_classes(vec![])
      .with_max_frames(Some(3));
    assert_eq!(config.scale_factor(), 50.0);
    assert!(config.classes().is_empty());
    assert_eq!(config.max_frames(), Some(3));
  }

  #[test]
  fn records_one_observation_per_outlined_track() {
    let mut sink = Collect::default();
    let mut task = TrackingTask::new(PipelineConfig::default());
    let outcome = task
      .run(|| Ok(frames(3, Some(25.0))), OneBird, |_| Ok(&mut sink))
      .unwrap();

    assert_eq!(task.state(), PipelineState::Done);
    assert_eq!(outcome.frames_read, 3);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.log.len(), 3);
    assert_eq!(outcome.log.as_slice()[0].weight_index(), 1.0);
    assert_eq!(outcome.log.as_slice()[2].timestamp(), Timestamp::from_centis(12));
    assert!(sink.finished);
    assert_eq!(sink.frames.len(), 3);
    // 绘制了边框
    assert_eq!(*sink.frames[0].get_pixel(5, 30), Rgb([0, 255, 0]));
  }

  #[test]
  fn invalid_frame_rate_falls_back_to_default() {
    let mut sink = Collect::default();
    let mut task = TrackingTask::new(PipelineConfig::default());
    let outcome = task
      .run(|| Ok(frames(1, Some(f64::NAN))), OneBird, |_| Ok(&mut sink))
      .unwrap();
    assert_eq!(outcome.stream.fps, DEFAULT_FPS);
    assert_eq!(outcome.log.as_slice()[0].timestamp(), Timestamp::from_centis(4));
  }

  #[test]
  fn max_frames_stops_early() {
    let mut sink = Collect::default();
    let mut task =
      TrackingTask::new(PipelineConfig::default().with_max_frames(Some(2)));
    let outcome = task
      .run(|| Ok(frames(10, None)), OneBird, |_| Ok(&mut sink))
      .unwrap();
    assert_eq!(outcome.frames_read, 2);
    assert!(!outcome.cancelled);
    assert_eq!(sink.frames.len(), 2);
  }

  #[test]
  fn cancelled_before_start_processes_nothing() {
    let mut sink = Collect::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut task = TrackingTask::new(PipelineConfig::default()).with_cancel_token(cancel);
    let outcome = task
      .run(|| Ok(frames(5, None)), OneBird, |_| Ok(&mut sink))
      .unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.frames_read, 0);
    assert!(outcome.log.is_empty());
    assert!(sink.finished);
  }

  #[test]
  fn sink_open_failure_closes_source() {
    let source = frames(1, None);
    let closed = source.closed.clone();
    let mut task = TrackingTask::new(PipelineConfig::default());
    let err = task
      .run(
        || Ok(source),
        OneBird,
        |_| Err::<&mut Collect, _>(OutputError::SchemeMismatch("rtsp".to_string())),
      )
      .unwrap_err();

    assert!(closed.get());
    assert_eq!(task.state(), PipelineState::Failed);
    assert_eq!(err.kind(), ErrorKind::SinkWriteFailure);
    assert_eq!(err.frame(), None);
  }

  #[test]
  fn source_is_closed_after_a_normal_run() {
    let source = frames(2, None);
    let closed = source.closed.clone();
    let mut sink = Collect::default();
    let mut task = TrackingTask::new(PipelineConfig::default());
    task.run(|| Ok(source), OneBird, |_| Ok(&mut sink)).unwrap();
    assert!(closed.get());
  }

  #[test]
  fn error_kinds_display_as_names() {
    assert_eq!(ErrorKind::DetectorFailure.to_string(), "DetectorFailure");
    assert_eq!(
      serde_json::to_string(&ErrorKind::SourceUnavailable).unwrap(),
      "\"SourceUnavailable\""
    );
    assert_eq!(PipelineState::Streaming.to_string(), "STREAMING");
  }
}
