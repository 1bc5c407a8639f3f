// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/tracker/track_file.rs - 预先计算的跟踪结果回放
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

//! 从 JSON Lines 文件回放外部跟踪器的输出。
//!
//! 每行对应一帧：
//!
//! ```text
//! {"frame": 1, "detections": [{"bbox": [10, 20, 30, 40], "track_id": 5, "class_id": 14, "outline": [[10, 20], [30, 20], [30, 40]]}]}
//! ```
//!
//! 帧号从 1 开始并且必须严格递增；没有对应行的帧视为没有检测结果。
//!
//! # URL 格式
//!
//! - `tracks:///path/to/run.jsonl`

use std::fs::File;
use std::io::{BufRead, BufReader};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  url_path,
  tracker::{Detection, Tracker},
};

#[derive(Error, Debug)]
pub enum TrackFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
  #[error("第 {line} 行帧号 {frame} 未按递增顺序排列 (上一帧 {previous})")]
  OutOfOrder { line: usize, frame: u64, previous: u64 },
  #[error("第 {line} 行帧 {frame} 含有无效边框 {bbox:?}")]
  InvalidBox {
    line: usize,
    frame: u64,
    bbox: [f32; 4],
  },
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
  frame: u64,
  #[serde(default)]
  detections: Vec<Detection>,
  #[serde(skip)]
  line: usize,
}

pub struct TrackFileTracker {
  reader: Box<dyn BufRead + Send>,
  line_number: usize,
  last_frame: Option<u64>,
  pending: Option<FrameRecord>,
}

impl FromUrlWithScheme for TrackFileTracker {
  const SCHEME: &'static str = "tracks";
}

impl FromUrl for TrackFileTracker {
  type Error = TrackFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TrackFileError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = url_path(url);
    info!("打开跟踪结果文件: {}", path.display());
    let file = File::open(&path)?;
    Ok(Self::from_reader(BufReader::new(file)))
  }
}

impl TrackFileTracker {
  pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
    Self {
      reader: Box::new(reader),
      line_number: 0,
      last_frame: None,
      pending: None,
    }
  }

  fn next_record(&mut self) -> Result<Option<FrameRecord>, TrackFileError> {
    let mut line = String::new();
    loop {
      line.clear();
      if self.reader.read_line(&mut line)? == 0 {
        return Ok(None);
      }
      self.line_number += 1;

      let trimmed = line.trim();
      if trimmed.is_empty() {
        continue;
      }

      let mut record: FrameRecord =
        serde_json::from_str(trimmed).map_err(|source| TrackFileError::ParseError {
          line: self.line_number,
          source,
        })?;
      record.line = self.line_number;

      if let Some(previous) = self.last_frame {
        if record.frame <= previous {
          return Err(TrackFileError::OutOfOrder {
            line: self.line_number,
            frame: record.frame,
            previous,
          });
        }
      }
      self.last_frame = Some(record.frame);

      if let Some(bad) = record.detections.iter().find(|d| !d.has_valid_bbox()) {
        return Err(TrackFileError::InvalidBox {
          line: self.line_number,
          frame: record.frame,
          bbox: bad.bbox,
        });
      }

      return Ok(Some(record));
    }
  }

  /// 取出帧 `index` 的检测结果
  fn detections_for(&mut self, index: u64) -> Result<Vec<Detection>, TrackFileError> {
    loop {
      let record = match self.pending.take() {
        Some(record) => record,
        None => match self.next_record()? {
          Some(record) => record,
          None => return Ok(Vec::new()),
        },
      };

      if record.frame < index {
        warn!(
          "第 {} 行的帧 {} 早于当前帧 {}，已跳过",
          record.line, record.frame, index
        );
        continue;
      }

      if record.frame == index {
        return Ok(record.detections);
      }

      self.pending = Some(record);
      return Ok(Vec::new());
    }
  }
}

impl Tracker for TrackFileTracker {
  type Error = TrackFileError;

  fn track(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>, Self::Error> {
    let mut detections = self.detections_for(frame.index)?;
    let total = detections.len();
    detections.retain(|d| d.matches_classes(classes));
    debug!(
      "帧 {}: 跟踪文件给出 {} 个检测，类别过滤后 {} 个",
      frame.index,
      total,
      detections.len()
    );
    Ok(detections)
  }
}
