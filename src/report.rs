// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/report.rs - 运行结果报告
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

//! JSON 报告。成功时输出 [`RunReport`]，失败时输出 [`ErrorReport`]。

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use crate::{
  frame::Timestamp,
  geometry::WEIGHT_INDEX_UNIT,
  registry::TrackId,
  task::{ErrorKind, PipelineError, RunOutcome},
};

const NO_OBJECTS_MESSAGE: &str = "No objects detected";

/// 单个目标的平均体型指标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackWeight {
  pub avg_weight_index: f64,
  pub unit: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Artifacts {
  pub annotated_video: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub filename: String,
  /// 出现过目标的不同时间戳数量
  pub total_frames_processed: usize,
  pub frames_read: u64,
  pub counts_timeseries: BTreeMap<Timestamp, usize>,
  /// 按目标编号索引
  pub weight_estimates: BTreeMap<TrackId, TrackWeight>,
  pub max_concurrent: usize,
  pub artifacts: Artifacts,
  pub no_objects_detected: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  pub cancelled: bool,
  pub scale_factor: f64,
  pub generated_at: String,
}

impl RunReport {
  pub fn new(filename: impl Into<String>, outcome: &RunOutcome, scale_factor: f64) -> Self {
    let summary = outcome.summary();
    let no_objects_detected = summary.is_empty();

    Self {
      filename: filename.into(),
      total_frames_processed: summary.total_timestamps(),
      frames_read: outcome.frames_read,
      counts_timeseries: summary.counts_by_timestamp,
      weight_estimates: summary
        .summary_by_track
        .into_iter()
        .map(|(id, avg_weight_index)| {
          (
            id,
            TrackWeight {
              avg_weight_index,
              unit: WEIGHT_INDEX_UNIT,
            },
          )
        })
        .collect(),
      max_concurrent: summary.max_concurrent,
      artifacts: Artifacts {
        annotated_video: outcome.artifact.clone(),
      },
      no_objects_detected,
      message: no_objects_detected.then(|| NO_OBJECTS_MESSAGE.to_string()),
      cancelled: outcome.cancelled,
      scale_factor,
      generated_at: Utc::now().to_rfc3339(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
  pub kind: ErrorKind,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub frame: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
  pub error: ErrorDetail,
}

impl From<&PipelineError> for ErrorReport {
  fn from(err: &PipelineError) -> Self {
    Self {
      error: ErrorDetail {
        kind: err.kind(),
        message: err.to_string(),
        frame: err.frame(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::{Value, json};

  use super::*;
  use crate::{frame::StreamInfo, input::InputError, registry::ObservationLog};

  fn outcome(log: ObservationLog) -> RunOutcome {
    RunOutcome {
      log,
      frames_read: 3,
      cancelled: false,
      stream: StreamInfo::new(64, 48, 25.0),
      artifact: Some("/tmp/out.mp4".to_string()),
    }
  }

  #[test]
  fn serializes_counts_and_weights() {
    let mut log = ObservationLog::new();
    log.record(Timestamp::from_centis(4), 5, Some(4.0));
    log.record(Timestamp::from_centis(8), 5, Some(4.0));
    log.record(Timestamp::from_centis(8), 7, Some(4.0));

    let report = RunReport::new("birds.mp4", &outcome(log), 100.0);
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["filename"], "birds.mp4");
    assert_eq!(value["total_frames_processed"], 2);
    assert_eq!(value["frames_read"], 3);
    assert_eq!(value["counts_timeseries"], json!({"0.04": 1, "0.08": 2}));
    assert_eq!(
      value["weight_estimates"],
      json!({
        "5": {"avg_weight_index": 4.0, "unit": "pixel_area_proxy"},
        "7": {"avg_weight_index": 4.0, "unit": "pixel_area_proxy"},
      })
    );
    assert_eq!(value["max_concurrent"], 2);
    assert_eq!(value["artifacts"]["annotated_video"], "/tmp/out.mp4");
    assert_eq!(value["no_objects_detected"], false);
    assert!(value.get("message").is_none());
  }

  #[test]
  fn empty_log_reports_no_objects() {
    let report = RunReport::new("empty.mp4", &outcome(ObservationLog::new()), 100.0);
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["no_objects_detected"], true);
    assert_eq!(value["message"], NO_OBJECTS_MESSAGE);
    assert_eq!(value["max_concurrent"], 0);
    assert_eq!(value["counts_timeseries"], json!({}));
    assert_eq!(value["weight_estimates"], json!({}));
  }

  #[test]
  fn error_report_shape() {
    let err = PipelineError::SourceUnavailable(InputError::SchemeMismatch("rtsp".to_string()));
    let value: Value = serde_json::to_value(ErrorReport::from(&err)).unwrap();
    assert_eq!(value["error"]["kind"], "SourceUnavailable");
    assert!(value["error"]["message"].as_str().unwrap().contains("rtsp"));
    assert!(value["error"].get("frame").is_none());
  }
}
