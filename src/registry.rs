// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/registry.rs - 观测记录
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

use serde::Serialize;
use tracing::debug;

use crate::{frame::Timestamp, geometry::round2};

/// 外部跟踪器分配的目标编号
pub type TrackId = u64;

/// 单帧单目标的观测记录，创建后不可修改
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
  timestamp: Timestamp,
  #[serde(rename = "id")]
  track_id: TrackId,
  weight_index: f64,
}

impl Observation {
  pub fn timestamp(&self) -> Timestamp {
    self.timestamp
  }

  pub fn track_id(&self) -> TrackId {
    self.track_id
  }

  pub fn weight_index(&self) -> f64 {
    self.weight_index
  }
}

/// 只追加的观测日志
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
  observations: Vec<Observation>,
}

impl ObservationLog {
  pub fn new() -> Self {
    Self::default()
  }

  /// 记录一次观测。
  ///
  /// `weight_index` 为 `None` 表示该目标本帧没有轮廓，不产生记录。
  /// 返回是否追加了记录。
  pub fn record(
    &mut self,
    timestamp: Timestamp,
    track_id: TrackId,
    weight_index: Option<f64>,
  ) -> bool {
    let Some(weight_index) = weight_index else {
      return false;
    };

    debug_assert!(
      self
        .observations
        .last()
        .is_none_or(|last| last.timestamp <= timestamp),
      "观测时间戳必须单调不减"
    );

    let weight_index = if weight_index.is_finite() {
      round2(weight_index.max(0.0))
    } else {
      0.0
    };

    debug!(
      "记录观测: t={} id={} weight_index={:.2}",
      timestamp, track_id, weight_index
    );
    self.observations.push(Observation {
      timestamp,
      track_id,
      weight_index,
    });
    true
  }

  pub fn len(&self) -> usize {
    self.observations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.observations.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
    self.observations.iter()
  }

  pub fn as_slice(&self) -> &[Observation] {
    &self.observations
  }
}

impl<'a> IntoIterator for &'a ObservationLog {
  type Item = &'a Observation;
  type IntoIter = std::slice::Iter<'a, Observation>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
