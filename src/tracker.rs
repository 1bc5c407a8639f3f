// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/tracker.rs - 外部检测跟踪器接口
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

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::Frame, registry::TrackId};

mod track_file;
pub use self::track_file::{TrackFileError, TrackFileTracker};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 默认只关注鸟类
pub const DEFAULT_CLASS: u32 = 14;

/// 按 COCO 名称或数字解析类别
pub fn parse_class(name: &str) -> Option<u32> {
  let name = name.trim();
  if let Ok(id) = name.parse::<u32>() {
    return Some(id);
  }
  COCO_CLASSES
    .iter()
    .position(|c| c.eq_ignore_ascii_case(name))
    .map(|i| i as u32)
}

pub fn class_name(class_id: u32) -> &'static str {
  COCO_CLASSES
    .get(class_id as usize)
    .copied()
    .unwrap_or("unknown")
}

/// 单个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  /// [x1, y1, x2, y2]，像素坐标
  pub bbox: [f32; 4],
  /// 跟踪编号，未进入跟踪的目标为 None
  #[serde(default)]
  pub track_id: Option<TrackId>,
  #[serde(default)]
  pub class_id: Option<u32>,
  #[serde(default)]
  pub score: Option<f32>,
  /// 实例轮廓，闭合多边形的顶点序列
  #[serde(default)]
  pub outline: Option<Vec<[f32; 2]>>,
}

impl Detection {
  pub fn new(bbox: [f32; 4]) -> Self {
    Self {
      bbox,
      track_id: None,
      class_id: None,
      score: None,
      outline: None,
    }
  }

  pub fn with_track_id(mut self, track_id: TrackId) -> Self {
    self.track_id = Some(track_id);
    self
  }

  pub fn with_class(mut self, class_id: u32) -> Self {
    self.class_id = Some(class_id);
    self
  }

  pub fn with_outline(mut self, outline: Vec<[f32; 2]>) -> Self {
    self.outline = Some(outline);
    self
  }

  /// 边框坐标有限且 x1 < x2, y1 < y2
  pub fn has_valid_bbox(&self) -> bool {
    let [x1, y1, x2, y2] = self.bbox;
    self.bbox.iter().all(|v| v.is_finite()) && x1 < x2 && y1 < y2
  }

  /// 没有类别信息的检测视为已经过滤
  pub fn matches_classes(&self, classes: &[u32]) -> bool {
    match self.class_id {
      Some(class_id) => classes.is_empty() || classes.contains(&class_id),
      None => true,
    }
  }
}

/// 本帧中不同跟踪编号的数量
pub fn distinct_tracks(detections: &[Detection]) -> usize {
  detections
    .iter()
    .filter_map(|d| d.track_id)
    .collect::<BTreeSet<_>>()
    .len()
}

/// 外部检测跟踪器。每帧调用一次，返回按顺序排列的检测结果。
pub trait Tracker {
  type Error;

  fn track(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>, Self::Error>;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
  type Error = T::Error;

  fn track(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>, Self::Error> {
    (**self).track(frame, classes)
  }
}

#[derive(Error, Debug)]
pub enum TrackerError {
  #[error("跟踪文件错误: {0}")]
  TrackFileError(#[from] TrackFileError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum TrackerWrapper {
  TrackFile(TrackFileTracker),
}

impl FromUrl for TrackerWrapper {
  type Error = TrackerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      TrackFileTracker::SCHEME => Ok(TrackerWrapper::TrackFile(TrackFileTracker::from_url(url)?)),
      other => Err(TrackerError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Tracker for TrackerWrapper {
  type Error = TrackerError;

  fn track(&mut self, frame: &Frame, classes: &[u32]) -> Result<Vec<Detection>, Self::Error> {
    match self {
      TrackerWrapper::TrackFile(tracker) => tracker.track(frame, classes).map_err(TrackerError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_class_names_and_ids() {
    assert_eq!(parse_class("bird"), Some(14));
    assert_eq!(parse_class("Bird"), Some(14));
    assert_eq!(parse_class("14"), Some(14));
    assert_eq!(parse_class("teddy bear"), Some(77));
    assert_eq!(parse_class("dragon"), None);
    assert_eq!(class_name(DEFAULT_CLASS), "bird");
    assert_eq!(class_name(500), "unknown");
  }

  #[test]
  fn distinct_tracks_ignores_untracked_and_duplicates() {
    let detections = vec![
      Detection::new([0.0, 0.0, 1.0, 1.0]).with_track_id(3),
      Detection::new([0.0, 0.0, 1.0, 1.0]).with_track_id(3),
      Detection::new([0.0, 0.0, 1.0, 1.0]),
      Detection::new([0.0, 0.0, 1.0, 1.0]).with_track_id(9),
    ];
    assert_eq!(distinct_tracks(&detections), 2);
    assert_eq!(distinct_tracks(&[]), 0);
  }

  #[test]
  fn bbox_validation() {
    assert!(Detection::new([0.0, 0.0, 1.0, 1.0]).has_valid_bbox());
    assert!(!Detection::new([2.0, 0.0, 1.0, 1.0]).has_valid_bbox());
    assert!(!Detection::new([0.0, 0.0, f32::INFINITY, 1.0]).has_valid_bbox());
  }

  #[test]
  fn class_filter() {
    let bird = Detection::new([0.0, 0.0, 1.0, 1.0]).with_class(14);
    let cat = Detection::new([0.0, 0.0, 1.0, 1.0]).with_class(15);
    let unknown = Detection::new([0.0, 0.0, 1.0, 1.0]);
    assert!(bird.matches_classes(&[14]));
    assert!(!cat.matches_classes(&[14]));
    assert!(cat.matches_classes(&[]));
    assert!(unknown.matches_classes(&[14]));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("grpc://tracker.local:50051").unwrap();
    assert!(matches!(
      TrackerWrapper::from_url(&url),
      Err(TrackerError::SchemeMismatch(_))
    ));
  }
}
