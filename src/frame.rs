// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/frame.rs - 帧与时间戳定义
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

use image::RgbImage;
use serde::{Serialize, Serializer};

/// 帧率无效时使用的默认帧率
pub const DEFAULT_FPS: f64 = 25.0;

/// 以百分之一秒为单位的时间戳。
///
/// 观测记录与聚合都以两位小数的时间戳作为键，用整数保存可以保证
/// 同一舍入值总是精确相等。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
  pub fn from_centis(centis: u64) -> Self {
    Timestamp(centis)
  }

  /// 由秒数构造，保留两位小数（恰好一半时取偶数）；负数与非有限值视为 0
  pub fn from_secs(secs: f64) -> Self {
    if !secs.is_finite() || secs <= 0.0 {
      return Timestamp(0);
    }
    Timestamp((secs * 100.0).round_ties_even() as u64)
  }

  /// timestamp = index / fps
  pub fn from_frame(index: u64, fps: f64) -> Self {
    Self::from_secs(index as f64 / fps)
  }

  pub fn centis(&self) -> u64 {
    self.0
  }

  pub fn as_secs(&self) -> f64 {
    self.0 as f64 / 100.0
  }
}

impl fmt::Display for Timestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
  }
}

// 作为 JSON 对象键时需要序列化为字符串
impl Serialize for Timestamp {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// 输入流的基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  pub fps: f64,
}

impl StreamInfo {
  pub fn new(width: u32, height: u32, fps: f64) -> Self {
    Self { width, height, fps }
  }

  /// 帧率不可用时回退到默认值
  pub fn effective_fps(&self) -> f64 {
    if self.fps.is_finite() && self.fps > 0.0 {
      self.fps
    } else {
      DEFAULT_FPS
    }
  }
}

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引，从 1 开始
  pub index: u64,
  /// 时间戳
  pub timestamp: Timestamp,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, fps: f64) -> Self {
    Self {
      image,
      index,
      timestamp: Timestamp::from_frame(index, fps),
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}
