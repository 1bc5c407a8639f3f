// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/geometry.rs - 轮廓面积估计
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

//! 由实例轮廓计算体型指标。
//!
//! 指标为 `面积 / 缩放系数`，保留两位小数。它只是像素面积的代理量，
//! 不对应任何物理质量单位。

use tracing::warn;

/// 默认缩放系数
pub const DEFAULT_SCALE_FACTOR: f64 = 100.0;

/// 指标的单位标签
pub const WEIGHT_INDEX_UNIT: &str = "pixel_area_proxy";

/// 保留两位小数，恰好一半时取偶数
pub fn round2(value: f64) -> f64 {
  (value * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryEstimator {
  scale_factor: f64,
}

impl Default for GeometryEstimator {
  fn default() -> Self {
    Self {
      scale_factor: DEFAULT_SCALE_FACTOR,
    }
  }
}

impl GeometryEstimator {
  pub fn new(scale_factor: f64) -> Self {
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
      warn!(
        "缩放系数 {} 无效，使用默认值 {}",
        scale_factor, DEFAULT_SCALE_FACTOR
      );
      return Self::default();
    }
    Self { scale_factor }
  }

  pub fn scale_factor(&self) -> f64 {
    self.scale_factor
  }

  /// 计算轮廓的体型指标，退化轮廓返回 0.0
  pub fn estimate(&self, outline: &[[f32; 2]]) -> f64 {
    round2(polygon_area(outline) / self.scale_factor)
  }
}

/// 闭合多边形的无符号面积（鞋带公式）。
///
/// 少于三个不同顶点、含非有限坐标或有边真正交叉的轮廓面积为 0。
/// 只在一点相接或沿边折返的轮廓（掩码轮廓中常见）按原样计算面积。
pub fn polygon_area(outline: &[[f32; 2]]) -> f64 {
  let points = normalize(outline);
  if points.len() < 3 || points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
    return 0.0;
  }
  // 三角形不可能自相交
  if points.len() > 3 && is_self_intersecting(&points) {
    return 0.0;
  }

  let n = points.len();
  let twice_area: f64 = (0..n)
    .map(|i| {
      let [x0, y0] = points[i];
      let [x1, y1] = points[(i + 1) % n];
      x0 * y1 - x1 * y0
    })
    .sum();

  let area = 0.5 * twice_area.abs();
  if area.is_finite() { area } else { 0.0 }
}

// 去掉连续重复点以及与起点重合的闭合点
fn normalize(outline: &[[f32; 2]]) -> Vec<[f64; 2]> {
  let mut points: Vec<[f64; 2]> = Vec::with_capacity(outline.len());
  for p in outline {
    let p = [p[0] as f64, p[1] as f64];
    if points.last() != Some(&p) {
      points.push(p);
    }
  }
  while points.len() > 1 && points.first() == points.last() {
    points.pop();
  }
  points
}

fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
  (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

// 严格交叉：两条线段的端点分别位于对方两侧，接触与共线重叠不算
fn segments_cross(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
  let d1 = orientation(q1, q2, p1);
  let d2 = orientation(q1, q2, p2);
  let d3 = orientation(p1, p2, q1);
  let d4 = orientation(p1, p2, q2);
  d1 * d2 < 0.0 && d3 * d4 < 0.0
}

// 只检查不相邻的边。掩码轮廓一般只有几十到几百个顶点，逐对比较即可
fn is_self_intersecting(points: &[[f64; 2]]) -> bool {
  let n = points.len();
  for i in 0..n {
    let (a1, a2) = (points[i], points[(i + 1) % n]);
    for j in (i + 2)..n {
      if i == 0 && j == n - 1 {
        continue;
      }
      let (b1, b2) = (points[j], points[(j + 1) % n]);
      if segments_cross(a1, a2, b1, b2) {
        return true;
      }
    }
  }
  false
}
