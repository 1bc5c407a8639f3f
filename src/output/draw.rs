// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/output/draw.rs - 跟踪结果可视化
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

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::tracker::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const COUNT_FONT_SIZE: f32 = 32.0;
const COUNT_POSITION: (i32, i32) = (16, 16);
const BOX_THICKNESS: i32 = 2;

const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const OUTLINE_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const COUNT_COLOR: [u8; 3] = [255, 0, 0];

// 轮廓线加粗时的偏移
const OUTLINE_OFFSETS: [(f32, f32); 3] = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];

/// 一个待绘制的检测结果，以及该检测估算出的重量指数（若有）
#[derive(Debug, Clone, Copy)]
pub struct Annotation<'d> {
  pub detection: &'d Detection,
  pub weight_index: Option<f64>,
}

impl<'d> Annotation<'d> {
  pub fn new(detection: &'d Detection, weight_index: Option<f64>) -> Self {
    Self {
      detection,
      weight_index,
    }
  }

  pub fn label(&self) -> String {
    let id = match self.detection.track_id {
      Some(id) => id.to_string(),
      None => "-".to_string(),
    };
    match self.weight_index {
      Some(weight) => format!("ID:{} W:{:.2}", id, weight),
      None => format!("ID:{}", id),
    }
  }
}

pub struct Draw<'a> {
  font: FontRef<'a>,
  label_scale: PxScale,
  count_scale: PxScale,
  box_color: Rgb<u8>,
  outline_color: Rgb<u8>,
  label_text_color: Rgb<u8>,
  count_color: Rgb<u8>,
}

impl<'a> Default for Draw<'a> {
  fn default() -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontRef::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Self {
      font,
      label_scale: PxScale::from(LABEL_FONT_SIZE),
      count_scale: PxScale::from(COUNT_FONT_SIZE),
      box_color: Rgb(BOX_COLOR),
      outline_color: Rgb(OUTLINE_COLOR),
      label_text_color: Rgb(LABEL_TEXT_COLOR),
      count_color: Rgb(COUNT_COLOR),
    }
  }
}

/// 将像素坐标边框裁剪到图像范围内，返回闭区间 (x_min, y_min, x_max, y_max)
fn clamp_bbox(bbox: &[f32; 4], width: u32, height: u32) -> Option<(i32, i32, i32, i32)> {
  if bbox.iter().any(|v| !v.is_finite()) {
    return None;
  }

  let max_x = width as i32 - 1;
  let max_y = height as i32 - 1;
  let x_min = (bbox[0].floor() as i32).clamp(0, max_x);
  let y_min = (bbox[1].floor() as i32).clamp(0, max_y);
  let x_max = (bbox[2].ceil() as i32).clamp(0, max_x);
  let y_max = (bbox[3].ceil() as i32).clamp(0, max_y);

  if x_min >= x_max || y_min >= y_max {
    return None;
  }
  Some((x_min, y_min, x_max, y_max))
}

impl<'a> Draw<'a> {
  /// 在图像上绘制全部检测结果，并在左上角叠加当前帧的目标数
  pub fn annotate(&self, image: &mut RgbImage, annotations: &[Annotation<'_>], count: usize) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }

    for annotation in annotations {
      let bbox = clamp_bbox(&annotation.detection.bbox, image.width(), image.height());
      if let Some(bbox) = bbox {
        self.draw_box(image, bbox);
      }
      if let Some(outline) = annotation.detection.outline.as_deref() {
        self.draw_outline(image, outline);
      }
      if let Some((x_min, y_min, _, _)) = bbox {
        self.draw_label(image, x_min, y_min, &annotation.label());
      }
    }

    self.draw_count(image, count);
  }

  fn draw_box(&self, image: &mut RgbImage, (x_min, y_min, x_max, y_max): (i32, i32, i32, i32)) {
    // 向内加粗
    for thickness in 0..BOX_THICKNESS {
      let left = x_min + thickness;
      let top = y_min + thickness;
      let right = x_max - thickness;
      let bottom = y_max - thickness;
      if left > right || top > bottom {
        break;
      }
      for x in left..=right {
        image.put_pixel(x as u32, top as u32, self.box_color);
        image.put_pixel(x as u32, bottom as u32, self.box_color);
      }
      for y in top..=bottom {
        image.put_pixel(left as u32, y as u32, self.box_color);
        image.put_pixel(right as u32, y as u32, self.box_color);
      }
    }
  }

  fn draw_outline(&self, image: &mut RgbImage, outline: &[[f32; 2]]) {
    if outline.len() < 2 || outline.iter().flatten().any(|v| !v.is_finite()) {
      return;
    }

    let max_x = (image.width() - 1) as f32;
    let max_y = (image.height() - 1) as f32;
    let points: Vec<(f32, f32)> = outline
      .iter()
      .map(|p| (p[0].clamp(0.0, max_x), p[1].clamp(0.0, max_y)))
      .collect();

    let closing = std::iter::once((points[points.len() - 1], points[0]));
    let edges = points.windows(2).map(|w| (w[0], w[1])).chain(closing);
    for (start, end) in edges {
      for (dx, dy) in OUTLINE_OFFSETS {
        draw_line_segment_mut(
          image,
          (start.0 + dx, start.1 + dy),
          (end.0 + dx, end.1 + dy),
          self.outline_color,
        );
      }
    }
  }

  fn draw_label(&self, image: &mut RgbImage, x_min: i32, y_min: i32, label: &str) {
    let (text_width, text_height) = text_size(self.label_scale, &self.font, label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不够时放进边框内
    let label_x = x_min;
    let label_y = if y_min >= label_height {
      y_min - label_height
    } else {
      y_min
    };

    let max_width = (image.width() as i32 - label_x).max(0);
    let max_height = (image.height() as i32 - label_y).max(0);
    let label_width = (text_width as i32).min(max_width);
    let label_height = label_height.min(max_height);

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
      draw_filled_rect_mut(image, rect, self.box_color);
      draw_text_mut(
        image,
        self.label_text_color,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.label_scale,
        &self.font,
        label,
      );
    }
  }

  fn draw_count(&self, image: &mut RgbImage, count: usize) {
    let text = format!("Count: {}", count);
    draw_text_mut(
      image,
      self.count_color,
      COUNT_POSITION.0,
      COUNT_POSITION.1,
      self.count_scale,
      &self.font,
      &text,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn is_red(pixel: &Rgb<u8>) -> bool {
    pixel[0] > 128 && pixel[1] == 0 && pixel[2] == 0
  }

  #[test]
  fn labels_follow_track_and_weight() {
    let tracked = Detection::new([0.0, 0.0, 1.0, 1.0]).with_track_id(5);
    let untracked = Detection::new([0.0, 0.0, 1.0, 1.0]);
    assert_eq!(Annotation::new(&tracked, Some(4.0)).label(), "ID:5 W:4.00");
    assert_eq!(Annotation::new(&tracked, None).label(), "ID:5");
    assert_eq!(Annotation::new(&untracked, None).label(), "ID:-");
  }

  #[test]
  fn draws_box_outline_and_count() {
    let draw = Draw::default();
    let mut image = RgbImage::new(200, 200);
    let detection = Detection::new([100.0, 100.0, 150.0, 150.0])
      .with_track_id(1)
      .with_outline(vec![[110.0, 110.0], [140.0, 110.0], [140.0, 140.0], [110.0, 140.0]]);

    draw.annotate(&mut image, &[Annotation::new(&detection, Some(9.0))], 1);

    assert_eq!(*image.get_pixel(125, 150), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(150, 125), Rgb(BOX_COLOR));
    assert_eq!(*image.get_pixel(125, 110), Rgb(OUTLINE_COLOR));
    assert_eq!(*image.get_pixel(125, 125), Rgb([0, 0, 0]));

    let count_pixels = (16..60)
      .flat_map(|y| (16..150).map(move |x| (x, y)))
      .filter(|&(x, y)| is_red(image.get_pixel(x, y)))
      .count();
    assert!(count_pixels > 0);
  }

  #[test]
  fn survives_degenerate_geometry() {
    let draw = Draw::default();
    let mut image = RgbImage::new(50, 40);
    let out_of_frame = Detection::new([-500.0, -500.0, 900.0, 900.0]).with_track_id(1);
    let inverted = Detection::new([30.0, 30.0, 10.0, 10.0]).with_track_id(2);
    let nan = Detection::new([f32::NAN, 0.0, 10.0, 10.0])
      .with_outline(vec![[f32::NAN, 1.0], [2.0, 2.0], [3.0, 1.0]]);
    let single_point = Detection::new([1.0, 1.0, 2.0, 2.0]).with_outline(vec![[1.0, 1.0]]);
    let far_outline = Detection::new([0.0, 0.0, 5.0, 5.0])
      .with_outline(vec![[-1e6, -1e6], [1e6, -1e6], [1e6, 1e6]]);

    let annotations: Vec<_> = [&out_of_frame, &inverted, &nan, &single_point, &far_outline]
      .into_iter()
      .map(|d| Annotation::new(d, None))
      .collect();
    draw.annotate(&mut image, &annotations, 2);

    // 超出画面的边框被裁剪到图像边缘
    assert_eq!(*image.get_pixel(0, 39), Rgb(BOX_COLOR));

    let mut empty = RgbImage::new(0, 0);
    draw.annotate(&mut empty, &annotations, 0);
  }
}
