// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/input/frame_directory.rs - 图片序列目录输入
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

//! 把一个目录下按文件名排序的图片当作视频帧序列读取。
//!
//! - `folder:///path/to/frames`
//! - `folder:///path/to/frames?fps=30`

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::DEFAULT_FPS,
  input::{FrameSource, InputError},
  query_param, url_path,
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum FrameDirectoryInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("目录中没有图片: {0}")]
  Empty(PathBuf),
  #[error("{path} 尺寸为 {actual:?}，与首帧 {expected:?} 不一致")]
  SizeMismatch {
    path: PathBuf,
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

pub struct FrameDirectoryInput {
  pending: VecDeque<PathBuf>,
  first: Option<RgbImage>,
  width: u32,
  height: u32,
  fps: f64,
}

impl FromUrlWithScheme for FrameDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for FrameDirectoryInput {
  type Error = FrameDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FrameDirectoryInputError::SchemeMismatch(
        url.scheme().to_string(),
      ));
    }

    let directory = url_path(url);
    let mut pending: VecDeque<PathBuf> = list_images(&directory)?.into();
    let first_path = pending
      .pop_front()
      .ok_or_else(|| FrameDirectoryInputError::Empty(directory.clone()))?;
    let first = load(&first_path)?;
    let (width, height) = first.dimensions();

    info!(
      "帧目录 {}: {} 张图片, {}x{}",
      directory.display(),
      pending.len() + 1,
      width,
      height
    );

    Ok(FrameDirectoryInput {
      pending,
      first: Some(first),
      width,
      height,
      fps: query_param(url, "fps").unwrap_or(DEFAULT_FPS),
    })
  }
}

fn list_images(directory: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(directory)? {
    let path = entry?.path();
    let is_image = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
      .unwrap_or(false);
    if path.is_file() && is_image {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

fn load(path: &Path) -> Result<RgbImage, FrameDirectoryInputError> {
  debug!("读取帧图片: {}", path.display());
  Ok(ImageReader::open(path)?.decode()?.to_rgb8())
}

impl FrameDirectoryInput {
  fn next_image(&mut self) -> Option<Result<RgbImage, FrameDirectoryInputError>> {
    if let Some(first) = self.first.take() {
      return Some(Ok(first));
    }

    let path = self.pending.pop_front()?;
    Some(load(&path).and_then(|image| {
      if image.dimensions() != (self.width, self.height) {
        Err(FrameDirectoryInputError::SizeMismatch {
          path,
          expected: (self.width, self.height),
          actual: image.dimensions(),
        })
      } else {
        Ok(image)
      }
    }))
  }
}

impl Iterator for FrameDirectoryInput {
  type Item = Result<RgbImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.next_image().map(|r| r.map_err(InputError::from))
  }
}

impl FrameSource for FrameDirectoryInput {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps)
  }

  fn close(&mut self) {
    self.first = None;
    self.pending.clear();
  }
}
