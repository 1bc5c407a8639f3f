// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{FrameSink, OutputError},
  url_path,
};

/// 只保留最后一帧，在 `finish` 时写入文件
///
/// - `image:///path/to/last.png`
pub struct SaveImageFileOutput {
  path: PathBuf,
  last: Option<RgbImage>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      last: None,
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(path: &Path, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    image.save(path)?;
    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}

impl FrameSink for SaveImageFileOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    self.last = Some(image.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    match self.last.take() {
      Some(image) => Self::save_image(&self.path, &image)?,
      None => warn!("没有帧可保存: {}", self.path.display()),
    }
    Ok(())
  }

  fn discard(&mut self) {
    self.last = None;
  }

  fn location(&self) -> Option<String> {
    Some(self.path.display().to_string())
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn keeps_only_the_last_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("last.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();

    let mut output = SaveImageFileOutput::from_url(&url).unwrap();
    output.write_frame(&RgbImage::from_pixel(4, 4, Rgb([1, 0, 0]))).unwrap();
    output.write_frame(&RgbImage::from_pixel(4, 4, Rgb([2, 0, 0]))).unwrap();
    assert!(!path.exists());
    output.finish().unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.get_pixel(0, 0)[0], 2);
  }

  #[test]
  fn discard_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();

    let mut output = SaveImageFileOutput::from_url(&url).unwrap();
    output.write_frame(&RgbImage::new(4, 4)).unwrap();
    output.discard();
    assert!(!path.exists());
  }
}
