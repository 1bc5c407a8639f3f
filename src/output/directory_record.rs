// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{FrameSink, OutputError},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每帧保存为一张图片：`frame_000001.png`、`frame_000002.png`……
///
/// - `folder:///path/to/frames`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: u64,
  written: Vec<PathBuf>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let directory = url_path(uri);
    std::fs::create_dir_all(&directory)?;
    info!("帧输出目录: {}", directory.display());

    Ok(DirectoryRecordOutput {
      directory,
      frame_counter: 0,
      written: Vec::new(),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_path(&mut self) -> PathBuf {
    self.frame_counter += 1;
    self
      .directory
      .join(format!("frame_{:06}.png", self.frame_counter))
  }

  fn save(&mut self, image: &RgbImage) -> Result<(), DirectoryRecordOutputError> {
    let path = self.frame_path();
    image.save(&path)?;
    debug!("保存帧: {}", path.display());
    self.written.push(path);
    Ok(())
  }
}

impl FrameSink for DirectoryRecordOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    Ok(self.save(image)?)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    info!(
      "共保存 {} 帧到 {}",
      self.written.len(),
      self.directory.display()
    );
    self.written.clear();
    Ok(())
  }

  fn discard(&mut self) {
    for path in self.written.drain(..) {
      if let Err(e) = std::fs::remove_file(&path) {
        warn!("删除不完整的帧 {} 失败: {}", path.display(), e);
      }
    }
  }

  fn location(&self) -> Option<String> {
    Some(self.directory.display().to_string())
  }
}
