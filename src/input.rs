// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;

use crate::{
  FromUrl,
  frame::{DEFAULT_FPS, StreamInfo},
};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_image_file")]
mod frame_directory;
#[cfg(feature = "read_image_file")]
pub use self::frame_directory::{FrameDirectoryInput, FrameDirectoryInputError};

#[cfg(feature = "video_file")]
mod video_file;
#[cfg(feature = "video_file")]
pub use self::video_file::{VideoFileInput, VideoFileInputError};

/// 输入源。按顺序产出帧，迭代结束即为流结束。
pub trait FrameSource: Iterator<Item = Result<RgbImage, InputError>> {
  /// 获取帧宽度
  fn width(&self) -> u32;

  /// 获取帧高度
  fn height(&self) -> u32;

  /// 获取帧率（如果适用）
  fn fps(&self) -> Option<f64>;

  /// 释放底层资源，可重复调用
  fn close(&mut self) {}

  fn info(&self) -> StreamInfo {
    StreamInfo::new(self.width(), self.height(), self.fps().unwrap_or(DEFAULT_FPS))
  }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn width(&self) -> u32 {
    (**self).width()
  }

  fn height(&self) -> u32 {
    (**self).height()
  }

  fn fps(&self) -> Option<f64> {
    (**self).fps()
  }

  fn close(&mut self) {
    (**self).close()
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("帧目录输入错误: {0}")]
  FrameDirectoryInputError(#[from] FrameDirectoryInputError),
  #[cfg(feature = "video_file")]
  #[error("视频文件输入错误: {0}")]
  VideoFileInputError(#[from] VideoFileInputError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  FrameDirectory(FrameDirectoryInput),
  #[cfg(feature = "video_file")]
  VideoFile(VideoFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
      if url.scheme() == FrameDirectoryInput::SCHEME {
        let input = FrameDirectoryInput::from_url(url)?;
        return Ok(InputWrapper::FrameDirectory(input));
      }
    }
    #[cfg(feature = "video_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == VideoFileInput::SCHEME {
        let input = VideoFileInput::from_url(url)?;
        return Ok(InputWrapper::VideoFile(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = Result<RgbImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::FrameDirectory(input) => input.next(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn width(&self) -> u32 {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.width(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::FrameDirectory(input) => input.width(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.width(),
    }
  }

  fn height(&self) -> u32 {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.height(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::FrameDirectory(input) => input.height(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.height(),
    }
  }

  fn fps(&self) -> Option<f64> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.fps(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::FrameDirectory(input) => input.fps(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.fps(),
    }
  }

  fn close(&mut self) {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.close(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::FrameDirectory(input) => input.close(),
      #[cfg(feature = "video_file")]
      InputWrapper::VideoFile(input) => input.close(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
  }
}
