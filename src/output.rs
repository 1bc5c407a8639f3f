// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::{FromUrl, frame::StreamInfo};

pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(feature = "video_file")]
mod save_video_file;
#[cfg(feature = "video_file")]
pub use self::save_video_file::{SaveVideoFileError, SaveVideoFileOutput};

/// 帧输出。帧按顺序写入，成功时调用 `finish`，失败时调用 `discard`。
pub trait FrameSink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError>;

  /// 正常结束，刷新并关闭输出
  fn finish(&mut self) -> Result<(), OutputError>;

  /// 运行失败后关闭输出并删除不完整的产物
  fn discard(&mut self) {}

  /// 产物位置，用于报告
  fn location(&self) -> Option<String> {
    None
  }
}

impl<O: FrameSink + ?Sized> FrameSink for Box<O> {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    (**self).write_frame(image)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    (**self).finish()
  }

  fn discard(&mut self) {
    (**self).discard()
  }

  fn location(&self) -> Option<String> {
    (**self).location()
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[cfg(feature = "video_file")]
  #[error("保存视频文件错误: {0}")]
  SaveVideoFileError(#[from] SaveVideoFileError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
  #[cfg(feature = "video_file")]
  SaveVideoFileOutput(SaveVideoFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(any(
      feature = "save_image_file",
      feature = "directory_record",
      feature = "video_file"
    ))]
    use crate::FromUrlWithScheme;

    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      #[cfg(feature = "video_file")]
      SaveVideoFileOutput::SCHEME => {
        let output = SaveVideoFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveVideoFileOutput(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 按输入流的尺寸与帧率打开输出
  pub fn open(url: &Url, info: &StreamInfo) -> Result<Self, OutputError> {
    let output = Self::from_url(url)?;
    Ok(match output {
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => {
        OutputWrapper::SaveVideoFileOutput(output.with_stream(info)?)
      }
      #[allow(unreachable_patterns)]
      other => {
        let _ = info;
        other
      }
    })
  }
}

impl FrameSink for OutputWrapper {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.write_frame(image),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.write_frame(image),
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => output.write_frame(image),
    }
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.finish(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.finish(),
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => output.finish(),
    }
  }

  fn discard(&mut self) {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.discard(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.discard(),
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => output.discard(),
    }
  }

  fn location(&self) -> Option<String> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.location(),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.location(),
      #[cfg(feature = "video_file")]
      OutputWrapper::SaveVideoFileOutput(output) => output.location(),
    }
  }
}
