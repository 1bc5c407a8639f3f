// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/output/save_video_file.rs - 保存视频文件
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

//! 视频文件输出模块
//!
//! 标注后的帧以 RGB24 原始数据写入 `ffmpeg` 子进程的标准输入，
//! 由 ffmpeg 编码为 H.264 MP4，帧率与输入源一致。
//!
//! # URL 格式
//!
//! - `video:///path/to/output.mp4` - 默认质量 crf=23
//! - `video:///path/to/output.mp4?crf=18` - 指定质量参数（0-51，越小质量越好）
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 命令行工具来编码视频。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{DEFAULT_FPS, StreamInfo},
  output::{FrameSink, OutputError},
  query_param, url_path,
};

#[derive(Error, Debug)]
pub enum SaveVideoFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("视频编码错误: {0}")]
  EncodingError(String),
  #[error("参数验证错误: {0}")]
  ValidationError(String),
  #[error("帧尺寸 {actual:?} 与输出尺寸 {expected:?} 不一致")]
  DimensionMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

const DEFAULT_CRF: u8 = 23;
const MAX_CRF: u8 = 51;

struct Encoder {
  child: Child,
  stdin: Option<ChildStdin>,
  width: u32,
  height: u32,
}

impl Encoder {
  fn spawn(path: &Path, info: &StreamInfo, crf: u8) -> Result<Self, SaveVideoFileError> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)?;
      }
    }

    let fps = info.effective_fps();
    info!(
      "开始编码视频: {}x{} @ {} fps -> {}",
      info.width,
      info.height,
      fps,
      path.display()
    );

    let mut child = Command::new("ffmpeg")
      .arg("-y") // 覆盖已存在的文件
      .arg("-loglevel")
      .arg("error") // 减少日志输出
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("-s")
      .arg(format!("{}x{}", info.width, info.height))
      .arg("-framerate")
      .arg(fps.to_string())
      .arg("-i")
      .arg("-")
      .arg("-vf")
      .arg("scale=trunc(iw/2)*2:trunc(ih/2)*2") // yuv420p 要求偶数宽高
      .arg("-c:v")
      .arg("libx264") // 使用 H.264 编码
      .arg("-pix_fmt")
      .arg("yuv420p") // 兼容性格式
      .arg("-preset")
      .arg("fast") // 编码速度预设
      .arg("-crf")
      .arg(crf.to_string())
      .arg(path)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|e| {
        error!("无法执行 ffmpeg: {}", e);
        SaveVideoFileError::EncodingError(format!("无法执行 ffmpeg (请确保已安装): {}", e))
      })?;

    let stdin = child.stdin.take();
    Ok(Encoder {
      child,
      stdin,
      width: info.width,
      height: info.height,
    })
  }

  fn write(&mut self, image: &RgbImage) -> Result<(), SaveVideoFileError> {
    if image.dimensions() != (self.width, self.height) {
      return Err(SaveVideoFileError::DimensionMismatch {
        expected: (self.width, self.height),
        actual: image.dimensions(),
      });
    }

    let stdin = self
      .stdin
      .as_mut()
      .ok_or_else(|| SaveVideoFileError::EncodingError("编码器输入已关闭".to_string()))?;
    stdin.write_all(image.as_raw()).map_err(|e| {
      SaveVideoFileError::EncodingError(format!("写入 ffmpeg 失败: {}", e))
    })
  }

  fn finish(mut self) -> Result<(), SaveVideoFileError> {
    // 关闭标准输入，ffmpeg 随后完成编码并退出
    drop(self.stdin.take());
    let status = self.child.wait()?;
    if status.success() {
      Ok(())
    } else {
      error!("ffmpeg 退出状态: {}", status);
      Err(SaveVideoFileError::EncodingError(format!(
        "ffmpeg 失败: {}",
        status
      )))
    }
  }

  fn kill(mut self) {
    drop(self.stdin.take());
    if let Err(e) = self.child.kill() {
      debug!("结束 ffmpeg 编码进程: {}", e);
    }
    let _ = self.child.wait();
  }
}

pub struct SaveVideoFileOutput {
  path: PathBuf,
  crf: u8,
  fps: f64,
  encoder: Option<Encoder>,
  frames_written: u64,
}

impl FromUrlWithScheme for SaveVideoFileOutput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for SaveVideoFileOutput {
  type Error = SaveVideoFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveVideoFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let crf = query_param::<u8>(uri, "crf").unwrap_or(DEFAULT_CRF);
    if crf > MAX_CRF {
      return Err(SaveVideoFileError::ValidationError(format!(
        "crf {} 超出有效范围 [0, {}]",
        crf, MAX_CRF
      )));
    }

    Ok(SaveVideoFileOutput {
      path: url_path(uri),
      crf,
      fps: DEFAULT_FPS,
      encoder: None,
      frames_written: 0,
    })
  }
}

impl SaveVideoFileOutput {
  /// 按输入流的尺寸和帧率启动编码器
  pub fn with_stream(mut self, info: &StreamInfo) -> Result<Self, SaveVideoFileError> {
    self.fps = info.effective_fps();
    self.encoder = Some(Encoder::spawn(&self.path, info, self.crf)?);
    Ok(self)
  }

  fn ensure_encoder(&mut self, image: &RgbImage) -> Result<&mut Encoder, SaveVideoFileError> {
    if self.encoder.is_none() {
      let info = StreamInfo::new(image.width(), image.height(), self.fps);
      self.encoder = Some(Encoder::spawn(&self.path, &info, self.crf)?);
    }
    self
      .encoder
      .as_mut()
      .ok_or_else(|| SaveVideoFileError::EncodingError("编码器未启动".to_string()))
  }

  fn remove_artifact(&self) {
    if self.path.exists() {
      if let Err(e) = std::fs::remove_file(&self.path) {
        warn!("删除不完整的视频 {} 失败: {}", self.path.display(), e);
      }
    }
  }

  fn finish_encoding(&mut self) -> Result<(), SaveVideoFileError> {
    let Some(encoder) = self.encoder.take() else {
      return Ok(());
    };

    if self.frames_written == 0 {
      info!("没有帧可以编码为视频，跳过编码过程");
      encoder.kill();
      self.remove_artifact();
      return Ok(());
    }

    encoder.finish()?;
    info!(
      "视频已保存到文件: {} ({} 帧)",
      self.path.display(),
      self.frames_written
    );
    Ok(())
  }
}

impl FrameSink for SaveVideoFileOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    self.ensure_encoder(image)?.write(image)?;
    self.frames_written += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    Ok(self.finish_encoding()?)
  }

  fn discard(&mut self) {
    if let Some(encoder) = self.encoder.take() {
      encoder.kill();
    }
    self.remove_artifact();
  }

  fn location(&self) -> Option<String> {
    Some(self.path.display().to_string())
  }
}

impl Drop for SaveVideoFileOutput {
  fn drop(&mut self) {
    // 在对象销毁时完成视频编码
    if let Err(e) = self.finish_encoding() {
      error!("编码视频时出错: {}", e);
    }
  }
}
