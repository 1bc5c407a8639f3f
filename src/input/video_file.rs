// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/input/video_file.rs - 视频文件输入
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

//! 视频文件输入模块
//!
//! 通过 `ffprobe` 读取视频尺寸与帧率，再由 `ffmpeg` 子进程解码为 RGB24 原始帧，
//! 从管道中逐帧读取。
//!
//! # URL 格式
//!
//! - `video:///path/to/input.mp4`
//!
//! # 依赖
//!
//! 此模块需要系统安装 ffmpeg 与 ffprobe 命令行工具。

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
  url_path,
};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum VideoFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("视频文件不存在: {0}")]
  NotFound(PathBuf),
  #[error("ffprobe 失败: {0}")]
  ProbeError(String),
  #[error("ffprobe 输出解析失败: {0}")]
  ProbeParseError(#[from] serde_json::Error),
  #[error("ffmpeg 解码失败: {0}")]
  DecodeError(String),
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
  #[serde(default)]
  streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
  width: Option<u32>,
  height: Option<u32>,
  avg_frame_rate: Option<String>,
  r_frame_rate: Option<String>,
}

/// 解析 ffprobe 的 "30000/1001" 形式帧率
fn parse_rate(rate: &str) -> Option<f64> {
  let (num, den) = match rate.split_once('/') {
    Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
    None => (rate.trim().parse::<f64>().ok()?, 1.0),
  };
  let fps = num / den;
  (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn probe(path: &Path) -> Result<(u32, u32, Option<f64>), VideoFileInputError> {
  let output = Command::new("ffprobe")
    .arg("-v")
    .arg("error")
    .arg("-select_streams")
    .arg("v:0")
    .arg("-show_entries")
    .arg("stream=width,height,avg_frame_rate,r_frame_rate")
    .arg("-of")
    .arg("json")
    .arg(path)
    .output()
    .map_err(|e| VideoFileInputError::ProbeError(format!("无法执行 ffprobe (请确保已安装): {}", e)))?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(VideoFileInputError::ProbeError(stderr.trim().to_string()));
  }

  let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
  let stream = probe
    .streams
    .into_iter()
    .next()
    .ok_or_else(|| VideoFileInputError::ProbeError("找不到视频流".to_string()))?;

  let (width, height) = match (stream.width, stream.height) {
    (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
    _ => {
      return Err(VideoFileInputError::ProbeError(
        "视频流缺少有效的宽高".to_string(),
      ));
    }
  };

  let fps = stream
    .avg_frame_rate
    .as_deref()
    .and_then(parse_rate)
    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

  Ok((width, height, fps))
}

/// 视频输入源
pub struct VideoFileInput {
  path: PathBuf,
  child: Option<Child>,
  stdout: Option<ChildStdout>,
  width: u32,
  height: u32,
  fps: Option<f64>,
  frames_read: u64,
}

impl FromUrlWithScheme for VideoFileInput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for VideoFileInput {
  type Error = VideoFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(VideoFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_path(url);
    if !path.is_file() {
      return Err(VideoFileInputError::NotFound(path));
    }

    let (width, height, fps) = probe(&path)?;
    info!(
      "打开视频 {}: {}x{} @ {:?} fps",
      path.display(),
      width,
      height,
      fps
    );

    let mut child = Command::new("ffmpeg")
      .arg("-v")
      .arg("error")
      .arg("-nostdin")
      .arg("-i")
      .arg(&path)
      .arg("-map")
      .arg("0:v:0")
      .arg("-fps_mode")
      .arg("passthrough") // 不丢帧也不补帧
      .arg("-f")
      .arg("rawvideo")
      .arg("-pix_fmt")
      .arg("rgb24")
      .arg("-")
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .spawn()
      .map_err(|e| VideoFileInputError::DecodeError(format!("无法执行 ffmpeg (请确保已安装): {}", e)))?;

    let stdout = child.stdout.take();

    Ok(VideoFileInput {
      path,
      child: Some(child),
      stdout,
      width,
      height,
      fps,
      frames_read: 0,
    })
  }
}

impl VideoFileInput {
  fn frame_size(&self) -> usize {
    self.width as usize * self.height as usize * RGB_CHANNELS
  }

  /// 读取一帧原始数据，流结束返回 None
  fn read_frame(&mut self) -> Result<Option<Vec<u8>>, VideoFileInputError> {
    let size = self.frame_size();
    let Some(stdout) = self.stdout.as_mut() else {
      return Ok(None);
    };

    let mut buffer = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
      match stdout.read(&mut buffer[filled..]) {
        Ok(0) => break,
        Ok(n) => filled += n,
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e.into()),
      }
    }

    if filled == size {
      return Ok(Some(buffer));
    }
    if filled > 0 {
      warn!(
        "视频 {} 末尾存在不完整的帧 ({} / {} 字节)，已忽略",
        self.path.display(),
        filled,
        size
      );
    }

    self.stdout = None;
    self.wait_decoder()?;
    Ok(None)
  }

  fn wait_decoder(&mut self) -> Result<(), VideoFileInputError> {
    if let Some(mut child) = self.child.take() {
      let status = child.wait()?;
      if !status.success() {
        error!("ffmpeg 解码进程退出: {}", status);
        return Err(VideoFileInputError::DecodeError(format!(
          "ffmpeg 退出状态 {}",
          status
        )));
      }
      debug!("解码完成，共 {} 帧", self.frames_read);
    }
    Ok(())
  }
}

impl Iterator for VideoFileInput {
  type Item = Result<RgbImage, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.read_frame() {
      Ok(Some(data)) => {
        self.frames_read += 1;
        match RgbImage::from_raw(self.width, self.height, data) {
          Some(image) => Some(Ok(image)),
          None => Some(Err(InputError::from(VideoFileInputError::DecodeError(
            "无法创建 RGB 图像".to_string(),
          )))),
        }
      }
      Ok(None) => None,
      Err(e) => Some(Err(e.into())),
    }
  }
}

impl FrameSource for VideoFileInput {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    self.fps
  }

  fn close(&mut self) {
    self.stdout = None;
    if let Some(mut child) = self.child.take() {
      if let Err(e) = child.kill() {
        debug!("结束 ffmpeg 解码进程: {}", e);
      }
      let _ = child.wait();
    }
  }
}

impl Drop for VideoFileInput {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_frame_rates() {
    assert_eq!(parse_rate("30/1"), Some(30.0));
    assert_eq!(parse_rate("25"), Some(25.0));
    let ntsc = parse_rate("30000/1001").unwrap();
    assert!((ntsc - 29.97).abs() < 0.01);
    assert_eq!(parse_rate("0/0"), None);
    assert_eq!(parse_rate("abc"), None);
  }

  #[test]
  fn parses_probe_json() {
    let json = r#"{"streams": [{"width": 1280, "height": 720, "avg_frame_rate": "25/1", "r_frame_rate": "25/1"}]}"#;
    let probe: ProbeOutput = serde_json::from_str(json).unwrap();
    assert_eq!(probe.streams[0].width, Some(1280));
    assert_eq!(probe.streams[0].avg_frame_rate.as_deref(), Some("25/1"));
  }

  #[test]
  fn missing_file_is_not_found() {
    let url = Url::parse("video:///no/such/clip.mp4").unwrap();
    assert!(matches!(
      VideoFileInput::from_url(&url),
      Err(VideoFileInputError::NotFound(_))
    ));
  }
}
