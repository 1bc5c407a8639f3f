// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/args.rs - 项目参数配置
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

use anyhow::{Result, anyhow};
use clap::Parser;
use url::Url;

use flockscale::{geometry::DEFAULT_SCALE_FACTOR, task::PipelineConfig, tracker::parse_class};

/// Flockscale 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/to/picture.png?fps=25
  /// - 图片目录: folder:///path/to/frames?fps=25
  /// - 视频: video:///path/to/input.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 跟踪结果来源，例如 tracks:///path/to/run.jsonl
  #[arg(long, value_name = "TRACKER")]
  pub tracker: Url,

  /// 输出路径
  /// 支持格式:
  /// - 最后一帧图片: image:///path/to/last.png
  /// - 逐帧图片: folder:///path/to/frames
  /// - 视频: video:///path/to/output.mp4?crf=23
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 需要统计的类别（COCO 名称或编号，逗号分隔）
  #[arg(long, value_delimiter = ',', default_value = "bird", value_name = "CLASSES")]
  pub classes: Vec<String>,

  /// 统计全部类别，忽略 --classes
  #[arg(long)]
  pub all_classes: bool,

  /// 面积到体型指标的缩放系数
  #[arg(long, default_value_t = DEFAULT_SCALE_FACTOR, value_name = "FACTOR")]
  pub scale_factor: f64,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: u64,

  /// JSON 报告输出文件，缺省时打印到标准输出
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,
}

impl Args {
  pub fn class_filter(&self) -> Result<Vec<u32>> {
    if self.all_classes {
      return Ok(Vec::new());
    }
    self
      .classes
      .iter()
      .map(|name| parse_class(name).ok_or_else(|| anyhow!("未知类别: {}", name)))
      .collect()
  }

  pub fn pipeline_config(&self) -> Result<PipelineConfig> {
    Ok(
      PipelineConfig::default()
        .with_scale_factor(self.scale_factor)
        .with_classes(self.class_filter()?)
        .with_max_frames((self.max_frames > 0).then_some(self.max_frames)),
    )
  }

  /// 报告中使用的输入文件名
  pub fn input_name(&self) -> String {
    self
      .input
      .path_segments()
      .and_then(|mut segments| segments.next_back().map(str::to_string))
      .filter(|name| !name.is_empty())
      .unwrap_or_else(|| self.input.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(extra: &[&str]) -> Args {
    let mut argv = vec![
      "flockscale",
      "--input",
      "video:///data/birds.mp4",
      "--tracker",
      "tracks:///data/birds.jsonl",
      "--output",
      "video:///data/out.mp4",
    ];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
  }

  #[test]
  fn defaults_track_birds() {
    let args = parse(&[]);
    let config = args.pipeline_config().unwrap();
    assert_eq!(config.classes(), &[14]);
    assert_eq!(config.scale_factor(), DEFAULT_SCALE_FACTOR);
    assert_eq!(config.max_frames(), None);
    assert_eq!(args.input_name(), "birds.mp4");
  }

  #[test]
  fn class_list_and_limits() {
    let args = parse(&["--classes", "bird,0", "--max-frames", "10"]);
    let config = args.pipeline_config().unwrap();
    assert_eq!(config.classes(), &[14, 0]);
    assert_eq!(config.max_frames(), Some(10));

    assert!(parse(&["--all-classes"]).class_filter().unwrap().is_empty());
    assert!(parse(&["--classes", "dragon"]).class_filter().is_err());
  }
}
