// 该文件是 Flockscale （群羽称重） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use flockscale::{
  FromUrl,
  input::InputWrapper,
  output::OutputWrapper,
  report::{ErrorDetail, ErrorReport, RunReport},
  task::{CancelToken, ErrorKind, TrackingTask},
  tracker::TrackerWrapper,
};

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(report)?;
  match path {
    Some(path) => {
      std::fs::write(path, json)?;
      info!("报告已写入: {}", path.display());
    }
    None => println!("{}", json),
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("跟踪结果: {}", args.tracker);
  info!("输出路径: {}", args.output);

  let config = args.pipeline_config()?;
  info!(
    "类别: {:?}, 缩放系数: {}, 最大帧数: {:?}",
    config.classes(),
    config.scale_factor(),
    config.max_frames()
  );

  let tracker = match TrackerWrapper::from_url(&args.tracker) {
    Ok(tracker) => tracker,
    Err(e) => {
      error!("无法打开跟踪结果: {}", e);
      let report = ErrorReport {
        error: ErrorDetail {
          kind: ErrorKind::DetectorFailure,
          message: e.to_string(),
          frame: None,
        },
      };
      write_report(args.report.as_deref(), &report)?;
      std::process::exit(1);
    }
  };

  let cancel = CancelToken::new();
  cancel.install_ctrlc_handler()?;

  let mut task = TrackingTask::new(config).with_cancel_token(cancel);
  let result = task.run(
    || InputWrapper::from_url(&args.input),
    tracker,
    |info| OutputWrapper::open(&args.output, info),
  );

  match result {
    Ok(outcome) => {
      let report = RunReport::new(args.input_name(), &outcome, task.scale_factor());
      info!(
        "统计完成: {} 个时间点, {} 个目标, 最多同时 {} 个",
        report.total_frames_processed,
        report.weight_estimates.len(),
        report.max_concurrent
      );
      write_report(args.report.as_deref(), &report)
    }
    Err(err) => {
      write_report(args.report.as_deref(), &ErrorReport::from(&err))?;
      std::process::exit(1);
    }
  }
}
