// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::{detector::DetectionError, input::VideoError};

/// 出错的处理阶段，用于在用户可见的错误中指明故障位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Load,
  Detect,
  Extract,
  Write,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Load => "load",
      Stage::Detect => "detect",
      Stage::Extract => "extract",
      Stage::Write => "write",
    };
    f.write_str(name)
  }
}

/// I/O 失败的具体原因
#[derive(Error, Debug)]
pub enum IoCause {
  #[error("{0}")]
  Io(#[from] std::io::Error),
  #[error("{0}")]
  Image(#[from] image::ImageError),
  #[error("{0}")]
  Video(#[from] VideoError),
}

/// 对调用方可见的流水线错误
///
/// 文字识别失败不会出现在这里：它在提取器内部被吸收为空字符串。
#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("[load] 模型加载失败: {0}")]
  ModelLoad(String),
  #[error("[load] 不支持的文件类型: {extension:?}")]
  UnsupportedFormat { extension: String },
  #[error("[detect] 第 {frame_index} 帧检测失败: {source}")]
  Detection {
    frame_index: u64,
    #[source]
    source: DetectionError,
  },
  #[error("[{stage}] I/O 错误 ({}): {source}", path.display())]
  Io {
    stage: Stage,
    path: PathBuf,
    #[source]
    source: IoCause,
  },
  #[error("任务在第 {frame_index} 帧处被取消")]
  Cancelled { frame_index: u64 },
}

impl PipelineError {
  pub fn io(stage: Stage, path: impl Into<PathBuf>, source: impl Into<IoCause>) -> Self {
    PipelineError::Io {
      stage,
      path: path.into(),
      source: source.into(),
    }
  }

  /// 出错的阶段，取消不属于任何阶段
  pub fn stage(&self) -> Option<Stage> {
    match self {
      PipelineError::ModelLoad(_) | PipelineError::UnsupportedFormat { .. } => Some(Stage::Load),
      PipelineError::Detection { .. } => Some(Stage::Detect),
      PipelineError::Io { stage, .. } => Some(*stage),
      PipelineError::Cancelled { .. } => None,
    }
  }
}
