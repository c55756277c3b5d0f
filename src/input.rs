// 该文件是 Paizhao （牌照识读） 项目的一部分。
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

use std::{fmt, path::Path};

use thiserror::Error;

use crate::frame::Frame;

mod read_image_file;
mod video_file;

pub use self::read_image_file::read_image_file;
pub use self::video_file::{VideoFileInput, probe_video};

#[derive(Error, Debug)]
pub enum VideoError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("无法执行 {tool} (请确保已安装): {source}")]
  ToolMissing {
    tool: &'static str,
    #[source]
    source: std::io::Error,
  },
  #[error("{tool} 失败: {stderr}")]
  ToolFailed { tool: &'static str, stderr: String },
  #[error("视频元数据无效: {0}")]
  InvalidMetadata(String),
  #[error("第 {index} 帧数据不完整: 期望 {expected} 字节, 实际 {actual} 字节")]
  TruncatedFrame {
    index: u64,
    expected: usize,
    actual: usize,
  },
  #[error("帧尺寸不一致: 期望 {expected:?}, 实际 {actual:?}")]
  DimensionMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("视频编码器已关闭")]
  EncoderClosed,
}

/// 有理数帧率，保留容器中的原始分子分母（例如 30000/1001）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
  pub num: u32,
  pub den: u32,
}

impl FrameRate {
  pub fn new(num: u32, den: u32) -> Result<Self, VideoError> {
    if num == 0 || den == 0 {
      return Err(VideoError::InvalidMetadata(format!("帧率 {}/{} 必须大于 0", num, den)));
    }
    Ok(Self { num, den })
  }

  pub fn as_f64(&self) -> f64 {
    self.num as f64 / self.den as f64
  }
}

impl std::str::FromStr for FrameRate {
  type Err = VideoError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || VideoError::InvalidMetadata(format!("无法解析帧率: {:?}", s));
    match s.split_once('/') {
      Some((num, den)) => FrameRate::new(
        num.trim().parse().map_err(|_| invalid())?,
        den.trim().parse().map_err(|_| invalid())?,
      ),
      None => FrameRate::new(s.trim().parse().map_err(|_| invalid())?, 1),
    }
  }
}

impl fmt::Display for FrameRate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.num, self.den)
  }
}

/// 视频流的基本参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
  pub width: u32,
  pub height: u32,
  pub frame_rate: FrameRate,
  /// 容器声明的帧数，未知时为 `None`
  pub frame_count: Option<u64>,
}

/// 按解码顺序产出帧的视频源
pub trait FrameSource: Iterator<Item = Result<Frame, VideoError>> {
  fn info(&self) -> VideoInfo;

  /// 输入位置，用于错误报告
  fn path(&self) -> &Path;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frame_rate_parses_rational_and_integer_forms() {
    let ntsc: FrameRate = "30000/1001".parse().expect("rate");
    assert_eq!(ntsc, FrameRate { num: 30000, den: 1001 });
    assert!((ntsc.as_f64() - 29.97).abs() < 0.01);
    assert_eq!(ntsc.to_string(), "30000/1001");

    let pal: FrameRate = "25".parse().expect("rate");
    assert_eq!(pal, FrameRate { num: 25, den: 1 });
  }

  #[test]
  fn zero_frame_rate_is_rejected() {
    assert!("0/0".parse::<FrameRate>().is_err());
    assert!("abc".parse::<FrameRate>().is_err());
  }
}
