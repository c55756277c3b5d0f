// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/frame.rs - 帧与单帧处理结果
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

use crate::detector::Detection;

/// 解码得到的一帧
#[derive(Debug, Clone)]
pub struct Frame {
  /// 帧索引，按解码顺序从 0 开始
  pub index: u64,
  /// RGB 图像数据，原点在左上角
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: u64, image: RgbImage) -> Self {
    Self { index, image }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 单帧流水线的产物
///
/// `texts` 与 `detections` 按位置一一对应。
#[derive(Debug, Clone)]
pub struct FrameOutcome {
  pub index: u64,
  pub annotated: RgbImage,
  pub detections: Vec<Detection>,
  pub texts: Vec<String>,
}

impl FrameOutcome {
  pub fn detection_count(&self) -> usize {
    self.detections.len()
  }
}
