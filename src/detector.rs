// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/detector.rs - 检测器适配层
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
use tracing::debug;

use crate::model::{DetectResult, Model};

/// 像素坐标的边界框，`x2`/`y2` 为开区间端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl BoundingBox {
  pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> u32 {
    self.x2.saturating_sub(self.x1)
  }

  pub fn height(&self) -> u32 {
    self.y2.saturating_sub(self.y1)
  }

  /// 面积为零的框不能裁剪
  pub fn is_degenerate(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }
}

/// 一个检测到的目标区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  /// 置信度，范围 [0, 1]
  pub confidence: f32,
}

impl Detection {
  pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
    Self { bbox, confidence }
  }
}

#[derive(Error, Debug)]
pub enum DetectionError {
  #[error("检测模型推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// 检测能力：给定一帧，返回按模型输出顺序排列的检测结果
pub trait Detect {
  fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError>;
}

impl<T: Detect + ?Sized> Detect for &T {
  fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
    (**self).detect(frame)
  }
}

impl<T: Detect + ?Sized> Detect for std::sync::Arc<T> {
  fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
    (**self).detect(frame)
  }
}

/// 把模型的归一化输出换算为输入帧的像素坐标
///
/// 框被裁剪到 `[0, width] x [0, height]`，裁剪后面积为零的框被丢弃，
/// 因此返回的每个检测都满足 `x1 < x2 <= width`、`y1 < y2 <= height`。
/// 顺序与模型输出保持一致。
pub struct DetectorAdapter<M> {
  model: M,
}

impl<M> DetectorAdapter<M> {
  pub fn new(model: M) -> Self {
    Self { model }
  }
}

impl<M, E> Detect for DetectorAdapter<M>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
    let result = self
      .model
      .infer(frame)
      .map_err(|e| DetectionError::Inference(Box::new(e)))?;
    Ok(to_pixel_detections(&result, frame.width(), frame.height()))
  }
}

fn to_pixel_detections(result: &DetectResult, width: u32, height: u32) -> Vec<Detection> {
  let (w, h) = (width as f32, height as f32);
  let mut detections = Vec::with_capacity(result.len());

  for item in result.items.iter() {
    let x1 = (item.bbox[0] * w).floor().clamp(0.0, w) as u32;
    let y1 = (item.bbox[1] * h).floor().clamp(0.0, h) as u32;
    let x2 = (item.bbox[2] * w).ceil().clamp(0.0, w) as u32;
    let y2 = (item.bbox[3] * h).ceil().clamp(0.0, h) as u32;

    let bbox = BoundingBox::new(x1, y1, x2, y2);
    if x1 >= x2 || y1 >= y2 {
      debug!("丢弃裁剪后面积为零的检测框: {:?} -> {:?}", item.bbox, bbox);
      continue;
    }

    let confidence = if item.score.is_nan() {
      0.0
    } else {
      item.score.clamp(0.0, 1.0)
    };
    detections.push(Detection::new(bbox, confidence));
  }

  detections
}
