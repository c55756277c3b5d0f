// 该文件是 Paizhao （牌照识读） 项目的一部分。
// src/ocr.rs - 文字提取
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{detector::BoundingBox, output::transcript::single_line};

mod tesseract;
pub use self::tesseract::{TesseractCli, TesseractCliBuilder};

#[derive(Error, Debug)]
pub enum ExtractionError {
  #[error("OCR 引擎 URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("OCR 参数无效: {0}")]
  InvalidParameter(String),
  #[error("无法启动 OCR 引擎: {0}")]
  Spawn(#[source] std::io::Error),
  #[error("OCR 引擎 I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("裁剪图像编码失败: {0}")]
  Encode(#[from] image::ImageError),
  #[error("OCR 引擎异常退出 ({status}): {stderr}")]
  Engine { status: String, stderr: String },
}

/// OCR 能力：给定一张小图，返回识别出的原始文本
pub trait Recognize {
  fn recognize(&self, crop: &RgbImage) -> Result<String, ExtractionError>;
}

impl<T: Recognize + ?Sized> Recognize for &T {
  fn recognize(&self, crop: &RgbImage) -> Result<String, ExtractionError> {
    (**self).recognize(crop)
  }
}

impl<T: Recognize + ?Sized> Recognize for std::sync::Arc<T> {
  fn recognize(&self, crop: &RgbImage) -> Result<String, ExtractionError> {
    (**self).recognize(crop)
  }
}

/// 文字提取器
///
/// 识别失败不会向上传播：记录警告后返回空字符串。
pub struct TextExtractor<R> {
  engine: R,
}

impl<R: Recognize> TextExtractor<R> {
  pub fn new(engine: R) -> Self {
    Self { engine }
  }

  pub fn engine(&self) -> &R {
    &self.engine
  }

  /// 识别已裁剪的图像，结果整理为单行
  ///
  /// 引擎输出多行时（例如 psm 调为 6 识别双行牌照），各行去掉首尾空白后以空格连接。
  pub fn extract(&self, crop: &RgbImage) -> String {
    if crop.width() == 0 || crop.height() == 0 {
      return String::new();
    }

    match self.engine.recognize(crop) {
      Ok(text) => single_line(&text),
      Err(e) => {
        warn!("文字识别失败，按空文本处理: {}", e);
        String::new()
      }
    }
  }

  /// 从整帧中裁剪出检测框区域再识别，零面积框不会调用 OCR
  pub fn extract_region(&self, frame: &RgbImage, bbox: &BoundingBox) -> String {
    let x1 = bbox.x1.min(frame.width());
    let y1 = bbox.y1.min(frame.height());
    let x2 = bbox.x2.min(frame.width());
    let y2 = bbox.y2.min(frame.height());
    if x1 >= x2 || y1 >= y2 {
      debug!("检测框 {:?} 面积为零，跳过识别", bbox);
      return String::new();
    }

    let crop = imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image();
    self.extract(&crop)
  }
}
